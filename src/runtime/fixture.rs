//! Fixture capability interface.
//!
//! A fixture is any object the interpreter can call by method name. Most
//! fixtures are plain Rust structs described with [`FixtureClass`], which
//! resolves `(method name, argument count)` to a registered closure. Types
//! that want full control can implement [`Fixture`] and [`FixtureFactory`]
//! directly.

use super::error::{CreateError, FixtureError, InvokeError};
use crate::protocol::{VOID, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// A live fixture instance bound in a session.
pub trait Fixture: Send {
    /// Type name, used in error details.
    fn class_name(&self) -> &str;

    /// Invoke `method` with `args`.
    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, InvokeError>;
}

/// Something that can construct fixtures of one type.
pub trait FixtureFactory: Send + Sync {
    /// Fully qualified type name.
    fn class_name(&self) -> &str;

    /// Construct a new instance from constructor arguments.
    fn construct(&self, args: &[Value]) -> Result<Box<dyn Fixture>, CreateError>;
}

type Constructor<T> = Arc<dyn Fn(&[Value]) -> Result<T, FixtureError> + Send + Sync>;
type Method<T> = Arc<dyn Fn(&mut T, &[Value]) -> Result<Value, FixtureError> + Send + Sync>;
type MethodTable<T> = HashMap<String, HashMap<usize, Method<T>>>;

/// Describes a Rust type as a fixture: its constructors and methods, keyed by
/// argument count.
pub struct FixtureClass<T> {
    name: String,
    constructors: HashMap<usize, Constructor<T>>,
    methods: Arc<MethodTable<T>>,
}

impl<T: Send + 'static> FixtureClass<T> {
    /// Start describing a type registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: HashMap::new(),
            methods: Arc::new(HashMap::new()),
        }
    }

    /// Add a constructor taking exactly `arity` arguments.
    pub fn constructor<F>(mut self, arity: usize, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> Result<T, FixtureError> + Send + Sync + 'static,
    {
        self.constructors.insert(arity, Arc::new(constructor));
        self
    }

    /// Add a method taking exactly `arity` arguments. Overloads by arity are
    /// allowed; registering the same name and arity again replaces it.
    pub fn method<F>(mut self, name: impl Into<String>, arity: usize, method: F) -> Self
    where
        F: Fn(&mut T, &[Value]) -> Result<Value, FixtureError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.methods)
            .entry(name.into())
            .or_default()
            .insert(arity, Arc::new(method));
        self
    }
}

impl<T: Default + Send + 'static> FixtureClass<T> {
    /// Add a zero-argument constructor using `T::default()`.
    pub fn default_constructor(self) -> Self {
        self.constructor(0, |_| Ok(T::default()))
    }
}

impl<T: Send + 'static> FixtureFactory for FixtureClass<T> {
    fn class_name(&self) -> &str {
        &self.name
    }

    fn construct(&self, args: &[Value]) -> Result<Box<dyn Fixture>, CreateError> {
        let constructor = self
            .constructors
            .get(&args.len())
            .ok_or(CreateError::NoConstructor { arity: args.len() })?;
        let value = constructor(args)?;
        Ok(Box::new(ClassInstance {
            class: self.name.clone(),
            value,
            methods: Arc::clone(&self.methods),
        }))
    }
}

struct ClassInstance<T> {
    class: String,
    value: T,
    methods: Arc<MethodTable<T>>,
}

impl<T: Send> Fixture for ClassInstance<T> {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, InvokeError> {
        let body = self
            .methods
            .get(method)
            .and_then(|overloads| overloads.get(&args.len()))
            .ok_or_else(|| InvokeError::NoMethod {
                method: method.to_owned(),
                arity: args.len(),
            })?;
        Ok(body(&mut self.value, args)?)
    }
}

/// Borrow argument `index` as a string.
pub fn arg_str(args: &[Value], index: usize) -> Result<&str, FixtureError> {
    args.get(index)
        .ok_or_else(|| FixtureError::new(format!("missing argument {index}")))?
        .as_str()
        .ok_or_else(|| FixtureError::new(format!("argument {index} must be a string")))
}

/// Convert argument `index` from its string form.
pub fn arg<T>(args: &[Value], index: usize) -> Result<T, FixtureError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = arg_str(args, index)?;
    text.parse()
        .map_err(|err| FixtureError::new(format!("argument {index} ({text:?}): {err}")))
}

/// Result value for methods that return nothing.
pub fn void() -> Value {
    Value::str(VOID)
}
