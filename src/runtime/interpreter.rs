//! Statement interpreter
//!
//! One [`Interpreter`] serves one session. It owns the session's instance
//! table, symbol table, and import list, and executes each batch strictly in
//! order. A failing statement becomes an exception entry and execution moves
//! on, unless the failure is a stop-test, in which case the batch ends there
//! and later statements produce no entry at all.

use super::error::{CreateError, InvokeError};
use super::fixture::Fixture;
use super::interaction::Interaction;
use super::registry::FixtureRegistry;
use crate::protocol::codec::encode;
use crate::protocol::{
    ExceptionKind, Instruction, OK, Outcome, ResultEntry, SlimException, Statement, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Where the interpreter is in its current (or last) batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    /// No batch executed yet
    Ready,
    /// Executing statement `index` of `total`
    Executing {
        /// Zero-based position in the batch
        index: usize,
        /// Batch length
        total: usize,
    },
    /// The last batch ran to the end
    Done,
    /// The last batch was cut short by a stop-test at `index`
    Halted {
        /// Position of the stopping statement
        index: usize,
    },
}

/// Results of one batch and the state it ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// One entry per executed statement, in statement order
    pub results: Vec<ResultEntry>,
    /// [`InterpreterState::Done`] or [`InterpreterState::Halted`]
    pub state: InterpreterState,
}

impl Execution {
    /// Whether a stop-test cut the batch short.
    pub fn halted(&self) -> bool {
        matches!(self.state, InterpreterState::Halted { .. })
    }
}

/// Per-session executor of statement batches.
pub struct Interpreter {
    registry: Arc<FixtureRegistry>,
    interaction: Arc<dyn Interaction>,
    instances: HashMap<String, Box<dyn Fixture>>,
    symbols: HashMap<String, String>,
    imports: Vec<String>,
    state: InterpreterState,
}

impl Interpreter {
    /// Create an interpreter with empty tables.
    pub fn new(registry: Arc<FixtureRegistry>, interaction: Arc<dyn Interaction>) -> Self {
        Self {
            registry,
            interaction,
            instances: HashMap::new(),
            symbols: HashMap::new(),
            imports: Vec::new(),
            state: InterpreterState::Ready,
        }
    }

    /// Current state.
    pub fn state(&self) -> InterpreterState {
        self.state
    }

    /// Whether an instance is bound under `name`.
    pub fn has_instance(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// Number of bound instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Current value of a symbol.
    pub fn symbol(&self, name: &str) -> Option<&str> {
        self.symbols.get(name).map(String::as_str)
    }

    /// Drop every instance, symbol, and import.
    pub fn reset(&mut self) {
        self.instances.clear();
        self.symbols.clear();
        self.imports.clear();
        self.state = InterpreterState::Ready;
    }

    /// Execute a batch in order, stopping after the first stop-test failure.
    pub fn execute(&mut self, statements: Vec<Statement>) -> Execution {
        let total = statements.len();
        let mut results = Vec::with_capacity(total);

        for (index, statement) in statements.into_iter().enumerate() {
            self.state = InterpreterState::Executing { index, total };
            let id = statement.id.clone();
            let outcome = self.step(statement);

            let stop = outcome.exception().is_some_and(SlimException::is_stop_test);
            results.push(ResultEntry { id, outcome });
            if stop {
                self.state = InterpreterState::Halted { index };
                tracing::debug!(index, total, "stop-test exception, abandoning batch");
                return Execution {
                    results,
                    state: self.state,
                };
            }
        }

        self.state = InterpreterState::Done;
        Execution {
            results,
            state: self.state,
        }
    }

    fn step(&mut self, statement: Statement) -> Outcome {
        tracing::debug!(id = %statement.id, verb = %statement.verb(), "executing statement");
        let result = match statement.instruction {
            Instruction::Import { path } => {
                self.imports.push(path);
                Ok(Value::str(OK))
            }
            Instruction::Make {
                instance,
                class,
                args,
            } => {
                let args = self.substitute_all(args);
                self.make(instance, &class, &args)
            }
            Instruction::Call {
                instance,
                method,
                args,
            } => {
                let args = self.substitute_all(args);
                self.call(&instance, &method, &args)
            }
            Instruction::CallAndAssign {
                symbol,
                instance,
                method,
                args,
            } => {
                let args = self.substitute_all(args);
                self.call(&instance, &method, &args).inspect(|value| {
                    self.symbols.insert(symbol, symbol_text(value));
                })
            }
            Instruction::Assign { symbol, value } => {
                let value = self.substitute(value);
                self.symbols.insert(symbol, symbol_text(&value));
                Ok(Value::str(OK))
            }
        };

        match result {
            Ok(value) => Outcome::Value(value),
            Err(exception) => {
                tracing::debug!(id = %statement.id, %exception, "statement failed");
                Outcome::Exception(exception)
            }
        }
    }

    fn make(&mut self, instance: String, class: &str, args: &[Value]) -> Result<Value, SlimException> {
        let factory = self
            .registry
            .resolve(class, &self.imports)
            .ok_or_else(|| {
                SlimException::could_not_invoke_constructor(class, args.len(), "no such class")
            })?;

        let fixture = self
            .interaction
            .create(factory.as_ref(), args)
            .map_err(|err| {
                let reason = match err {
                    CreateError::NoConstructor { .. } => "no matching constructor".to_owned(),
                    CreateError::Fixture(err) => err.message,
                };
                SlimException::could_not_invoke_constructor(class, args.len(), &reason)
            })?;

        self.instances.insert(instance, fixture);
        Ok(Value::str(OK))
    }

    fn call(&mut self, instance: &str, method: &str, args: &[Value]) -> Result<Value, SlimException> {
        let fixture = self
            .instances
            .get_mut(instance)
            .ok_or_else(|| SlimException::no_instance(instance, method))?;

        self.interaction
            .invoke(fixture.as_mut(), method, args)
            .map_err(|err| match err {
                InvokeError::NoMethod { method, arity } => {
                    SlimException::no_method_in_class(&method, arity, fixture.class_name())
                }
                InvokeError::Fixture(err) if err.stop_test => {
                    SlimException::new(ExceptionKind::StopTest, err.message)
                }
                InvokeError::Fixture(err) => SlimException::new(ExceptionKind::Fixture, err.message),
            })
    }

    fn substitute_all(&self, args: Vec<Value>) -> Vec<Value> {
        args.into_iter().map(|arg| self.substitute(arg)).collect()
    }

    fn substitute(&self, value: Value) -> Value {
        if self.symbols.is_empty() {
            return value;
        }
        match value {
            Value::Str(text) => Value::Str(substitute_symbols(&text, &self.symbols)),
            Value::List(items) => Value::List(self.substitute_all(items)),
        }
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("interaction", &self.interaction.name())
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("symbols", &self.symbols)
            .field("imports", &self.imports)
            .field("state", &self.state)
            .finish()
    }
}

fn symbol_text(value: &Value) -> String {
    match value {
        Value::Str(text) => text.clone(),
        Value::List(_) => String::from_utf8_lossy(&encode(value)).into_owned(),
    }
}

/// Replace each `$name` whose name is defined in `symbols`.
///
/// A name is an ASCII letter followed by ASCII letters, digits, or `_`.
/// References to undefined symbols are left as written.
pub fn substitute_symbols(text: &str, symbols: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name = &after[..symbol_name_len(after)];
        match symbols.get(name).filter(|_| !name.is_empty()) {
            Some(value) => {
                out.push_str(value);
                rest = &after[name.len()..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn symbol_name_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(first) if first.is_ascii_alphabetic() => bytes
            .iter()
            .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
            .count(),
        _ => 0,
    }
}
