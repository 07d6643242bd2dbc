//! Built-in fixtures shipped with `slim-server`.
//!
//! Useful for smoke-testing a client against a running service:
//!
//! ```text
//! import  slim.fixtures
//! make    echo    Echo
//! call    echo    echoString   hello
//! ```

use super::error::FixtureError;
use super::fixture::{FixtureClass, arg, arg_str, void};
use super::registry::FixtureRegistry;
use crate::protocol::Value;

/// Namespace the built-in fixtures are registered under.
pub const NAMESPACE: &str = "slim.fixtures";

/// Returns its arguments.
#[derive(Debug, Default)]
pub struct Echo;

/// A named integer counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: i64,
}

/// Type description for [`Echo`].
pub fn echo_class() -> FixtureClass<Echo> {
    FixtureClass::new(format!("{NAMESPACE}.Echo"))
        .default_constructor()
        .method("echoInt", 1, |_, args| {
            Ok(Value::str(arg::<i64>(args, 0)?.to_string()))
        })
        .method("echoString", 1, |_, args| Ok(Value::str(arg_str(args, 0)?)))
        .method("echoList", 1, |_, args| match &args[0] {
            list @ Value::List(_) => Ok(list.clone()),
            Value::Str(_) => Err(FixtureError::new("echoList expects a list")),
        })
        .method("fail", 1, |_, args| Err(FixtureError::new(arg_str(args, 0)?)))
        .method("stop", 1, |_, args| {
            Err(FixtureError::stop_test(arg_str(args, 0)?))
        })
}

/// Type description for [`Counter`].
pub fn counter_class() -> FixtureClass<Counter> {
    FixtureClass::new(format!("{NAMESPACE}.Counter"))
        .default_constructor()
        .constructor(1, |args| Ok(Counter { value: arg(args, 0)? }))
        .method("increment", 0, |counter, _| {
            counter.value += 1;
            Ok(void())
        })
        .method("add", 1, |counter, args| {
            counter.value += arg::<i64>(args, 0)?;
            Ok(void())
        })
        .method("value", 0, |counter, _| Ok(Value::str(counter.value.to_string())))
        .method("reset", 0, |counter, _| {
            counter.value = 0;
            Ok(void())
        })
}

/// Register every built-in fixture.
pub fn register_builtin(registry: &mut FixtureRegistry) {
    registry
        .register_class(echo_class())
        .register_class(counter_class());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ExceptionKind, Outcome, Statement};
    use crate::runtime::interaction::DefaultInteraction;
    use crate::runtime::interpreter::Interpreter;
    use std::sync::Arc;

    #[test]
    fn test_builtins_through_interpreter() {
        let mut registry = FixtureRegistry::new();
        register_builtin(&mut registry);
        let mut interpreter = Interpreter::new(Arc::new(registry), Arc::new(DefaultInteraction));

        let execution = interpreter.execute(vec![
            Statement::import("i", NAMESPACE),
            Statement::make("m1", "echo", "Echo"),
            Statement::make("m2", "counter", "Counter").arg("40"),
            Statement::call("c1", "counter", "add").arg("2"),
            Statement::call("c2", "counter", "value"),
            Statement::call("c3", "echo", "echoInt").arg("x"),
            Statement::call("c4", "echo", "echoList").arg(Value::list(["a"])),
        ]);

        let outcome = |id: &str| {
            execution
                .results
                .iter()
                .find(|entry| entry.id == id)
                .map(|entry| entry.outcome.clone())
                .unwrap()
        };
        assert_eq!(outcome("c2"), Outcome::Value(Value::str("42")));
        assert_eq!(
            outcome("c3").exception().map(|e| e.kind.clone()),
            Some(ExceptionKind::Fixture)
        );
        assert_eq!(outcome("c4"), Outcome::Value(Value::list(["a"])));
    }
}
