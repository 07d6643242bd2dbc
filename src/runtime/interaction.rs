//! Interaction strategies: how constructors and methods are actually invoked.
//!
//! The interpreter never calls a fixture directly; it goes through the
//! [`Interaction`] chosen by configuration. Strategies are looked up by name
//! with [`interaction_by_name`].

use super::error::{ConfigError, CreateError, InvokeError};
use super::fixture::{Fixture, FixtureFactory};
use crate::protocol::Value;
use std::sync::Arc;
use std::time::Instant;

/// Name of the strategy used when none is configured.
pub const DEFAULT_INTERACTION: &str = "default";

/// Name of the strategy that traces every call.
pub const TRACING_INTERACTION: &str = "tracing";

/// Strategy for constructing fixtures and invoking their methods.
pub trait Interaction: Send + Sync {
    /// Configuration name of this strategy.
    fn name(&self) -> &'static str;

    /// Construct a fixture.
    fn create(
        &self,
        factory: &dyn FixtureFactory,
        args: &[Value],
    ) -> Result<Box<dyn Fixture>, CreateError>;

    /// Invoke a method on a fixture.
    fn invoke(
        &self,
        fixture: &mut dyn Fixture,
        method: &str,
        args: &[Value],
    ) -> Result<Value, InvokeError>;
}

/// Calls straight through to the fixture.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInteraction;

impl Interaction for DefaultInteraction {
    fn name(&self) -> &'static str {
        DEFAULT_INTERACTION
    }

    fn create(
        &self,
        factory: &dyn FixtureFactory,
        args: &[Value],
    ) -> Result<Box<dyn Fixture>, CreateError> {
        factory.construct(args)
    }

    fn invoke(
        &self,
        fixture: &mut dyn Fixture,
        method: &str,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        fixture.invoke(method, args)
    }
}

/// Calls straight through and records each call with its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInteraction;

impl Interaction for TracingInteraction {
    fn name(&self) -> &'static str {
        TRACING_INTERACTION
    }

    fn create(
        &self,
        factory: &dyn FixtureFactory,
        args: &[Value],
    ) -> Result<Box<dyn Fixture>, CreateError> {
        let _span = tracing::info_span!("construct", class = factory.class_name()).entered();
        let started = Instant::now();
        let result = factory.construct(args);
        tracing::info!(
            arity = args.len(),
            ok = result.is_ok(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "constructor returned"
        );
        result
    }

    fn invoke(
        &self,
        fixture: &mut dyn Fixture,
        method: &str,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        let _span =
            tracing::info_span!("invoke", class = fixture.class_name(), method).entered();
        let started = Instant::now();
        let result = fixture.invoke(method, args);
        tracing::info!(
            arity = args.len(),
            ok = result.is_ok(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "method returned"
        );
        result
    }
}

/// Names accepted by [`interaction_by_name`].
pub fn available_interactions() -> &'static [&'static str] {
    &[DEFAULT_INTERACTION, TRACING_INTERACTION]
}

/// Resolve a configured strategy name.
pub fn interaction_by_name(name: &str) -> Result<Arc<dyn Interaction>, ConfigError> {
    match name {
        DEFAULT_INTERACTION => Ok(Arc::new(DefaultInteraction)),
        TRACING_INTERACTION => Ok(Arc::new(TracingInteraction)),
        other => Err(ConfigError::UnknownInteraction {
            name: other.to_owned(),
            available: available_interactions().join(", "),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fixture::FixtureClass;

    #[derive(Default)]
    struct Greeter;

    fn greeter() -> FixtureClass<Greeter> {
        FixtureClass::new("Greeter")
            .default_constructor()
            .method("greet", 1, |_, args| {
                Ok(Value::str(format!("hello {}", args[0])))
            })
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(interaction_by_name("default").unwrap().name(), "default");
        assert_eq!(interaction_by_name("tracing").unwrap().name(), "tracing");
        let err = interaction_by_name("reflective").err().unwrap();
        assert!(err.to_string().contains("default, tracing"), "{err}");
    }

    #[test]
    fn test_strategies_agree() {
        let class = greeter();
        for strategy in available_interactions() {
            let interaction = interaction_by_name(strategy).unwrap();
            let mut fixture = interaction.create(&class, &[]).unwrap();
            let value = interaction
                .invoke(fixture.as_mut(), "greet", &[Value::str("world")])
                .unwrap();
            assert_eq!(value, Value::str("hello world"));
        }
    }
}
