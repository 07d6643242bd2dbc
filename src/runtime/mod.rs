//! Session runtime: fixtures, interpreter, service, and client
//!
//! This module ties the protocol to sockets. The server side is
//! [`service::Service`] (one session per connection) and
//! [`service::SlimListener`] (accept loop); the client side is
//! [`service_client::SlimClient`].

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

// Submodules
#[cfg(feature = "cli")]
pub mod bootstrap;
pub mod error;
pub mod fixture;
pub mod fixtures;
pub mod interaction;
pub mod interpreter;
pub mod registry;
pub mod service;
pub mod service_client;

use error::ConfigError;
use interaction::{DEFAULT_INTERACTION, Interaction};

/// Port the service listens on when none is given.
pub const DEFAULT_PORT: u16 = 8099;

/// Configuration for the Slim service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// TCP port to listen on
    pub port: u16,

    /// Log every statement and session event
    pub verbose: bool,

    /// Name of the interaction strategy (see [`interaction::available_interactions`])
    pub interaction: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            verbose: false,
            interaction: DEFAULT_INTERACTION.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Address to bind: every interface, configured port.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Resolve the configured interaction strategy.
    pub fn interaction(&self) -> Result<Arc<dyn Interaction>, ConfigError> {
        interaction::interaction_by_name(&self.interaction)
    }
}

// Re-export commonly used types
pub use fixture::{Fixture, FixtureClass, FixtureFactory};
pub use interpreter::{Execution, Interpreter, InterpreterState};
pub use registry::FixtureRegistry;
