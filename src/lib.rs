//! Slim – a minimal list-based remote invocation protocol for test fixtures
//!
//! This crate implements both halves of the SLIM protocol:
//! - A length-prefixed wire codec for nested lists of strings
//! - Typed statements (`import`, `make`, `call`, `callAndAssign`, `assign`)
//! - A per-connection interpreter that executes statement batches against
//!   registered fixtures, with stop-on-fatal semantics
//! - A TCP service and a synchronous client that drives it

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Wire codec, statements, and exception encoding
pub mod protocol;
/// Interpreter, fixtures, service, and client
pub mod runtime;

// Re-export key types for convenience
pub use protocol::{SlimException, Statement, Value};
pub use runtime::service_client::{Response, SlimClient};
pub use runtime::{ServiceConfig, service::Service};

/// Current version of the Slim crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version announced by the service during the handshake
pub const PROTOCOL_VERSION: f64 = 0.5;
