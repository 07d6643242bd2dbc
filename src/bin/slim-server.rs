//! `slim-server` – serve the built-in fixtures over the SLIM protocol.

use anyhow::Context;
use clap::Parser;
use slim::runtime::bootstrap::ServiceArgs;
use slim::runtime::fixtures;
use slim::runtime::registry::FixtureRegistry;
use slim::runtime::service::{Service, SlimListener};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let args = ServiceArgs::parse();
    let print_config = args.print_config;
    let config = args.into_config()?;

    if print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let level = if config.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let mut registry = FixtureRegistry::new();
    fixtures::register_builtin(&mut registry);
    tracing::debug!(types = ?registry.type_names(), "registered fixtures");

    let service = Service::from_config(Arc::new(registry), &config)?;
    let listener = SlimListener::bind(config.bind_addr(), service)
        .with_context(|| format!("failed to bind port {}", config.port))?;
    listener.serve().context("accept loop failed")
}
