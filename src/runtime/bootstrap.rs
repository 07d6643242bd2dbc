//! Command-line options for starting the service.

use super::error::ConfigError;
use super::interaction::{DEFAULT_INTERACTION, interaction_by_name};
use super::{DEFAULT_PORT, ServiceConfig};
use clap::Parser;
use std::ffi::OsString;

/// `slim-server [-v] [-i NAME] [--print-config] [PORT]`
#[derive(Debug, Clone, Parser)]
#[command(name = "slim-server")]
#[command(about = "Serve registered fixtures over the SLIM protocol", long_about = None)]
pub struct ServiceArgs {
    /// Log every statement and session event
    #[arg(short, long)]
    pub verbose: bool,

    /// Interaction strategy used to construct fixtures and invoke methods
    #[arg(short, long, default_value = DEFAULT_INTERACTION)]
    pub interaction: String,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// TCP port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ServiceArgs {
    /// Parse arguments that do not include the program name.
    pub fn parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let program = std::iter::once(OsString::from("slim-server"));
        Self::try_parse_from(program.chain(args.into_iter().map(Into::into)))
    }

    /// Validate the interaction name and build the configuration.
    pub fn into_config(self) -> Result<ServiceConfig, ConfigError> {
        interaction_by_name(&self.interaction)?;
        Ok(ServiceConfig {
            port: self.port,
            verbose: self.verbose,
            interaction: self.interaction,
        })
    }
}
