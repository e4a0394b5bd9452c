//! CLI module for GMU
//!
//! Provides command-line interface for:
//! - simulate: concurrent in-process workload with order verification
//! - config: print the effective configuration

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{config, run, run_command, simulate};
pub use errors::{CliError, CliResult};
