//! CLI command implementations

use std::path::Path;

use crate::config::GmuConfig;
use crate::node::{self, SimulationOptions};
use crate::observability::{log_event_with_fields, Event, Logger};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Simulate {
            nodes,
            transactions,
            threads,
            seed,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            simulate(SimulationOptions {
                nodes,
                transactions,
                threads,
                seed,
                config,
            })
        }
        Command::Config { config } => self::config(config.as_deref()),
    }
}

/// Load the configuration file, or defaults when none is given, and
/// apply its log level.
fn load_config(path: Option<&Path>) -> CliResult<GmuConfig> {
    let config = match path {
        Some(path) => GmuConfig::load(path)?,
        None => GmuConfig::default(),
    };
    Logger::set_min_severity(config.severity()?);
    log_event_with_fields(
        Event::ConfigLoaded,
        &[(
            "source",
            &path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string()),
        )],
    );
    Ok(config)
}

/// Run the simulation and print its report as JSON.
///
/// Fails when any node applied out of order or kept queued entries.
pub fn simulate(options: SimulationOptions) -> CliResult<()> {
    let report = node::simulate(&options)?;
    println!("{}", report.to_json());

    if !report.drain_order_ok {
        let offenders: Vec<&str> = report
            .nodes
            .iter()
            .filter(|n| !n.ordered || n.queue_size != 0)
            .map(|n| n.address.as_str())
            .collect();
        return Err(CliError::OrderViolation(format!(
            "nodes out of order or not drained: {}",
            offenders.join(",")
        )));
    }
    Ok(())
}

/// Print the effective configuration as JSON.
pub fn config(path: Option<&Path>) -> CliResult<()> {
    let config = load_config(path)?;
    println!("{}", config.to_json());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_command_with_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"rpc_timeout_ms": 500, "log_level": "warn"}}"#).unwrap();
        assert!(config(Some(file.path())).is_ok());
    }

    #[test]
    fn test_config_command_rejects_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"rpc_timeout_ms": 0}}"#).unwrap();
        let err = config(Some(file.path())).unwrap_err();
        assert_eq!(err.code(), "GMU_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_simulate_command() {
        let result = run_command(Command::Simulate {
            nodes: 2,
            transactions: 24,
            threads: 2,
            seed: 3,
            config: None,
        });
        assert!(result.is_ok());
    }
}
