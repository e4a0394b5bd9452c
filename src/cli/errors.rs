//! CLI-specific error types
//!
//! All CLI errors are fatal: the binary prints them and exits non-zero.

use thiserror::Error;

use crate::config::ConfigError;
use crate::gc::GcError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}: {0}", Self::CONFIG)]
    Config(#[from] ConfigError),

    #[error("{}: {0}", Self::SIMULATION)]
    Simulation(#[from] GcError),

    #[error("{}: {0}", Self::ORDER)]
    OrderViolation(String),
}

impl CliError {
    const CONFIG: &'static str = "GMU_CLI_CONFIG_ERROR";
    const SIMULATION: &'static str = "GMU_CLI_SIMULATION_FAILED";
    const ORDER: &'static str = "GMU_CLI_ORDER_VIOLATION";

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => Self::CONFIG,
            Self::Simulation(_) => Self::SIMULATION,
            Self::OrderViolation(_) => Self::ORDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::from(ConfigError::Invalid("rpc_timeout_ms must be > 0".into()));
        assert_eq!(err.code(), "GMU_CLI_CONFIG_ERROR");
        assert!(err.to_string().starts_with("GMU_CLI_CONFIG_ERROR: "));

        let err = CliError::OrderViolation("node 1".into());
        assert_eq!(err.to_string(), "GMU_CLI_ORDER_VIOLATION: node 1");
    }
}
