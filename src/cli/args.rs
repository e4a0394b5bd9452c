//! CLI argument definitions using clap
//!
//! Commands:
//! - gmu simulate --nodes <n> --transactions <n> --threads <n> --seed <n> [--config <path>]
//! - gmu config [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GMU commit ordering and version garbage collection
#[derive(Parser, Debug)]
#[command(name = "gmu")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a concurrent in-process workload and verify the apply order
    Simulate {
        /// Number of nodes in the cluster
        #[arg(long, default_value_t = 3)]
        nodes: usize,

        /// Total number of transactions
        #[arg(long, default_value_t = 1000)]
        transactions: usize,

        /// Worker threads issuing transactions
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Seed for the arrival order
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
