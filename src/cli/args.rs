//! CLI argument definitions using clap
//!
//! Commands:
//! - widerow plan --config <path> [--schema-dir <dir>]
//! - widerow check --config <path> [--schema-dir <dir>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// widerow - schema compiler for wide-column stores
#[derive(Parser, Debug)]
#[command(name = "widerow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the schema directory and print the CQL it needs
    Plan {
        /// Path to configuration file
        #[arg(long, default_value = "./widerow.json")]
        config: PathBuf,

        /// Schema directory, overrides `schema_dir` in the config
        #[arg(long)]
        schema_dir: Option<PathBuf>,
    },

    /// Compile the schema directory and report success or failure
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./widerow.json")]
        config: PathBuf,

        /// Schema directory, overrides `schema_dir` in the config
        #[arg(long)]
        schema_dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from(["widerow", "plan", "--config", "c.json", "--schema-dir", "s"]).unwrap();
        match cli.command {
            Command::Plan { config, schema_dir } => {
                assert_eq!(config, PathBuf::from("c.json"));
                assert_eq!(schema_dir, Some(PathBuf::from("s")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_defaults() {
        let cli = Cli::try_parse_from(["widerow", "check"]).unwrap();
        match cli.command {
            Command::Check { config, schema_dir } => {
                assert_eq!(config, PathBuf::from("./widerow.json"));
                assert!(schema_dir.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
