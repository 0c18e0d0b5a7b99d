//! CLI module
//!
//! Provides command-line interface for:
//! - plan: compile a schema directory and print its CQL
//! - check: compile a schema directory and report the outcome

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, check_report, plan, plan_report, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
