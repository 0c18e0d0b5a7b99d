//! CLI command implementations
//!
//! Both commands follow the same sequence: load config, load the schema
//! directory, compile against an in-memory engine. Nothing connects to a
//! live cluster.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::compiler::Compiler;
use crate::config::CompilerConfig;
use crate::engine::{ddl, MemoryEngine};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::plan::StoragePlan;
use crate::schema::SchemaLoader;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Plan { config, schema_dir } => plan(&config, schema_dir),
        Command::Check { config, schema_dir } => check(&config, schema_dir),
    }
}

/// Print the CQL statements the schema directory needs
pub fn plan(config_path: &Path, schema_dir: Option<PathBuf>) -> CliResult<()> {
    let data = plan_report(config_path, schema_dir)?;
    write_response(data)
}

/// Compile the schema directory, reporting only the outcome
pub fn check(config_path: &Path, schema_dir: Option<PathBuf>) -> CliResult<()> {
    match check_report(config_path, schema_dir) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.schema_code().unwrap_or(e.code_str()), e.message())?;
            Err(e)
        }
    }
}

/// `{"keyspace", "entities", "statements"}` for the compiled directory
pub fn plan_report(config_path: &Path, schema_dir: Option<PathBuf>) -> CliResult<Value> {
    let config = load_config(config_path, schema_dir)?;
    let plans = compile_dir(&config)?;

    let statements: Vec<String> = plans
        .iter()
        .flat_map(|plan| ddl::render_plan(&config.keyspace, plan))
        .map(|statement| format!("{};", statement))
        .collect();

    Ok(json!({
        "keyspace": config.keyspace,
        "entities": entity_names(&plans),
        "statements": statements,
    }))
}

/// `{"entities"}` for the compiled directory
pub fn check_report(config_path: &Path, schema_dir: Option<PathBuf>) -> CliResult<Value> {
    let config = load_config(config_path, schema_dir)?;
    let plans = compile_dir(&config)?;
    Ok(json!({ "entities": entity_names(&plans) }))
}

fn load_config(config_path: &Path, schema_dir: Option<PathBuf>) -> CliResult<CompilerConfig> {
    let mut config = CompilerConfig::load(config_path)?;
    if let Some(dir) = schema_dir {
        config = config.with_schema_dir(dir);
    }

    Logger::set_min_severity(config.severity());
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("keyspace", config.keyspace.as_str()),
            ("path", config_path.display().to_string().as_str()),
        ],
    );
    Ok(config)
}

fn compile_dir(config: &CompilerConfig) -> CliResult<Vec<Arc<StoragePlan>>> {
    let dir = config.schema_dir.as_ref().ok_or_else(CliError::no_schema_dir)?;
    let schemas = SchemaLoader::load_dir(dir)?;

    let engine = Arc::new(MemoryEngine::new(config.keyspace.clone()));
    let compiler = Compiler::new(engine, config.clone());

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime_failed(format!("Failed to create tokio runtime: {}", e)))?;
    let plans = rt.block_on(compiler.compile_all(&schemas))?;
    Ok(plans)
}

fn entity_names(plans: &[Arc<StoragePlan>]) -> Vec<String> {
    plans.iter().map(|plan| plan.entity.clone()).collect()
}
