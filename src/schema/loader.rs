//! Schema loader for reading schema literals from disk
//!
//! - One schema literal per `*.json` file
//! - Files are read in file-name order
//! - A missing directory is an empty set, a malformed file is FATAL

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{SchemaError, SchemaResult};
use super::types::SchemaDescriptor;
use crate::observability::{log_event_with_fields, Event};

/// Reads schema literals from a directory.
pub struct SchemaLoader {
    schema_dir: PathBuf,
}

impl SchemaLoader {
    pub fn new(schema_dir: impl Into<PathBuf>) -> Self {
        Self {
            schema_dir: schema_dir.into(),
        }
    }

    /// Returns the schema directory path.
    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Loads every schema file in the directory, sorted by file name.
    pub fn load_all(&self) -> SchemaResult<Vec<SchemaDescriptor>> {
        if !self.schema_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.schema_dir).map_err(|e| {
            SchemaError::definition(format!(
                "Failed to read schema directory {}: {}",
                self.schema_dir.display(),
                e
            ))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SchemaError::definition(format!(
                    "Failed to read directory entry in {}: {}",
                    self.schema_dir.display(),
                    e
                ))
            })?;
            let path = entry.path();

            // Skip non-JSON files
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let schemas = paths
            .iter()
            .map(|path| Self::load_file(path))
            .collect::<SchemaResult<Vec<_>>>()?;

        log_event_with_fields(
            Event::SchemasLoaded,
            &[
                ("count", schemas.len().to_string().as_str()),
                ("dir", self.schema_dir.display().to_string().as_str()),
            ],
        );
        Ok(schemas)
    }

    /// Loads a single schema file.
    pub fn load_file(path: &Path) -> SchemaResult<SchemaDescriptor> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::definition(format!("Failed to read {}: {}", path.display(), e))
        })?;

        SchemaDescriptor::from_json_str(&content).map_err(|e| {
            let message = format!("{}: {}", path.display(), e.message());
            let code = e.code();
            let rebuilt = match code {
                super::SchemaErrorCode::Decode => SchemaError::decode(message),
                _ => SchemaError::definition(message),
            };
            match e.field() {
                Some(field) => rebuilt.with_field(field),
                None => rebuilt,
            }
        })
    }

    /// Convenience for `SchemaLoader::new(dir).load_all()`
    pub fn load_dir(dir: impl AsRef<Path>) -> SchemaResult<Vec<SchemaDescriptor>> {
        Self::new(dir.as_ref()).load_all()
    }
}
