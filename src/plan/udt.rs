//! Composite type registry
//!
//! One composite type per distinct nested-schema name, created lazily.
//! `get_or_create` checks its cache, then asks the engine: an existing type
//! must match the computed fields exactly (composite types are never
//! altered), a missing one is created. The lock is held across the engine
//! round trip so concurrent compilations never create the same type twice.

use std::collections::HashMap;

use tokio::sync::Mutex;

use super::resolver::TypeResolver;
use super::types::{UdtDefinition, UdtField};
use crate::engine::StorageEngine;
use crate::schema::{SchemaDescriptor, SchemaError, SchemaRegistry, SchemaResult};

/// What `get_or_create` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdtOutcome {
    /// Known from an earlier call, nothing sent to the engine
    Cached,
    /// Existed in the engine with identical fields
    Verified,
    Created,
}

#[derive(Debug, Default)]
pub struct UdtRegistry {
    known: Mutex<HashMap<String, Vec<UdtField>>>,
}

impl UdtRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the composite type, or verifies the existing one.
    ///
    /// # Errors
    ///
    /// - UDT_CONFLICT if a type of that name exists with other fields
    /// - STORAGE_ENGINE if the engine call fails
    pub async fn get_or_create(
        &self,
        engine: &dyn StorageEngine,
        definition: &UdtDefinition,
    ) -> SchemaResult<UdtOutcome> {
        let mut known = self.known.lock().await;

        if let Some(fields) = known.get(&definition.name) {
            return if fields == &definition.fields {
                Ok(UdtOutcome::Cached)
            } else {
                Err(conflict(definition, fields))
            };
        }

        match engine.describe_composite_type(&definition.name).await? {
            Some(existing) if existing == definition.fields => {
                known.insert(definition.name.clone(), existing);
                Ok(UdtOutcome::Verified)
            }
            Some(existing) => Err(conflict(definition, &existing)),
            None => {
                engine
                    .create_composite_type(&definition.name, &definition.fields)
                    .await?;
                known.insert(definition.name.clone(), definition.fields.clone());
                Ok(UdtOutcome::Created)
            }
        }
    }

    /// Derives the composite types of a named nested schema and ensures each
    /// exists. Returns the schema's own type name.
    pub async fn get_or_create_schema(
        &self,
        engine: &dyn StorageEngine,
        schema: &SchemaDescriptor,
        registry: &SchemaRegistry,
    ) -> SchemaResult<String> {
        let definitions = TypeResolver::new(registry).derive_udts(schema)?;
        for definition in &definitions {
            self.get_or_create(engine, definition).await?;
        }
        definitions
            .last()
            .map(|d| d.name.clone())
            .ok_or_else(|| SchemaError::name_required("Composite type"))
    }

    /// Names known to this registry
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.known.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

fn conflict(definition: &UdtDefinition, existing: &[UdtField]) -> SchemaError {
    SchemaError::udt_conflict(
        &definition.name,
        &UdtDefinition::describe_fields(existing),
        &UdtDefinition::describe_fields(&definition.fields),
    )
}
