//! Registry of compiled entity plans
//!
//! Append-mostly table from entity name to `StoragePlan`, consulted while
//! resolving references. Insertion per name happens at most once: a second
//! insert compiled from the same definition returns the plan already
//! published, any other definition is rejected. Published plans are
//! immutable and shared through `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::{SchemaError, SchemaResult};
use crate::plan::StoragePlan;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    plans: RwLock<HashMap<String, Arc<StoragePlan>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plan registered under `entity`
    pub fn get(&self, entity: &str) -> Option<Arc<StoragePlan>> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned()
    }

    /// Like `get`, but an unknown name is a DANGLING_REFERENCE
    pub fn require(&self, entity: &str) -> SchemaResult<Arc<StoragePlan>> {
        self.get(entity)
            .ok_or_else(|| SchemaError::dangling_reference(entity))
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(entity)
    }

    /// Publishes a plan under its entity name (compare-and-insert).
    ///
    /// # Errors
    ///
    /// DUPLICATE_ENTITY if the name is taken by a plan compiled from another
    /// definition.
    pub fn insert(&self, plan: StoragePlan) -> SchemaResult<Arc<StoragePlan>> {
        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = plans.get(&plan.entity) {
            if existing.same_definition(&plan) {
                return Ok(Arc::clone(existing));
            }
            return Err(SchemaError::duplicate_entity(&plan.entity));
        }

        let plan = Arc::new(plan);
        plans.insert(plan.entity.clone(), Arc::clone(&plan));
        Ok(plan)
    }

    /// Registered entity names, sorted
    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
