//! Schema compilation
//!
//! Orchestrates one compile:
//! 1. Plan the descriptor (pure, nothing touches the engine)
//! 2. Return the registered plan if an identical one exists
//! 3. Create or verify each composite type, inner types first
//! 4. Issue table and index DDL when `sync_tables` is on
//! 5. Publish the plan in the registry
//!
//! A failure at any step registers nothing. Composite types created before a
//! later failure stay in the engine.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::engine::{sync_plan, StorageEngine};
use crate::marshal::Marshaller;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::plan::{ColumnPlanner, StoragePlan, UdtOutcome, UdtRegistry};
use crate::schema::{SchemaDescriptor, SchemaError, SchemaRegistry, SchemaResult};

/// Scope name for the begin/complete/failed lines of one compile
const COMPILE_SCOPE: &str = "SCHEMA_COMPILE";

pub struct Compiler {
    engine: Arc<dyn StorageEngine>,
    registry: Arc<SchemaRegistry>,
    udts: UdtRegistry,
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(engine: Arc<dyn StorageEngine>, config: CompilerConfig) -> Self {
        Self::with_registry(engine, Arc::new(SchemaRegistry::new()), config)
    }

    /// Compiles into an existing registry, e.g. one shared with other
    /// compilers over the same keyspace
    pub fn with_registry(
        engine: Arc<dyn StorageEngine>,
        registry: Arc<SchemaRegistry>,
        config: CompilerConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            udts: UdtRegistry::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn udts(&self) -> &UdtRegistry {
        &self.udts
    }

    /// Compiles one entity schema and registers its plan.
    ///
    /// Compiling an identical schema again returns the registered plan
    /// without touching the engine.
    ///
    /// # Errors
    ///
    /// Any FATAL schema error, DUPLICATE_ENTITY when the name is registered
    /// with another definition, STORAGE_ENGINE when DDL fails.
    pub async fn compile(&self, schema: &SchemaDescriptor) -> SchemaResult<Arc<StoragePlan>> {
        let entity = schema.name.clone().unwrap_or_default();
        let scope = ObservationScope::with_fields(COMPILE_SCOPE, &[("entity", entity.as_str())]);

        match self.compile_inner(schema).await {
            Ok(plan) => {
                scope.complete_with_fields(&[
                    ("columns", plan.columns.len().to_string().as_str()),
                    ("fingerprint", plan.fingerprint().as_str()),
                ]);
                Ok(plan)
            }
            Err(e) => {
                scope.fail_with_fields(e.message(), &[("code", e.code().code())]);
                Err(e)
            }
        }
    }

    async fn compile_inner(&self, schema: &SchemaDescriptor) -> SchemaResult<Arc<StoragePlan>> {
        let plan = ColumnPlanner::new(&self.registry)
            .with_sets_as_arrays(self.config.sets_as_arrays())
            .plan(schema)?;

        if let Some(existing) = self.registry.get(&plan.entity) {
            if existing.same_definition(&plan) {
                log_event_with_fields(Event::PlanCacheHit, &[("entity", plan.entity.as_str())]);
                return Ok(existing);
            }
            return Err(SchemaError::duplicate_entity(&plan.entity));
        }

        for udt in &plan.udts {
            let outcome = self
                .udts
                .get_or_create(self.engine.as_ref(), udt)
                .await
                .map_err(|e| e.with_entity(&plan.entity))?;
            match outcome {
                UdtOutcome::Created => {
                    log_event_with_fields(Event::UdtCreated, &[("udt", udt.name.as_str())])
                }
                UdtOutcome::Verified => {
                    log_event_with_fields(Event::UdtVerified, &[("udt", udt.name.as_str())])
                }
                UdtOutcome::Cached => {}
            }
        }

        if self.config.sync_tables {
            log_event_with_fields(
                Event::TableSyncBegin,
                &[("keyspace", self.config.keyspace.as_str()), ("table", plan.entity.as_str())],
            );
            let summary = sync_plan(self.engine.as_ref(), &plan)
                .await
                .map_err(|e| SchemaError::from(e).with_entity(&plan.entity))?;
            log_event_with_fields(
                Event::TableSyncComplete,
                &[
                    ("indexes", summary.indexes.to_string().as_str()),
                    ("table", plan.entity.as_str()),
                    ("unique_indexes", summary.unique_indexes.to_string().as_str()),
                ],
            );
        }

        let plan = self.registry.insert(plan)?;
        log_event_with_fields(Event::EntityRegistered, &[("entity", plan.entity.as_str())]);
        Ok(plan)
    }

    /// Compiles a batch, referenced entities first.
    ///
    /// # Errors
    ///
    /// DANGLING_REFERENCE when a reference names an entity that is neither in
    /// the batch nor registered, or when references form a cycle. Nothing is
    /// compiled in that case. Otherwise stops at the first failing schema;
    /// plans compiled before it stay registered.
    pub async fn compile_all(&self, schemas: &[SchemaDescriptor]) -> SchemaResult<Vec<Arc<StoragePlan>>> {
        let order = dependency_order(schemas, &self.registry)?;
        let mut plans = Vec::with_capacity(order.len());
        for index in order {
            plans.push(self.compile(&schemas[index]).await?);
        }
        Ok(plans)
    }

    /// Marshaller for a registered entity
    pub fn marshaller(&self, entity: &str) -> SchemaResult<Marshaller> {
        let plan = self.registry.require(entity)?;
        Ok(Marshaller::new(plan, Arc::clone(&self.registry)))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Indexes of `schemas` such that every schema follows the ones it
/// references. Ties keep input order.
fn dependency_order(schemas: &[SchemaDescriptor], registry: &SchemaRegistry) -> SchemaResult<Vec<usize>> {
    let mut by_name = HashMap::new();
    for (index, schema) in schemas.iter().enumerate() {
        let name = match schema.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(SchemaError::name_required("Entity schema")),
        };
        if by_name.insert(name, index).is_some() {
            return Err(SchemaError::duplicate_entity(name));
        }
    }

    let mut state: HashMap<usize, Visit> = HashMap::new();
    let mut order = Vec::with_capacity(schemas.len());
    for index in 0..schemas.len() {
        visit(index, schemas, &by_name, registry, &mut state, &mut order)?;
    }
    Ok(order)
}

fn visit(
    index: usize,
    schemas: &[SchemaDescriptor],
    by_name: &HashMap<&str, usize>,
    registry: &SchemaRegistry,
    state: &mut HashMap<usize, Visit>,
    order: &mut Vec<usize>,
) -> SchemaResult<()> {
    match state.get(&index) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let name = schemas[index].name.clone().unwrap_or_default();
            return Err(SchemaError::reference_cycle(name));
        }
        None => {}
    }
    state.insert(index, Visit::InProgress);

    for target in schemas[index].referenced_entities() {
        match by_name.get(target.as_str()) {
            Some(&dependency) => visit(dependency, schemas, by_name, registry, state, order)?,
            None if registry.contains(&target) => {}
            None => return Err(SchemaError::dangling_reference(target)),
        }
    }

    state.insert(index, Visit::Done);
    order.push(index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::schema::{FieldSpec, PrimitiveKind, SchemaErrorCode, TypeDescriptor};

    fn entity(name: &str, refs: &[&str]) -> SchemaDescriptor {
        let mut schema = SchemaDescriptor::new(name).field(
            FieldSpec::new("id", TypeDescriptor::primitive(PrimitiveKind::Uuid)).partition_key(),
        );
        for target in refs {
            schema = schema.field(FieldSpec::new(
                format!("{}_ref", target),
                TypeDescriptor::reference(*target),
            ));
        }
        schema
    }

    fn names(schemas: &[SchemaDescriptor], order: &[usize]) -> Vec<String> {
        order.iter().map(|i| schemas[*i].name.clone().unwrap()).collect()
    }

    #[test]
    fn test_compile_scope_matches_events() {
        assert_eq!(format!("{}_BEGIN", COMPILE_SCOPE), Event::SchemaCompileBegin.as_str());
        assert_eq!(format!("{}_COMPLETE", COMPILE_SCOPE), Event::SchemaCompileComplete.as_str());
        assert_eq!(format!("{}_FAILED", COMPILE_SCOPE), Event::SchemaCompileFailed.as_str());
    }

    #[test]
    fn test_dependency_order_targets_first() {
        let schemas = vec![
            entity("order", &["user", "product"]),
            entity("user", &["account"]),
            entity("product", &[]),
            entity("account", &[]),
        ];
        let order = dependency_order(&schemas, &SchemaRegistry::new()).unwrap();
        assert_eq!(names(&schemas, &order), vec!["account", "user", "product", "order"]);
    }

    #[test]
    fn test_dependency_order_missing_target() {
        let schemas = vec![entity("order", &["user"])];
        let err = dependency_order(&schemas, &SchemaRegistry::new()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::DanglingReference);
        assert!(err.message().contains("user"));
    }

    #[test]
    fn test_dependency_order_cycle() {
        let schemas = vec![entity("a", &["b"]), entity("b", &["a"])];
        let err = dependency_order(&schemas, &SchemaRegistry::new()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::DanglingReference);
        assert!(err.message().contains("cycle"));
    }

    #[test]
    fn test_dependency_order_duplicate_name() {
        let schemas = vec![entity("a", &[]), entity("a", &[])];
        let err = dependency_order(&schemas, &SchemaRegistry::new()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::DuplicateEntity);
    }

    #[tokio::test]
    async fn test_registered_target_satisfies_reference() {
        let compiler = Compiler::new(Arc::new(MemoryEngine::new("app")), CompilerConfig::default());
        compiler.compile(&entity("user", &[])).await.unwrap();

        let plans = compiler.compile_all(&[entity("order", &["user"])]).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(compiler.registry().entities(), vec!["order", "user"]);
    }

    #[tokio::test]
    async fn test_marshaller_requires_registered_entity() {
        let compiler = Compiler::new(Arc::new(MemoryEngine::new("app")), CompilerConfig::default());
        let err = compiler.marshaller("ghost").unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::DanglingReference);

        compiler.compile(&entity("user", &[])).await.unwrap();
        assert_eq!(compiler.marshaller("user").unwrap().plan().entity, "user");
    }
}
