//! Table synchronization
//!
//! Issues the DDL calls for a compiled plan: table first, then secondary
//! indexes, then unique indexes. Composite types are handled by
//! `UdtRegistry` before this runs. Failures propagate unchanged.

use super::errors::EngineResult;
use super::handle::StorageEngine;
use crate::plan::StoragePlan;

/// Number of DDL calls issued for one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSummary {
    pub tables: usize,
    pub indexes: usize,
    pub unique_indexes: usize,
}

pub async fn sync_plan(engine: &dyn StorageEngine, plan: &StoragePlan) -> EngineResult<SyncSummary> {
    engine
        .create_table(&plan.entity, &plan.columns, &plan.key, &plan.indexes)
        .await?;

    for index in &plan.indexes {
        engine.create_index(&plan.entity, index).await?;
    }
    for index in &plan.unique_indexes {
        engine.create_unique_index(&plan.entity, index).await?;
    }

    Ok(SyncSummary {
        tables: 1,
        indexes: plan.indexes.len(),
        unique_indexes: plan.unique_indexes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, EngineError, EngineOp, MemoryEngine};
    use crate::plan::ColumnPlanner;
    use crate::schema::{FieldSpec, IndexFlag, PrimitiveKind, SchemaDescriptor, SchemaRegistry, TypeDescriptor};

    fn plan() -> StoragePlan {
        let string = || TypeDescriptor::primitive(PrimitiveKind::String);
        let schema = SchemaDescriptor::new("user")
            .field(FieldSpec::new("id", string()).partition_key())
            .field(FieldSpec::new("email", string()).unique())
            .field(FieldSpec::new("city", string()).secondary_index(IndexFlag::Simple));
        ColumnPlanner::new(&SchemaRegistry::new()).plan(&schema).unwrap()
    }

    #[tokio::test]
    async fn test_sync_issues_table_then_indexes() {
        let engine = MemoryEngine::new("app");
        let summary = sync_plan(&engine, &plan()).await.unwrap();

        assert_eq!(summary, SyncSummary { tables: 1, indexes: 1, unique_indexes: 1 });
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::CreateTable("user".into()),
                EngineCall::CreateIndex("user_city_idx".into()),
                EngineCall::CreateUniqueIndex("user_email_uniq".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_engine_failure_propagates_unchanged() {
        let engine = MemoryEngine::new("app");
        engine.fail_on(EngineOp::CreateIndex, EngineError::Rejected("no".into()));

        let err = sync_plan(&engine, &plan()).await.unwrap_err();
        assert_eq!(err, EngineError::Rejected("no".into()));
        assert!(!engine.calls().contains(&EngineCall::CreateUniqueIndex("user_email_uniq".into())));
    }
}
