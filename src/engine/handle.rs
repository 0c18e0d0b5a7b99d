//! Storage-engine handle
//!
//! The compiler talks to the wide-column store only through this trait.
//! Calls are awaited and inspected for success/failure; no retries.

use async_trait::async_trait;

use super::errors::EngineResult;
use crate::plan::{ColumnSpec, IndexSpec, PrimaryKey, UdtField};

#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Returns the fields of an existing composite type, or `None`
    async fn describe_composite_type(&self, name: &str) -> EngineResult<Option<Vec<UdtField>>>;

    async fn composite_type_exists(&self, name: &str) -> EngineResult<bool> {
        Ok(self.describe_composite_type(name).await?.is_some())
    }

    async fn create_composite_type(&self, name: &str, fields: &[UdtField]) -> EngineResult<()>;

    async fn create_table(
        &self,
        name: &str,
        columns: &[ColumnSpec],
        key: &PrimaryKey,
        indexes: &[IndexSpec],
    ) -> EngineResult<()>;

    async fn create_index(&self, table: &str, index: &IndexSpec) -> EngineResult<()>;

    async fn create_unique_index(&self, table: &str, index: &IndexSpec) -> EngineResult<()>;
}
