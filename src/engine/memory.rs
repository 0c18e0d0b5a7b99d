//! In-memory storage engine
//!
//! Keeps composite types and table names in memory and records every call
//! and rendered statement. Used by the CLI to print a plan's DDL and by
//! tests to count create calls. Failures can be injected per operation.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::ddl;
use super::errors::{EngineError, EngineResult};
use super::handle::StorageEngine;
use crate::plan::{ColumnSpec, IndexSpec, PrimaryKey, UdtField};

/// Operation kinds, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    DescribeType,
    CreateType,
    CreateTable,
    CreateIndex,
    CreateUniqueIndex,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    DescribeType(String),
    CreateType(String),
    CreateTable(String),
    CreateIndex(String),
    CreateUniqueIndex(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    types: BTreeMap<String, Vec<UdtField>>,
    tables: Vec<(String, Vec<ColumnSpec>)>,
    calls: Vec<EngineCall>,
    statements: Vec<String>,
    failures: Vec<(EngineOp, EngineError)>,
}

#[derive(Debug)]
pub struct MemoryEngine {
    keyspace: String,
    /// Delay applied before answering a type lookup
    latency: Option<Duration>,
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            latency: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seeds an existing composite type
    pub fn with_type(self, name: impl Into<String>, fields: Vec<UdtField>) -> Self {
        self.lock().types.insert(name.into(), fields);
        self
    }

    /// Makes every later call of `op` fail with `error`
    pub fn fail_on(&self, op: EngineOp, error: EngineError) {
        self.lock().failures.push((op, error));
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Rendered statements of the successful create calls
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn composite_type(&self, name: &str) -> Option<Vec<UdtField>> {
        self.lock().types.get(name).cloned()
    }

    pub fn tables(&self) -> Vec<String> {
        self.lock().tables.iter().map(|(name, _)| name.clone()).collect()
    }

    fn table_columns(&self, table: &str) -> Vec<ColumnSpec> {
        self.lock()
            .tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, columns)| columns.clone())
            .unwrap_or_default()
    }

    /// Number of composite type create calls issued
    pub fn type_creates(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::CreateType(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the injected failure, if any
    fn record(&self, op: EngineOp, call: EngineCall) -> EngineResult<()> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.iter().find(|(o, _)| *o == op) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn describe_composite_type(&self, name: &str) -> EngineResult<Option<Vec<UdtField>>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.record(EngineOp::DescribeType, EngineCall::DescribeType(name.to_string()))?;
        Ok(self.composite_type(name))
    }

    async fn create_composite_type(&self, name: &str, fields: &[UdtField]) -> EngineResult<()> {
        self.record(EngineOp::CreateType, EngineCall::CreateType(name.to_string()))?;
        let statement = ddl::create_type(&self.keyspace, name, fields);
        let mut state = self.lock();
        state.types.entry(name.to_string()).or_insert_with(|| fields.to_vec());
        state.statements.push(statement);
        Ok(())
    }

    async fn create_table(
        &self,
        name: &str,
        columns: &[ColumnSpec],
        key: &PrimaryKey,
        _indexes: &[IndexSpec],
    ) -> EngineResult<()> {
        self.record(EngineOp::CreateTable, EngineCall::CreateTable(name.to_string()))?;
        let statement = ddl::create_table(&self.keyspace, name, columns, key);
        let mut state = self.lock();
        if !state.tables.iter().any(|(t, _)| t == name) {
            state.tables.push((name.to_string(), columns.to_vec()));
        }
        state.statements.push(statement);
        Ok(())
    }

    async fn create_index(&self, table: &str, index: &IndexSpec) -> EngineResult<()> {
        self.record(EngineOp::CreateIndex, EngineCall::CreateIndex(index.name.clone()))?;
        let statement = ddl::create_index(&self.keyspace, table, index, &self.table_columns(table));
        self.lock().statements.push(statement);
        Ok(())
    }

    async fn create_unique_index(&self, table: &str, index: &IndexSpec) -> EngineResult<()> {
        self.record(
            EngineOp::CreateUniqueIndex,
            EngineCall::CreateUniqueIndex(index.name.clone()),
        )?;
        let statement =
            ddl::create_unique_index(&self.keyspace, table, index, &self.table_columns(table));
        self.lock().statements.push(statement);
        Ok(())
    }
}
