//! Storage-engine subsystem
//!
//! The handle trait the compiler issues DDL through, CQL rendering, plan
//! synchronization and an in-memory engine.

pub mod ddl;
mod errors;
mod handle;
mod memory;
mod sync;

pub use errors::{EngineError, EngineResult};
pub use handle::StorageEngine;
pub use memory::{EngineCall, EngineOp, MemoryEngine};
pub use sync::{sync_plan, SyncSummary};
