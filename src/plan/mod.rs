//! Storage planning subsystem
//!
//! Turns schema descriptors into immutable `StoragePlan`s:
//! - `TypeResolver`: semantic types to physical column types
//! - `ColumnPlanner`: flattening, key and index derivation
//! - `UdtRegistry`: idempotent create-or-verify of composite types
//! - `AccessorTable`: group, virtual and layered accessors

mod accessor;
mod planner;
mod resolver;
mod types;
mod udt;

pub use accessor::{Accessor, AccessorTable};
pub use planner::ColumnPlanner;
pub use resolver::{ResolvedType, TypeResolver, UdtCollector};
pub use types::{
    ColumnSpec, IndexKind, IndexSpec, KeyRole, KeyShape, NativeType, PhysicalType, PrimaryKey,
    ReferenceDescriptor, StoragePlan, UdtDefinition, UdtField, UdtShape, ValueShape,
};
pub use udt::{UdtOutcome, UdtRegistry};
