//! Schema subsystem
//!
//! Schema descriptors (builder API and JSON literals), instance values,
//! validation assembly, the entity registry and the coded error type.
//!
//! # Design Principles
//!
//! - Descriptors are immutable once compiled
//! - Compile-time errors are FATAL for the schema, nothing is registered
//! - Per-instance errors REJECT only the failing call

mod errors;
mod literal;
mod loader;
mod registry;
mod types;
pub mod validator;
mod value;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult, Severity};
pub use loader::SchemaLoader;
pub use registry::SchemaRegistry;
pub use types::{
    AccessorHooks, CollectionKind, Constraint, CustomValidator, DefaultContext, DefaultFn,
    DefaultValue, FieldFlags, FieldSpec, Generator, GetterFn, IndexDeclaration, IndexFlag,
    KeyLayout, PrimitiveKind, SchemaDescriptor, SchemaNode, SchemaOptions, SetterFn, SortOrder,
    Transform, TypeDescriptor, ValidateFn,
};
pub use value::{record_from_json, Record, Value};
