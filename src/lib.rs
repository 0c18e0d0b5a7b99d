//! widerow - schema compiler and instance marshaller for wide-column stores
//!
//! Declarative entity schemas compile into immutable storage plans (columns,
//! primary key, indexes, composite types). Marshallers built from a plan
//! convert application instances to storage rows and back.

pub mod cli;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod marshal;
pub mod observability;
pub mod plan;
pub mod schema;
