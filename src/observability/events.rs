//! Observable events
//!
//! Every line the compiler logs names one of these events.

use std::fmt;

use super::logger::Severity;

/// Observable events during schema loading and compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Schema literals read from disk
    SchemasLoaded,

    // Compilation
    /// Compilation of one descriptor started
    SchemaCompileBegin,
    /// Compilation produced and registered a plan
    SchemaCompileComplete,
    /// Compilation failed, nothing registered
    SchemaCompileFailed,
    /// The registry already held an identical plan
    PlanCacheHit,

    // Composite types
    /// A composite type was created
    UdtCreated,
    /// An existing composite type matched its definition
    UdtVerified,

    // Tables
    /// Table and index DDL about to be issued
    TableSyncBegin,
    /// Table and index DDL issued
    TableSyncComplete,

    /// A plan was published in the registry
    EntityRegistered,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",

            Event::SchemaCompileBegin => "SCHEMA_COMPILE_BEGIN",
            Event::SchemaCompileComplete => "SCHEMA_COMPILE_COMPLETE",
            Event::SchemaCompileFailed => "SCHEMA_COMPILE_FAILED",
            Event::PlanCacheHit => "PLAN_CACHE_HIT",

            Event::UdtCreated => "UDT_CREATED",
            Event::UdtVerified => "UDT_VERIFIED",

            Event::TableSyncBegin => "TABLE_SYNC_BEGIN",
            Event::TableSyncComplete => "TABLE_SYNC_COMPLETE",

            Event::EntityRegistered => "ENTITY_REGISTERED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::SchemaCompileFailed => Severity::Error,
            Event::PlanCacheHit | Event::UdtVerified => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
