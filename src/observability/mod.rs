//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Scope-based begin/complete/failed tracing
//!
//! Logging is synchronous and has no side effects on compilation.
//! Marshalling never logs.
//!
//! ```ignore
//! use widerow::observability::{log_event_with_fields, Event, Logger, ObservationScope};
//!
//! Logger::info("SCHEMAS_LOADED", &[("count", "3")]);
//! log_event_with_fields(Event::UdtCreated, &[("udt", "address")]);
//!
//! let scope = ObservationScope::new("SCHEMA_COMPILE");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = event.severity();
    if severity >= Severity::Error {
        Logger::log_stderr(severity, event.as_str(), fields);
    } else {
        Logger::log(severity, event.as_str(), fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::ConfigLoaded);
        log_event(Event::SchemasLoaded);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::EntityRegistered, &[("entity", "user")]);
        log_event_with_fields(Event::SchemaCompileFailed, &[("code", "UDT_CONFLICT")]);
    }
}
