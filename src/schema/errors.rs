//! Schema error types
//!
//! Compile-time codes (FATAL for the schema being compiled):
//! - SCHEMA_DEFINITION, UNSUPPORTED_PRIMITIVE, INVALID_MAP_ARITY,
//!   INVALID_KEY_TYPE, NAME_REQUIRED, KEY_DEFINITION, DANGLING_REFERENCE,
//!   UDT_CONFLICT, DECODE, DUPLICATE_ENTITY, STORAGE_ENGINE
//!
//! Per-instance codes (REJECT the single call):
//! - REQUIRED_FIELD, VALIDATION, ENCODING, UNKNOWN_FIELD

use std::fmt;

use crate::engine::EngineError;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The single instance operation is rejected
    Reject,
    /// Compilation of the schema is aborted and nothing is registered
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Schema error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Malformed field spec or unresolvable layout
    SchemaDefinition,
    /// Primitive name with no physical mapping
    UnsupportedPrimitive,
    /// Map declared with other than two element types
    InvalidMapArity,
    /// Map key that is not string-like
    InvalidKeyType,
    /// Composite type or entity without an explicit name
    NameRequired,
    /// Bad partition/clustering key layout
    KeyDefinition,
    /// Reference to an entity that is not registered
    DanglingReference,
    /// Existing composite type differs from the computed one
    UdtConflict,
    /// Declared type could not be decoded
    Decode,
    /// Entity name already registered with a different layout
    DuplicateEntity,
    /// Storage engine rejected a DDL call
    StorageEngine,
    /// Required value missing on an instance
    RequiredField,
    /// Constraint failed on an instance
    Validation,
    /// Instance value cannot be encoded for its column
    Encoding,
    /// Instance carries a field the plan does not know
    UnknownField,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::SchemaDefinition => "SCHEMA_DEFINITION",
            SchemaErrorCode::UnsupportedPrimitive => "UNSUPPORTED_PRIMITIVE",
            SchemaErrorCode::InvalidMapArity => "INVALID_MAP_ARITY",
            SchemaErrorCode::InvalidKeyType => "INVALID_KEY_TYPE",
            SchemaErrorCode::NameRequired => "NAME_REQUIRED",
            SchemaErrorCode::KeyDefinition => "KEY_DEFINITION",
            SchemaErrorCode::DanglingReference => "DANGLING_REFERENCE",
            SchemaErrorCode::UdtConflict => "UDT_CONFLICT",
            SchemaErrorCode::Decode => "DECODE",
            SchemaErrorCode::DuplicateEntity => "DUPLICATE_ENTITY",
            SchemaErrorCode::StorageEngine => "STORAGE_ENGINE",
            SchemaErrorCode::RequiredField => "REQUIRED_FIELD",
            SchemaErrorCode::Validation => "VALIDATION",
            SchemaErrorCode::Encoding => "ENCODING",
            SchemaErrorCode::UnknownField => "UNKNOWN_FIELD",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::RequiredField
            | SchemaErrorCode::Validation
            | SchemaErrorCode::Encoding
            | SchemaErrorCode::UnknownField => Severity::Reject,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error type with full context
#[derive(Debug)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    /// Field path (e.g. "info.subinfo.name") if applicable
    field: Option<String>,
    /// Entity or composite type name if applicable
    entity: Option<String>,
    source: Option<EngineError>,
}

impl SchemaError {
    fn new(code: SchemaErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            entity: None,
            source: None,
        }
    }

    /// Malformed field spec or layout
    pub fn definition(message: impl Into<String>) -> Self {
        Self::new(SchemaErrorCode::SchemaDefinition, message)
    }

    /// Malformed spec for a specific field
    pub fn field_definition(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            SchemaErrorCode::SchemaDefinition,
            format!("field '{}': {}", field, message.into()),
        )
        .with_field(field)
    }

    pub fn unsupported_primitive(name: impl Into<String>) -> Self {
        Self::new(
            SchemaErrorCode::UnsupportedPrimitive,
            format!("Unsupported primitive type '{}'", name.into()),
        )
    }

    pub fn invalid_map_arity(found: usize) -> Self {
        Self::new(
            SchemaErrorCode::InvalidMapArity,
            format!("Map requires exactly two element types, found {}", found),
        )
    }

    pub fn invalid_key_type(found: impl fmt::Display) -> Self {
        Self::new(
            SchemaErrorCode::InvalidKeyType,
            format!("Map keys must be text-like, found '{}'", found),
        )
    }

    /// Composite type or entity missing its explicit name
    pub fn name_required(what: &str) -> Self {
        Self::new(
            SchemaErrorCode::NameRequired,
            format!("{} requires an explicit name", what),
        )
    }

    pub fn key_definition(message: impl Into<String>) -> Self {
        Self::new(SchemaErrorCode::KeyDefinition, message)
    }

    pub fn dangling_reference(target: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(
            SchemaErrorCode::DanglingReference,
            format!("Reference to unregistered entity '{}'", target),
        )
        .with_entity(target)
    }

    pub fn udt_conflict(name: impl Into<String>, existing: &str, computed: &str) -> Self {
        let name = name.into();
        Self::new(
            SchemaErrorCode::UdtConflict,
            format!(
                "Composite type '{}' exists as {{{}}} but schema computes {{{}}}",
                name, existing, computed
            ),
        )
        .with_entity(name)
    }

    /// No physical mapping for a declared type
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(SchemaErrorCode::Decode, message)
    }

    /// References among a batch of entities that form a cycle
    pub fn reference_cycle(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self::new(
            SchemaErrorCode::DanglingReference,
            format!("References of '{}' form a cycle", entity),
        )
        .with_entity(entity)
    }

    pub fn duplicate_entity(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            SchemaErrorCode::DuplicateEntity,
            format!("Entity '{}' is already registered with a different layout", name),
        )
        .with_entity(name)
    }

    /// Wraps a storage engine failure without altering it
    pub fn engine(error: EngineError) -> Self {
        let mut err = Self::new(SchemaErrorCode::StorageEngine, error.to_string());
        err.source = Some(error);
        err
    }

    pub fn required_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            SchemaErrorCode::RequiredField,
            format!("Field '{}' is required", field),
        )
        .with_field(field)
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            SchemaErrorCode::Validation,
            format!("Validation failed for field '{}': {}", field, message.into()),
        )
        .with_field(field)
    }

    pub fn encoding(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            SchemaErrorCode::Encoding,
            format!("Cannot encode field '{}': {}", field, message.into()),
        )
        .with_field(field)
    }

    pub fn unknown_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            SchemaErrorCode::UnknownField,
            format!("Unknown field '{}'", field),
        )
        .with_field(field)
    }

    /// Attaches the entity (or composite type) the error belongs to
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the field path if applicable
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Returns the entity name if applicable
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Returns the storage engine error this wraps, if any
    pub fn engine_error(&self) -> Option<&EngineError> {
        self.source.as_ref()
    }

    /// Returns whether this error aborts compilation
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " (entity '{}')", entity)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<EngineError> for SchemaError {
    fn from(error: EngineError) -> Self {
        SchemaError::engine(error)
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
