//! Storage plan types
//!
//! A `StoragePlan` is the compiled, immutable form of one entity schema:
//! ordered physical columns, key layout, index layout, composite type
//! dependencies and the compiled validator/transform pipelines.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::accessor::AccessorTable;
use crate::schema::validator::{CompiledValidator, TransformPipeline};
use crate::schema::{DefaultValue, Record, SchemaResult, SortOrder, Value};

/// Native column types of the wide-column store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Text,
    Ascii,
    Float,
    Double,
    Int,
    BigInt,
    Decimal,
    Counter,
    Boolean,
    Timestamp,
    Date,
    Uuid,
    TimeUuid,
    Blob,
    Inet,
}

impl NativeType {
    pub fn name(&self) -> &'static str {
        match self {
            NativeType::Text => "text",
            NativeType::Ascii => "ascii",
            NativeType::Float => "float",
            NativeType::Double => "double",
            NativeType::Int => "int",
            NativeType::BigInt => "bigint",
            NativeType::Decimal => "decimal",
            NativeType::Counter => "counter",
            NativeType::Boolean => "boolean",
            NativeType::Timestamp => "timestamp",
            NativeType::Date => "date",
            NativeType::Uuid => "uuid",
            NativeType::TimeUuid => "timeuuid",
            NativeType::Blob => "blob",
            NativeType::Inet => "inet",
        }
    }

    /// Text-like types are the only ones allowed as map keys
    pub fn is_text_like(&self) -> bool {
        matches!(self, NativeType::Text | NativeType::Ascii)
    }

    /// Converts a value into this type's canonical form where lossless.
    ///
    /// Returns the expected type description on failure.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        let expected = || format!("{} value, got {}", self.name(), value.type_name());
        match (self, value) {
            (NativeType::Text, Value::Text(_)) => Ok(value.clone()),
            (NativeType::Ascii, Value::Text(s)) if s.is_ascii() => Ok(value.clone()),
            (NativeType::Float | NativeType::Double, Value::Float(_)) => Ok(value.clone()),
            (NativeType::Float | NativeType::Double, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (NativeType::Int, Value::Int(i)) if i32::try_from(*i).is_ok() => Ok(value.clone()),
            (NativeType::BigInt | NativeType::Counter, Value::Int(_)) => Ok(value.clone()),
            (NativeType::Decimal, Value::Int(_) | Value::Float(_)) => Ok(value.clone()),
            (NativeType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (NativeType::Timestamp, Value::Timestamp(_)) => Ok(value.clone()),
            (NativeType::Timestamp, Value::Text(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .map_err(|_| expected()),
            (NativeType::Timestamp, Value::Int(ms)) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .map(Value::Timestamp)
                .ok_or_else(expected),
            (NativeType::Date, Value::Date(_)) => Ok(value.clone()),
            (NativeType::Date, Value::Text(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| expected()),
            (NativeType::Uuid, Value::Uuid(_)) => Ok(value.clone()),
            (NativeType::Uuid, Value::Text(s)) => {
                Uuid::parse_str(s).map(Value::Uuid).map_err(|_| expected())
            }
            (NativeType::TimeUuid, Value::Uuid(u)) if u.get_version_num() == 1 => {
                Ok(value.clone())
            }
            (NativeType::TimeUuid, Value::Text(s)) => match Uuid::parse_str(s) {
                Ok(u) if u.get_version_num() == 1 => Ok(Value::Uuid(u)),
                _ => Err(expected()),
            },
            (NativeType::Blob, Value::Blob(_)) => Ok(value.clone()),
            (NativeType::Inet, Value::Text(s)) if s.parse::<IpAddr>().is_ok() => {
                Ok(value.clone())
            }
            _ => Err(expected()),
        }
    }

    /// Parses the text form produced by `Value::to_key_text`
    pub fn decode_text(&self, text: &str) -> Option<Value> {
        match self {
            NativeType::Int | NativeType::BigInt | NativeType::Counter => {
                text.parse::<i64>().ok().map(Value::Int)
            }
            NativeType::Float | NativeType::Double | NativeType::Decimal => {
                text.parse::<f64>().ok().map(Value::Float)
            }
            NativeType::Boolean => text.parse::<bool>().ok().map(Value::Bool),
            _ => self.coerce(&Value::Text(text.to_string())).ok(),
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical column type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Native(NativeType),
    List(Box<PhysicalType>),
    Set(Box<PhysicalType>),
    Map(Box<PhysicalType>, Box<PhysicalType>),
    Frozen(Box<PhysicalType>),
    /// Named composite type
    Udt(String),
}

impl PhysicalType {
    pub fn frozen(inner: PhysicalType) -> Self {
        PhysicalType::Frozen(Box::new(inner))
    }

    /// Non-frozen collections cannot be part of a primary key
    pub fn is_unfrozen_collection(&self) -> bool {
        matches!(
            self,
            PhysicalType::List(_) | PhysicalType::Set(_) | PhysicalType::Map(_, _)
        )
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalType::Native(n) => write!(f, "{}", n),
            PhysicalType::List(e) => write!(f, "list<{}>", e),
            PhysicalType::Set(e) => write!(f, "set<{}>", e),
            PhysicalType::Map(k, v) => write!(f, "map<{},{}>", k, v),
            PhysicalType::Frozen(t) => write!(f, "frozen<{}>", t),
            PhysicalType::Udt(name) => write!(f, "{}", name),
        }
    }
}

/// Shape of a referenced entity's primary key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyShape {
    /// One key column: encoded as its scalar value
    Atomic { column: String, native: NativeType },
    /// Several key columns: encoded as a string-keyed map. `stored_as` is the
    /// map value type; mixed component types are stored as text.
    Compound {
        components: Vec<(String, NativeType)>,
        stored_as: NativeType,
    },
}

/// Compile-time view of a reference target
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDescriptor {
    pub target: String,
    pub key: KeyShape,
}

impl ReferenceDescriptor {
    /// Physical type of one encoded key
    pub fn physical(&self) -> PhysicalType {
        match &self.key {
            KeyShape::Atomic { native, .. } => PhysicalType::Native(*native),
            KeyShape::Compound { stored_as, .. } => PhysicalType::frozen(PhysicalType::Map(
                Box::new(PhysicalType::Native(NativeType::Text)),
                Box::new(PhysicalType::Native(*stored_as)),
            )),
        }
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.key, KeyShape::Compound { .. })
    }
}

/// Composite type layout used by the marshaller and element validators
#[derive(Debug)]
pub struct UdtShape {
    pub name: String,
    pub fields: Vec<(String, ValueShape)>,
    /// The nested schema's own compiled validator, re-run per element
    pub validator: CompiledValidator,
}

/// Value layout of a column, walked by the marshaller
#[derive(Debug, Clone)]
pub enum ValueShape {
    Scalar(NativeType),
    /// JSON document stored as text
    Json,
    List(Box<ValueShape>),
    /// `array` selects list representation on read
    Set { element: Box<ValueShape>, array: bool },
    /// Text-keyed map
    Map(Box<ValueShape>),
    Udt(Arc<UdtShape>),
    Reference(Arc<ReferenceDescriptor>),
}

impl ValueShape {
    /// Overrides the read representation of a top-level Set
    pub fn with_set_representation(self, array: bool) -> Self {
        match self {
            ValueShape::Set { element, .. } => ValueShape::Set { element, array },
            other => other,
        }
    }

    /// Returns the reference descriptor reachable from this shape, if any
    pub fn reference(&self) -> Option<&ReferenceDescriptor> {
        match self {
            ValueShape::Reference(r) => Some(r),
            ValueShape::List(e) | ValueShape::Map(e) => e.reference(),
            ValueShape::Set { element, .. } => element.reference(),
            _ => None,
        }
    }
}

/// Role of a column in the primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Regular,
    Partition(usize),
    Clustering(usize),
}

/// One physical column
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Dot-flattened path, e.g. `info.subinfo.name`
    pub name: String,
    pub physical: PhysicalType,
    pub shape: ValueShape,
    pub role: KeyRole,
    /// Names of the indexes this column belongs to
    pub indexes: Vec<String>,
}

/// Primary key layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimaryKey {
    pub partition: Vec<String>,
    pub clustering: Vec<String>,
    pub clustering_order: Vec<(String, SortOrder)>,
}

impl PrimaryKey {
    /// Partition columns followed by clustering columns
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.partition.iter().chain(self.clustering.iter())
    }

    pub fn is_compound_partition(&self) -> bool {
        self.partition.len() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Simple,
    Compound,
    /// Single column with include-list or clustering order
    Annotated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub include: Vec<String>,
    pub clustering_order: Vec<(String, SortOrder)>,
}

impl IndexSpec {
    pub fn kind(&self) -> IndexKind {
        if self.columns.len() > 1 {
            IndexKind::Compound
        } else if self.include.is_empty() && self.clustering_order.is_empty() {
            IndexKind::Simple
        } else {
            IndexKind::Annotated
        }
    }
}

/// A composite type field as the storage engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtField {
    pub name: String,
    pub type_name: String,
}

impl UdtField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A composite type the plan depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtDefinition {
    pub name: String,
    pub fields: Vec<UdtField>,
}

impl UdtDefinition {
    /// `name type, name type` rendering used in messages and DDL
    pub fn describe_fields(fields: &[UdtField]) -> String {
        fields
            .iter()
            .map(|f| format!("{} {}", f.name, f.type_name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The compiled form of one entity schema
#[derive(Debug)]
pub struct StoragePlan {
    pub entity: String,
    pub columns: Vec<ColumnSpec>,
    pub key: PrimaryKey,
    pub indexes: Vec<IndexSpec>,
    pub unique_indexes: Vec<IndexSpec>,
    /// Composite types in dependency order (inner types first)
    pub udts: Vec<UdtDefinition>,
    pub(crate) validator: CompiledValidator,
    pub(crate) before_save: TransformPipeline,
    pub(crate) before_update: TransformPipeline,
    pub(crate) accessors: AccessorTable,
    pub(crate) defaults: Vec<(String, DefaultValue)>,
}

impl StoragePlan {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn partition_key(&self) -> &[String] {
        &self.key.partition
    }

    pub fn clustering_key(&self) -> &[String] {
        &self.key.clustering
    }

    /// Key shape other entities use to reference this one
    pub fn key_shape(&self) -> SchemaResult<KeyShape> {
        let mut components = Vec::new();
        for name in self.key.columns() {
            let native = match self.column(name).map(|c| &c.physical) {
                Some(PhysicalType::Native(n)) => *n,
                _ => {
                    return Err(crate::schema::SchemaError::key_definition(format!(
                        "key column '{}' of '{}' is not a scalar and cannot be referenced",
                        name, self.entity
                    )))
                }
            };
            components.push((name.clone(), native));
        }

        if components.len() == 1 {
            let (column, native) = components.remove(0);
            return Ok(KeyShape::Atomic { column, native });
        }

        let first = components.first().map(|(_, n)| *n);
        let uniform = components.iter().all(|(_, n)| Some(*n) == first);
        let stored_as = match first {
            Some(n) if uniform => n,
            _ => NativeType::Text,
        };
        Ok(KeyShape::Compound {
            components,
            stored_as,
        })
    }

    /// Runs the compiled validator against a candidate instance
    pub fn validate(&self, instance: &Record) -> SchemaResult<()> {
        self.validator.validate(instance, self)
    }

    /// Validates only the given fields, for partial updates
    pub fn validate_fields(&self, instance: &Record, fields: &[&str]) -> SchemaResult<()> {
        self.validator.validate_only(instance, self, fields)
    }

    /// Applies before-save transformations in place
    pub fn before_save(&self, instance: &mut Record) {
        self.before_save.apply(instance);
    }

    /// Applies before-update transformations in place
    pub fn before_update(&self, instance: &mut Record) {
        self.before_update.apply(instance);
    }

    pub fn accessors(&self) -> &AccessorTable {
        &self.accessors
    }

    pub fn default_for(&self, field: &str) -> Option<&DefaultValue> {
        self.defaults.iter().find(|(f, _)| f == field).map(|(_, d)| d)
    }

    /// SHA-256 over the physical layout and the compiled behaviour: column
    /// shapes (set representation included), key and index layout with
    /// clustering orders, composite types, validator predicates, transforms,
    /// defaults and accessor kinds. User closures appear only as markers;
    /// `same_definition` compares them by identity.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.entity.as_bytes());
        for column in &self.columns {
            hasher.update(format!(
                "|c:{}:{}:{:?}:{:?}",
                column.name, column.physical, column.role, column.shape
            ));
        }
        for (name, order) in &self.key.clustering_order {
            hasher.update(format!("|o:{}:{}", name, order.as_str()));
        }
        for (family, indexes) in [("i", &self.indexes), ("u", &self.unique_indexes)] {
            for index in indexes {
                hasher.update(format!(
                    "|{}:{}:{}:{}:{:?}",
                    family,
                    index.name,
                    index.columns.join(","),
                    index.include.join(","),
                    index.clustering_order
                ));
            }
        }
        for udt in &self.udts {
            hasher.update(format!("|t:{}:{}", udt.name, UdtDefinition::describe_fields(&udt.fields)));
        }
        hasher.update(format!("|v:{:?}", self.validator));
        hasher.update(format!("|s:{:?}|w:{:?}", self.before_save, self.before_update));
        for (path, default) in &self.defaults {
            hasher.update(format!("|d:{}:{:?}", path, default));
        }
        hasher.update(format!("|a:{:?}", self.accessors));
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    /// Addresses of every user closure the plan runs: custom validators,
    /// computed defaults, getters and setters
    fn hooks(&self) -> Vec<*const ()> {
        let mut hooks = Vec::new();
        self.validator.collect_hooks(&mut hooks);
        for (_, default) in &self.defaults {
            if let DefaultValue::Computed(f) = default {
                hooks.push(Arc::as_ptr(f) as *const ());
            }
        }
        self.accessors.collect_hooks(&mut hooks);
        hooks
    }

    /// Whether two plans were compiled from the same definition: equal
    /// fingerprints and the very same user closures
    pub fn same_definition(&self, other: &StoragePlan) -> bool {
        self.fingerprint() == other.fingerprint() && self.hooks() == other.hooks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_type_rendering() {
        let ty = PhysicalType::Map(
            Box::new(PhysicalType::Native(NativeType::Text)),
            Box::new(PhysicalType::Native(NativeType::Float)),
        );
        assert_eq!(ty.to_string(), "map<text,float>");

        let ty = PhysicalType::List(Box::new(PhysicalType::frozen(PhysicalType::Udt(
            "address".into(),
        ))));
        assert_eq!(ty.to_string(), "list<frozen<address>>");
    }

    #[test]
    fn test_coerce_widens_integers_into_float() {
        assert_eq!(NativeType::Float.coerce(&Value::Int(2)), Ok(Value::Float(2.0)));
        assert!(NativeType::Int.coerce(&Value::Float(2.5)).is_err());
        assert!(NativeType::Int.coerce(&Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn test_coerce_parses_text_forms() {
        let id = Uuid::new_v4();
        assert_eq!(
            NativeType::Uuid.coerce(&Value::Text(id.to_string())),
            Ok(Value::Uuid(id))
        );
        assert!(NativeType::TimeUuid.coerce(&Value::Text(id.to_string())).is_err());
        assert!(matches!(
            NativeType::Timestamp.coerce(&Value::from("2024-01-02T03:04:05Z")),
            Ok(Value::Timestamp(_))
        ));
        assert!(NativeType::Inet.coerce(&Value::from("10.0.0.1")).is_ok());
        assert!(NativeType::Inet.coerce(&Value::from("nope")).is_err());
    }

    #[test]
    fn test_decode_text_inverts_key_text() {
        assert_eq!(NativeType::Int.decode_text("42"), Some(Value::Int(42)));
        assert_eq!(NativeType::Boolean.decode_text("true"), Some(Value::Bool(true)));
        assert_eq!(NativeType::Text.decode_text("x"), Some(Value::from("x")));
    }

    #[test]
    fn test_index_kind() {
        let mut index = IndexSpec {
            name: "t_a_idx".into(),
            columns: vec!["a".into()],
            include: vec![],
            clustering_order: vec![],
        };
        assert_eq!(index.kind(), IndexKind::Simple);
        index.include.push("b".into());
        assert_eq!(index.kind(), IndexKind::Annotated);
        index.columns.push("c".into());
        assert_eq!(index.kind(), IndexKind::Compound);
    }
}
