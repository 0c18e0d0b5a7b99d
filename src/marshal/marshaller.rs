//! Instance marshalling
//!
//! Pure, synchronous transforms between application instances and storage
//! rows, driven by one immutable `StoragePlan`:
//!
//! - `to_storage`: coerces values to their column types, encodes references
//!   as the target's key, normalizes Set columns, serializes JSON to text and
//!   fills absent columns with their default or an explicit null
//! - `from_storage`: omits nulls, materializes Set columns per their
//!   representation, boxes JSON, leaves references in encoded form
//!
//! Marshalling never performs I/O and never logs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::json_box::JsonBox;
use crate::plan::{KeyShape, NativeType, ReferenceDescriptor, StoragePlan, ValueShape};
use crate::schema::{
    DefaultContext, DefaultValue, Generator, Record, SchemaError, SchemaRegistry, SchemaResult, Value,
};

/// Marshaller bound to one compiled plan
#[derive(Debug, Clone)]
pub struct Marshaller {
    plan: Arc<StoragePlan>,
    registry: Arc<SchemaRegistry>,
}

impl Marshaller {
    pub fn new(plan: Arc<StoragePlan>, registry: Arc<SchemaRegistry>) -> Self {
        Self { plan, registry }
    }

    pub fn plan(&self) -> &StoragePlan {
        &self.plan
    }

    pub(crate) fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Converts an instance into a storage row with one entry per column.
    ///
    /// Group values are flattened structurally (no setters run), virtual
    /// fields are dropped.
    ///
    /// # Errors
    ///
    /// - UNKNOWN_FIELD for keys the plan does not know
    /// - ENCODING for values that do not fit their column
    pub fn to_storage(&self, values: &Record) -> SchemaResult<Record> {
        let mut flat = self.flatten(values)?;
        let mut row = Record::new();

        for column in &self.plan.columns {
            let value = match flat.remove(&column.name) {
                Some(value) if !value.is_null() => encode(&value, &column.shape, &column.name)?,
                Some(_) => Value::Null,
                None => match self.plan.default_for(&column.name) {
                    Some(default) => {
                        let value = evaluate_default(default, &column.name, values, &self.plan);
                        if value.is_null() {
                            Value::Null
                        } else {
                            encode(&value, &column.shape, &column.name)?
                        }
                    }
                    None => Value::Null,
                },
            };
            row.insert(column.name.clone(), value);
        }

        Ok(row)
    }

    /// Converts a storage row back into a flat instance; null cells are
    /// omitted.
    pub fn from_storage(&self, row: &Record) -> SchemaResult<Record> {
        let mut instance = Record::new();
        for (name, value) in row {
            let column = self
                .plan
                .column(name)
                .ok_or_else(|| SchemaError::unknown_field(name))?;
            if value.is_null() {
                continue;
            }
            instance.insert(name.clone(), decode(value, &column.shape, name)?);
        }
        Ok(instance)
    }

    /// Builds a flat instance from application values: groups are expanded,
    /// setters run, and lazy defaults fill absent fields.
    pub fn new_instance(&self, values: &Record) -> SchemaResult<Record> {
        let mut instance = self.apply_values(values)?;
        for (path, default) in &self.plan.defaults {
            if !instance.contains_key(path) {
                let value = evaluate_default(default, path, &instance, &self.plan);
                if !value.is_null() {
                    instance.insert(path.clone(), value);
                }
            }
        }
        Ok(instance)
    }

    /// Application view of a flat instance: groups reassembled, getters
    /// applied, virtual fields computed
    pub fn view(&self, instance: &Record) -> Record {
        self.plan.accessors().view(instance, &self.plan)
    }

    /// Reads one field, group or virtual value
    pub fn get(&self, instance: &Record, path: &str) -> Value {
        self.plan.accessors().read(instance, path, &self.plan)
    }

    /// Writes one field through its accessor
    pub fn set(&self, instance: &mut Record, path: &str, value: Value) -> SchemaResult<()> {
        self.check_known(path)?;
        self.plan.accessors().write(instance, path, value, &self.plan)
    }

    /// Defaults, before-save transforms, validation, encoding
    pub fn prepare_save(&self, values: &Record) -> SchemaResult<Record> {
        let mut instance = self.new_instance(values)?;
        self.plan.before_save(&mut instance);
        self.plan.validate(&instance)?;
        self.to_storage(&instance)
    }

    /// Before-update transforms, validation of the changed fields, and
    /// encoding of the changed columns only
    pub fn prepare_update(&self, changes: &Record) -> SchemaResult<Record> {
        let mut instance = self.apply_values(changes)?;
        self.plan.before_update(&mut instance);

        let changed: Vec<&str> = instance
            .keys()
            .map(String::as_str)
            .filter(|k| self.plan.column(k).is_some())
            .collect();
        self.plan.validate_fields(&instance, &changed)?;

        let mut row = Record::new();
        for name in changed {
            let (Some(column), Some(value)) = (self.plan.column(name), instance.get(name)) else {
                continue;
            };
            let encoded = if value.is_null() {
                Value::Null
            } else {
                encode(value, &column.shape, name)?
            };
            row.insert(name.to_string(), encoded);
        }
        Ok(row)
    }

    fn apply_values(&self, values: &Record) -> SchemaResult<Record> {
        let mut instance = Record::new();
        for (path, value) in values {
            self.set(&mut instance, path, value.clone())?;
        }
        Ok(instance)
    }

    fn check_known(&self, path: &str) -> SchemaResult<()> {
        if self.plan.column(path).is_some() || self.plan.accessors().get(path).is_some() {
            Ok(())
        } else {
            Err(SchemaError::unknown_field(path))
        }
    }

    /// Structural flattening for `to_storage`
    fn flatten(&self, values: &Record) -> SchemaResult<Record> {
        let mut flat = Record::new();
        for (path, value) in values {
            self.flatten_into(&mut flat, path, value)?;
        }
        Ok(flat)
    }

    fn flatten_into(&self, flat: &mut Record, path: &str, value: &Value) -> SchemaResult<()> {
        let accessors = self.plan.accessors();
        if accessors.is_virtual(path) {
            return Ok(());
        }
        if accessors.is_group(path) {
            return match value {
                Value::Map(children) => {
                    for (key, child) in children {
                        self.flatten_into(flat, &format!("{}.{}", path, key), child)?;
                    }
                    Ok(())
                }
                Value::Null => Ok(()),
                other => Err(SchemaError::encoding(
                    path,
                    format!("group expects a map, got {}", other.type_name()),
                )),
            };
        }
        if self.plan.column(path).is_none() {
            return Err(SchemaError::unknown_field(path));
        }
        flat.insert(path.to_string(), value.clone());
        Ok(())
    }
}

pub(crate) fn evaluate_default(default: &DefaultValue, field: &str, instance: &Record, plan: &StoragePlan) -> Value {
    match default {
        DefaultValue::Value(value) => value.clone(),
        DefaultValue::Generated(Generator::Uuid) => Value::Uuid(Uuid::new_v4()),
        DefaultValue::Generated(Generator::Now) => Value::Timestamp(Utc::now()),
        DefaultValue::Computed(f) => f(&DefaultContext {
            field,
            instance,
            plan,
        }),
    }
}

fn encode(value: &Value, shape: &ValueShape, path: &str) -> SchemaResult<Value> {
    match shape {
        ValueShape::Scalar(native) => native
            .coerce(value)
            .map_err(|expected| SchemaError::encoding(path, format!("expected {}", expected))),
        ValueShape::Json => Ok(Value::Text(match value {
            Value::Json(boxed) => boxed.to_text(),
            other => other.to_json().to_string(),
        })),
        ValueShape::List(element) => Ok(Value::List(encode_elements(value, element, path)?)),
        ValueShape::Set { element, .. } => Ok(Value::set(encode_elements(value, element, path)?)),
        ValueShape::Map(element) => {
            let map = value
                .as_map()
                .ok_or_else(|| SchemaError::encoding(path, format!("expected map, got {}", value.type_name())))?;
            let mut encoded = BTreeMap::new();
            for (key, item) in map {
                let item_path = format!("{}[{}]", path, key);
                if item.is_null() {
                    return Err(SchemaError::encoding(item_path, "map values cannot be null"));
                }
                encoded.insert(key.clone(), encode(item, element, &item_path)?);
            }
            Ok(Value::Map(encoded))
        }
        ValueShape::Udt(udt) => {
            let map = value.as_map().ok_or_else(|| {
                SchemaError::encoding(path, format!("expected {}, got {}", udt.name, value.type_name()))
            })?;
            if let Some(extra) = map.keys().find(|k| !udt.fields.iter().any(|(f, _)| f == *k)) {
                return Err(SchemaError::encoding(
                    path,
                    format!("no field '{}' in {}", extra, udt.name),
                ));
            }
            let mut encoded = BTreeMap::new();
            for (name, field_shape) in &udt.fields {
                let field_value = match map.get(name) {
                    Some(v) if !v.is_null() => encode(v, field_shape, &format!("{}.{}", path, name))?,
                    _ => Value::Null,
                };
                encoded.insert(name.clone(), field_value);
            }
            Ok(Value::Map(encoded))
        }
        ValueShape::Reference(reference) => encode_reference(value, reference, path),
    }
}

fn encode_elements(value: &Value, element: &ValueShape, path: &str) -> SchemaResult<Vec<Value>> {
    let items = value
        .as_elements()
        .ok_or_else(|| SchemaError::encoding(path, format!("expected list, got {}", value.type_name())))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = format!("{}[{}]", path, i);
            if item.is_null() {
                return Err(SchemaError::encoding(item_path, "collection elements cannot be null"));
            }
            encode(item, element, &item_path)
        })
        .collect()
}

/// Replaces an embedded instance (or key) with the target's encoded key
pub(crate) fn encode_reference(value: &Value, reference: &ReferenceDescriptor, path: &str) -> SchemaResult<Value> {
    match &reference.key {
        KeyShape::Atomic { column, native } => {
            let key = match value {
                Value::Map(instance) => instance.get(column).ok_or_else(|| {
                    SchemaError::encoding(
                        path,
                        format!("{} instance is missing key '{}'", reference.target, column),
                    )
                })?,
                other => other,
            };
            native
                .coerce(key)
                .map_err(|e| SchemaError::encoding(path, format!("{} key: expected {}", reference.target, e)))
        }
        KeyShape::Compound { components, stored_as } => {
            let instance = value.as_map().ok_or_else(|| {
                SchemaError::encoding(
                    path,
                    format!("{} has a compound key and needs a map, got {}", reference.target, value.type_name()),
                )
            })?;
            let mut encoded = BTreeMap::new();
            for (name, native) in components {
                let component = instance.get(name).ok_or_else(|| {
                    SchemaError::encoding(path, format!("{} key is missing '{}'", reference.target, name))
                })?;
                let typed = native
                    .coerce(component)
                    .ok()
                    .or_else(|| component.as_str().and_then(|s| native.decode_text(s)))
                    .ok_or_else(|| {
                        SchemaError::encoding(
                            path,
                            format!("{} key component '{}' must be {}", reference.target, name, native),
                        )
                    })?;
                let stored = if *stored_as == NativeType::Text && *native != NativeType::Text {
                    typed.to_key_text().map(Value::Text).ok_or_else(|| {
                        SchemaError::encoding(path, format!("key component '{}' has no text form", name))
                    })?
                } else {
                    typed
                };
                encoded.insert(name.clone(), stored);
            }
            Ok(Value::Map(encoded))
        }
    }
}

fn decode(value: &Value, shape: &ValueShape, path: &str) -> SchemaResult<Value> {
    match shape {
        ValueShape::Scalar(native) => native
            .coerce(value)
            .map_err(|expected| SchemaError::encoding(path, format!("stored value is not {}", expected))),
        ValueShape::Json => match value {
            Value::Text(text) => JsonBox::parse(text)
                .map(Value::Json)
                .map_err(|e| SchemaError::encoding(path, format!("stored JSON is invalid: {}", e))),
            Value::Json(_) => Ok(value.clone()),
            other => Ok(Value::Json(JsonBox::new(other.to_json()))),
        },
        ValueShape::List(element) => Ok(Value::List(decode_elements(value, element, path)?)),
        ValueShape::Set { element, array } => {
            let items = decode_elements(value, element, path)?;
            Ok(if *array { Value::List(items) } else { Value::set(items) })
        }
        ValueShape::Map(element) => {
            let map = value
                .as_map()
                .ok_or_else(|| SchemaError::encoding(path, format!("stored value is not a map: {}", value.type_name())))?;
            let mut decoded = BTreeMap::new();
            for (key, item) in map {
                decoded.insert(key.clone(), decode(item, element, &format!("{}[{}]", path, key))?);
            }
            Ok(Value::Map(decoded))
        }
        ValueShape::Udt(udt) => {
            let map = value
                .as_map()
                .ok_or_else(|| SchemaError::encoding(path, format!("stored value is not {}", udt.name)))?;
            let mut decoded = BTreeMap::new();
            for (name, field_shape) in &udt.fields {
                if let Some(v) = map.get(name).filter(|v| !v.is_null()) {
                    decoded.insert(name.clone(), decode(v, field_shape, &format!("{}.{}", path, name))?);
                }
            }
            Ok(Value::Map(decoded))
        }
        // References stay encoded until populated explicitly
        ValueShape::Reference(_) => Ok(value.clone()),
    }
}

fn decode_elements(value: &Value, element: &ValueShape, path: &str) -> SchemaResult<Vec<Value>> {
    let items = value
        .as_elements()
        .ok_or_else(|| SchemaError::encoding(path, format!("stored value is not a list: {}", value.type_name())))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| decode(item, element, &format!("{}[{}]", path, i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ColumnPlanner;
    use crate::schema::{
        Constraint, FieldSpec, PrimitiveKind, SchemaDescriptor, SchemaErrorCode, SchemaNode, Transform,
        TypeDescriptor,
    };
    use serde_json::json;

    fn ty(kind: PrimitiveKind) -> TypeDescriptor {
        TypeDescriptor::primitive(kind)
    }

    fn marshaller(schema: SchemaDescriptor) -> Marshaller {
        let registry = Arc::new(SchemaRegistry::new());
        let plan = ColumnPlanner::new(&registry).plan(&schema).unwrap();
        Marshaller::new(Arc::new(plan), registry)
    }

    fn sample() -> Marshaller {
        marshaller(
            SchemaDescriptor::new("sample")
                .field(FieldSpec::new("id", ty(PrimitiveKind::String)).partition_key())
                .field(FieldSpec::new("count", ty(PrimitiveKind::Int)))
                .field(FieldSpec::new("score", ty(PrimitiveKind::Number)))
                .field(FieldSpec::new("tags", TypeDescriptor::set(ty(PrimitiveKind::String))))
                .field(FieldSpec::new("doc", ty(PrimitiveKind::Json)))
                .group("info", vec![SchemaNode::Field(FieldSpec::new("name", ty(PrimitiveKind::String)))]),
        )
    }

    #[test]
    fn test_absent_fields_become_null() {
        let m = sample();
        let mut values = Record::new();
        values.insert("id".into(), "a".into());
        let row = m.to_storage(&values).unwrap();

        assert_eq!(row.len(), 6);
        assert_eq!(row["count"], Value::Null);
        assert_eq!(row["info.name"], Value::Null);
    }

    #[test]
    fn test_coercion_and_set_normalization() {
        let m = sample();
        let mut values = Record::new();
        values.insert("id".into(), "a".into());
        values.insert("score".into(), Value::Int(3));
        values.insert("tags".into(), Value::List(vec!["x".into(), "y".into(), "x".into()]));
        let row = m.to_storage(&values).unwrap();

        assert_eq!(row["score"], Value::Float(3.0));
        assert_eq!(row["tags"], Value::Set(vec!["x".into(), "y".into()]));
    }

    #[test]
    fn test_json_round_trip_boxes() {
        let m = sample();
        let mut values = Record::new();
        values.insert("id".into(), "a".into());
        values.insert("doc".into(), Value::Json(JsonBox::new(json!({"theme": {"color": "dark"}}))));

        let row = m.to_storage(&values).unwrap();
        assert!(matches!(row["doc"], Value::Text(_)));

        let back = m.from_storage(&row).unwrap();
        match &back["doc"] {
            Value::Json(boxed) => assert_eq!(boxed.get("theme.color"), Some(&json!("dark"))),
            other => panic!("expected boxed JSON, got {:?}", other),
        }
    }

    #[test]
    fn test_group_values_flatten() {
        let m = sample();
        let mut values = Record::new();
        values.insert("id".into(), "a".into());
        values.insert("info".into(), Value::map([("name", "Ada".into())]));
        let row = m.to_storage(&values).unwrap();
        assert_eq!(row["info.name"], Value::from("Ada"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let m = sample();
        let mut values = Record::new();
        values.insert("nope".into(), "x".into());
        assert_eq!(m.to_storage(&values).unwrap_err().code(), SchemaErrorCode::UnknownField);
    }

    #[test]
    fn test_bad_value_is_encoding_error() {
        let m = sample();
        let mut values = Record::new();
        values.insert("count".into(), "three".into());
        let err = m.to_storage(&values).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::Encoding);
        assert_eq!(err.field(), Some("count"));
    }

    #[test]
    fn test_from_storage_drops_nulls() {
        let m = sample();
        let mut row = Record::new();
        row.insert("id".into(), "a".into());
        row.insert("count".into(), Value::Null);
        let instance = m.from_storage(&row).unwrap();
        assert_eq!(instance.len(), 1);
    }

    #[test]
    fn test_defaults_apply_when_absent() {
        let m = marshaller(
            SchemaDescriptor::new("t")
                .field(FieldSpec::new("id", ty(PrimitiveKind::Uuid)).partition_key())
                .field(FieldSpec::new("status", ty(PrimitiveKind::String)).default_value("new"))
                .field(
                    FieldSpec::new("label", ty(PrimitiveKind::String))
                        .default_with(|ctx| Value::Text(format!("{}-label", ctx.field))),
                ),
        );
        let instance = m.new_instance(&Record::new()).unwrap();
        assert_eq!(instance["status"], Value::from("new"));
        assert_eq!(instance["label"], Value::from("label-label"));

        let mut values = Record::new();
        values.insert("status".into(), "done".into());
        let row = m.to_storage(&values).unwrap();
        assert_eq!(row["status"], Value::from("done"));
        assert_eq!(row["label"], Value::from("label-label"));
    }

    #[test]
    fn test_prepare_save_transforms_then_validates() {
        let m = marshaller(
            SchemaDescriptor::new("user")
                .field(FieldSpec::new("id", ty(PrimitiveKind::String)).partition_key().required())
                .field(
                    FieldSpec::new("email", ty(PrimitiveKind::String))
                        .transform(Transform::Trim)
                        .transform(Transform::Lowercase)
                        .constraint(Constraint::Match("^[a-z]+@[a-z]+\\.com$".into())),
                ),
        );

        let mut values = Record::new();
        values.insert("id".into(), "u1".into());
        values.insert("email".into(), " Ada@Example.COM ".into());
        let row = m.prepare_save(&values).unwrap();
        assert_eq!(row["email"], Value::from("ada@example.com"));

        let mut missing = Record::new();
        missing.insert("email".into(), "ada@example.com".into());
        assert_eq!(m.prepare_save(&missing).unwrap_err().code(), SchemaErrorCode::RequiredField);
    }

    #[test]
    fn test_prepare_update_is_partial() {
        let m = marshaller(
            SchemaDescriptor::new("user")
                .field(FieldSpec::new("id", ty(PrimitiveKind::String)).partition_key().required())
                .field(FieldSpec::new("age", ty(PrimitiveKind::Int)).constraint(Constraint::Min(0.0)))
                .field(FieldSpec::new("name", ty(PrimitiveKind::String))),
        );

        let mut changes = Record::new();
        changes.insert("age".into(), Value::Int(30));
        let row = m.prepare_update(&changes).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row["age"], Value::Int(30));

        changes.insert("age".into(), Value::Int(-1));
        assert_eq!(m.prepare_update(&changes).unwrap_err().code(), SchemaErrorCode::Validation);
    }
}
