//! Validation assembly
//!
//! Per-field constraints compile into one short-circuiting predicate chain:
//! - `required` is checked first and fails with REQUIRED_FIELD
//! - the column's physical type is checked next
//! - `match`, `enum`, `minlength`, `maxlength`, `min`, `max`, `validate`
//!   run in declaration order; the first failure is a VALIDATION error
//!   naming the field
//!
//! `lowercase`, `uppercase` and `trim` compile into ordered before-save and
//! before-update steps keyed by field path.
//!
//! Validators never mutate the candidate instance.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::errors::{SchemaError, SchemaResult};
use super::types::{Constraint, CustomValidator, FieldSpec, Transform};
use super::value::{Record, Value};
use crate::plan::{KeyShape, NativeType, ReferenceDescriptor, StoragePlan, ValueShape};

/// One compiled predicate
enum Predicate {
    Match(Regex),
    Enum(Vec<Value>),
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Custom(CustomValidator),
}

impl Predicate {
    fn check(&self, value: &Value, instance: &Record, plan: &StoragePlan) -> Result<(), String> {
        match self {
            Predicate::Match(re) => match value.as_str() {
                Some(s) if re.is_match(s) => Ok(()),
                Some(_) => Err(format!("value does not match /{}/", re.as_str())),
                None => Err(format!("pattern /{}/ requires text", re.as_str())),
            },
            Predicate::Enum(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err("value is not one of the allowed values".into())
                }
            }
            Predicate::MinLength(min) => match value.length() {
                Some(len) if len >= *min => Ok(()),
                Some(len) => Err(format!("length {} is shorter than {}", len, min)),
                None => Err("minlength requires text or a collection".into()),
            },
            Predicate::MaxLength(max) => match value.length() {
                Some(len) if len <= *max => Ok(()),
                Some(len) => Err(format!("length {} is longer than {}", len, max)),
                None => Err("maxlength requires text or a collection".into()),
            },
            Predicate::Min(min) => match value.as_f64() {
                Some(n) if n >= *min => Ok(()),
                Some(n) => Err(format!("{} is less than minimum {}", n, min)),
                None => Err("min requires a number".into()),
            },
            Predicate::Max(max) => match value.as_f64() {
                Some(n) if n <= *max => Ok(()),
                Some(n) => Err(format!("{} is greater than maximum {}", n, max)),
                None => Err("max requires a number".into()),
            },
            Predicate::Custom(custom) => {
                if (custom.check)(value, instance, plan) {
                    Ok(())
                } else {
                    Err(custom
                        .message
                        .clone()
                        .unwrap_or_else(|| "custom validator rejected the value".into()))
                }
            }
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Match(re) => write!(f, "Match({})", re.as_str()),
            Predicate::Enum(v) => write!(f, "Enum({:?})", v),
            Predicate::MinLength(n) => write!(f, "MinLength({})", n),
            Predicate::MaxLength(n) => write!(f, "MaxLength({})", n),
            Predicate::Min(n) => write!(f, "Min({})", n),
            Predicate::Max(n) => write!(f, "Max({})", n),
            Predicate::Custom(custom) => write!(f, "Custom({:?})", custom.message),
        }
    }
}

/// The predicate chain of one field
#[derive(Debug)]
struct FieldValidator {
    path: String,
    required: bool,
    shape: ValueShape,
    predicates: Vec<Predicate>,
}

impl FieldValidator {
    fn validate(&self, instance: &Record, plan: &StoragePlan) -> SchemaResult<()> {
        let value = match instance.get(&self.path) {
            Some(v) if !v.is_null() => v,
            _ if self.required => return Err(SchemaError::required_field(&self.path)),
            _ => return Ok(()),
        };

        check_shape(value, &self.shape, plan)
            .map_err(|msg| SchemaError::validation(&self.path, msg))?;

        for predicate in &self.predicates {
            predicate
                .check(value, instance, plan)
                .map_err(|msg| SchemaError::validation(&self.path, msg))?;
        }
        Ok(())
    }
}

/// All field validators of one schema, in declaration order
#[derive(Debug, Default)]
pub struct CompiledValidator {
    fields: Vec<FieldValidator>,
}

impl CompiledValidator {
    /// Validates the whole instance; stops at the first failing field
    pub fn validate(&self, instance: &Record, plan: &StoragePlan) -> SchemaResult<()> {
        for field in &self.fields {
            field.validate(instance, plan)?;
        }
        Ok(())
    }

    /// Validates only the listed field paths
    pub fn validate_only(
        &self,
        instance: &Record,
        plan: &StoragePlan,
        paths: &[&str],
    ) -> SchemaResult<()> {
        for field in self.fields.iter().filter(|f| paths.contains(&f.path.as_str())) {
            field.validate(instance, plan)?;
        }
        Ok(())
    }

    pub fn field_paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.path.as_str())
    }

    pub fn is_required(&self, path: &str) -> bool {
        self.fields.iter().any(|f| f.path == path && f.required)
    }

    /// Addresses of the user predicates, including those of composite type
    /// elements, in declaration order
    pub(crate) fn collect_hooks(&self, out: &mut Vec<*const ()>) {
        for field in &self.fields {
            for predicate in &field.predicates {
                if let Predicate::Custom(custom) = predicate {
                    out.push(Arc::as_ptr(&custom.check) as *const ());
                }
            }
            collect_shape_hooks(&field.shape, out);
        }
    }
}

/// Walks a shape for composite types and collects their user predicates
fn collect_shape_hooks(shape: &ValueShape, out: &mut Vec<*const ()>) {
    match shape {
        ValueShape::List(element) | ValueShape::Map(element) => collect_shape_hooks(element, out),
        ValueShape::Set { element, .. } => collect_shape_hooks(element, out),
        ValueShape::Udt(udt) => udt.validator.collect_hooks(out),
        ValueShape::Scalar(_) | ValueShape::Json | ValueShape::Reference(_) => {}
    }
}

/// Ordered transformation steps keyed by field path
#[derive(Debug, Default, Clone)]
pub struct TransformPipeline {
    steps: Vec<(String, Vec<Transform>)>,
}

impl TransformPipeline {
    /// Applies every step to text values present in the instance
    pub fn apply(&self, instance: &mut Record) {
        for (path, transforms) in &self.steps {
            if let Some(Value::Text(text)) = instance.get_mut(path) {
                for transform in transforms {
                    *text = match transform {
                        Transform::Lowercase => text.to_lowercase(),
                        Transform::Uppercase => text.to_uppercase(),
                        Transform::Trim => text.trim().to_string(),
                    };
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Collects field validators and transformation steps while a schema is
/// being planned
#[derive(Debug, Default)]
pub struct ValidationAssembler {
    fields: Vec<FieldValidator>,
    before_save: TransformPipeline,
    before_update: TransformPipeline,
}

impl ValidationAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the constraints and transformations of one leaf field.
    ///
    /// # Errors
    ///
    /// Returns SCHEMA_DEFINITION for an invalid `match` pattern, inverted
    /// bounds, or a text transformation on a non-text column.
    pub fn add_field(&mut self, path: &str, field: &FieldSpec, shape: &ValueShape) -> SchemaResult<()> {
        let mut predicates = Vec::with_capacity(field.constraints.len());
        let mut min_len = None;
        let mut max_len = None;
        let mut min = None;
        let mut max = None;

        for constraint in &field.constraints {
            let predicate = match constraint {
                Constraint::Match(pattern) => Predicate::Match(Regex::new(pattern).map_err(|e| {
                    SchemaError::field_definition(path, format!("invalid match pattern: {}", e))
                })?),
                Constraint::Enum(values) => {
                    if values.is_empty() {
                        return Err(SchemaError::field_definition(path, "enum must list at least one value"));
                    }
                    Predicate::Enum(values.clone())
                }
                Constraint::MinLength(n) => {
                    min_len = Some(*n);
                    Predicate::MinLength(*n)
                }
                Constraint::MaxLength(n) => {
                    max_len = Some(*n);
                    Predicate::MaxLength(*n)
                }
                Constraint::Min(n) => {
                    min = Some(*n);
                    Predicate::Min(*n)
                }
                Constraint::Max(n) => {
                    max = Some(*n);
                    Predicate::Max(*n)
                }
                Constraint::Validate(custom) => Predicate::Custom(custom.clone()),
            };
            predicates.push(predicate);
        }

        if let (Some(lo), Some(hi)) = (min_len, max_len) {
            if lo > hi {
                return Err(SchemaError::field_definition(path, "minlength exceeds maxlength"));
            }
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(SchemaError::field_definition(path, "min exceeds max"));
            }
        }

        if !field.transforms.is_empty() {
            let text = matches!(
                shape,
                ValueShape::Scalar(NativeType::Text) | ValueShape::Scalar(NativeType::Ascii)
            );
            if !text {
                return Err(SchemaError::field_definition(
                    path,
                    "lowercase/uppercase/trim require a text column",
                ));
            }
            self.before_save
                .steps
                .push((path.to_string(), field.transforms.clone()));
            self.before_update
                .steps
                .push((path.to_string(), field.transforms.clone()));
        }

        self.fields.push(FieldValidator {
            path: path.to_string(),
            required: field.flags.required,
            shape: shape.clone(),
            predicates,
        });
        Ok(())
    }

    pub fn finish(self) -> (CompiledValidator, TransformPipeline, TransformPipeline) {
        (
            CompiledValidator {
                fields: self.fields,
            },
            self.before_save,
            self.before_update,
        )
    }
}

/// Checks that a value fits a column shape. Returns what was expected on
/// failure.
fn check_shape(value: &Value, shape: &ValueShape, plan: &StoragePlan) -> Result<(), String> {
    match shape {
        ValueShape::Scalar(native) => native.coerce(value).map(|_| ()),
        ValueShape::Json => Ok(()),
        ValueShape::List(element) | ValueShape::Set { element, .. } => {
            let items = value
                .as_elements()
                .ok_or_else(|| format!("list value, got {}", value.type_name()))?;
            for (i, item) in items.iter().enumerate() {
                if item.is_null() {
                    return Err(format!("non-null element at [{}]", i));
                }
                check_shape(item, element, plan).map_err(|e| nest(format!("[{}]", i), e))?;
            }
            Ok(())
        }
        ValueShape::Map(element) => {
            let map = value
                .as_map()
                .ok_or_else(|| format!("map value, got {}", value.type_name()))?;
            for (key, item) in map {
                check_shape(item, element, plan).map_err(|e| nest(format!("[{}]", key), e))?;
            }
            Ok(())
        }
        ValueShape::Udt(udt) => {
            let map = value
                .as_map()
                .ok_or_else(|| format!("{} value, got {}", udt.name, value.type_name()))?;
            if let Some(extra) = map.keys().find(|k| !udt.fields.iter().any(|(f, _)| f == *k)) {
                return Err(format!("no field '{}' in {}", extra, udt.name));
            }
            let element: Record = map.clone();
            udt.validator.validate(&element, plan).map_err(|e| match e.field() {
                Some(field) => format!(".{}: {} {}", field, e.code(), e.message()),
                None => format!("{} {}", e.code(), e.message()),
            })
        }
        ValueShape::Reference(reference) => check_reference(value, reference),
    }
}

/// Prefixes an element path onto a nested failure, `[0]` + `.zip: ..`
/// reads `[0].zip: ..`
fn nest(prefix: String, inner: String) -> String {
    if inner.starts_with('.') || inner.starts_with('[') {
        prefix + &inner
    } else {
        format!("{}: {}", prefix, inner)
    }
}

/// A reference accepts either its encoded key or an instance carrying it
fn check_reference(value: &Value, reference: &ReferenceDescriptor) -> Result<(), String> {
    match &reference.key {
        KeyShape::Atomic { column, native } => {
            let key = match value {
                Value::Map(instance) => instance
                    .get(column)
                    .ok_or_else(|| format!("{} instance with key '{}'", reference.target, column))?,
                other => other,
            };
            native
                .coerce(key)
                .map(|_| ())
                .map_err(|e| format!("{} key: {}", reference.target, e))
        }
        KeyShape::Compound { components, .. } => {
            let map = value.as_map().ok_or_else(|| {
                format!("{} compound key map, got {}", reference.target, value.type_name())
            })?;
            for (name, native) in components {
                let component = map
                    .get(name)
                    .ok_or_else(|| format!("{} key component '{}'", reference.target, name))?;
                let ok = native.coerce(component).is_ok()
                    || component
                        .as_str()
                        .and_then(|s| native.decode_text(s))
                        .is_some();
                if !ok {
                    return Err(format!(
                        "{} key component '{}' of type {}",
                        reference.target, name, native
                    ));
                }
            }
            Ok(())
        }
    }
}
