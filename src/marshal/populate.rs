//! Reference population
//!
//! References come out of `from_storage` in encoded form. `populate`
//! substitutes the referenced instances, one field at a time, through a
//! caller-supplied loader. It is never performed implicitly.

use std::sync::Arc;

use super::marshaller::Marshaller;
use crate::plan::{ReferenceDescriptor, ValueShape};
use crate::schema::{Record, SchemaError, SchemaResult, Value};

/// Fetches a stored row of `entity` by its encoded key
pub trait ReferenceLoader {
    fn load(&self, entity: &str, key: &Value) -> SchemaResult<Option<Record>>;
}

impl<F> ReferenceLoader for F
where
    F: Fn(&str, &Value) -> SchemaResult<Option<Record>>,
{
    fn load(&self, entity: &str, key: &Value) -> SchemaResult<Option<Record>> {
        self(entity, key)
    }
}

impl Marshaller {
    /// Replaces the encoded reference(s) in `field` with the referenced
    /// instances. Keys the loader cannot find become null. An absent field is
    /// left alone.
    ///
    /// # Errors
    ///
    /// - UNKNOWN_FIELD if the plan has no such column
    /// - SCHEMA_DEFINITION if the column holds no reference
    /// - whatever the loader returns
    pub fn populate(&self, instance: &mut Record, field: &str, loader: &dyn ReferenceLoader) -> SchemaResult<()> {
        let column = self
            .plan()
            .column(field)
            .ok_or_else(|| SchemaError::unknown_field(field))?;
        if column.shape.reference().is_none() {
            return Err(SchemaError::field_definition(field, "field is not a reference"));
        }

        let Some(value) = instance.get(field) else {
            return Ok(());
        };
        let populated = self.populate_value(value, &column.shape, loader)?;
        instance.insert(field.to_string(), populated);
        Ok(())
    }

    fn populate_value(&self, value: &Value, shape: &ValueShape, loader: &dyn ReferenceLoader) -> SchemaResult<Value> {
        match (shape, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ValueShape::Reference(reference), key) => self.load_one(reference, key, loader),
            (ValueShape::List(element), Value::List(items) | Value::Set(items)) => items
                .iter()
                .map(|item| self.populate_value(item, element, loader))
                .collect::<SchemaResult<Vec<_>>>()
                .map(Value::List),
            (ValueShape::Set { element, .. }, Value::List(items) | Value::Set(items)) => {
                let populated = items
                    .iter()
                    .map(|item| self.populate_value(item, element, loader))
                    .collect::<SchemaResult<Vec<_>>>()?;
                Ok(match value {
                    Value::List(_) => Value::List(populated),
                    _ => Value::Set(populated),
                })
            }
            (ValueShape::Map(element), Value::Map(entries)) => {
                let mut populated = std::collections::BTreeMap::new();
                for (key, item) in entries {
                    populated.insert(key.clone(), self.populate_value(item, element, loader)?);
                }
                Ok(Value::Map(populated))
            }
            (_, other) => Ok(other.clone()),
        }
    }

    fn load_one(&self, reference: &ReferenceDescriptor, key: &Value, loader: &dyn ReferenceLoader) -> SchemaResult<Value> {
        let Some(row) = loader.load(&reference.target, key)? else {
            return Ok(Value::Null);
        };
        let target = self.registry().require(&reference.target)?;
        let marshaller = Marshaller::new(target, Arc::clone(self.registry()));
        let instance = marshaller.from_storage(&row)?;
        Ok(Value::Map(marshaller.view(&instance)))
    }
}
