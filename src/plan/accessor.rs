//! Accessors generated per compiled schema
//!
//! Three kinds of entries, keyed by field path:
//! - `Group`: a field tree without its own column. Reading reassembles the
//!   nested map from the leaf columns under `path.`, writing flattens a map
//!   back into those columns.
//! - `Virtual`: no column; the getter computes the value from the instance,
//!   the setter writes other fields.
//! - `Layered`: getter/setter over a physical column.
//!
//! Accessors are plain functions taking the instance and the plan
//! explicitly; nothing is bound to a receiver.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::StoragePlan;
use crate::schema::{GetterFn, Record, SchemaError, SchemaResult, SetterFn, Value};

#[derive(Clone)]
pub enum Accessor {
    Group,
    Virtual {
        get: Option<GetterFn>,
        set: Option<SetterFn>,
    },
    Layered {
        get: Option<GetterFn>,
        set: Option<SetterFn>,
    },
}

impl std::fmt::Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Accessor::Group => f.write_str("Group"),
            Accessor::Virtual { get, set } => f
                .debug_struct("Virtual")
                .field("get", &get.is_some())
                .field("set", &set.is_some())
                .finish(),
            Accessor::Layered { get, set } => f
                .debug_struct("Layered")
                .field("get", &get.is_some())
                .field("set", &set.is_some())
                .finish(),
        }
    }
}

/// Accessors of one plan, in declaration order
#[derive(Debug, Default, Clone)]
pub struct AccessorTable {
    entries: Vec<(String, Accessor)>,
}

impl AccessorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, path: impl Into<String>, accessor: Accessor) {
        self.entries.push((path.into(), accessor));
    }

    pub fn get(&self, path: &str) -> Option<&Accessor> {
        self.entries.iter().find(|(p, _)| p == path).map(|(_, a)| a)
    }

    pub fn is_group(&self, path: &str) -> bool {
        matches!(self.get(path), Some(Accessor::Group))
    }

    pub fn is_virtual(&self, path: &str) -> bool {
        matches!(self.get(path), Some(Accessor::Virtual { .. }))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addresses of the getter and setter closures, in declaration order
    pub(crate) fn collect_hooks(&self, out: &mut Vec<*const ()>) {
        for (_, accessor) in &self.entries {
            if let Accessor::Virtual { get, set } | Accessor::Layered { get, set } = accessor {
                if let Some(get) = get {
                    out.push(Arc::as_ptr(get) as *const ());
                }
                if let Some(set) = set {
                    out.push(Arc::as_ptr(set) as *const ());
                }
            }
        }
    }

    /// Reads a field, group or virtual value from a flat instance
    pub fn read(&self, record: &Record, path: &str, plan: &StoragePlan) -> Value {
        let stored = record.get(path).cloned().unwrap_or(Value::Null);
        match self.get(path) {
            Some(Accessor::Group) => self.reassemble(record, path, plan),
            Some(Accessor::Virtual { get: Some(get), .. }) => get(&Value::Null, record, plan),
            Some(Accessor::Layered { get: Some(get), .. }) => get(&stored, record, plan),
            _ => stored,
        }
    }

    /// Writes a value through the field's accessor.
    ///
    /// # Errors
    ///
    /// ENCODING when a group receives a non-map, or a virtual field without
    /// a setter is written.
    pub fn write(&self, record: &mut Record, path: &str, value: Value, plan: &StoragePlan) -> SchemaResult<()> {
        match self.get(path) {
            Some(Accessor::Group) => {
                // Setting a group replaces its whole subtree
                let children = match value {
                    Value::Map(children) => children,
                    Value::Null => BTreeMap::new(),
                    other => {
                        return Err(SchemaError::encoding(
                            path,
                            format!("group expects a map, got {}", other.type_name()),
                        ))
                    }
                };
                self.clear_group(record, path);
                for (key, child) in children {
                    self.write(record, &format!("{}.{}", path, key), child, plan)?;
                }
                Ok(())
            }
            Some(Accessor::Virtual { set: Some(set), .. }) => {
                set(value, record, plan);
                Ok(())
            }
            Some(Accessor::Virtual { set: None, .. }) => {
                Err(SchemaError::encoding(path, "virtual field has no setter"))
            }
            Some(Accessor::Layered { set: Some(set), .. }) => {
                let stored = set(value, record, plan);
                record.insert(path.to_string(), stored);
                Ok(())
            }
            _ => {
                record.insert(path.to_string(), value);
                Ok(())
            }
        }
    }

    /// Application view of a flat instance: top-level groups reassembled,
    /// getters applied, virtual values computed. Null values are omitted.
    pub fn view(&self, record: &Record, plan: &StoragePlan) -> Record {
        let mut out = Record::new();
        for column in &plan.columns {
            if column.name.contains('.') {
                continue;
            }
            let value = self.read(record, &column.name, plan);
            if !value.is_null() {
                out.insert(column.name.clone(), value);
            }
        }
        for (path, accessor) in &self.entries {
            if path.contains('.') || matches!(accessor, Accessor::Layered { .. }) {
                continue;
            }
            let value = self.read(record, path, plan);
            if !value.is_null() {
                out.insert(path.clone(), value);
            }
        }
        out
    }

    fn reassemble(&self, record: &Record, path: &str, plan: &StoragePlan) -> Value {
        let prefix = format!("{}.", path);
        let mut tree = BTreeMap::new();

        let leaves = plan
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.entries.iter().filter_map(|(p, a)| match a {
                Accessor::Virtual { .. } => Some(p.as_str()),
                _ => None,
            }));

        for leaf in leaves {
            let Some(rest) = leaf.strip_prefix(&prefix) else {
                continue;
            };
            let value = self.read(record, leaf, plan);
            if !value.is_null() {
                let segments: Vec<&str> = rest.split('.').collect();
                insert_nested(&mut tree, &segments, value);
            }
        }

        if tree.is_empty() {
            Value::Null
        } else {
            Value::Map(tree)
        }
    }

    fn clear_group(&self, record: &mut Record, path: &str) {
        let prefix = format!("{}.", path);
        record.retain(|key, _| !key.starts_with(&prefix));
    }
}

fn insert_nested(tree: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        tree.insert(head.to_string(), value);
        return;
    }
    let child = tree
        .entry(head.to_string())
        .or_insert_with(|| Value::Map(BTreeMap::new()));
    if !matches!(child, Value::Map(_)) {
        *child = Value::Map(BTreeMap::new());
    }
    if let Value::Map(map) = child {
        insert_nested(map, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ColumnPlanner;
    use crate::schema::{FieldSpec, PrimitiveKind, SchemaDescriptor, SchemaNode, SchemaRegistry, TypeDescriptor};

    fn person() -> StoragePlan {
        let string = || TypeDescriptor::primitive(PrimitiveKind::String);
        let schema = SchemaDescriptor::new("person")
            .field(FieldSpec::new("id", string()).partition_key())
            .group(
                "info",
                vec![SchemaNode::group(
                    "subinfo",
                    vec![
                        FieldSpec::new("name", string()).into(),
                        FieldSpec::new("surname", string()).into(),
                    ],
                )],
            )
            .field(
                FieldSpec::virtual_field("full_name")
                    .getter(|_, instance, _| {
                        let part = |k: &str| instance.get(k).and_then(Value::as_str).unwrap_or("").to_string();
                        Value::Text(format!("{} {}", part("info.subinfo.name"), part("info.subinfo.surname")))
                    })
                    .setter(|value, instance, _| {
                        if let Some((first, last)) = value.as_str().and_then(|s| s.split_once(' ')) {
                            instance.insert("info.subinfo.name".into(), first.into());
                            instance.insert("info.subinfo.surname".into(), last.into());
                        }
                        Value::Null
                    }),
            );
        ColumnPlanner::new(&SchemaRegistry::new()).plan(&schema).unwrap()
    }

    #[test]
    fn test_group_reassembles_leaves() {
        let plan = person();
        let mut record = Record::new();
        record.insert("info.subinfo.name".into(), "Ada".into());
        record.insert("info.subinfo.surname".into(), "Lovelace".into());

        let info = plan.accessors().read(&record, "info", &plan);
        assert_eq!(
            info,
            Value::map([(
                "subinfo",
                Value::map([("name", "Ada".into()), ("surname", "Lovelace".into())])
            )])
        );
    }

    #[test]
    fn test_group_write_replaces_subtree() {
        let plan = person();
        let mut record = Record::new();
        record.insert("info.subinfo.surname".into(), "Old".into());

        plan.accessors()
            .write(
                &mut record,
                "info",
                Value::map([("subinfo", Value::map([("name", "Grace".into())]))]),
                &plan,
            )
            .unwrap();
        assert_eq!(record.get("info.subinfo.name"), Some(&Value::from("Grace")));
        assert!(!record.contains_key("info.subinfo.surname"));
    }

    #[test]
    fn test_virtual_getter_and_setter() {
        let plan = person();
        let mut record = Record::new();
        plan.accessors()
            .write(&mut record, "full_name", "Alan Turing".into(), &plan)
            .unwrap();
        assert!(!record.contains_key("full_name"));
        assert_eq!(
            plan.accessors().read(&record, "full_name", &plan),
            Value::from("Alan Turing")
        );
    }

    #[test]
    fn test_view_nests_groups() {
        let plan = person();
        let mut record = Record::new();
        record.insert("id".into(), "p1".into());
        record.insert("info.subinfo.name".into(), "Ada".into());

        let view = plan.accessors().view(&record, &plan);
        assert_eq!(view.get("id"), Some(&Value::from("p1")));
        assert!(matches!(view.get("info"), Some(Value::Map(_))));
        assert_eq!(view.get("full_name"), Some(&Value::from("Ada ")));
    }
}
