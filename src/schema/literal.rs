//! Schema literal decoding
//!
//! Decodes a JSON schema document into a `SchemaDescriptor`:
//!
//! ```json
//! { "name": "user",
//!   "fields": {
//!     "id":    {"type": "Uuid", "primary_key": true},
//!     "info":  {"subinfo": {"name": {"type": "String"}}},
//!     "tags":  {"type": "Set", "of": "String"},
//!     "owner": {"type": {"ref": "account"}} },
//!   "options": {"indexes": ["info.subinfo.name"]} }
//! ```
//!
//! An object with `type` (or `virtual`) is a leaf field; any other object is
//! a group. Field order follows the document.
//!
//! Type decoding tries, in order: a primitive name, a collection keyword
//! qualified by `of`, a complex object (`{"ref": ...}` or a nested schema
//! with `fields`), the `[T]` list shorthand. Anything else fails DECODE.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use super::errors::{SchemaError, SchemaResult};
use super::types::{
    CollectionKind, Constraint, DefaultValue, FieldSpec, Generator, IndexDeclaration, IndexFlag,
    KeyLayout, PrimitiveKind, SchemaDescriptor, SchemaNode, SchemaOptions, SortOrder, Transform,
    TypeDescriptor,
};
use super::value::Value;

const FIELD_ATTRIBUTES: &[&str] = &[
    "type",
    "of",
    "primary_key",
    "clustering_key",
    "secondary_index",
    "unique",
    "required",
    "virtual",
    "array",
    "default",
    "match",
    "enum",
    "minlength",
    "maxlength",
    "min",
    "max",
    "lowercase",
    "uppercase",
    "trim",
];

impl SchemaDescriptor {
    /// Decodes a schema document
    pub fn from_json(json: &JsonValue) -> SchemaResult<Self> {
        decode_schema(json, "")
    }

    /// Parses and decodes a schema document
    pub fn from_json_str(text: &str) -> SchemaResult<Self> {
        let json: JsonValue = serde_json::from_str(text)
            .map_err(|e| SchemaError::definition(format!("Invalid schema JSON: {}", e)))?;
        Self::from_json(&json)
    }
}

fn decode_schema(json: &JsonValue, path: &str) -> SchemaResult<SchemaDescriptor> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::definition("schema document must be an object"))?;

    let name = match obj.get("name") {
        None => None,
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(_) => return Err(SchemaError::definition("schema name must be a string")),
    };

    let fields = obj
        .get("fields")
        .and_then(JsonValue::as_object)
        .ok_or_else(|| SchemaError::definition("schema document requires a 'fields' object"))?;

    let options = match obj.get("options") {
        None => SchemaOptions::default(),
        Some(options) => decode_options(options)?,
    };

    Ok(SchemaDescriptor {
        name,
        nodes: decode_nodes(fields, path)?,
        options,
    })
}

fn decode_nodes(fields: &Map<String, JsonValue>, prefix: &str) -> SchemaResult<Vec<SchemaNode>> {
    fields
        .iter()
        .map(|(name, spec)| decode_node(name, spec, &join_path(prefix, name)))
        .collect()
}

fn decode_node(name: &str, spec: &JsonValue, path: &str) -> SchemaResult<SchemaNode> {
    let obj = spec
        .as_object()
        .ok_or_else(|| SchemaError::field_definition(path, "field spec must be an object"))?;

    if obj.contains_key("type") || obj.contains_key("virtual") {
        return decode_field(name, obj, path).map(SchemaNode::Field);
    }

    if obj.is_empty() {
        return Err(SchemaError::field_definition(path, "group has no fields"));
    }
    Ok(SchemaNode::Group {
        name: name.to_string(),
        children: decode_nodes(obj, path)?,
    })
}

fn decode_field(name: &str, obj: &Map<String, JsonValue>, path: &str) -> SchemaResult<FieldSpec> {
    if let Some(unknown) = obj.keys().find(|k| !FIELD_ATTRIBUTES.contains(&k.as_str())) {
        return Err(SchemaError::field_definition(
            path,
            format!("unknown attribute '{}'", unknown),
        ));
    }

    let is_virtual = flag(obj, "virtual", path)?;
    let mut field = match obj.get("type") {
        Some(ty) => FieldSpec::new(name, decode_type(ty, obj.get("of")).map_err(|e| e.with_field(path))?),
        None => FieldSpec::virtual_field(name),
    };
    field.flags.is_virtual = is_virtual;

    field.flags.partition_key = flag(obj, "primary_key", path)?;
    field.flags.clustering_key = flag(obj, "clustering_key", path)?;
    field.flags.required = flag(obj, "required", path)?;
    field.flags.secondary_index = decode_index_flag(obj.get("secondary_index"), path)?;
    field.flags.unique = decode_index_flag(obj.get("unique"), path)?;
    if let Some(array) = obj.get("array") {
        field.flags.array = Some(
            array
                .as_bool()
                .ok_or_else(|| SchemaError::field_definition(path, "'array' must be a boolean"))?,
        );
    }

    if let Some(default) = obj.get("default") {
        field.default = Some(decode_default(default, path)?);
    }

    // Constraints and transforms keep document order
    for (key, value) in obj {
        let constraint = match key.as_str() {
            "match" => Constraint::Match(
                value
                    .as_str()
                    .ok_or_else(|| SchemaError::field_definition(path, "'match' must be a string"))?
                    .to_string(),
            ),
            "enum" => Constraint::Enum(
                value
                    .as_array()
                    .ok_or_else(|| SchemaError::field_definition(path, "'enum' must be an array"))?
                    .iter()
                    .map(Value::from_json)
                    .collect(),
            ),
            "minlength" => Constraint::MinLength(length(value, key, path)?),
            "maxlength" => Constraint::MaxLength(length(value, key, path)?),
            "min" => Constraint::Min(number(value, key, path)?),
            "max" => Constraint::Max(number(value, key, path)?),
            "lowercase" | "uppercase" | "trim" => {
                if flag(obj, key, path)? {
                    field.transforms.push(match key.as_str() {
                        "lowercase" => Transform::Lowercase,
                        "uppercase" => Transform::Uppercase,
                        _ => Transform::Trim,
                    });
                }
                continue;
            }
            _ => continue,
        };
        field.constraints.push(constraint);
    }

    Ok(field)
}

/// Decodes the `type` attribute together with its `of` qualifier
fn decode_type(ty: &JsonValue, of: Option<&JsonValue>) -> SchemaResult<TypeDescriptor> {
    match ty {
        JsonValue::String(name) => {
            if let Some(kind) = PrimitiveKind::from_name(name) {
                if of.is_some() {
                    return Err(SchemaError::definition(format!(
                        "'of' does not apply to primitive type '{}'",
                        name
                    )));
                }
                return Ok(TypeDescriptor::Primitive(kind));
            }
            if let Some(kind) = CollectionKind::from_keyword(name) {
                return decode_collection(kind, of);
            }
            Err(SchemaError::decode(format!("Could not decode Type '{}'", name)))
        }
        JsonValue::Object(_) => decode_complex(ty),
        JsonValue::Array(items) => match items.as_slice() {
            [element] => Ok(TypeDescriptor::list(decode_element(element)?)),
            _ => Err(SchemaError::definition(
                "list shorthand must contain exactly one element type",
            )),
        },
        _ => Err(SchemaError::decode("Could not decode Type")),
    }
}

fn decode_collection(kind: CollectionKind, of: Option<&JsonValue>) -> SchemaResult<TypeDescriptor> {
    let of = of.ok_or_else(|| {
        SchemaError::definition(format!("collection '{}' requires 'of'", kind.name()))
    })?;

    let elements = match (kind, of) {
        (CollectionKind::Map, JsonValue::Array(items)) => {
            if items.len() != 2 {
                return Err(SchemaError::invalid_map_arity(items.len()));
            }
            items.iter().map(decode_element).collect::<SchemaResult<Vec<_>>>()?
        }
        (CollectionKind::Map, _) => return Err(SchemaError::invalid_map_arity(1)),
        (_, element) => vec![decode_element(element)?],
    };
    Ok(TypeDescriptor::Collection { kind, elements })
}

/// Decodes a type in element position (inside `of` or `[T]`)
fn decode_element(element: &JsonValue) -> SchemaResult<TypeDescriptor> {
    match element {
        JsonValue::String(name) => PrimitiveKind::from_name(name)
            .map(TypeDescriptor::Primitive)
            .ok_or_else(|| SchemaError::unsupported_primitive(name.as_str())),
        JsonValue::Array(items) => match items.as_slice() {
            [inner] => Ok(TypeDescriptor::list(decode_element(inner)?)),
            _ => Err(SchemaError::definition(
                "list shorthand must contain exactly one element type",
            )),
        },
        JsonValue::Object(_) => decode_complex(element),
        _ => Err(SchemaError::decode("Could not decode Type")),
    }
}

/// `{"ref": "entity"}` or an embedded schema document
fn decode_complex(json: &JsonValue) -> SchemaResult<TypeDescriptor> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::decode("Could not decode Type"))?;

    if let Some(target) = obj.get("ref") {
        return target
            .as_str()
            .map(TypeDescriptor::reference)
            .ok_or_else(|| SchemaError::definition("'ref' must name an entity"));
    }
    if obj.contains_key("fields") {
        return Ok(TypeDescriptor::nested(decode_schema(json, "")?));
    }
    Err(SchemaError::decode("Could not decode Type"))
}

/// Object form of an index: `{"on": .., "include": [..], "clustering_order": {..}}`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexDescriptor {
    #[serde(default)]
    on: Option<ColumnList>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    clustering_order: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ColumnList {
    One(String),
    Many(Vec<String>),
}

impl IndexDescriptor {
    fn from_object(obj: &Map<String, JsonValue>) -> Result<Self, String> {
        serde_json::from_value(JsonValue::Object(obj.clone()))
            .map_err(|e| format!("invalid index descriptor: {}", e))
    }

    fn clustering_order(&self) -> SchemaResult<Vec<(String, SortOrder)>> {
        match &self.clustering_order {
            None => Ok(Vec::new()),
            Some(v) => decode_clustering_order(v),
        }
    }
}

fn decode_index_flag(value: Option<&JsonValue>, path: &str) -> SchemaResult<Option<IndexFlag>> {
    match value {
        None | Some(JsonValue::Bool(false)) => Ok(None),
        Some(JsonValue::Bool(true)) => Ok(Some(IndexFlag::Simple)),
        Some(JsonValue::Object(obj)) => {
            let descriptor = IndexDescriptor::from_object(obj)
                .map_err(|msg| SchemaError::field_definition(path, msg))?;
            if descriptor.on.is_some() {
                return Err(SchemaError::field_definition(
                    path,
                    "a field index covers its own field; 'on' belongs in options.indexes",
                ));
            }
            Ok(Some(IndexFlag::Annotated {
                clustering_order: descriptor.clustering_order()?,
                include: descriptor.include,
            }))
        }
        Some(_) => Err(SchemaError::field_definition(
            path,
            "index flag must be a boolean or an index descriptor",
        )),
    }
}

fn decode_options(json: &JsonValue) -> SchemaResult<SchemaOptions> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::definition("'options' must be an object"))?;

    let mut options = SchemaOptions::default();
    for (key, value) in obj {
        match key.as_str() {
            "key" => options.key = Some(decode_key(value)?),
            "indexes" => options.indexes = Some(decode_index_list(value)?),
            "unique" => options.unique = Some(decode_index_list(value)?),
            "clustering_order" => options.clustering_order = decode_clustering_order(value)?,
            "type_name" => {
                options.type_name = Some(
                    value
                        .as_str()
                        .ok_or_else(|| SchemaError::definition("'type_name' must be a string"))?
                        .to_string(),
                )
            }
            other => {
                return Err(SchemaError::definition(format!("unknown option '{}'", other)));
            }
        }
    }
    Ok(options)
}

/// `[partition, clustering...]` where partition is a name or a list of names
fn decode_key(json: &JsonValue) -> SchemaResult<KeyLayout> {
    let items = json
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| SchemaError::key_definition("'key' must be a non-empty array"))?;

    let partition = match &items[0] {
        JsonValue::String(s) => vec![s.clone()],
        other => string_list(other)
            .ok_or_else(|| SchemaError::key_definition("partition key must be a name or list of names"))?,
    };
    let clustering = items[1..]
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| SchemaError::key_definition("clustering keys must be names"))
        })
        .collect::<SchemaResult<Vec<_>>>()?;

    Ok(KeyLayout {
        partition,
        clustering,
    })
}

fn decode_index_list(json: &JsonValue) -> SchemaResult<Vec<IndexDeclaration>> {
    let items = json
        .as_array()
        .ok_or_else(|| SchemaError::definition("index options must be an array"))?;

    items
        .iter()
        .map(|item| match item {
            JsonValue::String(column) => Ok(IndexDeclaration::on(&[column.as_str()])),
            JsonValue::Array(_) => string_list(item)
                .map(|columns| IndexDeclaration {
                    columns,
                    ..Default::default()
                })
                .ok_or_else(|| SchemaError::definition("compound index must list field names")),
            JsonValue::Object(obj) => {
                let descriptor = IndexDescriptor::from_object(obj).map_err(SchemaError::definition)?;
                let clustering_order = descriptor.clustering_order()?;
                let columns = match descriptor.on {
                    Some(ColumnList::One(column)) => vec![column],
                    Some(ColumnList::Many(columns)) => columns,
                    None => return Err(SchemaError::definition("index descriptor requires 'on'")),
                };
                Ok(IndexDeclaration {
                    columns,
                    include: descriptor.include,
                    clustering_order,
                })
            }
            _ => Err(SchemaError::definition("invalid index declaration")),
        })
        .collect()
}

fn decode_clustering_order(json: &JsonValue) -> SchemaResult<Vec<(String, SortOrder)>> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaError::definition("'clustering_order' must be an object"))?;
    obj.iter()
        .map(|(column, order)| {
            order
                .as_str()
                .and_then(SortOrder::from_name)
                .map(|o| (column.clone(), o))
                .ok_or_else(|| {
                    SchemaError::definition(format!("clustering order of '{}' must be asc or desc", column))
                })
        })
        .collect()
}

fn flag(obj: &Map<String, JsonValue>, key: &str, path: &str) -> SchemaResult<bool> {
    match obj.get(key) {
        None => Ok(false),
        Some(JsonValue::Bool(b)) => Ok(*b),
        Some(_) => Err(SchemaError::field_definition(
            path,
            format!("'{}' must be a boolean", key),
        )),
    }
}

fn length(value: &JsonValue, key: &str, path: &str) -> SchemaResult<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| SchemaError::field_definition(path, format!("'{}' must be a non-negative integer", key)))
}

fn number(value: &JsonValue, key: &str, path: &str) -> SchemaResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| SchemaError::field_definition(path, format!("'{}' must be a number", key)))
}

fn string_list(json: &JsonValue) -> Option<Vec<String>> {
    json.as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
