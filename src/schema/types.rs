//! Schema descriptor types
//!
//! A `SchemaDescriptor` is an ordered tree of fields and groups plus table
//! options. Descriptors are built once (by the builder API or by decoding a
//! JSON literal) and never mutated after compilation.
//!
//! Type markers are a closed enum: primitives, collections, nested schemas
//! and references to other entities.

use std::fmt;
use std::sync::Arc;

use super::value::{Record, Value};
use crate::plan::StoragePlan;

/// Primitive kinds a field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Ascii,
    Number,
    Double,
    Int,
    BigInt,
    Decimal,
    Counter,
    Boolean,
    /// Point in time
    Date,
    /// Calendar date without time
    LocalDate,
    Uuid,
    TimeUuid,
    Buffer,
    Inet,
    /// Free-form JSON document stored as text
    Json,
}

impl PrimitiveKind {
    /// All kinds, in catalogue order
    pub const ALL: [PrimitiveKind; 16] = [
        PrimitiveKind::String,
        PrimitiveKind::Ascii,
        PrimitiveKind::Number,
        PrimitiveKind::Double,
        PrimitiveKind::Int,
        PrimitiveKind::BigInt,
        PrimitiveKind::Decimal,
        PrimitiveKind::Counter,
        PrimitiveKind::Boolean,
        PrimitiveKind::Date,
        PrimitiveKind::LocalDate,
        PrimitiveKind::Uuid,
        PrimitiveKind::TimeUuid,
        PrimitiveKind::Buffer,
        PrimitiveKind::Inet,
        PrimitiveKind::Json,
    ];

    /// Returns the literal name used in schema documents
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "String",
            PrimitiveKind::Ascii => "Ascii",
            PrimitiveKind::Number => "Number",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::Int => "Int",
            PrimitiveKind::BigInt => "BigInt",
            PrimitiveKind::Decimal => "Decimal",
            PrimitiveKind::Counter => "Counter",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Date => "Date",
            PrimitiveKind::LocalDate => "LocalDate",
            PrimitiveKind::Uuid => "Uuid",
            PrimitiveKind::TimeUuid => "TimeUuid",
            PrimitiveKind::Buffer => "Buffer",
            PrimitiveKind::Inet => "Inet",
            PrimitiveKind::Json => "Json",
        }
    }

    /// Looks up a literal name; the physical names (`text`, `float`, ...) are
    /// accepted as aliases
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "String" | "text" | "varchar" => PrimitiveKind::String,
            "Ascii" | "ascii" => PrimitiveKind::Ascii,
            "Number" | "float" => PrimitiveKind::Number,
            "Double" | "double" => PrimitiveKind::Double,
            "Int" | "int" => PrimitiveKind::Int,
            "BigInt" | "bigint" => PrimitiveKind::BigInt,
            "Decimal" | "decimal" => PrimitiveKind::Decimal,
            "Counter" | "counter" => PrimitiveKind::Counter,
            "Boolean" | "boolean" => PrimitiveKind::Boolean,
            "Date" | "timestamp" => PrimitiveKind::Date,
            "LocalDate" | "date" => PrimitiveKind::LocalDate,
            "Uuid" | "uuid" => PrimitiveKind::Uuid,
            "TimeUuid" | "timeuuid" => PrimitiveKind::TimeUuid,
            "Buffer" | "blob" => PrimitiveKind::Buffer,
            "Inet" | "inet" => PrimitiveKind::Inet,
            "Json" | "Mixed" | "Object" => PrimitiveKind::Json,
            _ => return None,
        };
        Some(kind)
    }
}

/// Collection families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

impl CollectionKind {
    /// Recognizes a collection keyword (`Array` is an alias of `List`)
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "Array" | "List" | "list" => Some(CollectionKind::List),
            "Set" | "set" => Some(CollectionKind::Set),
            "Map" | "map" => Some(CollectionKind::Map),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CollectionKind::List => "list",
            CollectionKind::Set => "set",
            CollectionKind::Map => "map",
        }
    }
}

/// Semantic type of a field
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Primitive(PrimitiveKind),
    /// List/Set carry one element type, Map carries key and value
    Collection {
        kind: CollectionKind,
        elements: Vec<TypeDescriptor>,
    },
    /// An embedded schema, flattened at top level or stored as a composite
    /// type inside collections
    Nested(Arc<SchemaDescriptor>),
    /// Points at another entity's primary key
    Reference(String),
}

impl TypeDescriptor {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeDescriptor::Primitive(kind)
    }

    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::Collection {
            kind: CollectionKind::List,
            elements: vec![element],
        }
    }

    pub fn set(element: TypeDescriptor) -> Self {
        TypeDescriptor::Collection {
            kind: CollectionKind::Set,
            elements: vec![element],
        }
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Collection {
            kind: CollectionKind::Map,
            elements: vec![key, value],
        }
    }

    pub fn nested(schema: SchemaDescriptor) -> Self {
        TypeDescriptor::Nested(Arc::new(schema))
    }

    pub fn reference(entity: impl Into<String>) -> Self {
        TypeDescriptor::Reference(entity.into())
    }

    /// Entities this type points at, directly or through collections
    pub fn referenced_entities(&self, out: &mut Vec<String>) {
        match self {
            TypeDescriptor::Primitive(_) => {}
            TypeDescriptor::Collection { elements, .. } => {
                for element in elements {
                    element.referenced_entities(out);
                }
            }
            TypeDescriptor::Nested(schema) => schema.referenced_entities_into(out),
            TypeDescriptor::Reference(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
    }
}

/// Sort direction of a clustering column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Per-field index request
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IndexFlag {
    #[default]
    Simple,
    /// `{include: [...], clustering_order: {...}}`
    Annotated {
        include: Vec<String>,
        clustering_order: Vec<(String, SortOrder)>,
    },
}

/// An index declared in `options.indexes` / `options.unique`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexDeclaration {
    pub columns: Vec<String>,
    pub include: Vec<String>,
    pub clustering_order: Vec<(String, SortOrder)>,
}

impl IndexDeclaration {
    pub fn on(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// Explicit primary key layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyLayout {
    pub partition: Vec<String>,
    pub clustering: Vec<String>,
}

/// Table-level options
#[derive(Debug, Clone, Default)]
pub struct SchemaOptions {
    pub key: Option<KeyLayout>,
    /// When present, replaces every per-field `secondary_index` flag
    pub indexes: Option<Vec<IndexDeclaration>>,
    /// When present, replaces every per-field `unique` flag
    pub unique: Option<Vec<IndexDeclaration>>,
    pub clustering_order: Vec<(String, SortOrder)>,
    /// Composite type name used when this schema is stored inside a collection
    pub type_name: Option<String>,
}

/// Key and index flags plus storage toggles
#[derive(Debug, Clone, Default)]
pub struct FieldFlags {
    pub partition_key: bool,
    pub clustering_key: bool,
    pub secondary_index: Option<IndexFlag>,
    pub unique: Option<IndexFlag>,
    pub required: bool,
    /// No physical column; value computed by the getter
    pub is_virtual: bool,
    /// Set columns read back as arrays when `Some(true)`
    pub array: Option<bool>,
}

/// User predicate: candidate value, whole candidate instance, owning plan
pub type ValidateFn = Arc<dyn Fn(&Value, &Record, &StoragePlan) -> bool + Send + Sync>;

/// Computes a default at instance-creation time
pub type DefaultFn = Arc<dyn Fn(&DefaultContext<'_>) -> Value + Send + Sync>;

/// Getter: stored value (null for virtual fields), instance, plan
pub type GetterFn = Arc<dyn Fn(&Value, &Record, &StoragePlan) -> Value + Send + Sync>;

/// Setter: incoming value, instance, plan; returns the value to store in the
/// field's own column (ignored for virtual fields)
pub type SetterFn = Arc<dyn Fn(Value, &mut Record, &StoragePlan) -> Value + Send + Sync>;

/// What a computed default can see
pub struct DefaultContext<'a> {
    pub field: &'a str,
    pub instance: &'a Record,
    pub plan: &'a StoragePlan,
}

/// Built-in generators usable from JSON literals (`{"$fn": "uuid"}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    Uuid,
    Now,
}

#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Generated(Generator),
    Computed(DefaultFn),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Generated(g) => f.debug_tuple("Generated").field(g).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

/// User predicate with an optional failure message
#[derive(Clone)]
pub struct CustomValidator {
    pub check: ValidateFn,
    pub message: Option<String>,
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValidator")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Per-field constraints, compiled into one predicate chain
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Regular expression the text value must match
    Match(String),
    Enum(Vec<Value>),
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Validate(CustomValidator),
}

/// Write-side value transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Lowercase,
    Uppercase,
    Trim,
}

#[derive(Clone, Default)]
pub struct AccessorHooks {
    pub get: Option<GetterFn>,
    pub set: Option<SetterFn>,
}

impl AccessorHooks {
    pub fn is_empty(&self) -> bool {
        self.get.is_none() && self.set.is_none()
    }
}

impl fmt::Debug for AccessorHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorHooks")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

/// A leaf field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    /// `None` only for virtual fields
    pub ty: Option<TypeDescriptor>,
    pub flags: FieldFlags,
    pub default: Option<DefaultValue>,
    pub constraints: Vec<Constraint>,
    pub hooks: AccessorHooks,
    pub transforms: Vec<Transform>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            flags: FieldFlags::default(),
            default: None,
            constraints: Vec::new(),
            hooks: AccessorHooks::default(),
            transforms: Vec::new(),
        }
    }

    /// A field with no physical column
    pub fn virtual_field(name: impl Into<String>) -> Self {
        let mut field = Self::new(name, TypeDescriptor::Primitive(PrimitiveKind::Json));
        field.ty = None;
        field.flags.is_virtual = true;
        field
    }

    pub fn partition_key(mut self) -> Self {
        self.flags.partition_key = true;
        self
    }

    pub fn clustering_key(mut self) -> Self {
        self.flags.clustering_key = true;
        self
    }

    pub fn secondary_index(mut self, flag: IndexFlag) -> Self {
        self.flags.secondary_index = Some(flag);
        self
    }

    pub fn unique(mut self) -> Self {
        self.flags.unique = Some(IndexFlag::Simple);
        self
    }

    pub fn required(mut self) -> Self {
        self.flags.required = true;
        self
    }

    pub fn array(mut self, array: bool) -> Self {
        self.flags.array = Some(array);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&DefaultContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(f)));
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn validate_with<F>(mut self, message: Option<&str>, f: F) -> Self
    where
        F: Fn(&Value, &Record, &StoragePlan) -> bool + Send + Sync + 'static,
    {
        self.constraints.push(Constraint::Validate(CustomValidator {
            check: Arc::new(f),
            message: message.map(str::to_string),
        }));
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Record, &StoragePlan) -> Value + Send + Sync + 'static,
    {
        self.hooks.get = Some(Arc::new(f));
        self
    }

    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &mut Record, &StoragePlan) -> Value + Send + Sync + 'static,
    {
        self.hooks.set = Some(Arc::new(f));
        self
    }
}

/// A node of the field tree
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Field(FieldSpec),
    /// A group without its own type; its children are flattened
    Group { name: String, children: Vec<SchemaNode> },
}

impl SchemaNode {
    pub fn group(name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        SchemaNode::Group {
            name: name.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Field(f) => &f.name,
            SchemaNode::Group { name, .. } => name,
        }
    }
}

impl From<FieldSpec> for SchemaNode {
    fn from(field: FieldSpec) -> Self {
        SchemaNode::Field(field)
    }
}

/// Complete schema description
#[derive(Debug, Clone, Default)]
pub struct SchemaDescriptor {
    /// Entity name (top level) or composite type name (nested)
    pub name: Option<String>,
    pub nodes: Vec<SchemaNode>,
    pub options: SchemaOptions,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A schema with no name, only valid where it gets flattened
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.nodes.push(SchemaNode::Field(field));
        self
    }

    pub fn group(mut self, name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        self.nodes.push(SchemaNode::group(name, children));
        self
    }

    pub fn options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    /// Name used for the composite type when stored inside a collection
    pub fn type_name(&self) -> Option<&str> {
        self.options.type_name.as_deref().or(self.name.as_deref())
    }

    /// Finds a field by dot path, descending through groups and nested schemas
    /// owned by this descriptor
    pub fn field_mut(&mut self, path: &str) -> Option<&mut FieldSpec> {
        let segments: Vec<&str> = path.split('.').collect();
        find_field_mut(&mut self.nodes, &segments)
    }

    /// Entities referenced anywhere in this schema
    pub fn referenced_entities(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.referenced_entities_into(&mut out);
        out
    }

    fn referenced_entities_into(&self, out: &mut Vec<String>) {
        fn walk(nodes: &[SchemaNode], out: &mut Vec<String>) {
            for node in nodes {
                match node {
                    SchemaNode::Field(field) => {
                        if let Some(ty) = &field.ty {
                            ty.referenced_entities(out);
                        }
                    }
                    SchemaNode::Group { children, .. } => walk(children, out),
                }
            }
        }
        walk(&self.nodes, out);
    }
}

fn find_field_mut<'a>(nodes: &'a mut [SchemaNode], segments: &[&str]) -> Option<&'a mut FieldSpec> {
    let (head, rest) = segments.split_first()?;
    for node in nodes.iter_mut() {
        if node.name() != *head {
            continue;
        }
        return match node {
            SchemaNode::Field(field) => {
                if rest.is_empty() {
                    return Some(field);
                }
                match field.ty.as_mut() {
                    Some(TypeDescriptor::Nested(schema)) => {
                        find_field_mut(&mut Arc::make_mut(schema).nodes, rest)
                    }
                    _ => None,
                }
            }
            SchemaNode::Group { children, .. } => find_field_mut(children, rest),
        };
    }
    None
}
