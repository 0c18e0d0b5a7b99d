//! Type resolution
//!
//! Pure mapping from a semantic `TypeDescriptor` to a physical column type
//! and the value shape the marshaller walks. No I/O: composite types are
//! only collected here, creation happens in `UdtRegistry`.
//!
//! Element positions accept primitives, nested schemas (stored as frozen
//! composite types), references (stored as the target's encoded key) and,
//! in a map value only, a list of references (`map<text,frozen<list<K>>>`).

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{
    NativeType, PhysicalType, ReferenceDescriptor, UdtDefinition, UdtField, UdtShape, ValueShape,
};
use crate::schema::validator::ValidationAssembler;
use crate::schema::{
    CollectionKind, FieldSpec, PrimitiveKind, SchemaDescriptor, SchemaError, SchemaNode,
    SchemaRegistry, SchemaResult, TypeDescriptor,
};

/// Physical type plus marshalling shape of one resolved type
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub physical: PhysicalType,
    pub shape: ValueShape,
}

impl ResolvedType {
    fn native(native: NativeType) -> Self {
        Self {
            physical: PhysicalType::Native(native),
            shape: ValueShape::Scalar(native),
        }
    }
}

/// Composite types derived while resolving one schema, deduplicated by name
/// and kept in dependency order (inner types first)
#[derive(Debug, Default)]
pub struct UdtCollector {
    definitions: Vec<UdtDefinition>,
    shapes: HashMap<String, Arc<UdtShape>>,
}

impl UdtCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, definition: UdtDefinition, shape: UdtShape) -> SchemaResult<Arc<UdtShape>> {
        if let Some(existing) = self.definitions.iter().find(|d| d.name == definition.name) {
            if existing.fields != definition.fields {
                return Err(SchemaError::udt_conflict(
                    &definition.name,
                    &UdtDefinition::describe_fields(&existing.fields),
                    &UdtDefinition::describe_fields(&definition.fields),
                ));
            }
            if let Some(shape) = self.shapes.get(&definition.name) {
                return Ok(Arc::clone(shape));
            }
        }

        let shape = Arc::new(shape);
        self.shapes.insert(definition.name.clone(), Arc::clone(&shape));
        self.definitions.push(definition);
        Ok(shape)
    }

    pub fn definitions(&self) -> &[UdtDefinition] {
        &self.definitions
    }

    pub fn into_definitions(self) -> Vec<UdtDefinition> {
        self.definitions
    }
}

/// Resolves type descriptors against the registered entities
pub struct TypeResolver<'a> {
    registry: &'a SchemaRegistry,
    /// Entity being compiled; a reference to it is dangling
    entity: Option<&'a str>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            entity: None,
        }
    }

    pub fn for_entity(mut self, entity: &'a str) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Maps a primitive kind to its native column type
    pub fn resolve_primitive(kind: PrimitiveKind) -> NativeType {
        match kind {
            PrimitiveKind::String => NativeType::Text,
            PrimitiveKind::Ascii => NativeType::Ascii,
            PrimitiveKind::Number => NativeType::Float,
            PrimitiveKind::Double => NativeType::Double,
            PrimitiveKind::Int => NativeType::Int,
            PrimitiveKind::BigInt => NativeType::BigInt,
            PrimitiveKind::Decimal => NativeType::Decimal,
            PrimitiveKind::Counter => NativeType::Counter,
            PrimitiveKind::Boolean => NativeType::Boolean,
            PrimitiveKind::Date => NativeType::Timestamp,
            PrimitiveKind::LocalDate => NativeType::Date,
            PrimitiveKind::Uuid => NativeType::Uuid,
            PrimitiveKind::TimeUuid => NativeType::TimeUuid,
            PrimitiveKind::Buffer => NativeType::Blob,
            PrimitiveKind::Inet => NativeType::Inet,
            PrimitiveKind::Json => NativeType::Text,
        }
    }

    /// Maps a primitive name; unknown names fail UNSUPPORTED_PRIMITIVE
    pub fn resolve_primitive_name(name: &str) -> SchemaResult<NativeType> {
        PrimitiveKind::from_name(name)
            .map(Self::resolve_primitive)
            .ok_or_else(|| SchemaError::unsupported_primitive(name))
    }

    /// Resolves a column type. Nested schemas resolve to frozen composite
    /// types; callers flatten top-level nested schemas before getting here.
    pub fn resolve(&self, ty: &TypeDescriptor, udts: &mut UdtCollector) -> SchemaResult<ResolvedType> {
        match ty {
            TypeDescriptor::Primitive(PrimitiveKind::Json) => Ok(ResolvedType {
                physical: PhysicalType::Native(NativeType::Text),
                shape: ValueShape::Json,
            }),
            TypeDescriptor::Primitive(kind) => Ok(ResolvedType::native(Self::resolve_primitive(*kind))),
            TypeDescriptor::Collection { kind, elements } => {
                self.resolve_collection(*kind, elements, udts)
            }
            TypeDescriptor::Nested(schema) => self.resolve_udt(schema, udts),
            TypeDescriptor::Reference(target) => {
                let reference = self.resolve_reference(target)?;
                Ok(ResolvedType {
                    physical: reference.physical(),
                    shape: ValueShape::Reference(reference),
                })
            }
        }
    }

    /// List/Set take one element type, Map takes a text-like key and a value
    pub fn resolve_collection(
        &self,
        kind: CollectionKind,
        elements: &[TypeDescriptor],
        udts: &mut UdtCollector,
    ) -> SchemaResult<ResolvedType> {
        match kind {
            CollectionKind::List | CollectionKind::Set => {
                let [element] = elements else {
                    return Err(SchemaError::definition(format!(
                        "{} requires exactly one element type, found {}",
                        kind.name(),
                        elements.len()
                    )));
                };
                let element = self.resolve_element(element, udts, false)?;
                Ok(if kind == CollectionKind::List {
                    ResolvedType {
                        physical: PhysicalType::List(Box::new(element.physical)),
                        shape: ValueShape::List(Box::new(element.shape)),
                    }
                } else {
                    ResolvedType {
                        physical: PhysicalType::Set(Box::new(element.physical)),
                        shape: ValueShape::Set {
                            element: Box::new(element.shape),
                            array: false,
                        },
                    }
                })
            }
            CollectionKind::Map => {
                let [key, value] = elements else {
                    return Err(SchemaError::invalid_map_arity(elements.len()));
                };
                let key = match key {
                    TypeDescriptor::Primitive(kind) if *kind != PrimitiveKind::Json => {
                        Self::resolve_primitive(*kind)
                    }
                    other => return Err(SchemaError::invalid_key_type(describe(other))),
                };
                if !key.is_text_like() {
                    return Err(SchemaError::invalid_key_type(key));
                }
                let value = self.resolve_element(value, udts, true)?;
                Ok(ResolvedType {
                    physical: PhysicalType::Map(
                        Box::new(PhysicalType::Native(key)),
                        Box::new(value.physical),
                    ),
                    shape: ValueShape::Map(Box::new(value.shape)),
                })
            }
        }
    }

    fn resolve_element(
        &self,
        element: &TypeDescriptor,
        udts: &mut UdtCollector,
        map_value: bool,
    ) -> SchemaResult<ResolvedType> {
        match element {
            TypeDescriptor::Collection {
                kind: CollectionKind::List,
                elements,
            } if map_value && matches!(elements.as_slice(), [TypeDescriptor::Reference(_)]) => {
                // One key fanning out to many foreign keys
                let reference = self.resolve(&elements[0], udts)?;
                Ok(ResolvedType {
                    physical: PhysicalType::frozen(PhysicalType::List(Box::new(reference.physical))),
                    shape: ValueShape::List(Box::new(reference.shape)),
                })
            }
            TypeDescriptor::Collection { kind, .. } => Err(SchemaError::definition(format!(
                "nested {} collections are not supported",
                kind.name()
            ))),
            other => self.resolve(other, udts),
        }
    }

    /// Looks up the target's compiled key shape
    pub fn resolve_reference(&self, target: &str) -> SchemaResult<Arc<ReferenceDescriptor>> {
        if self.entity == Some(target) {
            return Err(SchemaError::dangling_reference(target));
        }
        let plan = self.registry.require(target)?;
        let key = plan.key_shape()?;
        Ok(Arc::new(ReferenceDescriptor {
            target: target.to_string(),
            key,
        }))
    }

    /// Resolves a nested schema to a frozen composite type, collecting its
    /// definition (and those of composite types it contains)
    pub fn resolve_udt(&self, schema: &SchemaDescriptor, udts: &mut UdtCollector) -> SchemaResult<ResolvedType> {
        let name = schema
            .type_name()
            .ok_or_else(|| SchemaError::name_required("Composite type"))?
            .to_string();

        let mut fields = Vec::with_capacity(schema.nodes.len());
        let mut shapes = Vec::with_capacity(schema.nodes.len());
        let mut assembler = ValidationAssembler::new();

        for node in &schema.nodes {
            let field = match node {
                SchemaNode::Field(field) => field,
                SchemaNode::Group { name: group, .. } => {
                    return Err(SchemaError::definition(format!(
                        "composite type '{}' cannot contain group '{}'",
                        name, group
                    ))
                    .with_entity(&name))
                }
            };
            check_udt_field(&name, field)?;

            let ty = field.ty.as_ref().ok_or_else(|| {
                SchemaError::field_definition(&field.name, "composite type fields need a type")
            })?;
            let resolved = self
                .resolve(ty, udts)
                .map_err(|e| if e.field().is_none() { e.with_field(&field.name) } else { e })?;

            assembler.add_field(&field.name, field, &resolved.shape)?;
            fields.push(UdtField::new(&field.name, resolved.physical.to_string()));
            shapes.push((field.name.clone(), resolved.shape));
        }

        if fields.is_empty() {
            return Err(SchemaError::definition(format!("composite type '{}' has no fields", name)));
        }

        let (validator, _, _) = assembler.finish();
        let shape = udts.add(
            UdtDefinition {
                name: name.clone(),
                fields,
            },
            UdtShape {
                name: name.clone(),
                fields: shapes,
                validator,
            },
        )?;

        Ok(ResolvedType {
            physical: PhysicalType::frozen(PhysicalType::Udt(name)),
            shape: ValueShape::Udt(shape),
        })
    }

    /// Composite types a nested schema needs, inner types first and the
    /// schema's own type last
    pub fn derive_udts(&self, schema: &SchemaDescriptor) -> SchemaResult<Vec<UdtDefinition>> {
        let mut udts = UdtCollector::new();
        self.resolve_udt(schema, &mut udts)?;
        Ok(udts.into_definitions())
    }
}

/// Composite type fields carry a type and constraints only
fn check_udt_field(udt: &str, field: &FieldSpec) -> SchemaResult<()> {
    let flags = &field.flags;
    let unsupported = if flags.partition_key || flags.clustering_key {
        Some("key flags")
    } else if flags.secondary_index.is_some() || flags.unique.is_some() {
        Some("index flags")
    } else if flags.is_virtual || !field.hooks.is_empty() {
        Some("accessors")
    } else if field.default.is_some() {
        Some("defaults")
    } else if !field.transforms.is_empty() {
        Some("transformations")
    } else {
        None
    };

    match unsupported {
        Some(what) => Err(SchemaError::field_definition(
            &field.name,
            format!("{} are not supported inside composite type '{}'", what, udt),
        )
        .with_entity(udt)),
        None => Ok(()),
    }
}

fn describe(ty: &TypeDescriptor) -> String {
    match ty {
        TypeDescriptor::Primitive(kind) => kind.name().to_string(),
        TypeDescriptor::Collection { kind, .. } => kind.name().to_string(),
        TypeDescriptor::Nested(schema) => schema.type_name().unwrap_or("nested schema").to_string(),
        TypeDescriptor::Reference(target) => format!("ref {}", target),
    }
}
