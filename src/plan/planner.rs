//! Column planning
//!
//! Depth-first traversal of a schema producing the ordered physical columns,
//! key layout, index layout and composite type dependencies of one entity.
//!
//! - A leaf's column name is its dot path (`info.subinfo.name`)
//! - Groups, and fields typed with a nested schema outside a collection,
//!   are flattened and get a group accessor
//! - Nested schemas inside collections become one frozen composite column
//! - `options.key`, `options.indexes` and `options.unique`, when present,
//!   replace the per-field flags entirely
//!
//! Planning is pure; nothing is created or registered here.

use super::accessor::{Accessor, AccessorTable};
use super::resolver::{TypeResolver, UdtCollector};
use super::types::{ColumnSpec, IndexSpec, KeyRole, PrimaryKey, StoragePlan, ValueShape};
use crate::schema::validator::ValidationAssembler;
use crate::schema::{
    DefaultValue, FieldSpec, IndexDeclaration, IndexFlag, SchemaDescriptor, SchemaError, SchemaNode,
    SchemaRegistry, SchemaResult, TypeDescriptor,
};

/// Flattens schemas into storage plans
pub struct ColumnPlanner<'a> {
    registry: &'a SchemaRegistry,
    /// Read representation of Set fields without an explicit `array` flag
    sets_as_arrays: bool,
}

/// Everything collected during the traversal
#[derive(Default)]
struct Collected {
    columns: Vec<ColumnSpec>,
    partition: Vec<String>,
    clustering: Vec<String>,
    indexed: Vec<(String, IndexFlag)>,
    unique: Vec<(String, IndexFlag)>,
    defaults: Vec<(String, DefaultValue)>,
    accessors: AccessorTable,
    assembler: ValidationAssembler,
    udts: UdtCollector,
}

impl<'a> ColumnPlanner<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            sets_as_arrays: false,
        }
    }

    pub fn with_sets_as_arrays(mut self, arrays: bool) -> Self {
        self.sets_as_arrays = arrays;
        self
    }

    /// Compiles one entity schema into a storage plan.
    ///
    /// # Errors
    ///
    /// Any FATAL schema error; no partial plan is returned.
    pub fn plan(&self, schema: &SchemaDescriptor) -> SchemaResult<StoragePlan> {
        let entity = match schema.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(SchemaError::name_required("Entity schema")),
        };

        self.plan_entity(entity, schema)
            .map_err(|e| if e.entity().is_none() { e.with_entity(entity) } else { e })
    }

    fn plan_entity(&self, entity: &str, schema: &SchemaDescriptor) -> SchemaResult<StoragePlan> {
        let resolver = TypeResolver::new(self.registry).for_entity(entity);
        let mut collected = Collected::default();
        self.walk(&resolver, &schema.nodes, "", &mut collected)?;

        if collected.columns.is_empty() {
            return Err(SchemaError::definition(format!("schema '{}' has no columns", entity)));
        }

        let key = derive_key(schema, &collected)?;
        for (position, name) in key.partition.iter().enumerate() {
            set_role(&mut collected.columns, name, KeyRole::Partition(position));
        }
        for (position, name) in key.clustering.iter().enumerate() {
            set_role(&mut collected.columns, name, KeyRole::Clustering(position));
        }

        let indexes = derive_indexes(
            entity,
            &collected.columns,
            schema.options.indexes.as_deref(),
            &collected.indexed,
            "idx",
        )?;
        let unique_indexes = derive_indexes(
            entity,
            &collected.columns,
            schema.options.unique.as_deref(),
            &collected.unique,
            "uniq",
        )?;
        for index in indexes.iter().chain(unique_indexes.iter()) {
            for column in &index.columns {
                if let Some(spec) = collected.columns.iter_mut().find(|c| &c.name == column) {
                    spec.indexes.push(index.name.clone());
                }
            }
        }

        let (validator, before_save, before_update) = collected.assembler.finish();

        Ok(StoragePlan {
            entity: entity.to_string(),
            columns: collected.columns,
            key,
            indexes,
            unique_indexes,
            udts: collected.udts.into_definitions(),
            validator,
            before_save,
            before_update,
            accessors: collected.accessors,
            defaults: collected.defaults,
        })
    }

    fn walk(
        &self,
        resolver: &TypeResolver<'_>,
        nodes: &[SchemaNode],
        prefix: &str,
        collected: &mut Collected,
    ) -> SchemaResult<()> {
        for node in nodes {
            let path = join_path(prefix, node.name());
            if collected.columns.iter().any(|c| c.name == path) || collected.accessors.get(&path).is_some() {
                return Err(SchemaError::field_definition(&path, "declared more than once"));
            }

            match node {
                SchemaNode::Group { children, .. } => {
                    if children.is_empty() {
                        return Err(SchemaError::field_definition(&path, "group has no fields"));
                    }
                    collected.accessors.add(&path, Accessor::Group);
                    self.walk(resolver, children, &path, collected)?;
                }
                SchemaNode::Field(field) => self.plan_field(resolver, field, &path, collected)?,
            }
        }
        Ok(())
    }

    fn plan_field(
        &self,
        resolver: &TypeResolver<'_>,
        field: &FieldSpec,
        path: &str,
        collected: &mut Collected,
    ) -> SchemaResult<()> {
        let flags = &field.flags;

        if flags.is_virtual {
            if has_storage_flags(field) || field.default.is_some() {
                return Err(SchemaError::field_definition(
                    path,
                    "virtual fields cannot carry key, index or default settings",
                ));
            }
            if field.hooks.get.is_none() {
                return Err(SchemaError::field_definition(path, "virtual field requires a getter"));
            }
            collected.accessors.add(
                path,
                Accessor::Virtual {
                    get: field.hooks.get.clone(),
                    set: field.hooks.set.clone(),
                },
            );
            return Ok(());
        }

        let ty = field
            .ty
            .as_ref()
            .ok_or_else(|| SchemaError::field_definition(path, "field has no type"))?;

        if let TypeDescriptor::Nested(nested) = ty {
            if has_storage_flags(field) || !field.constraints.is_empty() || field.default.is_some() {
                return Err(SchemaError::field_definition(
                    path,
                    "flattened nested schemas cannot carry flags, constraints or defaults",
                ));
            }
            collected.accessors.add(path, Accessor::Group);
            return self.walk(resolver, &nested.nodes, path, collected);
        }

        let resolved = resolver
            .resolve(ty, &mut collected.udts)
            .map_err(|e| if e.field().is_none() { e.with_field(path) } else { e })?;

        let shape = match (&resolved.shape, flags.array) {
            (ValueShape::Set { .. }, array) => resolved
                .shape
                .clone()
                .with_set_representation(array.unwrap_or(self.sets_as_arrays)),
            (_, Some(_)) => {
                return Err(SchemaError::field_definition(path, "'array' applies only to Set fields"))
            }
            (_, None) => resolved.shape.clone(),
        };

        collected.assembler.add_field(path, field, &shape)?;

        if let Some(default) = &field.default {
            collected.defaults.push((path.to_string(), default.clone()));
        }
        if !field.hooks.is_empty() {
            collected.accessors.add(
                path,
                Accessor::Layered {
                    get: field.hooks.get.clone(),
                    set: field.hooks.set.clone(),
                },
            );
        }

        if flags.partition_key && flags.clustering_key {
            return Err(SchemaError::key_definition(format!(
                "field '{}' cannot be both partition and clustering key",
                path
            )));
        }
        if flags.partition_key {
            collected.partition.push(path.to_string());
        }
        if flags.clustering_key {
            collected.clustering.push(path.to_string());
        }
        if let Some(flag) = &flags.secondary_index {
            collected.indexed.push((path.to_string(), flag.clone()));
        }
        if let Some(flag) = &flags.unique {
            collected.unique.push((path.to_string(), flag.clone()));
        }

        collected.columns.push(ColumnSpec {
            name: path.to_string(),
            physical: resolved.physical,
            shape,
            role: KeyRole::Regular,
            indexes: Vec::new(),
        });
        Ok(())
    }
}

fn has_storage_flags(field: &FieldSpec) -> bool {
    let flags = &field.flags;
    flags.partition_key
        || flags.clustering_key
        || flags.secondary_index.is_some()
        || flags.unique.is_some()
        || flags.array.is_some()
}

/// Explicit `options.key` verbatim, else the scattered flags in declaration
/// order
fn derive_key(schema: &SchemaDescriptor, collected: &Collected) -> SchemaResult<PrimaryKey> {
    let (partition, clustering) = match &schema.options.key {
        Some(layout) => (layout.partition.clone(), layout.clustering.clone()),
        None => (collected.partition.clone(), collected.clustering.clone()),
    };

    if partition.is_empty() {
        return Err(SchemaError::key_definition(if clustering.is_empty() {
            "schema declares no partition key".to_string()
        } else {
            "a clustering key requires at least one partition key field".to_string()
        }));
    }

    let mut seen: Vec<&String> = Vec::new();
    for name in partition.iter().chain(clustering.iter()) {
        if seen.contains(&name) {
            return Err(SchemaError::key_definition(format!(
                "column '{}' appears twice in the primary key",
                name
            )));
        }
        seen.push(name);

        let column = collected
            .columns
            .iter()
            .find(|c| &c.name == name)
            .ok_or_else(|| {
                SchemaError::key_definition(format!("key column '{}' does not exist", name))
            })?;
        if column.physical.is_unfrozen_collection() {
            return Err(SchemaError::key_definition(format!(
                "key column '{}' has non-frozen collection type {}",
                name, column.physical
            )));
        }
    }

    for (name, _) in &schema.options.clustering_order {
        if !clustering.contains(name) {
            return Err(SchemaError::key_definition(format!(
                "clustering order names '{}', which is not a clustering column",
                name
            )));
        }
    }

    Ok(PrimaryKey {
        partition,
        clustering,
        clustering_order: schema.options.clustering_order.clone(),
    })
}

fn derive_indexes(
    entity: &str,
    columns: &[ColumnSpec],
    explicit: Option<&[IndexDeclaration]>,
    flagged: &[(String, IndexFlag)],
    suffix: &str,
) -> SchemaResult<Vec<IndexSpec>> {
    let declarations: Vec<IndexDeclaration> = match explicit {
        Some(declarations) => declarations.to_vec(),
        None => flagged
            .iter()
            .map(|(path, flag)| match flag {
                IndexFlag::Simple => IndexDeclaration::on(&[path.as_str()]),
                IndexFlag::Annotated {
                    include,
                    clustering_order,
                } => IndexDeclaration {
                    columns: vec![path.clone()],
                    include: include.clone(),
                    clustering_order: clustering_order.clone(),
                },
            })
            .collect(),
    };

    let mut indexes: Vec<IndexSpec> = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        if declaration.columns.is_empty() {
            return Err(SchemaError::definition("index declares no columns"));
        }
        let referenced = declaration
            .columns
            .iter()
            .chain(declaration.include.iter())
            .chain(declaration.clustering_order.iter().map(|(c, _)| c));
        for name in referenced {
            if !columns.iter().any(|c| &c.name == name) {
                return Err(SchemaError::definition(format!(
                    "index references unknown column '{}'",
                    name
                )));
            }
        }

        let name = format!(
            "{}_{}_{}",
            entity,
            declaration
                .columns
                .iter()
                .map(|c| c.replace('.', "_"))
                .collect::<Vec<_>>()
                .join("_"),
            suffix
        );
        if indexes.iter().any(|i| i.name == name) {
            continue;
        }
        indexes.push(IndexSpec {
            name,
            columns: declaration.columns,
            include: declaration.include,
            clustering_order: declaration.clustering_order,
        });
    }
    Ok(indexes)
}

fn set_role(columns: &mut [ColumnSpec], name: &str, role: KeyRole) {
    if let Some(column) = columns.iter_mut().find(|c| c.name == name) {
        column.role = role;
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
