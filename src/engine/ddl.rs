//! DDL rendering
//!
//! Renders the CQL statements a plan needs. All statements are idempotent
//! (`IF NOT EXISTS`). Identifiers outside `[a-z_][a-z0-9_]*` are double
//! quoted, which covers dot-path column names like `"info.subinfo.name"`.

use crate::plan::{ColumnSpec, IndexSpec, PhysicalType, PrimaryKey, StoragePlan, UdtDefinition, UdtField};

/// Quotes an identifier when it is not a plain lowercase name
pub fn quote_ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn qualified(keyspace: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(keyspace), quote_ident(name))
}

fn column_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

pub fn create_type(keyspace: &str, name: &str, fields: &[UdtField]) -> String {
    let body = fields
        .iter()
        .map(|f| format!("{} {}", quote_ident(&f.name), f.type_name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TYPE IF NOT EXISTS {} ({})", qualified(keyspace, name), body)
}

pub fn create_table(keyspace: &str, table: &str, columns: &[ColumnSpec], key: &PrimaryKey) -> String {
    let mut parts: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.physical))
        .collect();

    let partition = if key.partition.len() == 1 {
        quote_ident(&key.partition[0])
    } else {
        format!("({})", column_list(&key.partition))
    };
    let primary = if key.clustering.is_empty() {
        partition
    } else {
        format!("{}, {}", partition, column_list(&key.clustering))
    };
    parts.push(format!("PRIMARY KEY ({})", primary));

    let mut statement = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(keyspace, table),
        parts.join(", ")
    );
    if !key.clustering_order.is_empty() {
        statement.push_str(&format!(
            " WITH CLUSTERING ORDER BY ({})",
            clustering_order(&key.clustering_order)
        ));
    }
    statement
}

fn clustering_order(order: &[(String, crate::schema::SortOrder)]) -> String {
    order
        .iter()
        .map(|(c, o)| format!("{} {}", quote_ident(c), o.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Index target: collections index their values or entries, frozen
/// collections index the whole value
fn index_target(column: &str, columns: &[ColumnSpec]) -> String {
    let ident = quote_ident(column);
    match columns.iter().find(|c| c.name == column).map(|c| &c.physical) {
        Some(PhysicalType::List(_)) | Some(PhysicalType::Set(_)) => format!("VALUES({})", ident),
        Some(PhysicalType::Map(_, _)) => format!("ENTRIES({})", ident),
        Some(PhysicalType::Frozen(_)) => format!("FULL({})", ident),
        _ => ident,
    }
}

fn render_index(keyword: &str, keyspace: &str, table: &str, index: &IndexSpec, columns: &[ColumnSpec]) -> String {
    let targets = index
        .columns
        .iter()
        .map(|c| index_target(c, columns))
        .collect::<Vec<_>>()
        .join(", ");
    let mut statement = format!(
        "CREATE {} IF NOT EXISTS {} ON {} ({})",
        keyword,
        quote_ident(&index.name),
        qualified(keyspace, table),
        targets
    );
    if !index.include.is_empty() {
        statement.push_str(&format!(" INCLUDE ({})", column_list(&index.include)));
    }
    if !index.clustering_order.is_empty() {
        statement.push_str(&format!(
            " WITH CLUSTERING ORDER BY ({})",
            clustering_order(&index.clustering_order)
        ));
    }
    statement
}

pub fn create_index(keyspace: &str, table: &str, index: &IndexSpec, columns: &[ColumnSpec]) -> String {
    render_index("INDEX", keyspace, table, index, columns)
}

pub fn create_unique_index(keyspace: &str, table: &str, index: &IndexSpec, columns: &[ColumnSpec]) -> String {
    render_index("UNIQUE INDEX", keyspace, table, index, columns)
}

/// Every statement a plan needs, in execution order: composite types,
/// table, secondary indexes, unique indexes
pub fn render_plan(keyspace: &str, plan: &StoragePlan) -> Vec<String> {
    let mut statements: Vec<String> = plan
        .udts
        .iter()
        .map(|UdtDefinition { name, fields }| create_type(keyspace, name, fields))
        .collect();
    statements.push(create_table(keyspace, &plan.entity, &plan.columns, &plan.key));
    for index in &plan.indexes {
        statements.push(create_index(keyspace, &plan.entity, index, &plan.columns));
    }
    for index in &plan.unique_indexes {
        statements.push(create_unique_index(keyspace, &plan.entity, index, &plan.columns));
    }
    statements
}
