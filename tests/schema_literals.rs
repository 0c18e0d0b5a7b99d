//! Schema literal tests
//!
//! Schemas written as JSON documents, loaded from disk and compiled:
//! 1. Literal decoding produces the same plan as the builder API
//! 2. A schema directory compiles in reference order
//! 3. Literal constraints and transforms drive the save pipeline

use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use widerow::compiler::Compiler;
use widerow::config::CompilerConfig;
use widerow::engine::{ddl, EngineCall, MemoryEngine};
use widerow::plan::IndexKind;
use widerow::schema::{record_from_json, SchemaDescriptor, SchemaErrorCode, SchemaLoader, Value};

fn compiler(engine: &Arc<MemoryEngine>) -> Compiler {
    Compiler::new(engine.clone(), CompilerConfig::default().with_keyspace("lit"))
}

fn literal(json: serde_json::Value) -> SchemaDescriptor {
    SchemaDescriptor::from_json(&json).unwrap()
}

// =============================================================================
// LITERAL PLANS
// =============================================================================

/// Scalar-only literal: partition key from the flag, physical types in
/// declaration order, no indexes.
#[tokio::test]
async fn test_scalar_literal_plan() {
    let engine = Arc::new(MemoryEngine::new("lit"));
    let schema = literal(json!({"name": "sample", "fields": {
        "string": {"type": "String", "primary_key": true},
        "number": {"type": "Number"},
        "bool": {"type": "Boolean"}
    }}));

    let plan = compiler(&engine).compile(&schema).await.unwrap();

    assert_eq!(plan.partition_key(), ["string".to_string()]);
    assert!(plan.clustering_key().is_empty());
    assert!(plan.indexes.is_empty());
    assert_eq!(
        engine.statements(),
        vec!["CREATE TABLE IF NOT EXISTS lit.sample (string text, number float, bool boolean, \
              PRIMARY KEY (string))"
            .to_string()]
    );
}

/// An index descriptor on a field yields one annotated index with its
/// include list.
#[tokio::test]
async fn test_literal_include_index() {
    let engine = Arc::new(MemoryEngine::new("lit"));
    let schema = literal(json!({"name": "sample", "fields": {
        "string": {"type": "String", "primary_key": true},
        "number": {"type": "Number", "secondary_index": {"include": ["bool"]}},
        "bool": {"type": "Boolean"}
    }}));

    let plan = compiler(&engine).compile(&schema).await.unwrap();

    assert_eq!(plan.indexes.len(), 1);
    assert_eq!(plan.indexes[0].kind(), IndexKind::Annotated);
    assert_eq!(plan.indexes[0].include, vec!["bool".to_string()]);
    assert_eq!(
        engine.statements().last().unwrap(),
        "CREATE INDEX IF NOT EXISTS sample_number_idx ON lit.sample (number) INCLUDE (bool)"
    );
}

/// Explicit key and index options replace the per-field flags.
#[tokio::test]
async fn test_literal_options() {
    let engine = Arc::new(MemoryEngine::new("lit"));
    let schema = literal(json!({"name": "reading", "fields": {
        "sensor": {"type": "String"},
        "day": {"type": "LocalDate"},
        "ts": {"type": "Date"},
        "value": {"type": "Double", "secondary_index": true}
    }, "options": {
        "key": [["sensor", "day"], "ts"],
        "clustering_order": {"ts": "desc"},
        "indexes": [["sensor", "value"]]
    }}));

    let plan = compiler(&engine).compile(&schema).await.unwrap();

    assert_eq!(plan.partition_key(), ["sensor".to_string(), "day".to_string()]);
    assert_eq!(plan.clustering_key(), ["ts".to_string()]);
    assert_eq!(plan.indexes.len(), 1);
    assert_eq!(plan.indexes[0].kind(), IndexKind::Compound);
    assert_eq!(
        plan.column("value").unwrap().indexes,
        vec!["reading_sensor_value_idx".to_string()]
    );
    assert!(plan.indexes.iter().all(|index| index.name != "reading_value_idx"));

    let table = &ddl::render_plan("lit", &plan)[0];
    assert!(table.ends_with("PRIMARY KEY ((sensor, day), ts)) WITH CLUSTERING ORDER BY (ts DESC)"));
}

/// A nested schema inside a list becomes a composite type named after the
/// nested schema.
#[tokio::test]
async fn test_literal_nested_list_creates_udt() {
    let engine = Arc::new(MemoryEngine::new("lit"));
    let schema = literal(json!({"name": "store", "fields": {
        "id": {"type": "Uuid", "primary_key": true},
        "branches": {"type": "List", "of": {"name": "branch", "fields": {
            "city": {"type": "String"},
            "staff": {"type": "Int"}
        }}}
    }}));

    let plan = compiler(&engine).compile(&schema).await.unwrap();

    assert_eq!(plan.column("branches").unwrap().physical.to_string(), "list<frozen<branch>>");
    assert_eq!(engine.calls()[1], EngineCall::CreateType("branch".into()));
    assert_eq!(
        engine.statements()[0],
        "CREATE TYPE IF NOT EXISTS lit.branch (city text, staff int)"
    );
}

/// A nested schema without a name cannot become a composite type.
#[tokio::test]
async fn test_literal_anonymous_udt_rejected() {
    let engine = Arc::new(MemoryEngine::new("lit"));
    let schema = literal(json!({"name": "store", "fields": {
        "id": {"type": "Uuid", "primary_key": true},
        "branches": {"type": "List", "of": {"fields": {"city": {"type": "String"}}}}
    }}));

    let err = compiler(&engine).compile(&schema).await.unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::NameRequired);
    assert!(engine.calls().is_empty());
}

// =============================================================================
// SCHEMA DIRECTORY
// =============================================================================

/// Files load in name order but compile in reference order.
#[tokio::test]
async fn test_schema_dir_compiles_targets_first() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("a_comment.json"),
        json!({"name": "comment", "fields": {
            "id": {"type": "TimeUuid", "primary_key": true},
            "post": {"type": {"ref": "post"}}
        }})
        .to_string(),
    )
    .unwrap();
    fs::write(
        temp.path().join("b_post.json"),
        json!({"name": "post", "fields": {
            "id": {"type": "Uuid", "primary_key": true},
            "author": {"type": {"ref": "writer"}}
        }})
        .to_string(),
    )
    .unwrap();
    fs::write(
        temp.path().join("c_writer.json"),
        json!({"name": "writer", "fields": {"handle": {"type": "String", "primary_key": true}}})
            .to_string(),
    )
    .unwrap();

    let schemas = SchemaLoader::load_dir(temp.path()).unwrap();
    let engine = Arc::new(MemoryEngine::new("lit"));
    let plans = compiler(&engine).compile_all(&schemas).await.unwrap();

    let names: Vec<&str> = plans.iter().map(|p| p.entity.as_str()).collect();
    assert_eq!(names, vec!["writer", "post", "comment"]);
    assert_eq!(plans[2].column("post").unwrap().physical.to_string(), "uuid");
    assert_eq!(engine.tables(), vec!["writer", "post", "comment"]);
}

/// A literal that fails to decode names its file.
#[test]
fn test_bad_literal_names_file() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("broken.json"),
        json!({"name": "broken", "fields": {"x": {"type": "Whatever"}}}).to_string(),
    )
    .unwrap();

    let err = SchemaLoader::load_dir(temp.path()).unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::Decode);
    assert!(err.message().contains("broken.json"));
}

// =============================================================================
// LITERAL PIPELINES
// =============================================================================

/// Transforms, defaults and constraints declared in a literal run on save.
#[tokio::test]
async fn test_literal_save_pipeline() {
    let engine = Arc::new(MemoryEngine::new("lit"));
    let compiler = compiler(&engine);
    compiler
        .compile(&literal(json!({"name": "subscriber", "fields": {
            "email": {"type": "String", "primary_key": true, "trim": true, "lowercase": true},
            "plan": {"type": "String", "default": "free", "enum": ["free", "pro"]},
            "seats": {"type": "Int", "min": 1}
        }})))
        .await
        .unwrap();
    let marshaller = compiler.marshaller("subscriber").unwrap();

    let row = marshaller
        .prepare_save(&record_from_json(&json!({"email": "  Ada@Example.COM ", "seats": 3})))
        .unwrap();
    assert_eq!(row.get("email"), Some(&Value::from("ada@example.com")));
    assert_eq!(row.get("plan"), Some(&Value::from("free")));

    let err = marshaller
        .prepare_save(&record_from_json(&json!({"email": "x@y.z", "plan": "gold"})))
        .unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::Validation);
    assert_eq!(err.field(), Some("plan"));

    let err = marshaller
        .prepare_save(&record_from_json(&json!({"email": "x@y.z", "seats": 0})))
        .unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::Validation);
    assert_eq!(err.field(), Some("seats"));
}
