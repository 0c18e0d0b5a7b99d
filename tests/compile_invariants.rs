//! Compilation invariant tests
//!
//! Covers the compile path end to end against the in-memory engine:
//! 1. Composite types are created once and never altered
//! 2. Failed compilations register nothing
//! 3. Concurrent compiles of one entity publish exactly one plan
//! 4. Table and index DDL follows the plan
//! 5. Recompiling a name with another definition is refused

use std::sync::Arc;
use std::time::Duration;

use widerow::compiler::Compiler;
use widerow::config::{CompilerConfig, SetRepresentation};
use widerow::engine::{EngineCall, EngineError, EngineOp, MemoryEngine};
use widerow::plan::UdtField;
use widerow::schema::{
    record_from_json, Constraint, FieldSpec, IndexDeclaration, IndexFlag, PrimitiveKind,
    SchemaDescriptor, SchemaErrorCode, SchemaOptions, SchemaRegistry, SortOrder, TypeDescriptor,
};

fn ty(kind: PrimitiveKind) -> TypeDescriptor {
    TypeDescriptor::primitive(kind)
}

fn address() -> SchemaDescriptor {
    SchemaDescriptor::new("address")
        .field(FieldSpec::new("street", ty(PrimitiveKind::String)))
        .field(FieldSpec::new("zip", ty(PrimitiveKind::Int)))
}

fn customer() -> SchemaDescriptor {
    SchemaDescriptor::new("customer")
        .field(FieldSpec::new("id", ty(PrimitiveKind::Uuid)).partition_key())
        .field(FieldSpec::new("email", ty(PrimitiveKind::String)).unique())
        .field(FieldSpec::new("city", ty(PrimitiveKind::String)).secondary_index(IndexFlag::Simple))
        .field(FieldSpec::new("addresses", TypeDescriptor::list(TypeDescriptor::nested(address()))))
}

fn compiler(engine: &Arc<MemoryEngine>) -> Compiler {
    Compiler::new(engine.clone(), CompilerConfig::default().with_keyspace("shop"))
}

// =============================================================================
// COMPOSITE TYPES
// =============================================================================

/// Compiling the same schema twice issues exactly one composite type create
/// and returns the same plan.
#[tokio::test]
async fn test_udt_created_once_across_compiles() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = compiler(&engine);

    let first = compiler.compile(&customer()).await.unwrap();
    let second = compiler.compile(&customer()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.type_creates(), 1);
    assert_eq!(first.udts.len(), 1);
    assert_eq!(first.udts[0].name, "address");
    assert_eq!(
        first.column("addresses").unwrap().physical.to_string(),
        "list<frozen<address>>"
    );
}

/// Two entities embedding the same composite type share one create.
#[tokio::test]
async fn test_udt_shared_between_entities() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = compiler(&engine);

    compiler.compile(&customer()).await.unwrap();
    let warehouse = SchemaDescriptor::new("warehouse")
        .field(FieldSpec::new("code", ty(PrimitiveKind::String)).partition_key())
        .field(FieldSpec::new("docks", TypeDescriptor::list(TypeDescriptor::nested(address()))));
    compiler.compile(&warehouse).await.unwrap();

    assert_eq!(engine.type_creates(), 1);
    assert_eq!(compiler.udts().names().await, vec!["address".to_string()]);
}

/// A type already present in the engine with other fields is a hard
/// conflict; nothing is altered and nothing registered.
#[tokio::test]
async fn test_drifted_udt_is_conflict() {
    let engine = Arc::new(
        MemoryEngine::new("shop").with_type("address", vec![UdtField::new("street", "text")]),
    );
    let compiler = compiler(&engine);

    let err = compiler.compile(&customer()).await.unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::UdtConflict);
    assert!(err.is_fatal());
    assert_eq!(engine.type_creates(), 0);
    assert!(engine.tables().is_empty());
    assert!(!compiler.registry().contains("customer"));
    assert_eq!(
        engine.composite_type("address"),
        Some(vec![UdtField::new("street", "text")])
    );
}

/// A type already present with identical fields is verified, not recreated.
#[tokio::test]
async fn test_identical_udt_is_verified() {
    let engine = Arc::new(MemoryEngine::new("shop").with_type(
        "address",
        vec![UdtField::new("street", "text"), UdtField::new("zip", "int")],
    ));
    let compiler = compiler(&engine);

    compiler.compile(&customer()).await.unwrap();
    assert_eq!(engine.type_creates(), 0);
    assert!(engine.calls().contains(&EngineCall::DescribeType("address".into())));
}

/// A composite type inside a composite type is created first.
#[tokio::test]
async fn test_inner_udt_created_first() {
    let geo = SchemaDescriptor::new("geo")
        .field(FieldSpec::new("lat", ty(PrimitiveKind::Double)))
        .field(FieldSpec::new("lon", ty(PrimitiveKind::Double)));
    let site = SchemaDescriptor::new("site")
        .field(FieldSpec::new("label", ty(PrimitiveKind::String)))
        .field(FieldSpec::new("location", TypeDescriptor::nested(geo)));
    let schema = SchemaDescriptor::new("survey")
        .field(FieldSpec::new("id", ty(PrimitiveKind::Uuid)).partition_key())
        .field(FieldSpec::new("sites", TypeDescriptor::list(TypeDescriptor::nested(site))));

    let engine = Arc::new(MemoryEngine::new("shop"));
    let plan = compiler(&engine).compile(&schema).await.unwrap();

    let creates: Vec<EngineCall> = engine
        .calls()
        .into_iter()
        .filter(|c| matches!(c, EngineCall::CreateType(_)))
        .collect();
    assert_eq!(
        creates,
        vec![EngineCall::CreateType("geo".into()), EngineCall::CreateType("site".into())]
    );
    assert_eq!(
        engine.composite_type("site"),
        Some(vec![UdtField::new("label", "text"), UdtField::new("location", "frozen<geo>")])
    );
    assert_eq!(plan.udts.len(), 2);
}

// =============================================================================
// ALL-OR-NOTHING REGISTRATION
// =============================================================================

/// A reference to an unregistered entity fails before any engine call.
#[tokio::test]
async fn test_dangling_reference_touches_nothing() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = compiler(&engine);
    let order = SchemaDescriptor::new("order")
        .field(FieldSpec::new("id", ty(PrimitiveKind::Uuid)).partition_key())
        .field(FieldSpec::new("buyer", TypeDescriptor::reference("customer")));

    let err = compiler.compile(&order).await.unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::DanglingReference);
    assert!(engine.calls().is_empty());
    assert!(compiler.registry().is_empty());
}

/// Table DDL failure propagates the engine error unchanged and registers
/// nothing.
#[tokio::test]
async fn test_engine_failure_registers_nothing() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    engine.fail_on(EngineOp::CreateTable, EngineError::Timeout("create table".into()));
    let compiler = compiler(&engine);

    let err = compiler.compile(&customer()).await.unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::StorageEngine);
    assert_eq!(
        err.engine_error(),
        Some(&EngineError::Timeout("create table".into()))
    );
    assert!(!compiler.registry().contains("customer"));
}

/// Re-registering a name with another layout is refused before any DDL.
#[tokio::test]
async fn test_changed_layout_is_duplicate_entity() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = compiler(&engine);
    compiler.compile(&customer()).await.unwrap();
    let calls_before = engine.calls().len();

    let changed = customer().field(FieldSpec::new("phone", ty(PrimitiveKind::String)));
    let err = compiler.compile(&changed).await.unwrap_err();

    assert_eq!(err.code(), SchemaErrorCode::DuplicateEntity);
    assert_eq!(engine.calls().len(), calls_before);
    assert!(compiler.registry().get("customer").unwrap().column("phone").is_none());
}

// =============================================================================
// RECOMPILATION
// =============================================================================

fn user(max_name: usize, order: SortOrder) -> SchemaDescriptor {
    SchemaDescriptor::new("user")
        .field(FieldSpec::new("id", ty(PrimitiveKind::String)).partition_key())
        .field(
            FieldSpec::new("name", ty(PrimitiveKind::String))
                .constraint(Constraint::MaxLength(max_name)),
        )
        .options(SchemaOptions {
            indexes: Some(vec![IndexDeclaration {
                columns: vec!["name".into()],
                include: vec![],
                clustering_order: vec![("id".into(), order)],
            }]),
            ..Default::default()
        })
}

/// Changing a constraint or an index clustering order under the same name
/// is refused; the published plan keeps its own behaviour.
#[tokio::test]
async fn test_changed_behaviour_is_duplicate_entity() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = compiler(&engine);
    let first = compiler.compile(&user(3, SortOrder::Asc)).await.unwrap();

    let err = compiler.compile(&user(100, SortOrder::Asc)).await.unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::DuplicateEntity);

    let err = compiler.compile(&user(3, SortOrder::Desc)).await.unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::DuplicateEntity);

    let again = compiler.compile(&user(3, SortOrder::Asc)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(again.indexes[0].clustering_order, vec![("id".to_string(), SortOrder::Asc)]);

    let err = compiler
        .marshaller("user")
        .unwrap()
        .prepare_save(&record_from_json(&serde_json::json!({"id": "u1", "name": "abcdef"})))
        .unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::Validation);
}

/// Plans differing only in set representation are different definitions.
#[tokio::test]
async fn test_set_representation_is_part_of_definition() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let registry = Arc::new(SchemaRegistry::new());
    let tagged = || {
        SchemaDescriptor::new("tagged")
            .field(FieldSpec::new("id", ty(PrimitiveKind::Uuid)).partition_key())
            .field(FieldSpec::new("tags", TypeDescriptor::set(ty(PrimitiveKind::String))))
    };

    let native = Compiler::with_registry(engine.clone(), registry.clone(), CompilerConfig::default());
    native.compile(&tagged()).await.unwrap();

    let arrays = Compiler::with_registry(
        engine.clone(),
        registry.clone(),
        CompilerConfig::default().with_set_representation(SetRepresentation::Array),
    );
    let err = arrays.compile(&tagged()).await.unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::DuplicateEntity);
}

/// User closures are compared by identity: the same descriptor recompiles
/// to the published plan, a rebuilt closure is another definition.
#[tokio::test]
async fn test_custom_validator_identity() {
    let nickname = || {
        SchemaDescriptor::new("handle")
            .field(FieldSpec::new("id", ty(PrimitiveKind::String)).partition_key())
            .field(
                FieldSpec::new("nick", ty(PrimitiveKind::String))
                    .validate_with(Some("no spaces"), |v, _, _| {
                        v.as_str().map_or(true, |s| !s.contains(' '))
                    }),
            )
    };
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = compiler(&engine);
    let schema = nickname();

    let first = compiler.compile(&schema).await.unwrap();
    let again = compiler.compile(&schema.clone()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let err = compiler.compile(&nickname()).await.unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::DuplicateEntity);
}

// =============================================================================
// CONCURRENCY
// =============================================================================

/// Concurrent compiles of one entity publish a single plan and create each
/// composite type once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_compiles_insert_once() {
    let engine = Arc::new(MemoryEngine::new("shop").with_latency(Duration::from_millis(5)));
    let compiler = Arc::new(compiler(&engine));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let compiler = Arc::clone(&compiler);
        handles.push(tokio::spawn(async move { compiler.compile(&customer()).await }));
    }

    let mut plans = Vec::new();
    for handle in handles {
        plans.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(compiler.registry().len(), 1);
    assert_eq!(engine.type_creates(), 1);
    let registered = compiler.registry().get("customer").unwrap();
    assert!(plans.iter().all(|p| Arc::ptr_eq(p, &registered)));
}

/// Unrelated entities compile concurrently into the same registry.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_unrelated_compiles() {
    let engine = Arc::new(MemoryEngine::new("shop").with_latency(Duration::from_millis(2)));
    let compiler = Arc::new(compiler(&engine));

    let mut handles = Vec::new();
    for i in 0..6 {
        let compiler = Arc::clone(&compiler);
        handles.push(tokio::spawn(async move {
            let schema = SchemaDescriptor::new(format!("entity_{}", i))
                .field(FieldSpec::new("id", ty(PrimitiveKind::Uuid)).partition_key());
            compiler.compile(&schema).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(compiler.registry().len(), 6);
    assert_eq!(engine.tables().len(), 6);
}

// =============================================================================
// TABLE SYNC
// =============================================================================

/// Table first, then secondary indexes, then unique indexes.
#[tokio::test]
async fn test_table_sync_order_and_statements() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    compiler(&engine).compile(&customer()).await.unwrap();

    let ddl: Vec<EngineCall> = engine
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, EngineCall::DescribeType(_)))
        .collect();
    assert_eq!(
        ddl,
        vec![
            EngineCall::CreateType("address".into()),
            EngineCall::CreateTable("customer".into()),
            EngineCall::CreateIndex("customer_city_idx".into()),
            EngineCall::CreateUniqueIndex("customer_email_uniq".into()),
        ]
    );

    let statements = engine.statements();
    assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS shop.customer ("));
    assert!(statements[1].contains("addresses list<frozen<address>>"));
    assert!(statements[1].ends_with("PRIMARY KEY (id))"));
}

/// With `sync_tables` off only composite types reach the engine.
#[tokio::test]
async fn test_sync_tables_disabled() {
    let engine = Arc::new(MemoryEngine::new("shop"));
    let compiler = Compiler::new(
        engine.clone(),
        CompilerConfig::default().with_sync_tables(false),
    );

    compiler.compile(&customer()).await.unwrap();

    assert_eq!(engine.type_creates(), 1);
    assert!(engine.tables().is_empty());
    assert!(compiler.registry().contains("customer"));
}
