// tests/engine_tests.rs
mod common;
use common::*;
use serde_json::json;
use std::sync::Arc;
use trancode::definition::loader::TRANCODE_COLLECTION;
use trancode::{
  CachingLoader, DefinitionLoader, DocumentStoreLoader, EngineConfig, EngineError, ErrorKind, ExecutionRequest,
  FileDefinitionLoader, FunctionDef, FunctionGroupDef, InMemoryDocumentStore, InputBinding, InputSource,
  OutputBinding, OutputTarget, RouterDef, TranCodeEngine, TransactionCode, VarClass, TRANCODE_EXECUTE_CALLBACK,
};

/// Doubles `amount` from its inputs.
fn child_code() -> TransactionCode {
  TransactionCode::new("Child", "Main").group(
    FunctionGroupDef::new("Main").function(
      FunctionDef::new("double", "Multiply")
        .input(InputBinding::from_source("amount", InputSource::ExternalInputs).required())
        .output(OutputBinding::new("result").alias("doubled").to(OutputTarget::ExternalOutputs)),
    ),
  )
}

/// Runs `Child` through `SubTranCode` and routes on its output.
fn parent_code() -> TransactionCode {
  TransactionCode::new("Parent", "CallChild")
    .group(
      FunctionGroupDef::new("CallChild")
        .function(
          FunctionDef::new("runChild", "SubTranCode")
            .content("Child")
            .input(InputBinding::from_source("amount", InputSource::ExternalInputs)),
        )
        .router(
          RouterDef::on(VarClass::FuncCachedVariables, "runChild.doubled")
            .route(20, "Big")
            .otherwise("Small"),
        ),
    )
    .group(
      FunctionGroupDef::new("Big").function(
        FunctionDef::new("label", "InputMap")
          .input(InputBinding::constant("size", "big"))
          .output(OutputBinding::new("size").to(OutputTarget::ExternalOutputs)),
      ),
    )
    .group(
      FunctionGroupDef::new("Small").function(
        FunctionDef::new("label", "InputMap")
          .input(InputBinding::constant("size", "small"))
          .output(OutputBinding::new("size").to(OutputTarget::ExternalOutputs)),
      ),
    )
}

fn engine_with(loader: Arc<dyn DefinitionLoader>, provider: Arc<CountingTxProvider>) -> TranCodeEngine {
  engine_with_config(loader, provider, EngineConfig::default())
}

fn engine_with_config(
  loader: Arc<dyn DefinitionLoader>,
  provider: Arc<CountingTxProvider>,
  config: EngineConfig,
) -> TranCodeEngine {
  let mut catalog = trancode::OperationCatalog::with_builtins();
  catalog.register_fn("Multiply", |call| async move {
    let amount = call.inputs.get("amount").and_then(|v| v.as_i64()).unwrap_or_default();
    Ok::<_, anyhow::Error>(trancode::OperationOutput::new(vars(json!({ "result": amount * 2 }))))
  });
  TranCodeEngine::builder()
    .loader(loader)
    .catalog(catalog)
    .transaction_provider(provider)
    .config(config)
    .build()
    .unwrap()
}

/// A code whose only function runs `target` through `SubTranCode`.
fn calls_code(name: &str, target: &str) -> TransactionCode {
  TransactionCode::new(name, "Main")
    .group(FunctionGroupDef::new("Main").function(FunctionDef::new("recurse", "SubTranCode").content(target)))
}

#[tokio::test]
async fn test_engine_registers_nested_execution_callback() {
  setup_tracing();
  let engine = engine_with(MapLoader::new(vec![]), CountingTxProvider::new());
  assert!(engine.callbacks().contains(TRANCODE_EXECUTE_CALLBACK));
}

#[tokio::test]
async fn test_nested_trancode_joins_parent_transaction() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let engine = engine_with(MapLoader::new(vec![parent_code(), child_code()]), provider.clone());

  let outputs = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 10 }))))
    .await
    .unwrap();
  assert_eq!(outputs, vars(json!({ "size": "big" })));

  let outputs = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 3 }))))
    .await
    .unwrap();
  assert_eq!(outputs, vars(json!({ "size": "small" })));

  // One transaction per top-level execution; the child never begins its own.
  assert_eq!(provider.begins(), 2);
  assert_eq!(provider.commits(), 2);
  assert_eq!(provider.rollbacks(), 0);
}

#[tokio::test]
async fn test_nested_trancode_failure_rolls_back_parent_once() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let engine = engine_with(MapLoader::new(vec![parent_code(), child_code()]), provider.clone());

  // Child requires `amount`.
  let err = engine.execute(ExecutionRequest::new("Parent")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::FunctionFailed);
  assert!(err.to_string().contains("amount"));
  assert_eq!(provider.begins(), 1);
  assert_eq!(provider.rollbacks(), 1);
}

#[tokio::test]
async fn test_self_nesting_trancode_fails_and_rolls_back() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let engine = engine_with_config(
    MapLoader::new(vec![calls_code("Loop", "Loop")]),
    provider.clone(),
    EngineConfig {
      max_group_transitions: Some(10),
      ..Default::default()
    },
  );

  let err = engine.execute(ExecutionRequest::new("Loop")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::FunctionFailed);
  assert!(err
    .to_string()
    .contains("Nested execution of 'Loop' exceeded the nesting depth limit of 8"));
  assert_eq!(provider.begins(), 1);
  assert_eq!(provider.commits(), 0);
  assert_eq!(provider.rollbacks(), 1);
}

#[tokio::test]
async fn test_nesting_depth_limit_counts_every_level() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let limited = |max_nesting_depth| EngineConfig {
    max_nesting_depth,
    ..Default::default()
  };

  // Ping -> Pong -> Ping -> Pong: the third level is one too many.
  let engine = engine_with_config(
    MapLoader::new(vec![calls_code("Ping", "Pong"), calls_code("Pong", "Ping")]),
    provider.clone(),
    limited(2),
  );
  let err = engine.execute(ExecutionRequest::new("Ping")).await.unwrap_err();
  assert!(err
    .to_string()
    .contains("Nested execution of 'Pong' exceeded the nesting depth limit of 2"));
  assert_eq!(provider.rollbacks(), 1);

  // One level is enough for Parent -> Child.
  let engine = engine_with_config(
    MapLoader::new(vec![parent_code(), child_code()]),
    provider.clone(),
    limited(1),
  );
  let outputs = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 10 }))))
    .await
    .unwrap();
  assert_eq!(outputs, vars(json!({ "size": "big" })));

  // Zero turns nested execution off.
  let engine = engine_with_config(
    MapLoader::new(vec![parent_code(), child_code()]),
    provider.clone(),
    limited(0),
  );
  let err = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 10 }))))
    .await
    .unwrap_err();
  assert!(err.to_string().contains("nesting depth limit of 0"));
  assert_eq!(provider.commits(), 1);
  assert_eq!(provider.rollbacks(), 2);
}

#[tokio::test]
async fn test_missing_nested_trancode_fails_parent() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let engine = engine_with(MapLoader::new(vec![parent_code()]), provider.clone());

  let err = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 1 }))))
    .await
    .unwrap_err();
  assert!(err.to_string().contains("Transaction code not found: Child"));
  assert_eq!(provider.rollbacks(), 1);
}

#[tokio::test]
async fn test_engine_execute_unknown_code() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let engine = engine_with(MapLoader::new(vec![]), provider.clone());

  let err = engine.execute(ExecutionRequest::new("Nope")).await.unwrap_err();
  assert!(matches!(err, EngineError::TranCodeNotFound { ref name } if name == "Nope"));
  assert!(err.is_client_error());
  assert_eq!(provider.begins(), 0);
}

#[tokio::test]
async fn test_engine_joins_caller_transaction() {
  setup_tracing();
  let provider = CountingTxProvider::new();
  let engine = engine_with(MapLoader::new(vec![parent_code(), child_code()]), provider.clone());

  engine
    .execute(
      ExecutionRequest::new("Parent")
        .with_inputs(vars(json!({ "amount": 10 })))
        .with_transaction(provider.detached_tx()),
    )
    .await
    .unwrap();
  assert_eq!(provider.begins(), 0);
  assert_eq!(provider.commits(), 0);
}

#[tokio::test]
async fn test_file_loader_not_found_vs_malformed() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("Child.json"),
    serde_json::to_string_pretty(&child_code()).unwrap(),
  )
  .unwrap();
  std::fs::write(dir.path().join("Broken.json"), "{ \"trancodename\": \"Broken\", ").unwrap();

  let loader = FileDefinitionLoader::new(dir.path());

  let code = loader.load("Child").await.unwrap();
  assert_eq!(code.name, "Child");
  assert_eq!(code.function_groups[0].functions[0].function_type, "Multiply");

  let missing = loader.load("Absent").await.unwrap_err();
  assert_eq!(missing.kind(), ErrorKind::DefinitionNotFound);

  let broken = loader.load("Broken").await.unwrap_err();
  assert_eq!(broken.kind(), ErrorKind::Deserialization);

  let escape = loader.load("../Child").await.unwrap_err();
  assert!(matches!(escape, EngineError::TranCodeNotFound { .. }));
}

#[tokio::test]
async fn test_engine_reads_definitions_from_configured_dir() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("Child.json"),
    serde_json::to_string(&child_code()).unwrap(),
  )
  .unwrap();
  std::fs::write(
    dir.path().join("Parent.json"),
    serde_json::to_string(&parent_code()).unwrap(),
  )
  .unwrap();

  let mut catalog = trancode::OperationCatalog::with_builtins();
  catalog.register_fn("Multiply", |call| async move {
    let amount = call.inputs.get("amount").and_then(|v| v.as_i64()).unwrap_or_default();
    Ok::<_, anyhow::Error>(trancode::OperationOutput::new(vars(json!({ "result": amount * 2 }))))
  });
  let engine = TranCodeEngine::builder()
    .config(EngineConfig {
      trancode_dir: dir.path().to_path_buf(),
      cache_definitions: true,
      ..Default::default()
    })
    .catalog(catalog)
    .build()
    .unwrap();

  let outputs = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 10 }))))
    .await
    .unwrap();
  assert_eq!(outputs, vars(json!({ "size": "big" })));

  // Cached: removing the files does not affect later runs.
  std::fs::remove_file(dir.path().join("Parent.json")).unwrap();
  std::fs::remove_file(dir.path().join("Child.json")).unwrap();
  let outputs = engine
    .execute(ExecutionRequest::new("Parent").with_inputs(vars(json!({ "amount": 1 }))))
    .await
    .unwrap();
  assert_eq!(outputs, vars(json!({ "size": "small" })));
}

#[tokio::test]
async fn test_document_store_prefers_default_version() {
  setup_tracing();
  let store = Arc::new(InMemoryDocumentStore::new());

  let mut old = serde_json::to_value(child_code()).unwrap();
  old["version"] = json!("1");
  old["isdefault"] = json!(false);
  let mut current = serde_json::to_value(child_code()).unwrap();
  current["version"] = json!("2");
  current["isdefault"] = json!(true);
  store.insert(TRANCODE_COLLECTION, old);
  store.insert(TRANCODE_COLLECTION, current);
  store.insert("Other_Collection", serde_json::to_value(parent_code()).unwrap());

  let loader = DocumentStoreLoader::new(store.clone());
  let code = loader.load("Child").await.unwrap();
  assert_eq!(code.version, "2");

  let err = loader.load("Parent").await.unwrap_err();
  assert!(matches!(err, EngineError::TranCodeNotFound { .. }));

  let other = DocumentStoreLoader::new(store).with_collection("Other_Collection");
  assert_eq!(other.load("Parent").await.unwrap().name, "Parent");
}

#[tokio::test]
async fn test_caching_loader_memoizes_successes_only() {
  setup_tracing();
  let inner = MapLoader::new(vec![child_code()]);
  let caching = CachingLoader::new(inner.clone() as Arc<dyn DefinitionLoader>);

  caching.load("Child").await.unwrap();
  caching.load("Child").await.unwrap();
  assert_eq!(inner.loads(), 1);
  assert_eq!(caching.len(), 1);

  assert!(caching.load("Missing").await.is_err());
  assert!(caching.load("Missing").await.is_err());
  assert_eq!(inner.loads(), 3);

  caching.invalidate("Child");
  assert!(caching.is_empty());
  caching.load("Child").await.unwrap();
  assert_eq!(inner.loads(), 4);
}
