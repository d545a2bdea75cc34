// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;
use trancode::{
  CallbackRegistry, DbTransaction, DefinitionLoader, EngineConfig, EngineError, EngineResult, FlowServices,
  OperationCatalog, TransactionCode, TransactionProvider, TxHandle, VarMap,
};

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

/// Builds a `VarMap` from a `json!({...})` literal.
pub fn vars(value: Value) -> VarMap {
  match value {
    Value::Object(obj) => obj.into_iter().collect(),
    other => panic!("vars() expects a JSON object, got {:?}", other),
  }
}

// --- Transaction doubles ---

/// Counts begin/commit/rollback calls across every transaction it hands out.
#[derive(Default)]
pub struct CountingTxProvider {
  pub begins: AtomicUsize,
  pub commits: Arc<AtomicUsize>,
  pub rollbacks: Arc<AtomicUsize>,
  pub fail_begin: AtomicBool,
  pub fail_commit: Arc<AtomicBool>,
}

impl CountingTxProvider {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn begins(&self) -> usize {
    self.begins.load(Ordering::SeqCst)
  }

  pub fn commits(&self) -> usize {
    self.commits.load(Ordering::SeqCst)
  }

  pub fn rollbacks(&self) -> usize {
    self.rollbacks.load(Ordering::SeqCst)
  }

  /// A transaction that reports into this provider's counters without a
  /// `begin` call, for tests that join a caller-owned transaction.
  pub fn detached_tx(&self) -> TxHandle {
    Arc::new(CountingTx {
      commits: self.commits.clone(),
      rollbacks: self.rollbacks.clone(),
      fail_commit: self.fail_commit.clone(),
    })
  }
}

#[async_trait]
impl TransactionProvider for CountingTxProvider {
  async fn begin(&self) -> anyhow::Result<TxHandle> {
    if self.fail_begin.load(Ordering::SeqCst) {
      anyhow::bail!("connection refused");
    }
    self.begins.fetch_add(1, Ordering::SeqCst);
    Ok(self.detached_tx())
  }
}

struct CountingTx {
  commits: Arc<AtomicUsize>,
  rollbacks: Arc<AtomicUsize>,
  fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl DbTransaction for CountingTx {
  async fn commit(&self) -> anyhow::Result<()> {
    if self.fail_commit.load(Ordering::SeqCst) {
      anyhow::bail!("serialization failure");
    }
    self.commits.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn rollback(&self) -> anyhow::Result<()> {
    self.rollbacks.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

// --- Definitions ---

/// Serves definitions from memory and counts loads.
#[derive(Default)]
pub struct MapLoader {
  codes: HashMap<String, Arc<TransactionCode>>,
  pub loads: AtomicUsize,
}

impl MapLoader {
  pub fn new(codes: Vec<TransactionCode>) -> Arc<Self> {
    Arc::new(Self {
      codes: codes.into_iter().map(|c| (c.name.clone(), Arc::new(c))).collect(),
      loads: AtomicUsize::new(0),
    })
  }

  pub fn loads(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl DefinitionLoader for MapLoader {
  async fn load(&self, name: &str) -> EngineResult<Arc<TransactionCode>> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    self
      .codes
      .get(name)
      .cloned()
      .ok_or_else(|| EngineError::TranCodeNotFound { name: name.to_string() })
  }
}

// --- Services ---

pub fn services(catalog: OperationCatalog, provider: Arc<dyn TransactionProvider>) -> FlowServices {
  services_with_config(catalog, provider, EngineConfig::default())
}

pub fn services_with_config(
  catalog: OperationCatalog,
  provider: Arc<dyn TransactionProvider>,
  config: EngineConfig,
) -> FlowServices {
  FlowServices::new(
    Arc::new(catalog),
    Arc::new(CallbackRegistry::new()),
    provider,
    Arc::new(config),
  )
}
