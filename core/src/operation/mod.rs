// trancode/src/operation/mod.rs

//! Defines the `Operation` trait (what a function's `functype` resolves to) and
//! the `OperationCatalog` that maps operation identifiers to implementations.

pub mod builtin;

use crate::callback::CallbackRegistry;
use crate::core::context::FlowContext;
use crate::core::transaction::TxHandle;
use crate::core::value::VarMap;
use crate::definition::model::FunctionDef;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

/// Everything an operation gets to see for one function invocation.
#[derive(Clone)]
pub struct OperationCall {
  pub trancode: String,
  pub group: String,
  pub function: FunctionDef,
  /// The function's inputs, already resolved and validated.
  pub inputs: VarMap,
  /// Snapshot the function started from.
  pub context: FlowContext,
  pub tx: Option<TxHandle>,
  pub cancel: CancellationToken,
  pub callbacks: Arc<CallbackRegistry>,
}

impl std::fmt::Debug for OperationCall {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OperationCall")
      .field("trancode", &self.trancode)
      .field("group", &self.group)
      .field("function", &self.function.name)
      .field("inputs", &self.inputs)
      .field("tx_present", &self.tx.is_some())
      .finish()
  }
}

/// What an operation hands back.
///
/// `outputs` feed the function's output bindings and its cache entry. When
/// `context` is set it replaces the snapshot the function started from before
/// the outputs are bound, so anything missing from it is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOutput {
  pub outputs: VarMap,
  pub context: Option<FlowContext>,
}

impl OperationOutput {
  pub fn new(outputs: VarMap) -> Self {
    Self { outputs, context: None }
  }

  pub fn with_context(mut self, context: FlowContext) -> Self {
    self.context = Some(context);
    self
  }
}

#[async_trait]
pub trait Operation: Send + Sync {
  async fn invoke(&self, call: OperationCall) -> anyhow::Result<OperationOutput>;
}

struct FnOperation<F> {
  f: F,
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
  F: Fn(OperationCall) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<OperationOutput>> + Send + 'static,
{
  async fn invoke(&self, call: OperationCall) -> anyhow::Result<OperationOutput> {
    (self.f)(call).await
  }
}

#[derive(Default, Clone)]
pub struct OperationCatalog {
  operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationCatalog {
  /// An empty catalog.
  pub fn new() -> Self {
    Self::default()
  }

  /// A catalog preloaded with `InputMap`, `SubTranCode`, `Callback` and `ThrowError`.
  pub fn with_builtins() -> Self {
    let mut catalog = Self::new();
    builtin::register_builtins(&mut catalog);
    catalog
  }

  pub fn register(&mut self, name: impl Into<String>, operation: Arc<dyn Operation>) {
    let name = name.into();
    if self.operations.insert(name.clone(), operation).is_some() {
      event!(Level::WARN, operation = %name, "Operation re-registered; previous implementation replaced.");
    } else {
      event!(Level::DEBUG, operation = %name, "Operation registered.");
    }
  }

  /// Registers an async closure as an operation.
  pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
  where
    F: Fn(OperationCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<OperationOutput>> + Send + 'static,
  {
    self.register(name, Arc::new(FnOperation { f }));
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
    self.operations.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.operations.contains_key(name)
  }

  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.operations.keys().cloned().collect();
    names.sort();
    names
  }
}

impl std::fmt::Debug for OperationCatalog {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OperationCatalog").field("operations", &self.names()).finish()
  }
}
