// trancode/src/engine.rs

//! Defines `TranCodeEngine`, which ties a definition loader, the operation
//! catalog, the callback registry and a transaction provider together and runs
//! transaction codes by name.

use crate::callback::{CallbackHandler, CallbackRegistry, TRANCODE_EXECUTE_CALLBACK};
use crate::config::EngineConfig;
use crate::core::transaction::{NoopTransactionProvider, TransactionProvider, TxHandle};
use crate::core::value::VarMap;
use crate::definition::loader::{CachingLoader, DefinitionLoader, FileDefinitionLoader};
use crate::error::{EngineError, EngineResult};
use crate::flow::{FlowServices, TransactionFlow};
use crate::operation::{Operation, OperationCatalog};

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

tokio::task_local! {
  /// Nesting depth of the transaction code currently running on this task.
  /// Unset for a top-level execution.
  static NESTING_DEPTH: usize;
}

/// One request to run a transaction code.
#[derive(Clone, Default)]
pub struct ExecutionRequest {
  pub code: String,
  pub inputs: VarMap,
  pub system_session: VarMap,
  pub user_session: VarMap,
  /// Caller-owned transaction to join instead of beginning a new one.
  pub tx: Option<TxHandle>,
  pub cancel: Option<CancellationToken>,
}

impl ExecutionRequest {
  pub fn new(code: impl Into<String>) -> Self {
    Self {
      code: code.into(),
      ..Default::default()
    }
  }

  pub fn with_inputs(mut self, inputs: VarMap) -> Self {
    self.inputs = inputs;
    self
  }

  pub fn with_system_session(mut self, system_session: VarMap) -> Self {
    self.system_session = system_session;
    self
  }

  pub fn with_user_session(mut self, user_session: VarMap) -> Self {
    self.user_session = user_session;
    self
  }

  pub fn with_transaction(mut self, tx: TxHandle) -> Self {
    self.tx = Some(tx);
    self
  }

  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = Some(cancel);
    self
  }
}

impl std::fmt::Debug for ExecutionRequest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionRequest")
      .field("code", &self.code)
      .field("inputs", &self.inputs)
      .field("joint_tx", &self.tx.is_some())
      .finish()
  }
}

pub struct TranCodeEngine {
  loader: Arc<dyn DefinitionLoader>,
  services: FlowServices,
}

impl TranCodeEngine {
  pub fn builder() -> EngineBuilder {
    EngineBuilder::default()
  }

  pub fn services(&self) -> &FlowServices {
    &self.services
  }

  pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
    &self.services.callbacks
  }

  pub fn loader(&self) -> &Arc<dyn DefinitionLoader> {
    &self.loader
  }

  /// Loads `request.code` and executes it.
  #[instrument(name = "TranCodeEngine::execute", skip_all, fields(trancode = %request.code), err(Display))]
  pub async fn execute(&self, request: ExecutionRequest) -> EngineResult<VarMap> {
    let definition = self.loader.load(&request.code).await?;
    let mut flow = TransactionFlow::new(definition, request.inputs, request.system_session, self.services.clone())
      .with_user_session(request.user_session);
    if let Some(tx) = request.tx {
      flow = flow.with_transaction(tx);
    }
    if let Some(cancel) = request.cancel {
      flow = flow.with_cancellation(cancel);
    }
    flow.execute().await
  }
}

#[derive(Default)]
pub struct EngineBuilder {
  loader: Option<Arc<dyn DefinitionLoader>>,
  catalog: Option<OperationCatalog>,
  extra_operations: Vec<(String, Arc<dyn Operation>)>,
  tx_provider: Option<Arc<dyn TransactionProvider>>,
  callbacks: Option<Arc<CallbackRegistry>>,
  config: Option<EngineConfig>,
}

impl EngineBuilder {
  /// Definition source. Defaults to a file loader over `config.trancode_dir`.
  pub fn loader(mut self, loader: Arc<dyn DefinitionLoader>) -> Self {
    self.loader = Some(loader);
    self
  }

  /// Replaces the catalog. Defaults to `OperationCatalog::with_builtins()`.
  pub fn catalog(mut self, catalog: OperationCatalog) -> Self {
    self.catalog = Some(catalog);
    self
  }

  /// Adds an operation on top of whichever catalog is used.
  pub fn operation(mut self, name: impl Into<String>, operation: Arc<dyn Operation>) -> Self {
    self.extra_operations.push((name.into(), operation));
    self
  }

  /// Defaults to `NoopTransactionProvider`.
  pub fn transaction_provider(mut self, provider: Arc<dyn TransactionProvider>) -> Self {
    self.tx_provider = Some(provider);
    self
  }

  /// Shares an existing registry, e.g. one the host already registered callbacks in.
  pub fn callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
    self.callbacks = Some(callbacks);
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = Some(config);
    self
  }

  /// Builds the engine and registers the `TranCode_Execute` callback on its registry.
  pub fn build(self) -> EngineResult<TranCodeEngine> {
    let config = Arc::new(self.config.unwrap_or_default());

    let base_loader: Arc<dyn DefinitionLoader> = self
      .loader
      .unwrap_or_else(|| Arc::new(FileDefinitionLoader::new(config.trancode_dir.clone())));
    let loader: Arc<dyn DefinitionLoader> = if config.cache_definitions {
      Arc::new(CachingLoader::new(base_loader))
    } else {
      base_loader
    };

    let mut catalog = self.catalog.unwrap_or_else(OperationCatalog::with_builtins);
    for (name, operation) in self.extra_operations {
      catalog.register(name, operation);
    }
    let catalog = Arc::new(catalog);

    let tx_provider: Arc<dyn TransactionProvider> = self
      .tx_provider
      .unwrap_or_else(|| Arc::new(NoopTransactionProvider));
    let callbacks = self.callbacks.unwrap_or_default();

    callbacks.register(
      TRANCODE_EXECUTE_CALLBACK,
      Arc::new(NestedFlowCallback {
        loader: loader.clone(),
        catalog: catalog.clone(),
        tx_provider: tx_provider.clone(),
        config: config.clone(),
        callbacks: Arc::downgrade(&callbacks),
      }),
    )?;

    event!(Level::INFO, operations = ?catalog.names(), "Transaction code engine ready.");
    Ok(TranCodeEngine {
      loader,
      services: FlowServices::new(catalog, callbacks, tx_provider, config),
    })
  }
}

/// Runs a transaction code on behalf of a function, joining the caller's
/// transaction when one is passed.
///
/// Holds the registry weakly: the registry owns this handler.
///
/// Each nested level runs one deeper than its caller. Past `max_nesting_depth`
/// the call fails before loading anything.
struct NestedFlowCallback {
  loader: Arc<dyn DefinitionLoader>,
  catalog: Arc<OperationCatalog>,
  tx_provider: Arc<dyn TransactionProvider>,
  config: Arc<EngineConfig>,
  callbacks: Weak<CallbackRegistry>,
}

#[async_trait]
impl CallbackHandler for NestedFlowCallback {
  async fn call(
    &self,
    code: &str,
    inputs: VarMap,
    cancel: CancellationToken,
    tx: Option<TxHandle>,
  ) -> anyhow::Result<VarMap> {
    let depth = NESTING_DEPTH.try_with(|depth| *depth).unwrap_or(0) + 1;
    let limit = self.config.max_nesting_depth;
    if depth > limit {
      event!(Level::ERROR, trancode = %code, depth, limit, "Nested transaction code depth limit exceeded.");
      return Err(
        EngineError::NestingDepthExceeded {
          trancode: code.to_string(),
          limit,
        }
        .into(),
      );
    }

    let callbacks = self
      .callbacks
      .upgrade()
      .ok_or_else(|| anyhow!("callback registry dropped before nested execution of '{}'", code))?;
    let definition = self.loader.load(code).await?;
    let services = FlowServices::new(
      self.catalog.clone(),
      callbacks,
      self.tx_provider.clone(),
      self.config.clone(),
    );

    let mut flow = TransactionFlow::new(definition, inputs, VarMap::new(), services).with_cancellation(cancel);
    if let Some(tx) = tx {
      flow = flow.with_transaction(tx);
    }
    Ok(NESTING_DEPTH.scope(depth, flow.execute()).await?)
  }
}
