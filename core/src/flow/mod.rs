// trancode/src/flow/mod.rs

//! Execution of transaction codes: flow, function group, function and router.

pub mod execution;
pub mod function;
pub mod group;
pub mod router;

pub use execution::TransactionFlow;
pub use function::FunctionExecution;
pub use group::FunctionGroupExecution;
pub use router::evaluate_router;

use crate::callback::CallbackRegistry;
use crate::config::EngineConfig;
use crate::core::transaction::TransactionProvider;
use crate::operation::OperationCatalog;
use std::sync::Arc;

/// Collaborators a flow needs, passed in explicitly rather than reached
/// through globals. Cloning is cheap.
#[derive(Clone)]
pub struct FlowServices {
  pub catalog: Arc<OperationCatalog>,
  pub callbacks: Arc<CallbackRegistry>,
  pub tx_provider: Arc<dyn TransactionProvider>,
  pub config: Arc<EngineConfig>,
}

impl FlowServices {
  pub fn new(
    catalog: Arc<OperationCatalog>,
    callbacks: Arc<CallbackRegistry>,
    tx_provider: Arc<dyn TransactionProvider>,
    config: Arc<EngineConfig>,
  ) -> Self {
    Self {
      catalog,
      callbacks,
      tx_provider,
      config,
    }
  }
}

impl std::fmt::Debug for FlowServices {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FlowServices")
      .field("catalog", &self.catalog)
      .field("callbacks", &self.callbacks)
      .field("config", &self.config)
      .finish()
  }
}
