// trancode/src/callback.rs

//! Defines `CallbackRegistry`, a string-keyed table of host-supplied handlers
//! that functions invoke by name. Nested transaction-code execution goes
//! through it too, which keeps the flow executor free of a dependency on the
//! engine that drives it.
//!
//! The registry is an ordinary object owned by the host and injected into every
//! flow; there is no process-global table.

use crate::core::transaction::TxHandle;
use crate::core::value::VarMap;
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

/// Key under which the engine registers nested transaction-code execution.
pub const TRANCODE_EXECUTE_CALLBACK: &str = "TranCode_Execute";

/// A registered callback. Arguments arrive in a fixed order: transaction-code
/// name, inputs, cancellation token, database transaction.
///
/// The token is both the cancellation context and its trigger: observe it with
/// `is_cancelled`/`cancelled`, fire it with `cancel`.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
  async fn call(
    &self,
    code: &str,
    inputs: VarMap,
    cancel: CancellationToken,
    tx: Option<TxHandle>,
  ) -> anyhow::Result<VarMap>;
}

/// Adapter turning an async closure into a [`CallbackHandler`].
struct FnCallback<F> {
  f: F,
}

#[async_trait]
impl<F, Fut> CallbackHandler for FnCallback<F>
where
  F: Fn(String, VarMap, CancellationToken, Option<TxHandle>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<VarMap>> + Send + 'static,
{
  async fn call(
    &self,
    code: &str,
    inputs: VarMap,
    cancel: CancellationToken,
    tx: Option<TxHandle>,
  ) -> anyhow::Result<VarMap> {
    (self.f)(code.to_string(), inputs, cancel, tx).await
  }
}

#[derive(Default)]
pub struct CallbackRegistry {
  handlers: RwLock<HashMap<String, Arc<dyn CallbackHandler>>>,
}

impl CallbackRegistry {
  /// Creates a new, empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Stores `handler` under `key`. Registering an existing key replaces the
  /// previous handler.
  pub fn register(&self, key: impl Into<String>, handler: Arc<dyn CallbackHandler>) -> EngineResult<()> {
    let key = key.into();
    if key.trim().is_empty() {
      event!(Level::ERROR, "Refusing to register a callback under an empty key.");
      return Err(EngineError::InvalidCallback {
        key,
        message: "callback key must not be empty".to_string(),
      });
    }

    let previous = self.handlers.write().insert(key.clone(), handler);
    if previous.is_some() {
      event!(Level::WARN, callback_key = %key, "Callback re-registered; previous handler replaced.");
    } else {
      event!(Level::DEBUG, callback_key = %key, "Callback registered.");
    }
    Ok(())
  }

  /// Registers an async closure as a callback.
  pub fn register_fn<F, Fut>(&self, key: impl Into<String>, f: F) -> EngineResult<()>
  where
    F: Fn(String, VarMap, CancellationToken, Option<TxHandle>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<VarMap>> + Send + 'static,
  {
    self.register(key, Arc::new(FnCallback { f }))
  }

  pub fn unregister(&self, key: &str) -> bool {
    self.handlers.write().remove(key).is_some()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.handlers.read().contains_key(key)
  }

  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.handlers.read().keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Invokes the handler registered under `key`.
  ///
  /// `None` inputs become an empty map and a `None` token becomes a fresh one
  /// that is never cancelled. An unknown key is logged and reported as
  /// `CallbackNotFound`; no handler runs.
  #[instrument(
        name = "CallbackRegistry::invoke",
        skip(self, inputs, cancel, tx),
        fields(callback_key = %key, trancode = %code),
        err(Display)
    )]
  pub async fn invoke(
    &self,
    key: &str,
    code: &str,
    inputs: Option<VarMap>,
    cancel: Option<CancellationToken>,
    tx: Option<TxHandle>,
  ) -> EngineResult<VarMap> {
    // Clone the handler out so the lock is released before awaiting it.
    let handler = self.handlers.read().get(key).cloned();
    let Some(handler) = handler else {
      event!(Level::ERROR, "No callback registered for key.");
      return Err(EngineError::CallbackNotFound { key: key.to_string() });
    };

    let inputs = inputs.unwrap_or_default();
    let cancel = cancel.unwrap_or_default();
    event!(Level::DEBUG, num_inputs = inputs.len(), joint_tx = tx.is_some(), "Invoking callback.");

    handler
      .call(code, inputs, cancel, tx)
      .await
      .map_err(|source| EngineError::CallbackFailed {
        key: key.to_string(),
        source,
      })
  }
}

impl std::fmt::Debug for CallbackRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CallbackRegistry").field("keys", &self.keys()).finish()
  }
}
