// trancode/src/flow/execution.rs

//! Contains `TransactionFlow`, which walks a transaction code from its first
//! function group until the router names a group the definition does not
//! have, inside exactly one database transaction.

use crate::core::context::FlowContext;
use crate::core::transaction::TxHandle;
use crate::core::value::VarMap;
use crate::definition::model::TransactionCode;
use crate::error::{EngineError, EngineResult};
use crate::flow::group::FunctionGroupExecution;
use crate::flow::FlowServices;

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

pub struct TransactionFlow {
  definition: Arc<TransactionCode>,
  inputs: VarMap,
  system_session: VarMap,
  user_session: VarMap,
  services: FlowServices,
  tx: Option<TxHandle>,
  cancel: CancellationToken,
}

impl TransactionFlow {
  pub fn new(
    definition: Arc<TransactionCode>,
    inputs: VarMap,
    system_session: VarMap,
    services: FlowServices,
  ) -> Self {
    Self {
      definition,
      inputs,
      system_session,
      user_session: VarMap::new(),
      services,
      tx: None,
      cancel: CancellationToken::new(),
    }
  }

  /// Joins a transaction owned by the caller. The flow will neither commit nor
  /// roll it back.
  pub fn with_transaction(mut self, tx: TxHandle) -> Self {
    self.tx = Some(tx);
    self
  }

  pub fn with_user_session(mut self, user_session: VarMap) -> Self {
    self.user_session = user_session;
    self
  }

  /// Token handed to every operation. The flow itself never checks it.
  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn definition(&self) -> &TransactionCode {
    &self.definition
  }

  pub fn owns_transaction(&self) -> bool {
    self.tx.is_none()
  }

  /// Executes the flow and returns its external outputs.
  ///
  /// Without a caller transaction the flow begins one, commits it on success
  /// and rolls it back on error or panic (the panic then continues unwinding).
  #[instrument(
        name = "TransactionFlow::execute",
        skip_all,
        fields(trancode = %self.definition.name, owns_tx = self.tx.is_none()),
        err(Display)
    )]
  pub async fn execute(self) -> EngineResult<VarMap> {
    self.definition.validate()?;

    if let Some(tx) = self.tx.clone() {
      event!(Level::DEBUG, "Running inside caller-owned transaction.");
      return self.run_groups(&tx).await;
    }

    let tx = self
      .services
      .tx_provider
      .begin()
      .await
      .map_err(|source| EngineError::TransactionBegin { source })?;
    event!(Level::DEBUG, "Transaction begun.");

    let outcome = AssertUnwindSafe(self.run_groups(&tx)).catch_unwind().await;
    match outcome {
      Ok(Ok(outputs)) => {
        tx.commit()
          .await
          .map_err(|source| EngineError::TransactionCommit { source })?;
        event!(Level::DEBUG, "Transaction committed.");
        Ok(outputs)
      }
      Ok(Err(err)) => {
        rollback(&tx, &err.to_string()).await;
        Err(err)
      }
      Err(panic) => {
        rollback(&tx, "panic during flow execution").await;
        std::panic::resume_unwind(panic)
      }
    }
  }

  async fn run_groups(&self, tx: &TxHandle) -> EngineResult<VarMap> {
    let code = &*self.definition;
    let mut current = code
      .group_by_name(&code.first_func_group)
      .ok_or_else(|| EngineError::FunctionGroupNotFound {
        trancode: code.name.clone(),
        group: code.first_func_group.clone(),
      })?;

    let mut ctx = FlowContext::builder()
      .system_session(self.system_session.clone())
      .user_session(self.user_session.clone())
      .external_inputs(self.inputs.clone())
      .build();
    let mut transitions = 0usize;

    loop {
      let group = FunctionGroupExecution::new(&code.name, current, &self.services, Some(tx), &self.cancel);
      let outcome = group.execute(ctx).await?;

      let Some(next) = code.group_by_name(&outcome.next_group) else {
        event!(Level::DEBUG, last_group = %current.name, next_group = %outcome.next_group, transitions, "No such function group; flow complete.");
        return Ok(outcome.context.into_external_outputs());
      };

      transitions += 1;
      if let Some(limit) = self.services.config.max_group_transitions {
        if transitions > limit {
          event!(Level::ERROR, limit, "Function group transition limit exceeded.");
          return Err(EngineError::GroupTransitionLimit {
            trancode: code.name.clone(),
            limit,
          });
        }
      }

      event!(Level::TRACE, from = %current.name, to = %next.name, "Moving to next function group.");
      // User session and external inputs/outputs carry over; the system
      // session is restored and the function cache starts empty.
      ctx = outcome
        .context
        .into_builder()
        .system_session(self.system_session.clone())
        .func_cached(VarMap::new())
        .build();
      current = next;
    }
  }
}

async fn rollback(tx: &TxHandle, reason: &str) {
  event!(Level::WARN, reason = %reason, "Rolling back transaction.");
  if let Err(e) = tx.rollback().await {
    event!(Level::ERROR, error = %e, "Rollback failed.");
  }
}
