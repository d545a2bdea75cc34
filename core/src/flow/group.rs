// trancode/src/flow/group.rs

//! Contains `FunctionGroupExecution`, which runs the functions of one group in
//! order and asks the router where to go next.

use crate::core::context::FlowContext;
use crate::core::control::{FailurePolicy, GroupOutcome};
use crate::core::transaction::TxHandle;
use crate::definition::model::FunctionGroupDef;
use crate::error::{EngineError, EngineResult};
use crate::flow::function::FunctionExecution;
use crate::flow::router::evaluate_router;
use crate::flow::FlowServices;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

pub struct FunctionGroupExecution<'a> {
  trancode: &'a str,
  def: &'a FunctionGroupDef,
  services: &'a FlowServices,
  tx: Option<&'a TxHandle>,
  cancel: &'a CancellationToken,
}

impl<'a> FunctionGroupExecution<'a> {
  pub fn new(
    trancode: &'a str,
    def: &'a FunctionGroupDef,
    services: &'a FlowServices,
    tx: Option<&'a TxHandle>,
    cancel: &'a CancellationToken,
  ) -> Self {
    Self {
      trancode,
      def,
      services,
      tx,
      cancel,
    }
  }

  /// Runs every function in definition order. Each one starts from the
  /// snapshot the previous one returned, and its own result replaces it.
  ///
  /// A failing function either aborts the group or, under
  /// `FailurePolicy::Continue`, leaves `{"status": "error", "error": ..}` in
  /// the function cache under its name and the next function runs.
  #[instrument(
        name = "FunctionGroupExecution::execute",
        skip_all,
        fields(trancode = %self.trancode, group = %self.def.name, num_functions = self.def.functions.len()),
        err(Display)
    )]
  pub async fn execute(&self, ctx: FlowContext) -> EngineResult<GroupOutcome> {
    event!(Level::DEBUG, "Function group starting.");
    let mut ctx = ctx;

    for (function_idx, function) in self.def.functions.iter().enumerate() {
      let execution = FunctionExecution::new(self.trancode, &self.def.name, function, self.services, self.tx, self.cancel);

      match execution.execute(ctx.clone()).await {
        Ok(next) => ctx = next,
        Err(e) => {
          let policy = function.on_error.unwrap_or(self.services.config.on_function_error);
          match policy {
            FailurePolicy::Abort => {
              event!(Level::ERROR, function = %function.name, function_index = function_idx, error = %e, "Function failed; aborting group.");
              return Err(EngineError::FunctionFailed {
                group: self.def.name.clone(),
                function: function.name.clone(),
                source: Box::new(e),
              });
            }
            FailurePolicy::Continue => {
              event!(Level::WARN, function = %function.name, function_index = function_idx, error = %e, "Function failed; continuing with next function.");
              ctx = ctx
                .into_builder()
                .cache_result(function.name.clone(), json!({ "status": "error", "error": e.to_string() }))
                .build();
            }
          }
        }
      }
    }

    let next_group = evaluate_router(&self.def.router, &ctx);
    event!(Level::DEBUG, next_group = %next_group, "Function group finished.");
    Ok(GroupOutcome { context: ctx, next_group })
  }
}
