// trancode/src/flow/function.rs

//! Executes one function: resolves its inputs from the current snapshot, runs
//! the operation its `functype` names, and binds the outputs into the next
//! snapshot.

use crate::core::context::FlowContext;
use crate::core::transaction::TxHandle;
use crate::core::value::{varmap_to_object, Value, VarMap};
use crate::definition::model::{FunctionDef, InputSource, OutputTarget};
use crate::error::{EngineError, EngineResult};
use crate::flow::FlowServices;
use crate::operation::OperationCall;

use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

pub struct FunctionExecution<'a> {
  trancode: &'a str,
  group: &'a str,
  def: &'a FunctionDef,
  services: &'a FlowServices,
  tx: Option<&'a TxHandle>,
  cancel: &'a CancellationToken,
}

impl<'a> FunctionExecution<'a> {
  pub fn new(
    trancode: &'a str,
    group: &'a str,
    def: &'a FunctionDef,
    services: &'a FlowServices,
    tx: Option<&'a TxHandle>,
    cancel: &'a CancellationToken,
  ) -> Self {
    Self {
      trancode,
      group,
      def,
      services,
      tx,
      cancel,
    }
  }

  /// Runs the function against `ctx` and returns the snapshot that replaces it.
  #[instrument(
        name = "FunctionExecution::execute",
        skip_all,
        fields(function = %self.def.name, functype = %self.def.function_type),
        err(Display)
    )]
  pub async fn execute(&self, ctx: FlowContext) -> EngineResult<FlowContext> {
    let inputs = resolve_inputs(self.def, &ctx)?;

    let operation = self
      .services
      .catalog
      .get(&self.def.function_type)
      .ok_or_else(|| EngineError::OperationNotFound {
        function: self.def.name.clone(),
        operation: self.def.function_type.clone(),
      })?;

    let call = OperationCall {
      trancode: self.trancode.to_string(),
      group: self.group.to_string(),
      function: self.def.clone(),
      inputs,
      context: ctx.clone(),
      tx: self.tx.cloned(),
      cancel: self.cancel.clone(),
      callbacks: self.services.callbacks.clone(),
    };

    event!(Level::TRACE, "Invoking operation.");
    let output = operation
      .invoke(call)
      .await
      .map_err(|source| EngineError::OperationFailed {
        function: self.def.name.clone(),
        source,
      })?;

    let replaced = output.context.is_some();
    let base = output.context.unwrap_or(ctx);
    event!(Level::DEBUG, num_outputs = output.outputs.len(), context_replaced = replaced, "Function finished.");
    Ok(bind_outputs(self.def, base, output.outputs))
  }
}

/// Resolves every declared input against `ctx`. Null counts as absent; the
/// binding's default is used next, and a required input with neither fails.
pub fn resolve_inputs(def: &FunctionDef, ctx: &FlowContext) -> EngineResult<VarMap> {
  let mut resolved = VarMap::new();

  for input in &def.inputs {
    let key = input.key();
    let found = match input.source {
      InputSource::Constant => input.value.clone(),
      InputSource::SystemSession => ctx.system_session().get(key).cloned(),
      InputSource::UserSession => ctx.user_session().get(key).cloned(),
      InputSource::ExternalInputs => ctx.external_inputs().get(key).cloned(),
      InputSource::Prefunction => match key.split_once('.') {
        Some((function, field)) if !field.contains('.') => ctx.cached_field(function, field).cloned(),
        _ => None,
      },
    }
    .filter(|v| !v.is_null());

    let value = match found.or_else(|| input.default_value.clone()) {
      Some(v) => v,
      None if input.required => {
        return Err(EngineError::InputMissing {
          function: def.name.clone(),
          input: input.name.clone(),
        });
      }
      None => {
        event!(Level::TRACE, input = %input.name, "Optional input unresolved; omitted.");
        continue;
      }
    };

    if !input.data_type.accepts(&value) {
      let (expected, found) = input.data_type.describe_mismatch(&value);
      return Err(EngineError::InputTypeMismatch {
        function: def.name.clone(),
        input: input.name.clone(),
        expected,
        found,
      });
    }
    resolved.insert(input.name.clone(), value);
  }

  Ok(resolved)
}

/// Writes declared outputs into their destinations and caches the full output
/// map under the function's name.
fn bind_outputs(def: &FunctionDef, base: FlowContext, outputs: VarMap) -> FlowContext {
  let mut builder = base.into_builder();

  for binding in &def.outputs {
    let Some(value) = outputs.get(&binding.name) else {
      event!(Level::TRACE, output = %binding.name, "Declared output not produced; skipped.");
      continue;
    };
    for target in &binding.destinations {
      builder = match target {
        OutputTarget::UserSession => builder.set_user(binding.key(), value.clone()),
        OutputTarget::ExternalOutputs => builder.set_output(binding.key(), value.clone()),
        OutputTarget::ExternalInputs => builder.set_input(binding.key(), value.clone()),
      };
    }
  }

  let cached: Value = varmap_to_object(&outputs);
  builder.cache_result(def.name.clone(), cached).build()
}
