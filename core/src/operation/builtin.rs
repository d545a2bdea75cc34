// trancode/src/operation/builtin.rs

//! Operations every catalog built with `OperationCatalog::with_builtins` knows.

use crate::callback::TRANCODE_EXECUTE_CALLBACK;
use crate::core::value::Value;
use crate::operation::{Operation, OperationCall, OperationCatalog, OperationOutput};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, Level};

pub const INPUT_MAP: &str = "InputMap";
pub const SUB_TRANCODE: &str = "SubTranCode";
pub const CALLBACK: &str = "Callback";
pub const THROW_ERROR: &str = "ThrowError";

pub(crate) fn register_builtins(catalog: &mut OperationCatalog) {
  catalog.register(INPUT_MAP, Arc::new(InputMap));
  catalog.register(SUB_TRANCODE, Arc::new(SubTranCode));
  catalog.register(CALLBACK, Arc::new(Callback));
  catalog.register(THROW_ERROR, Arc::new(ThrowError));
}

/// Passes its resolved inputs through as outputs. Used to copy and rename
/// values between context classes, or to assign constants.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputMap;

#[async_trait]
impl Operation for InputMap {
  async fn invoke(&self, call: OperationCall) -> anyhow::Result<OperationOutput> {
    Ok(OperationOutput::new(call.inputs))
  }
}

/// Runs another transaction code inside the current database transaction.
///
/// The child code is named by `content`, or by a `trancode` input when
/// `content` is empty. The child's external outputs become this function's
/// outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubTranCode;

#[async_trait]
impl Operation for SubTranCode {
  async fn invoke(&self, call: OperationCall) -> anyhow::Result<OperationOutput> {
    let mut inputs = call.inputs;
    let child = if call.function.content.is_empty() {
      match inputs.remove("trancode") {
        Some(Value::String(name)) => name,
        _ => bail!("function '{}' names no child transaction code", call.function.name),
      }
    } else {
      call.function.content.clone()
    };

    event!(Level::DEBUG, parent = %call.trancode, child = %child, "Executing nested transaction code.");
    let outputs = call
      .callbacks
      .invoke(TRANCODE_EXECUTE_CALLBACK, &child, Some(inputs), Some(call.cancel), call.tx)
      .await?;
    Ok(OperationOutput::new(outputs))
  }
}

/// Invokes the callback whose key is the function's `content`, passing the
/// current transaction-code name and the resolved inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Callback;

#[async_trait]
impl Operation for Callback {
  async fn invoke(&self, call: OperationCall) -> anyhow::Result<OperationOutput> {
    if call.function.content.is_empty() {
      bail!("function '{}' names no callback key", call.function.name);
    }
    let outputs = call
      .callbacks
      .invoke(
        &call.function.content,
        &call.trancode,
        Some(call.inputs),
        Some(call.cancel),
        call.tx,
      )
      .await?;
    Ok(OperationOutput::new(outputs))
  }
}

/// Always fails. The message is the `message` input if it is a string,
/// otherwise the function's `content`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrowError;

#[async_trait]
impl Operation for ThrowError {
  async fn invoke(&self, call: OperationCall) -> anyhow::Result<OperationOutput> {
    let message = match call.inputs.get("message") {
      Some(Value::String(m)) => m.clone(),
      _ if !call.function.content.is_empty() => call.function.content.clone(),
      _ => format!("error raised by function '{}'", call.function.name),
    };
    Err(anyhow!(message))
  }
}
