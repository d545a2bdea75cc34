// trancode/src/core/context.rs

//! Defines `FlowContext`, the immutable snapshot of every variable class a
//! flow threads from function to function, and `ContextBuilder`, the only way
//! to derive a new snapshot.
//!
//! A function never edits the snapshot it was given. It hands back a new one
//! and the caller replaces its own wholesale, so a key the function left out
//! is gone afterwards.

use crate::core::value::{Value, VarClass, VarMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowContext {
  system_session: VarMap,
  user_session: VarMap,
  external_inputs: VarMap,
  external_outputs: VarMap,
  func_cached: VarMap,
}

impl FlowContext {
  pub fn builder() -> ContextBuilder {
    ContextBuilder::default()
  }

  /// Starts a builder seeded with this snapshot's maps.
  pub fn into_builder(self) -> ContextBuilder {
    ContextBuilder { ctx: self }
  }

  pub fn system_session(&self) -> &VarMap {
    &self.system_session
  }

  pub fn user_session(&self) -> &VarMap {
    &self.user_session
  }

  pub fn external_inputs(&self) -> &VarMap {
    &self.external_inputs
  }

  pub fn external_outputs(&self) -> &VarMap {
    &self.external_outputs
  }

  pub fn func_cached(&self) -> &VarMap {
    &self.func_cached
  }

  /// The session map for a router class. `FuncCachedVariables` maps function
  /// names to their cached results.
  pub fn class(&self, class: VarClass) -> &VarMap {
    match class {
      VarClass::SystemSession => &self.system_session,
      VarClass::UserSession => &self.user_session,
      VarClass::FuncCachedVariables => &self.func_cached,
    }
  }

  /// Reads `<function>.<field>` from the function cache.
  pub fn cached_field(&self, function: &str, field: &str) -> Option<&Value> {
    self.func_cached.get(function).and_then(|v| v.get(field))
  }

  pub fn into_external_outputs(self) -> VarMap {
    self.external_outputs
  }
}

/// Accumulates changes for the next [`FlowContext`]. Whole-map setters replace,
/// key setters insert or remove a single entry.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
  ctx: FlowContext,
}

impl ContextBuilder {
  pub fn system_session(mut self, map: VarMap) -> Self {
    self.ctx.system_session = map;
    self
  }

  pub fn user_session(mut self, map: VarMap) -> Self {
    self.ctx.user_session = map;
    self
  }

  pub fn external_inputs(mut self, map: VarMap) -> Self {
    self.ctx.external_inputs = map;
    self
  }

  pub fn external_outputs(mut self, map: VarMap) -> Self {
    self.ctx.external_outputs = map;
    self
  }

  pub fn func_cached(mut self, map: VarMap) -> Self {
    self.ctx.func_cached = map;
    self
  }

  pub fn set_system(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.ctx.system_session.insert(key.into(), value.into());
    self
  }

  pub fn set_user(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.ctx.user_session.insert(key.into(), value.into());
    self
  }

  pub fn set_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.ctx.external_inputs.insert(key.into(), value.into());
    self
  }

  pub fn set_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.ctx.external_outputs.insert(key.into(), value.into());
    self
  }

  pub fn remove_user(mut self, key: &str) -> Self {
    self.ctx.user_session.remove(key);
    self
  }

  pub fn remove_output(mut self, key: &str) -> Self {
    self.ctx.external_outputs.remove(key);
    self
  }

  pub fn cache_result(mut self, function: impl Into<String>, value: impl Into<Value>) -> Self {
    self.ctx.func_cached.insert(function.into(), value.into());
    self
  }

  pub fn build(self) -> FlowContext {
    self.ctx
  }
}
