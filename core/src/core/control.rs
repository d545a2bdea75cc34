// trancode/src/core/control.rs

//! Signals that steer a flow: what to do when a function fails, and what a
//! function group hands back to the flow.

use crate::core::context::FlowContext;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a function group does when one of its functions returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
  /// Stop the group and fail the flow. An owned transaction is rolled back.
  #[default]
  Abort,
  /// Record the failure in the function cache and run the next function.
  Continue,
}

impl FromStr for FailurePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "abort" => Ok(FailurePolicy::Abort),
      "continue" => Ok(FailurePolicy::Continue),
      other => Err(format!("unknown failure policy '{}', expected 'abort' or 'continue'", other)),
    }
  }
}

/// Result of running one function group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
  /// Snapshot after the last function of the group.
  pub context: FlowContext,
  /// Router decision. The flow stops when no group carries this name.
  pub next_group: String,
}
