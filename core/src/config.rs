// trancode/src/config.rs

//! Engine-wide settings.

use crate::core::control::FailurePolicy;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::{event, Level};

pub const DEFAULT_TRANCODE_DIR: &str = "./trancodes";
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Directory the default file loader reads `<name>.json` from.
  pub trancode_dir: PathBuf,
  /// Applied to functions that do not set `onerror` themselves.
  pub on_function_error: FailurePolicy,
  /// Upper bound on group-to-group transitions per flow. `None` is unbounded.
  pub max_group_transitions: Option<usize>,
  /// How many `SubTranCode` levels may run below a top-level execution. `0`
  /// disables nested execution.
  pub max_nesting_depth: usize,
  /// Memoize loaded definitions for the lifetime of the engine.
  pub cache_definitions: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      trancode_dir: PathBuf::from(DEFAULT_TRANCODE_DIR),
      on_function_error: FailurePolicy::Abort,
      max_group_transitions: None,
      max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
      cache_definitions: false,
    }
  }
}

impl EngineConfig {
  /// Load configuration from environment variables, falling back to defaults.
  ///
  /// - `TRANCODE_DIR` - definition directory (default: "./trancodes")
  /// - `TRANCODE_ON_FUNCTION_ERROR` - "abort" or "continue" (default: abort)
  /// - `TRANCODE_MAX_GROUP_TRANSITIONS` - transition limit, 0 for none (default: 0)
  /// - `TRANCODE_MAX_NESTING_DEPTH` - nested execution depth limit (default: 8)
  /// - `TRANCODE_CACHE_DEFINITIONS` - "true"/"1" to cache definitions (default: false)
  pub fn from_env() -> EngineResult<Self> {
    let defaults = Self::default();

    let trancode_dir = env::var("TRANCODE_DIR").map(PathBuf::from).unwrap_or(defaults.trancode_dir);

    let on_function_error = match env::var("TRANCODE_ON_FUNCTION_ERROR") {
      Ok(v) => v
        .parse::<FailurePolicy>()
        .map_err(|e| EngineError::Config(format!("Invalid TRANCODE_ON_FUNCTION_ERROR: {}", e)))?,
      Err(_) => defaults.on_function_error,
    };

    let max_group_transitions = match env::var("TRANCODE_MAX_GROUP_TRANSITIONS") {
      Ok(v) => {
        let limit = v
          .trim()
          .parse::<usize>()
          .map_err(|e| EngineError::Config(format!("Invalid TRANCODE_MAX_GROUP_TRANSITIONS: {}", e)))?;
        (limit > 0).then_some(limit)
      }
      Err(_) => defaults.max_group_transitions,
    };

    let max_nesting_depth = match env::var("TRANCODE_MAX_NESTING_DEPTH") {
      Ok(v) => v
        .trim()
        .parse::<usize>()
        .map_err(|e| EngineError::Config(format!("Invalid TRANCODE_MAX_NESTING_DEPTH: {}", e)))?,
      Err(_) => defaults.max_nesting_depth,
    };

    let cache_definitions = match env::var("TRANCODE_CACHE_DEFINITIONS") {
      Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" | "" => false,
        other => {
          return Err(EngineError::Config(format!(
            "Invalid TRANCODE_CACHE_DEFINITIONS value: {}",
            other
          )))
        }
      },
      Err(_) => defaults.cache_definitions,
    };

    let config = Self {
      trancode_dir,
      on_function_error,
      max_group_transitions,
      max_nesting_depth,
      cache_definitions,
    };
    event!(Level::INFO, config = ?config, "Engine configuration loaded.");
    Ok(config)
  }
}
