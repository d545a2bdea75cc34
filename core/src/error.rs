// trancode/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Coarse classification of an [`EngineError`], used by callers that only care
/// about the category (e.g. an HTTP layer choosing a status code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  DefinitionNotFound,
  Deserialization,
  TransactionBeginFailed,
  TransactionCommitFailed,
  CallbackNotFound,
  InvalidCallback,
  FunctionFailed,
  Configuration,
  Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("Transaction code not found: {name}")]
  TranCodeNotFound { name: String },

  #[error("Function group '{group}' not found in transaction code '{trancode}'")]
  FunctionGroupNotFound { trancode: String, group: String },

  #[error("Failed to deserialize transaction code from {source_label}: {message}")]
  Deserialization { source_label: String, message: String },

  #[error("Invalid transaction code '{trancode}': {message}")]
  InvalidDefinition { trancode: String, message: String },

  #[error("Failed to begin database transaction. Source: {source}")]
  TransactionBegin {
    #[source]
    source: AnyhowError,
  },

  #[error("Failed to commit database transaction. Source: {source}")]
  TransactionCommit {
    #[source]
    source: AnyhowError,
  },

  #[error("No callback registered under key '{key}'")]
  CallbackNotFound { key: String },

  #[error("Invalid callback '{key}': {message}")]
  InvalidCallback { key: String, message: String },

  #[error("Callback '{key}' failed. Source: {source}")]
  CallbackFailed {
    key: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Function '{function}' refers to unknown operation type '{operation}'")]
  OperationNotFound { function: String, operation: String },

  #[error("Required input '{input}' of function '{function}' could not be resolved")]
  InputMissing { function: String, input: String },

  #[error("Input '{input}' of function '{function}' expected {expected}, found {found}")]
  InputTypeMismatch {
    function: String,
    input: String,
    expected: String,
    found: String,
  },

  #[error("Operation of function '{function}' failed. Source: {source}")]
  OperationFailed {
    function: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Function '{function}' in group '{group}' failed: {source}")]
  FunctionFailed {
    group: String,
    function: String,
    #[source]
    source: Box<EngineError>,
  },

  #[error("Transaction code '{trancode}' exceeded {limit} function group transitions")]
  GroupTransitionLimit { trancode: String, limit: usize },

  #[error("Nested execution of '{trancode}' exceeded the nesting depth limit of {limit}")]
  NestingDepthExceeded { trancode: String, limit: usize },

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Error in user-provided handler or external operation. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal engine error: {0}")]
  Internal(String),
}

impl EngineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::TranCodeNotFound { .. } | EngineError::FunctionGroupNotFound { .. } => {
        ErrorKind::DefinitionNotFound
      }
      EngineError::Deserialization { .. } | EngineError::InvalidDefinition { .. } => ErrorKind::Deserialization,
      EngineError::TransactionBegin { .. } => ErrorKind::TransactionBeginFailed,
      EngineError::TransactionCommit { .. } => ErrorKind::TransactionCommitFailed,
      EngineError::CallbackNotFound { .. } => ErrorKind::CallbackNotFound,
      EngineError::InvalidCallback { .. } => ErrorKind::InvalidCallback,
      EngineError::CallbackFailed { .. }
      | EngineError::OperationNotFound { .. }
      | EngineError::InputMissing { .. }
      | EngineError::InputTypeMismatch { .. }
      | EngineError::OperationFailed { .. }
      | EngineError::FunctionFailed { .. } => ErrorKind::FunctionFailed,
      EngineError::Config(_) => ErrorKind::Configuration,
      EngineError::GroupTransitionLimit { .. }
      | EngineError::NestingDepthExceeded { .. }
      | EngineError::HandlerError { .. }
      | EngineError::Internal(_) => ErrorKind::Internal,
    }
  }

  /// True when the failure was caused by the request itself (unknown or malformed
  /// definition) rather than by executing it.
  pub fn is_client_error(&self) -> bool {
    matches!(self.kind(), ErrorKind::DefinitionNotFound | ErrorKind::Deserialization)
  }

  /// Walks through `FunctionFailed` wrappers to the error raised by the function itself.
  pub fn root_cause(&self) -> &EngineError {
    match self {
      EngineError::FunctionFailed { source, .. } => source.root_cause(),
      other => other,
    }
  }
}

impl From<AnyhowError> for EngineError {
  fn from(err: AnyhowError) -> Self {
    // An EngineError that travelled through anyhow (e.g. from a nested flow
    // invoked by a callback) is not Clone, so it stays wrapped.
    EngineError::HandlerError { source: err }
  }
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;
