// src/lib.rs

//! TranCode: an async, declarative transaction-flow engine.
//!
//! A transaction code is a JSON definition made of named function groups.
//! Executing one:
//!  - runs the functions of the current group in order, each one resolving its
//!    inputs from the flow's variable classes and binding its outputs back;
//!  - evaluates the group's router against a session variable or a prior
//!    function's output to pick the next group;
//!  - stops when the router names a group the definition does not have;
//!  - keeps the whole run inside one database transaction, either owned by the
//!    flow (begin, then commit or roll back) or joined from the caller.
//!
//! Functions are implemented by `Operation`s looked up in an
//! `OperationCatalog`, and can reach host code through a `CallbackRegistry`.
//! Nested transaction codes run through the `TranCode_Execute` callback that
//! `TranCodeEngine` registers.

pub mod callback;
pub mod config;
pub mod core;
pub mod definition;
pub mod engine;
pub mod error;
pub mod flow;
pub mod history;
pub mod operation;
pub mod queue;

// --- Re-exports for the Public API ---

pub use crate::core::context::{ContextBuilder, FlowContext};
pub use crate::core::control::{FailurePolicy, GroupOutcome};
pub use crate::core::transaction::{DbTransaction, NoopTransactionProvider, TransactionProvider, TxHandle};
pub use crate::core::value::{Value, VarClass, VarMap};

pub use crate::definition::loader::{
  CachingLoader, DefinitionLoader, DocumentStore, DocumentStoreLoader, FileDefinitionLoader, InMemoryDocumentStore,
};
pub use crate::definition::model::{
  DataType, FunctionDef, FunctionGroupDef, InputBinding, InputSource, OutputBinding, OutputTarget, RouterDef,
  TransactionCode,
};

pub use crate::callback::{CallbackHandler, CallbackRegistry, TRANCODE_EXECUTE_CALLBACK};
pub use crate::operation::{Operation, OperationCall, OperationCatalog, OperationOutput};

pub use crate::flow::{FlowServices, TransactionFlow};

pub use crate::config::EngineConfig;
pub use crate::engine::{EngineBuilder, ExecutionRequest, TranCodeEngine};
pub use crate::error::{EngineError, EngineResult, ErrorKind};

pub use crate::history::{HistorySink, InMemoryHistorySink, JobHistory, JobStatus};
pub use crate::queue::{JobOutcome, JobQueue, QueueMessage};

// Cancellation tokens appear in callback and operation signatures.
pub use tokio_util::sync::CancellationToken;
