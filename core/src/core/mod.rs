pub mod context;
pub mod control;
pub mod transaction;
pub mod value;

// Re-export key types for easier access from other modules (and lib.rs)
pub use context::{ContextBuilder, FlowContext};
pub use control::{FailurePolicy, GroupOutcome};
pub use transaction::{DbTransaction, NoopTransactionProvider, TransactionProvider, TxHandle};
pub use value::{Value, VarClass, VarMap};
