// trancode/src/core/transaction.rs

//! Database transaction collaborator. The engine never queries through a
//! transaction; it only begins, commits or rolls back one it owns and hands the
//! handle to operations.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, Level};

/// A live relational database transaction.
///
/// An owning flow calls exactly one of `commit` or `rollback`. When `commit`
/// fails the flow reports the error and does not roll back, so the
/// implementation decides what a failed commit leaves behind.
#[async_trait]
pub trait DbTransaction: Send + Sync {
  async fn commit(&self) -> anyhow::Result<()>;
  async fn rollback(&self) -> anyhow::Result<()>;
}

/// Shared handle threaded from the flow to every operation of one execution.
pub type TxHandle = Arc<dyn DbTransaction>;

/// Opens new transactions for flows that were not given one by their caller.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
  async fn begin(&self) -> anyhow::Result<TxHandle>;
}

/// Provider for hosts whose transaction codes never touch a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransactionProvider;

#[derive(Debug, Clone, Copy, Default)]
struct NoopTransaction;

#[async_trait]
impl DbTransaction for NoopTransaction {
  async fn commit(&self) -> anyhow::Result<()> {
    event!(Level::TRACE, "noop transaction committed");
    Ok(())
  }

  async fn rollback(&self) -> anyhow::Result<()> {
    event!(Level::TRACE, "noop transaction rolled back");
    Ok(())
  }
}

#[async_trait]
impl TransactionProvider for NoopTransactionProvider {
  async fn begin(&self) -> anyhow::Result<TxHandle> {
    Ok(Arc::new(NoopTransaction))
  }
}
