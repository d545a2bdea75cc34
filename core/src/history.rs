// trancode/src/history.rs

//! Execution history for queued jobs.

use crate::core::value::VarMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Succeeded,
  /// Failed, but re-enqueued for another attempt.
  Retrying,
  /// Failed and out of attempts.
  Failed,
}

/// One attempt at processing a queue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHistory {
  pub message_id: Uuid,
  pub topic: String,
  pub handler: String,
  pub status: JobStatus,
  /// Failed attempts so far, including this one when it failed.
  pub execute_count: u32,
  pub outputs: Option<VarMap>,
  pub error: Option<String>,
  pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistorySink: Send + Sync {
  async fn record(&self, entry: JobHistory) -> anyhow::Result<()>;
}

/// Keeps every entry in memory, in recording order.
#[derive(Debug, Default)]
pub struct InMemoryHistorySink {
  entries: Mutex<Vec<JobHistory>>,
}

impl InMemoryHistorySink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> Vec<JobHistory> {
    self.entries.lock().clone()
  }

  pub fn records_for(&self, message_id: Uuid) -> Vec<JobHistory> {
    self
      .entries
      .lock()
      .iter()
      .filter(|e| e.message_id == message_id)
      .cloned()
      .collect()
  }
}

#[async_trait]
impl HistorySink for InMemoryHistorySink {
  async fn record(&self, entry: JobHistory) -> anyhow::Result<()> {
    self.entries.lock().push(entry);
    Ok(())
  }
}
