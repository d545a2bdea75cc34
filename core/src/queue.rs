// trancode/src/queue.rs

//! Defines `JobQueue`, an in-process consumer that runs queued messages as
//! transaction codes, retries failures and records every attempt.

use crate::core::value::{object_to_varmap, Value, VarMap};
use crate::engine::{ExecutionRequest, TranCodeEngine};
use crate::history::{HistorySink, JobHistory, JobStatus};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

/// A unit of queued work. `handler` is the transaction code that processes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
  pub id: Uuid,
  pub topic: String,
  pub payload: Value,
  pub handler: String,
  /// Total attempts allowed.
  pub retry: u32,
  /// Failed attempts so far.
  #[serde(default)]
  pub execute: u32,
}

impl QueueMessage {
  pub fn new(topic: impl Into<String>, handler: impl Into<String>, payload: Value, retry: u32) -> Self {
    Self {
      id: Uuid::new_v4(),
      topic: topic.into(),
      payload,
      handler: handler.into(),
      retry,
      execute: 0,
    }
  }
}

/// Result of one `process_next` call.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
  pub message_id: Uuid,
  pub status: JobStatus,
  pub outputs: Option<VarMap>,
  pub error: Option<String>,
}

pub struct JobQueue {
  engine: Arc<TranCodeEngine>,
  history: Arc<dyn HistorySink>,
  pending: Mutex<VecDeque<QueueMessage>>,
}

impl JobQueue {
  pub fn new(engine: Arc<TranCodeEngine>, history: Arc<dyn HistorySink>) -> Self {
    Self {
      engine,
      history,
      pending: Mutex::new(VecDeque::new()),
    }
  }

  pub fn push(&self, message: QueueMessage) {
    event!(Level::DEBUG, message_id = %message.id, topic = %message.topic, handler = %message.handler, "Message enqueued.");
    self.pending.lock().push_back(message);
  }

  pub fn len(&self) -> usize {
    self.pending.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.lock().is_empty()
  }

  /// Takes the front message and runs its handler with the payload as external
  /// inputs. A failed message goes to the back of the queue while it has
  /// attempts left. Returns `None` when the queue is empty.
  #[instrument(name = "JobQueue::process_next", skip(self))]
  pub async fn process_next(&self) -> Option<JobOutcome> {
    let mut message = self.pending.lock().pop_front()?;

    let inputs = object_to_varmap(message.payload.clone(), "payload");
    let request = ExecutionRequest::new(message.handler.clone()).with_inputs(inputs);
    let result = self.engine.execute(request).await;

    let outcome = match result {
      Ok(outputs) => {
        event!(Level::INFO, message_id = %message.id, handler = %message.handler, "Job succeeded.");
        JobOutcome {
          message_id: message.id,
          status: JobStatus::Succeeded,
          outputs: Some(outputs),
          error: None,
        }
      }
      Err(e) => {
        message.execute += 1;
        let status = if message.execute < message.retry {
          JobStatus::Retrying
        } else {
          JobStatus::Failed
        };
        event!(
          Level::WARN,
          message_id = %message.id,
          handler = %message.handler,
          attempt = message.execute,
          retry = message.retry,
          status = ?status,
          error = %e,
          "Job failed."
        );
        JobOutcome {
          message_id: message.id,
          status,
          outputs: None,
          error: Some(e.to_string()),
        }
      }
    };

    let entry = JobHistory {
      message_id: message.id,
      topic: message.topic.clone(),
      handler: message.handler.clone(),
      status: outcome.status,
      execute_count: message.execute,
      outputs: outcome.outputs.clone(),
      error: outcome.error.clone(),
      recorded_at: Utc::now(),
    };
    if let Err(e) = self.history.record(entry).await {
      event!(Level::ERROR, message_id = %message.id, error = %e, "Failed to record job history.");
    }

    if outcome.status == JobStatus::Retrying {
      self.pending.lock().push_back(message);
    }
    Some(outcome)
  }

  /// Processes messages until the queue is empty, including retries.
  pub async fn drain(&self) -> Vec<JobOutcome> {
    let mut outcomes = Vec::new();
    while let Some(outcome) = self.process_next().await {
      outcomes.push(outcome);
    }
    outcomes
  }
}

impl std::fmt::Debug for JobQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("JobQueue").field("pending", &self.len()).finish()
  }
}
