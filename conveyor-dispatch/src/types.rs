//! Core types for the delivery engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work: a remote object and the payload to deliver to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Identifies the remote object. May be rewritten mid-flight when a
    /// revision lookup resolves the object's current revision.
    pub uid: String,
    /// Opaque payload forwarded to the target's write endpoint.
    #[serde(default)]
    pub data: Value,
    /// Selects the wire encoding used when writing ("json" or "xml").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A job plus the bookkeeping the retry engine needs.
///
/// Created when intake accepts a job or persisted state is replayed;
/// destroyed exactly when a write succeeds. Failures only advance
/// `attempts` and reschedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingJob {
    pub job: Job,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl PendingJob {
    /// Wrap a freshly accepted job with `attempts = 0`.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}
