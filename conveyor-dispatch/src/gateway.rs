//! The seam between the retry engine and the remote target system.

use async_trait::async_trait;

use crate::types::Job;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by a [`TargetGateway`] call.
///
/// Every variant is handled the same way by the retry loop (log, count a
/// failed attempt, reschedule); the split exists for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("auth header unavailable: {0}")]
    Auth(#[source] BoxError),

    #[error("payload could not be encoded: {0}")]
    Serialization(String),
}

impl GatewayError {
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    pub fn auth(err: impl Into<BoxError>) -> Self {
        Self::Auth(err.into())
    }
}

/// Remote calls the retry engine performs against the target system.
///
/// "Not found" and "currently blocked" are both reported as `Ok(false)` by
/// [`check_writable`](Self::check_writable); only genuine transport or
/// protocol failures are errors.
#[async_trait]
pub trait TargetGateway: Send + Sync {
    /// Ask the target whether `job`'s object currently accepts writes.
    async fn check_writable(&self, job: &Job) -> Result<bool, GatewayError>;

    /// Deliver the job's payload to the target's write endpoint.
    async fn write_data(&self, job: &Job) -> Result<(), GatewayError>;

    /// Resolve the object's current revision, when the target supports it.
    ///
    /// `Ok(None)` means the lookup yielded nothing usable (object missing or
    /// blocked); the engine proceeds with the uid it already has.
    async fn latest_revision(&self, _job: &Job) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }

    /// Whether the engine should resolve revisions before each check.
    fn has_revision_lookup(&self) -> bool {
        false
    }
}
