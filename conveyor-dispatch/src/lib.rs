//! Pending-job registry, worker pool and retry engine.
//!
//! This crate is the core of the conveyor delivery service:
//!
//! - [`Job`] / [`PendingJob`] - the unit of work and its in-flight record
//! - [`PendingStore`] - the authoritative, mutex-guarded collection of
//!   outstanding jobs, shared by intake, workers and persistence
//! - [`TargetGateway`] - the seam through which the engine talks to the
//!   remote target system
//! - [`WorkerPool`] - a fixed number of workers pulling jobs from a bounded
//!   queue and driving each one's retry loop to terminal success
//!
//! The engine guarantees at-most-one active retry loop per job uid, bounded
//! concurrency, and fail-fast backpressure when the intake queue is full.

mod gateway;
mod pool;
mod retry;
mod store;
mod types;

pub use gateway::{GatewayError, TargetGateway};
pub use pool::{PoolConfig, SubmitError, WorkerPool};
pub use retry::run_retry_loop;
pub use store::PendingStore;
pub use types::{Job, PendingJob};

// Re-export async_trait for convenience when implementing TargetGateway
pub use async_trait::async_trait;
