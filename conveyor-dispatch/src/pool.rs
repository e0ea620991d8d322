//! Fixed-size worker pool over a bounded intake queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conveyor_backoff::Backoff;
use conveyor_config::BackoffKind;

use crate::gateway::TargetGateway;
use crate::retry::run_retry_loop;
use crate::store::PendingStore;
use crate::types::PendingJob;

/// Worker pool sizing and pacing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub backoff: BackoffKind,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 100,
            backoff: BackoffKind::Sinusoidal,
        }
    }
}

/// A submission the pool could not take. The job is handed back so intake
/// can roll back whatever registration it performed.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("job queue is full")]
    QueueFull(PendingJob),

    #[error("job queue is closed")]
    Closed(PendingJob),
}

impl SubmitError {
    /// Recover the job that was not accepted.
    pub fn into_job(self) -> PendingJob {
        match self {
            Self::QueueFull(job) | Self::Closed(job) => job,
        }
    }
}

/// A fixed number of workers pulling pending jobs from a bounded queue and
/// running each one's retry loop to terminal success.
///
/// Submission is non-blocking: a full queue fails fast so intake can signal
/// backpressure instead of stalling or buffering without bound.
pub struct WorkerPool {
    tx: mpsc::Sender<PendingJob>,
    // Keeps the queue open even with zero workers: without this handle a
    // worker-less pool would drop the sole receiver and close the channel.
    _rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingJob>>>,
    store: PendingStore,
    gateway: Arc<dyn TargetGateway>,
    backoff: BackoffKind,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Launch `config.workers` workers sharing one bounded queue.
    ///
    /// Each worker draws a fresh backoff instance per job so sinusoidal phase
    /// shifts differ across jobs.
    pub fn start(
        config: PoolConfig,
        store: PendingStore,
        gateway: Arc<dyn TargetGateway>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    rx.clone(),
                    store.clone(),
                    gateway.clone(),
                    config.backoff,
                    cancel.clone(),
                ))
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "worker pool started"
        );

        Self {
            tx,
            _rx: rx,
            store,
            gateway,
            backoff: config.backoff,
            cancel,
            workers: Mutex::new(workers),
        }
    }

    /// Non-blocking enqueue. A full queue is backpressure, not a retry: the
    /// job is returned to the caller untouched.
    pub fn submit(&self, pending: PendingJob) -> Result<(), SubmitError> {
        self.tx.try_send(pending).map_err(|err| match err {
            TrySendError::Full(job) => SubmitError::QueueFull(job),
            TrySendError::Closed(job) => SubmitError::Closed(job),
        })
    }

    /// Run a restored job's retry loop on its own task, bypassing the intake
    /// queue. A snapshot may hold more jobs than the queue has capacity, and
    /// every restored job must get a loop, so resumption cannot go through
    /// `submit`. The task is tracked with the workers and honors the same
    /// cancellation and shutdown grace.
    pub fn resume(&self, pending: PendingJob) {
        debug!(uid = %pending.job.uid, attempts = pending.attempts, "resuming restored job");
        let handle = tokio::spawn(run_retry_loop(
            pending,
            self.store.clone(),
            self.gateway.clone(),
            make_backoff(self.backoff),
            self.cancel.clone(),
        ));
        self.workers
            .lock()
            .expect("worker handle lock poisoned")
            .push(handle);
    }

    /// Signal every worker and in-flight retry loop to stop, then wait up to
    /// `grace` for them to finish. Loops still running afterwards are
    /// abandoned; their state is already captured in the store.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker handle lock poisoned");
            workers.drain(..).collect()
        };
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(grace_secs = grace.as_secs(), "workers still busy after grace period; abandoning");
        }
    }
}

async fn worker(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingJob>>>,
    store: PendingStore,
    gateway: Arc<dyn TargetGateway>,
    backoff: BackoffKind,
    cancel: CancellationToken,
) {
    loop {
        let pending = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = rx.recv() => match received {
                    Some(pending) => pending,
                    None => return,
                },
            }
        };

        debug!(worker = id, uid = %pending.job.uid, "job picked up");
        run_retry_loop(
            pending,
            store.clone(),
            gateway.clone(),
            make_backoff(backoff),
            cancel.clone(),
        )
        .await;
    }
}

fn make_backoff(kind: BackoffKind) -> Backoff {
    match kind {
        BackoffKind::Exponential => Backoff::exponential(),
        BackoffKind::Sinusoidal => Backoff::sinusoidal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::types::Job;
    use async_trait::async_trait;
    use serde_json::json;

    fn job_for(uid: &str) -> Job {
        Job {
            uid: uid.to_string(),
            data: json!({}),
            content_type: None,
        }
    }

    fn pending(uid: &str) -> PendingJob {
        PendingJob::new(job_for(uid))
    }

    struct AlwaysWritable;

    #[async_trait]
    impl TargetGateway for AlwaysWritable {
        async fn check_writable(&self, _job: &Job) -> Result<bool, GatewayError> {
            Ok(true)
        }
        async fn write_data(&self, _job: &Job) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    struct NeverWritable;

    #[async_trait]
    impl TargetGateway for NeverWritable {
        async fn check_writable(&self, _job: &Job) -> Result<bool, GatewayError> {
            Ok(false)
        }
        async fn write_data(&self, _job: &Job) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_rejects_submission_and_returns_the_job() {
        // No workers: the queue fills deterministically.
        let pool = WorkerPool::start(
            PoolConfig {
                workers: 0,
                queue_capacity: 2,
                backoff: BackoffKind::Exponential,
            },
            PendingStore::new(),
            Arc::new(AlwaysWritable),
            CancellationToken::new(),
        );

        assert!(pool.submit(pending("a")).is_ok());
        assert!(pool.submit(pending("b")).is_ok());
        let err = pool.submit(pending("c")).unwrap_err();
        match err {
            SubmitError::QueueFull(job) => assert_eq!(job.job.uid, "c"),
            other => panic!("expected QueueFull, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn workers_drain_the_queue_to_completion() {
        let store = PendingStore::new();
        let pool = WorkerPool::start(
            PoolConfig {
                workers: 2,
                queue_capacity: 10,
                backoff: BackoffKind::Exponential,
            },
            store.clone(),
            Arc::new(AlwaysWritable),
            CancellationToken::new(),
        );

        for uid in ["a", "b", "c"] {
            pool.submit(store.add(job_for(uid)).unwrap()).unwrap();
        }

        while !store.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_jobs_run_even_when_the_queue_is_full() {
        let store = PendingStore::new();
        // No workers and a single queue slot: submitted jobs cannot run.
        let pool = WorkerPool::start(
            PoolConfig {
                workers: 0,
                queue_capacity: 1,
                backoff: BackoffKind::Exponential,
            },
            store.clone(),
            Arc::new(AlwaysWritable),
            CancellationToken::new(),
        );

        let queued = store.add(job_for("queued")).unwrap();
        pool.submit(queued).unwrap();

        for uid in ["restored-1", "restored-2"] {
            let p = store.add(job_for(uid)).unwrap();
            pool.resume(p);
        }

        // Both resumed loops complete; the queued job has no worker and stays.
        while store.len() > 1 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(store.contains("queued"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_workers_within_grace() {
        let store = PendingStore::new();
        let pool = WorkerPool::start(
            PoolConfig {
                workers: 1,
                queue_capacity: 10,
                backoff: BackoffKind::Exponential,
            },
            store.clone(),
            Arc::new(NeverWritable),
            CancellationToken::new(),
        );

        let p = store.add(job_for("stuck")).unwrap();
        pool.submit(p).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        pool.shutdown(Duration::from_secs(5)).await;

        // The unfinished job survives for the shutdown snapshot.
        assert_eq!(store.len(), 1);
    }
}
