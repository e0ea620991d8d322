//! The per-job retry loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conveyor_backoff::Backoff;

use crate::gateway::TargetGateway;
use crate::store::PendingStore;
use crate::types::PendingJob;

/// Drive one pending job to terminal success.
///
/// Each iteration sleeps for the backoff delay, optionally resolves the
/// object's latest revision, checks writability, and writes. Any failure
/// advances the attempt counter and reschedules; there is no maximum attempt
/// count and no terminal failure state. Cancellation abandons the loop; the
/// job's state survives in the store for the shutdown snapshot.
pub async fn run_retry_loop(
    mut pending: PendingJob,
    store: PendingStore,
    gateway: Arc<dyn TargetGateway>,
    backoff: Backoff,
    cancel: CancellationToken,
) {
    // Store entries stay keyed by the uid the job was registered under, even
    // when a revision lookup rewrites the wire uid.
    let registered_uid = pending.job.uid.clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(uid = %registered_uid, attempts = pending.attempts, "retry loop abandoned at shutdown");
                return;
            }
            _ = tokio::time::sleep(backoff.delay(pending.attempts)) => {}
        }

        if gateway.has_revision_lookup() {
            match gateway.latest_revision(&pending.job).await {
                Ok(Some(revision)) => pending.job.uid = revision,
                Ok(None) => {}
                Err(err) => {
                    warn!(uid = %pending.job.uid, error = %err, "revision lookup failed");
                    fail_attempt(&mut pending, &store, &registered_uid);
                    continue;
                }
            }
        }

        match gateway.check_writable(&pending.job).await {
            Err(err) => {
                warn!(uid = %pending.job.uid, error = %err, "writability check failed");
                fail_attempt(&mut pending, &store, &registered_uid);
                continue;
            }
            Ok(false) => {
                debug!(uid = %pending.job.uid, attempts = pending.attempts, "object not writable yet");
                fail_attempt(&mut pending, &store, &registered_uid);
                continue;
            }
            Ok(true) => {}
        }

        match gateway.write_data(&pending.job).await {
            Err(err) => {
                warn!(uid = %pending.job.uid, error = %err, "write failed");
                fail_attempt(&mut pending, &store, &registered_uid);
            }
            Ok(()) => {
                info!(uid = %pending.job.uid, attempts = pending.attempts, "payload delivered");
                store.remove(&registered_uid);
                return;
            }
        }
    }
}

fn fail_attempt(pending: &mut PendingJob, store: &PendingStore, registered_uid: &str) {
    pending.attempts += 1;
    store.set_attempts(registered_uid, pending.attempts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::types::Job;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn job(uid: &str) -> Job {
        Job {
            uid: uid.to_string(),
            data: json!({"k": "v"}),
            content_type: None,
        }
    }

    /// Scripted gateway: pops one outcome per check, counts writes.
    #[derive(Default)]
    struct ScriptedGateway {
        // outcomes consumed front-to-back; empties mean "writable"
        check_outcomes: Mutex<Vec<Result<bool, GatewayError>>>,
        write_outcomes: Mutex<Vec<Result<(), GatewayError>>>,
        checks: AtomicU32,
        writes: AtomicU32,
        revision: Option<String>,
    }

    #[async_trait]
    impl TargetGateway for ScriptedGateway {
        async fn check_writable(&self, _job: &Job) -> Result<bool, GatewayError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.check_outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(true)
            } else {
                outcomes.remove(0)
            }
        }

        async fn write_data(&self, _job: &Job) -> Result<(), GatewayError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.write_outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(())
            } else {
                outcomes.remove(0)
            }
        }

        async fn latest_revision(&self, _job: &Job) -> Result<Option<String>, GatewayError> {
            Ok(self.revision.clone())
        }

        fn has_revision_lookup(&self) -> bool {
            self.revision.is_some()
        }
    }

    fn rejection() -> GatewayError {
        GatewayError::Rejected {
            status: 500,
            body: "boom".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_write_removes_job_and_terminates() {
        let store = PendingStore::new();
        let pending = store.add(job("a")).unwrap();
        let gateway = Arc::new(ScriptedGateway::default());

        run_retry_loop(
            pending,
            store.clone(),
            gateway.clone(),
            Backoff::exponential(),
            CancellationToken::new(),
        )
        .await;

        assert!(store.is_empty());
        assert_eq!(gateway.checks.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_cycles_advance_attempts_before_success() {
        let store = PendingStore::new();
        let pending = store.add(job("b")).unwrap();
        let gateway = Arc::new(ScriptedGateway {
            check_outcomes: Mutex::new(vec![Ok(false), Ok(false)]),
            ..ScriptedGateway::default()
        });

        // Observe the mirrored attempt counts while the loop runs.
        let handle = tokio::spawn(run_retry_loop(
            pending,
            store.clone(),
            gateway.clone(),
            Backoff::exponential(),
            CancellationToken::new(),
        ));
        handle.await.unwrap();

        assert!(store.is_empty());
        assert_eq!(gateway.checks.load(Ordering::SeqCst), 3);
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_retried_until_success() {
        let store = PendingStore::new();
        let pending = store.add(job("c")).unwrap();
        let gateway = Arc::new(ScriptedGateway {
            write_outcomes: Mutex::new(vec![Err(rejection())]),
            ..ScriptedGateway::default()
        });

        run_retry_loop(
            pending,
            store.clone(),
            gateway.clone(),
            Backoff::exponential(),
            CancellationToken::new(),
        )
        .await;

        assert!(store.is_empty());
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_count_as_failed_attempts() {
        let store = PendingStore::new();
        let pending = store.add(job("d")).unwrap();
        let gateway = Arc::new(ScriptedGateway {
            check_outcomes: Mutex::new(vec![
                Err(GatewayError::transport(std::io::Error::other("conn refused"))),
                Ok(false),
            ]),
            ..ScriptedGateway::default()
        });

        run_retry_loop(
            pending,
            store.clone(),
            gateway.clone(),
            Backoff::exponential(),
            CancellationToken::new(),
        )
        .await;

        assert!(store.is_empty());
        // transport error + not-writable + success
        assert_eq!(gateway.checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_mirrored_into_the_store() {
        let store = PendingStore::new();
        let pending = store.add(job("e")).unwrap();
        let gateway = Arc::new(ScriptedGateway {
            check_outcomes: Mutex::new(vec![Ok(false), Ok(false), Ok(false)]),
            ..ScriptedGateway::default()
        });
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_retry_loop(
            pending,
            store.clone(),
            gateway,
            Backoff::exponential(),
            cancel.clone(),
        ));

        // Wait until the third failed cycle has been recorded.
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let snap = store.snapshot();
            if snap.is_empty() || snap[0].attempts >= 3 {
                break;
            }
        }
        handle.await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn revision_lookup_rewrites_wire_uid_but_not_store_key() {
        let store = PendingStore::new();
        let pending = store.add(job("stale-uid")).unwrap();
        let gateway = Arc::new(ScriptedGateway {
            revision: Some("fresh-uid".into()),
            ..ScriptedGateway::default()
        });

        run_retry_loop(
            pending,
            store.clone(),
            gateway,
            Backoff::exponential(),
            CancellationToken::new(),
        )
        .await;

        // Removal happens under the registered uid even after the rewrite.
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_the_loop_and_keeps_the_entry() {
        let store = PendingStore::new();
        let pending = store.add(job("f")).unwrap();

        // Never writable: the loop would run forever without cancellation.
        struct NeverWritable;
        #[async_trait]
        impl TargetGateway for NeverWritable {
            async fn check_writable(&self, _job: &Job) -> Result<bool, GatewayError> {
                Ok(false)
            }
            async fn write_data(&self, _job: &Job) -> Result<(), GatewayError> {
                unreachable!("write must not happen")
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_retry_loop(
            pending,
            store.clone(),
            Arc::new(NeverWritable),
            Backoff::exponential(),
            cancel.clone(),
        ));

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();

        // The job is still pending; its progress is visible to the snapshot.
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap[0].attempts >= 1);
    }
}
