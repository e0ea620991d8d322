use std::sync::Arc;

use tracing::{error, info, warn};

use conveyor_dispatch::{PendingStore, WorkerPool};
use conveyor_persistence::JobSnapshotFile;

/// Replay the persisted snapshot into the store and re-launch a retry loop
/// for every restored job, preserving its attempt count.
///
/// Restored jobs do not go through the intake queue: the snapshot may hold
/// more jobs than the queue has capacity, and every one of them must get a
/// loop. Each is resumed on its own task instead.
///
/// A missing snapshot means nothing was pending. A malformed one is logged
/// and treated the same way; those jobs are lost, not retried.
pub async fn restore_pending(
    snapshot: &JobSnapshotFile,
    store: &PendingStore,
    pool: &Arc<WorkerPool>,
) {
    let jobs = match snapshot.restore().await {
        Ok(jobs) => jobs,
        Err(err) => {
            error!(error = %err, path = %snapshot.path().display(), "failed to restore pending jobs; starting empty");
            return;
        }
    };

    let total = jobs.len();
    let mut resumed = 0usize;
    for pending in jobs {
        if !store.add_pending(pending.clone()) {
            warn!(uid = %pending.job.uid, "duplicate uid in snapshot; skipping");
            continue;
        }
        pool.resume(pending);
        resumed += 1;
    }

    if total > 0 {
        info!(total, resumed, "restored pending jobs");
    }
}
