//! The authoritative registry of outstanding jobs.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::types::{Job, PendingJob};

/// Ordered collection of [`PendingJob`], keyed by `job.uid`.
///
/// All mutation goes through one mutual-exclusion lock held only for the
/// duration of the operation; no operation performs I/O under the lock.
/// At most one entry exists per uid at any instant, which is what lets the
/// engine guarantee at most one active retry loop per uid.
#[derive(Clone, Default)]
pub struct PendingStore {
    inner: Arc<Mutex<Vec<PendingJob>>>,
}

impl fmt::Debug for PendingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingStore")
            .field("len", &self.len())
            .finish()
    }
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted job with `attempts = 0`.
    ///
    /// Returns `None` without inserting when an entry for the same uid is
    /// already pending; the caller must not launch a second retry loop.
    pub fn add(&self, job: Job) -> Option<PendingJob> {
        let pending = PendingJob::new(job);
        if self.add_pending(pending.clone()) {
            Some(pending)
        } else {
            None
        }
    }

    /// Re-register a restored entry verbatim, preserving its attempt count.
    ///
    /// Returns false (no insert) when the uid is already pending.
    pub fn add_pending(&self, pending: PendingJob) -> bool {
        let mut jobs = self.inner.lock().expect("pending store lock poisoned");
        if jobs.iter().any(|p| p.job.uid == pending.job.uid) {
            return false;
        }
        jobs.push(pending);
        true
    }

    /// Remove the first entry matching `uid`.
    ///
    /// Absence is not an error: the entry may already have been removed by a
    /// concurrent success. Returns whether an entry was removed.
    pub fn remove(&self, uid: &str) -> bool {
        let mut jobs = self.inner.lock().expect("pending store lock poisoned");
        match jobs.iter().position(|p| p.job.uid == uid) {
            Some(idx) => {
                jobs.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Mirror a retry loop's attempt count into the stored entry so snapshots
    /// taken at shutdown capture progress.
    pub fn set_attempts(&self, uid: &str, attempts: u32) {
        let mut jobs = self.inner.lock().expect("pending store lock poisoned");
        if let Some(entry) = jobs.iter_mut().find(|p| p.job.uid == uid) {
            entry.attempts = attempts;
        }
    }

    /// Deep copy of the collection for iteration or serialization outside
    /// the lock.
    pub fn snapshot(&self) -> Vec<PendingJob> {
        self.inner
            .lock()
            .expect("pending store lock poisoned")
            .clone()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.inner
            .lock()
            .expect("pending store lock poisoned")
            .iter()
            .any(|p| p.job.uid == uid)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
