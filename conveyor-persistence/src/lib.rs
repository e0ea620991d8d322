//! Crash persistence for the pending-job registry.
//!
//! The registry is snapshotted to a single JSON file: an ordered array of
//! pending jobs, rewritten wholesale on each save. Saves go through a
//! temporary file and an atomic rename so a crash mid-write never truncates
//! the previous snapshot. Restores treat an absent file as "nothing pending";
//! a malformed file is an error the caller logs and treats the same way.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use conveyor_dispatch::PendingJob;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot file holding the pending-job registry between process runs.
#[derive(Debug, Clone)]
pub struct JobSnapshotFile {
    path: PathBuf,
}

impl JobSnapshotFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the given snapshot, replacing any previous file atomically.
    pub async fn save(&self, jobs: &[PendingJob]) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec_pretty(jobs)?;

        let mut tmp: OsString = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(count = jobs.len(), path = %self.path.display(), "pending jobs saved");
        Ok(())
    }

    /// Read back the persisted snapshot.
    ///
    /// An absent file is not an error: there was nothing pending. The caller
    /// must re-launch a retry loop for every returned job, preserving its
    /// attempt count.
    pub async fn restore(&self) -> Result<Vec<PendingJob>, PersistenceError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot file; starting empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let jobs: Vec<PendingJob> = serde_json::from_slice(&data)?;
        info!(count = jobs.len(), path = %self.path.display(), "pending jobs restored");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_dispatch::Job;
    use serde_json::json;

    fn pending(uid: &str, attempts: u32) -> PendingJob {
        let mut p = PendingJob::new(Job {
            uid: uid.to_string(),
            data: json!({"payload": uid}),
            content_type: Some("json".into()),
        });
        p.attempts = attempts;
        p
    }

    #[tokio::test]
    async fn save_then_restore_round_trips_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let file = JobSnapshotFile::new(dir.path().join("pending_jobs.json"));

        let jobs = vec![pending("job1", 0), pending("job2", 3)];
        file.save(&jobs).await.unwrap();

        let restored = file.restore().await.unwrap();
        assert_eq!(restored, jobs);
        assert_eq!(restored[0].attempts, 0);
        assert_eq!(restored[1].attempts, 3);
    }

    #[tokio::test]
    async fn restore_of_absent_file_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = JobSnapshotFile::new(dir.path().join("does_not_exist.json"));
        assert!(file.restore().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_of_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_jobs.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let file = JobSnapshotFile::new(&path);
        assert!(matches!(
            file.restore().await.unwrap_err(),
            PersistenceError::Json(_)
        ));
    }

    #[tokio::test]
    async fn save_replaces_the_previous_snapshot_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let file = JobSnapshotFile::new(dir.path().join("pending_jobs.json"));

        file.save(&[pending("old", 1)]).await.unwrap();
        file.save(&[pending("new", 2)]).await.unwrap();

        let restored = file.restore().await.unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].job.uid, "new");
        // No stray temp file left behind.
        assert!(!dir.path().join("pending_jobs.json.tmp").exists());
    }
}
