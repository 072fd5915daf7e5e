//! Per-request ownership of scratch state
//!
//! A session exclusively owns `<scratch root>/<id>/`. Every artifact a
//! pipeline writes lives under that directory, and the directory is removed on
//! every terminal outcome: explicitly through [`RequestSession::teardown`], or
//! by the drop guard when the owning task unwinds or is cancelled.
//!
//! Pool jobs for the session are tracked. A job abandoned at its deadline can
//! still write into the directory, so when jobs are outstanding at teardown
//! the removal is deferred to a background task that waits for them.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::task::task_tracker::TrackedFuture;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::PipelineStage;

const SEPARATION_DIR: &str = "separation_output";
const FINAL_OUTPUT_DIR: &str = "final_output";
const TRANSCRIPT_FILE: &str = "transcript.json";

#[derive(Debug)]
pub struct RequestSession {
    id: Uuid,
    root_dir: PathBuf,
    stage_outputs: Vec<(PipelineStage, PathBuf)>,
    created_at: DateTime<Utc>,
    work: TaskTracker,
    torn_down: bool,
}

impl RequestSession {
    /// Create the session directory tree under `scratch_root`
    pub async fn create(scratch_root: &Path) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let root_dir = scratch_root.join(id.to_string());

        tokio::fs::create_dir_all(root_dir.join(SEPARATION_DIR)).await?;
        tokio::fs::create_dir_all(root_dir.join(FINAL_OUTPUT_DIR)).await?;

        tracing::debug!(request_id = %id, dir = %root_dir.display(), "Request session created");

        Ok(Self {
            id,
            root_dir,
            stage_outputs: Vec::new(),
            created_at: Utc::now(),
            work: TaskTracker::new(),
            torn_down: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn separation_dir(&self) -> PathBuf {
        self.root_dir.join(SEPARATION_DIR)
    }

    pub fn final_output_dir(&self) -> PathBuf {
        self.root_dir.join(FINAL_OUTPUT_DIR)
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.root_dir.join(TRANSCRIPT_FILE)
    }

    /// Location for an uploaded file inside the session
    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.root_dir.join(file_name)
    }

    /// Record the artifact a stage produced, replacing an earlier entry for it
    pub fn record_output(&mut self, stage: PipelineStage, path: PathBuf) {
        self.stage_outputs.retain(|(s, _)| *s != stage);
        self.stage_outputs.push((stage, path));
    }

    /// Stage outputs in the order they were produced
    pub fn stage_outputs(&self) -> &[(PipelineStage, PathBuf)] {
        &self.stage_outputs
    }

    pub fn output_of(&self, stage: PipelineStage) -> Option<&Path> {
        self.stage_outputs
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, p)| p.as_path())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Wrap work that may write into the session directory
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.work.track_future(future)
    }

    /// Tracked jobs that have not finished yet
    pub fn pending_jobs(&self) -> usize {
        self.work.len()
    }

    /// Remove the session directory and everything in it
    ///
    /// Idempotent. A directory that is already gone counts as success. With
    /// tracked jobs still running, removal happens in the background once they
    /// finish and this returns immediately.
    pub async fn teardown(&mut self) -> std::io::Result<()> {
        if self.torn_down {
            return Ok(());
        }

        self.work.close();
        if !self.work.is_empty() {
            self.defer_cleanup(&tokio::runtime::Handle::current());
            self.torn_down = true;
            self.stage_outputs.clear();
            return Ok(());
        }

        match tokio::fs::remove_dir_all(&self.root_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(
                    request_id = %self.id,
                    dir = %self.root_dir.display(),
                    error = %e,
                    "Failed to remove session directory"
                );
                return Err(e);
            }
        }

        self.torn_down = true;
        self.stage_outputs.clear();
        tracing::debug!(request_id = %self.id, "Request session torn down");
        Ok(())
    }

    fn defer_cleanup(&self, handle: &tokio::runtime::Handle) {
        let work = self.work.clone();
        let request_id = self.id;
        let root_dir = self.root_dir.clone();
        tracing::warn!(
            request_id = %request_id,
            pending = work.len(),
            "Deferring session cleanup until abandoned jobs finish"
        );

        handle.spawn(async move {
            work.wait().await;
            match tokio::fs::remove_dir_all(&root_dir).await {
                Ok(()) => tracing::debug!(request_id = %request_id, "Deferred session cleanup done"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(
                    request_id = %request_id,
                    dir = %root_dir.display(),
                    error = %e,
                    "Deferred session cleanup failed"
                ),
            }
        });
    }
}

impl Drop for RequestSession {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.work.close();
        if !self.work.is_empty() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                self.defer_cleanup(&handle);
                return;
            }
        }
        tracing::warn!(
            request_id = %self.id,
            "Request session dropped without teardown, removing scratch directory"
        );
        if let Err(e) = songcheck_common::fs::remove_path(&self.root_dir) {
            tracing::error!(request_id = %self.id, error = %e, "Drop guard cleanup failed");
        }
    }
}
