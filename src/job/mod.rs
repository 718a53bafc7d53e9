//! Background job controller for ingestion.
//!
//! Serializes to at most one running ingestion. `start` transitions the
//! singleton job state and schedules the pipeline on the runtime,
//! returning immediately; `progress` returns copy-out snapshots under a
//! poll-based contract. A guard around the pipeline body guarantees the
//! job always reaches a terminal state — `in_progress` is never left set
//! after a failure, a panic, a timeout, or cancellation.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::catalog::unix_now;
use crate::error::{Error, ErrorKind};
use crate::ingest::{self, PipelineDeps};

/// Result of a `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The job was scheduled.
    Accepted,
    /// Another ingestion is already running.
    Conflict,
}

/// Terminal result of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Always `true` for a recorded result.
    pub success: bool,
    /// Files accepted by the walker.
    #[serde(rename = "fileCount")]
    pub file_count: usize,
    /// Chunks acknowledged by the vector store.
    #[serde(rename = "chunkCount")]
    pub chunk_count: usize,
    /// Chunks skipped by the per-chunk failure policy.
    #[serde(rename = "skippedCount")]
    pub skipped_count: usize,
}

/// Terminal failure of an ingestion, redacted for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    /// Coarse error classification.
    pub kind: ErrorKind,
    /// Redacted message.
    pub message: String,
}

/// Immutable snapshot of the job state.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// A job is currently running.
    pub in_progress: bool,
    /// URL of the current or last job.
    pub repo_url: Option<String>,
    /// Progress in `0..=100`, monotone within one job.
    pub progress: u8,
    /// Human-readable stage description.
    pub stage: String,
    /// Unix timestamp when the current/last job started.
    pub started_at: Option<u64>,
    /// Terminal result of the last job, if it succeeded.
    pub result: Option<JobResult>,
    /// Terminal failure of the last job, if it failed.
    pub error: Option<JobFailure>,
}

#[derive(Debug, Default)]
struct JobInner {
    in_progress: bool,
    repo_url: Option<String>,
    progress: u8,
    stage: String,
    started_at: Option<u64>,
    result: Option<JobResult>,
    error: Option<JobFailure>,
}

/// Controller owning the singleton job state.
pub struct JobController {
    deps: PipelineDeps,
    state: Arc<Mutex<JobInner>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl JobController {
    /// Creates a controller over the shared pipeline services.
    #[must_use]
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps,
            state: Arc::new(Mutex::new(JobInner::default())),
            cancel: Mutex::new(None),
        }
    }

    /// Starts an ingestion for `repo_url`, unless one is already running.
    ///
    /// On acceptance the prior result and error are cleared, the state
    /// transitions to running synchronously, and the pipeline body is
    /// spawned onto the runtime.
    pub fn start(&self, repo_url: &str) -> StartOutcome {
        {
            let Ok(mut state) = self.state.lock() else {
                return StartOutcome::Conflict;
            };
            if state.in_progress {
                return StartOutcome::Conflict;
            }
            *state = JobInner {
                in_progress: true,
                repo_url: Some(repo_url.to_string()),
                progress: 0,
                stage: "Starting".to_string(),
                started_at: Some(unix_now()),
                result: None,
                error: None,
            };
        }

        let token = CancellationToken::new();
        if let Ok(mut cancel) = self.cancel.lock() {
            *cancel = Some(token.clone());
        }

        tokio::spawn(run_guarded(
            self.deps.clone(),
            Arc::clone(&self.state),
            repo_url.to_string(),
            token,
        ));

        StartOutcome::Accepted
    }

    /// Returns a copy of the current job state.
    #[must_use]
    pub fn progress(&self) -> JobSnapshot {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        JobSnapshot {
            in_progress: state.in_progress,
            repo_url: state.repo_url.clone(),
            progress: state.progress,
            stage: state.stage.clone(),
            started_at: state.started_at,
            result: state.result.clone(),
            error: state.error.clone(),
        }
    }

    /// Requests cooperative cancellation of the running job, if any.
    pub fn cancel(&self) {
        if let Ok(cancel) = self.cancel.lock()
            && let Some(token) = cancel.as_ref()
        {
            token.cancel();
        }
    }

}

/// Runs the pipeline under the terminal-state guard.
///
/// The inner spawn isolates panics: a panicked pipeline surfaces as a
/// join error and still transitions the job to a terminal failure.
async fn run_guarded(
    deps: PipelineDeps,
    state: Arc<Mutex<JobInner>>,
    url: String,
    token: CancellationToken,
) {
    let job_timeout = deps.config.job_timeout;

    let progress_state = Arc::clone(&state);
    let sink = move |percent: u8, stage: String| {
        if let Ok(mut inner) = progress_state.lock() {
            // Monotone within a job regardless of reporting order.
            inner.progress = inner.progress.max(percent.min(100));
            inner.stage = stage;
        }
    };

    let body_token = token.clone();
    let body_url = url.clone();
    let body =
        tokio::spawn(async move { ingest::run(&deps, &body_url, None, &sink, &body_token).await });

    let outcome = match tokio::time::timeout(job_timeout, body).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            tracing::error!(url, %join_error, "ingestion task aborted");
            Err(Error::Index(crate::error::IndexError::TooManyFailures {
                count: 0,
                last: "ingestion task aborted unexpectedly".to_string(),
            }))
        }
        Err(_) => {
            token.cancel();
            tracing::warn!(url, ?job_timeout, "ingestion exceeded its budget");
            Err(Error::Index(crate::error::IndexError::TooManyFailures {
                count: 0,
                last: format!("ingestion timed out after {}s", job_timeout.as_secs()),
            }))
        }
    };

    let Ok(mut inner) = state.lock() else { return };
    inner.in_progress = false;
    match outcome {
        Ok(report) => {
            inner.progress = 100;
            inner.stage = "Complete".to_string();
            inner.result = Some(JobResult {
                success: true,
                file_count: report.file_count,
                chunk_count: report.chunk_count,
                skipped_count: report.skipped_count,
            });
        }
        Err(error) => {
            tracing::error!(
                url,
                kind = ?error.kind(),
                stack_digest = %error.stack_digest(),
                "ingestion failed"
            );
            inner.stage = "Failed".to_string();
            inner.error = Some(JobFailure {
                kind: error.kind(),
                message: error.to_string(),
            });
        }
    }
}
