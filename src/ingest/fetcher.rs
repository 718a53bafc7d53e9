//! Repository acquisition.
//!
//! Produces a read-only local snapshot of a repository at its default
//! branch tip (or a pinned revision) via a shallow `git clone`. The
//! snapshot directory is a [`TempDir`] released on drop, so cleanup is
//! guaranteed on success, failure, and cancellation alike.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;

use crate::error::FetchError;

/// A fetched repository snapshot. Dropping it deletes the directory.
#[derive(Debug)]
pub struct Snapshot {
    dir: TempDir,
    revision: Option<String>,
}

impl Snapshot {
    /// Root directory of the checked-out tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The pinned revision, if one was requested.
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

/// Shallow-clones `url` into a temporary directory.
///
/// History is not fetched (`--depth 1 --single-branch`) to minimize disk
/// use. The whole operation is bounded by `timeout` wall clock.
///
/// # Errors
///
/// Returns [`FetchError::Timeout`] when the budget is exceeded,
/// [`FetchError::RevisionNotFound`] when a pinned revision does not
/// exist, and [`FetchError::CloneFailed`] for unreachable hosts and
/// authentication failures.
pub async fn fetch(
    url: &str,
    revision: Option<&str>,
    timeout: Duration,
) -> Result<Snapshot, FetchError> {
    let dir = TempDir::new()?;

    let mut command = Command::new("git");
    command
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg("--single-branch");
    if let Some(revision) = revision {
        command.arg("--branch").arg(revision);
    }
    command
        .arg("--")
        .arg(url)
        .arg(dir.path())
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::info!(url, ?revision, "fetching repository snapshot");

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| FetchError::Timeout {
            seconds: timeout.as_secs(),
        })??;

    if output.status.success() {
        return Ok(Snapshot {
            dir,
            revision: revision.map(str::to_string),
        });
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message: String = stderr.chars().take(400).collect();
    tracing::warn!(url, %message, "clone failed");

    if let Some(revision) = revision
        && (stderr.contains("Remote branch") || stderr.contains("not found in upstream"))
    {
        return Err(FetchError::RevisionNotFound {
            revision: revision.to_string(),
        });
    }

    Err(FetchError::CloneFailed {
        url: url.to_string(),
        message,
    })
}
