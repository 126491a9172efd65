// ABOUTME: The mirror run: bootstrap, enumerate, paced blob uploads, then one tree/commit/ref update.
// ABOUTME: Rate-limited uploads are retried after a fixed pause; other per-file failures are skipped.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::github::{is_conflict, HostingApi, HostingError, RepoTarget, TreeItem};
use crate::metrics;
use crate::walk::{enumerate, ExclusionRules, FileCandidate};

/// Path of the file written by the bootstrap step
pub const BOOTSTRAP_PATH: &str = "README.md";

/// Fixed checkpoints that throttle the upload loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    /// Pause for `major_pause` after this many successful uploads
    pub every_major: usize,
    pub major_pause: Duration,
    /// Pause for `minor_pause` after this many, unless a major checkpoint applies
    pub every_minor: usize,
    pub minor_pause: Duration,
    /// Wait before retrying a file that hit the rate limit
    pub rate_limit_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            every_major: 25,
            major_pause: Duration::from_millis(2000),
            every_minor: 5,
            minor_pause: Duration::from_millis(300),
            rate_limit_pause: Duration::from_millis(65_000),
        }
    }
}

/// What the loop does after the `uploaded`-th successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    None,
    Minor(Duration),
    Major(Duration),
}

impl Pacing {
    /// No pauses at all; for dry runs against the mock API
    pub fn none() -> Self {
        Self {
            every_major: 0,
            major_pause: Duration::ZERO,
            every_minor: 0,
            minor_pause: Duration::ZERO,
            rate_limit_pause: Duration::ZERO,
        }
    }

    pub fn checkpoint(&self, uploaded: usize) -> Checkpoint {
        if uploaded == 0 {
            return Checkpoint::None;
        }
        if self.every_major > 0 && uploaded % self.every_major == 0 {
            Checkpoint::Major(self.major_pause)
        } else if self.every_minor > 0 && uploaded % self.every_minor == 0 {
            Checkpoint::Minor(self.minor_pause)
        } else {
            Checkpoint::None
        }
    }
}

/// Everything a run needs besides the API client
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub target: RepoTarget,
    pub root: PathBuf,
    pub rules: ExclusionRules,
    pub pacing: Pacing,
    /// Commit message; defaults to a generated one naming the file count
    pub message: Option<String>,
    /// Contents of the bootstrap README
    pub bootstrap_readme: String,
}

impl MirrorOptions {
    pub fn new(target: RepoTarget, root: impl Into<PathBuf>) -> Self {
        let bootstrap_readme = format!("# {}\n", target.repo);
        Self {
            target,
            root: root.into(),
            rules: ExclusionRules::default(),
            pacing: Pacing::default(),
            message: None,
            bootstrap_readme,
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    pub candidates: usize,
    pub uploaded: usize,
    /// Paths dropped after a non-rate-limit failure
    pub skipped: Vec<String>,
    /// Number of rate-limit pauses taken
    pub rate_limited: usize,
    pub commit_sha: String,
}

/// Result of pushing one file through the retry loop
enum FileOutcome {
    Uploaded(TreeItem),
    Skipped,
}

/// Mirrors a local tree onto a hosted branch
pub struct Mirror {
    api: Arc<dyn HostingApi>,
    options: MirrorOptions,
}

impl Mirror {
    pub fn new(api: Arc<dyn HostingApi>, options: MirrorOptions) -> Self {
        Self { api, options }
    }

    /// List what a run would upload without touching the network
    pub fn plan(&self) -> Result<Vec<FileCandidate>> {
        enumerate(&self.options.root, &self.options.rules)
    }

    /// Run the full mirror sequence.
    ///
    /// Errors from tree, commit or ref calls propagate; objects already created
    /// remotely are left orphaned and the branch is not moved.
    pub async fn run(&self) -> Result<MirrorReport> {
        let target = &self.options.target;
        info!(repo = %target.full_name(), branch = %target.branch, "Starting mirror");

        self.bootstrap().await;

        let candidates = self.plan()?;
        info!(count = candidates.len(), root = %self.options.root.display(), "Enumerated files");

        let mut tree_items = Vec::with_capacity(candidates.len());
        let mut skipped = Vec::new();
        let mut rate_limited = 0usize;

        for candidate in &candidates {
            match self.upload_file(candidate, &mut rate_limited).await {
                FileOutcome::Uploaded(item) => {
                    tree_items.push(item);
                    self.pace(tree_items.len(), candidates.len()).await;
                }
                FileOutcome::Skipped => skipped.push(candidate.path.clone()),
            }
        }

        if tree_items.is_empty() {
            bail!("No files uploaded");
        }

        info!(
            uploaded = tree_items.len(),
            skipped = skipped.len(),
            "Uploads complete, building commit"
        );

        let commit_sha = self.commit(&tree_items).await?;

        Ok(MirrorReport {
            candidates: candidates.len(),
            uploaded: tree_items.len(),
            skipped,
            rate_limited,
            commit_sha,
        })
    }

    /// Make sure the branch has at least one commit. Failure is logged, never fatal.
    async fn bootstrap(&self) {
        let content = STANDARD.encode(self.options.bootstrap_readme.as_bytes());
        match self
            .api
            .put_file_contents(
                &self.options.target,
                BOOTSTRAP_PATH,
                "Initial commit",
                &content,
            )
            .await
        {
            Ok(()) => info!(path = BOOTSTRAP_PATH, "Bootstrap commit created"),
            Err(e) if is_conflict(e.status_code()) => {
                info!(path = BOOTSTRAP_PATH, error = %e, "Bootstrap file already exists")
            }
            Err(e) => warn!(path = BOOTSTRAP_PATH, error = %e, "Bootstrap commit failed, continuing"),
        }
    }

    /// Upload one file, retrying on rate limits until it succeeds or fails otherwise
    async fn upload_file(&self, candidate: &FileCandidate, rate_limited: &mut usize) -> FileOutcome {
        let full_path = self.options.root.join(&candidate.path);
        let bytes = match tokio::fs::read(&full_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %candidate.path, error = %e, "Failed to read file, skipping");
                metrics::record_file_skipped();
                return FileOutcome::Skipped;
            }
        };
        let content = STANDARD.encode(&bytes);

        loop {
            match self.api.create_blob(&self.options.target, &content).await {
                Ok(sha) => {
                    metrics::record_file_uploaded(candidate.size);
                    return FileOutcome::Uploaded(TreeItem::blob(&candidate.path, sha));
                }
                Err(e) if e.is_rate_limit() => {
                    *rate_limited += 1;
                    metrics::record_rate_limited();
                    let pause = self.options.pacing.rate_limit_pause;
                    warn!(
                        path = %candidate.path,
                        pause_ms = pause.as_millis() as u64,
                        "Rate limited, waiting before retrying the same file"
                    );
                    tokio::time::sleep(pause).await;
                }
                Err(e) => {
                    log_skip(&candidate.path, &e);
                    metrics::record_file_skipped();
                    return FileOutcome::Skipped;
                }
            }
        }
    }

    async fn pace(&self, uploaded: usize, total: usize) {
        match self.options.pacing.checkpoint(uploaded) {
            Checkpoint::Major(pause) => {
                info!(uploaded, total, "Upload progress");
                tokio::time::sleep(pause).await;
            }
            Checkpoint::Minor(pause) => tokio::time::sleep(pause).await,
            Checkpoint::None => {}
        }
    }

    /// Layer the uploaded blobs on the branch tip and force the branch to the new commit
    async fn commit(&self, items: &[TreeItem]) -> Result<String> {
        let target = &self.options.target;

        let tip = self
            .api
            .get_ref(target)
            .await
            .with_context(|| format!("Failed to read heads/{}", target.branch))?;
        let base_tree = self
            .api
            .get_commit(target, &tip)
            .await
            .with_context(|| format!("Failed to read commit {tip}"))?;
        let tree_sha = self
            .api
            .create_tree(target, &base_tree, items)
            .await
            .context("Failed to create tree")?;

        let message = self
            .options
            .message
            .clone()
            .unwrap_or_else(|| default_commit_message(items.len()));
        let commit_sha = self
            .api
            .create_commit(target, &message, &tree_sha, &[tip.clone()])
            .await
            .context("Failed to create commit")?;

        self.api
            .update_ref(target, &commit_sha, true)
            .await
            .with_context(|| format!("Failed to update heads/{}", target.branch))?;

        info!(
            commit = %commit_sha,
            parent = %tip,
            files = items.len(),
            "Branch updated"
        );
        Ok(commit_sha)
    }
}

fn log_skip(path: &str, error: &HostingError) {
    match error.status_code() {
        Some(status) => warn!(path = %path, status, error = %error, "Upload failed, skipping file"),
        None => warn!(path = %path, error = %error, "Upload failed, skipping file"),
    }
}

/// Commit message used when none is configured
pub fn default_commit_message(files: usize) -> String {
    format!(
        "Mirror workspace files ({files} files, {})",
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints() {
        let pacing = Pacing::default();
        assert_eq!(pacing.checkpoint(0), Checkpoint::None);
        assert_eq!(pacing.checkpoint(1), Checkpoint::None);
        assert_eq!(pacing.checkpoint(4), Checkpoint::None);
        assert_eq!(pacing.checkpoint(5), Checkpoint::Minor(Duration::from_millis(300)));
        assert_eq!(pacing.checkpoint(20), Checkpoint::Minor(Duration::from_millis(300)));
        assert_eq!(pacing.checkpoint(25), Checkpoint::Major(Duration::from_millis(2000)));
        assert_eq!(pacing.checkpoint(30), Checkpoint::Minor(Duration::from_millis(300)));
        assert_eq!(pacing.checkpoint(50), Checkpoint::Major(Duration::from_millis(2000)));
    }

    #[test]
    fn test_zero_interval_never_pauses() {
        let pacing = Pacing {
            every_major: 0,
            every_minor: 0,
            ..Pacing::default()
        };
        assert_eq!(pacing.checkpoint(25), Checkpoint::None);
    }

    #[test]
    fn test_default_commit_message_names_count() {
        assert!(default_commit_message(42).starts_with("Mirror workspace files (42 files"));
    }

    #[test]
    fn test_rate_limit_pause_is_65_seconds() {
        assert_eq!(Pacing::default().rate_limit_pause, Duration::from_secs(65));
    }
}
