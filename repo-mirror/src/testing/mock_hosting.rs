// ABOUTME: Scriptable in-memory HostingApi for exercising the mirror without a network.
// ABOUTME: Records every call and fails blob uploads on demand, keyed by file content.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::github::{HostingApi, HostingError, HostingResult, RepoTarget, TreeItem};

/// A call observed by the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingCall {
    PutFile { path: String },
    CreateBlob { content: String },
    GetRef,
    GetCommit { sha: String },
    CreateTree { base_tree: String, items: Vec<TreeItem> },
    CreateCommit { message: String, tree: String, parents: Vec<String> },
    UpdateRef { sha: String, force: bool },
}

/// Stage after the upload loop that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    GetRef,
    GetCommit,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

#[derive(Debug, Clone)]
struct BlobFailure {
    status: u16,
    message: String,
    /// Remaining failures; `None` fails forever
    remaining: Option<usize>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<HostingCall>,
    blob_failures: HashMap<String, BlobFailure>,
    stage_failures: HashMap<Stage, (u16, String)>,
    put_file_failure: Option<(u16, String)>,
    blob_counter: usize,
}

/// In-memory hosting API.
///
/// Blob failures are keyed by the decoded file content, since the blob
/// endpoint never sees a path.
pub struct MockHosting {
    state: Mutex<MockState>,
    tip_sha: String,
    base_tree_sha: String,
}

impl Default for MockHosting {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHosting {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            tip_sha: "tip-commit".to_string(),
            base_tree_sha: "base-tree".to_string(),
        }
    }

    /// Fail the blob upload for files whose content is `content`.
    /// `times: None` fails every attempt.
    pub fn fail_blob(
        self,
        content: &str,
        status: u16,
        message: &str,
        times: Option<usize>,
    ) -> Self {
        self.state.lock().unwrap().blob_failures.insert(
            content.to_string(),
            BlobFailure {
                status,
                message: message.to_string(),
                remaining: times,
            },
        );
        self
    }

    /// Rate-limit the upload of `content` for the first `times` attempts
    pub fn rate_limit_blob(self, content: &str, times: usize) -> Self {
        self.fail_blob(content, 403, "API rate limit exceeded for user", Some(times))
    }

    /// Make the bootstrap contents call fail
    pub fn fail_put_file(self, status: u16, message: &str) -> Self {
        self.state.lock().unwrap().put_file_failure = Some((status, message.to_string()));
        self
    }

    /// Make a post-upload stage fail
    pub fn fail_stage(self, stage: Stage, status: u16, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .stage_failures
            .insert(stage, (status, message.to_string()));
        self
    }

    pub fn tip_sha(&self) -> &str {
        &self.tip_sha
    }

    pub fn base_tree_sha(&self) -> &str {
        &self.base_tree_sha
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<HostingCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Decoded contents of every blob upload attempt, including failed ones
    pub fn blob_attempts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostingCall::CreateBlob { content } => Some(content),
                _ => None,
            })
            .collect()
    }

    /// True if any call after the upload loop was made
    pub fn touched_history(&self) -> bool {
        self.calls().iter().any(|call| {
            matches!(
                call,
                HostingCall::GetRef
                    | HostingCall::GetCommit { .. }
                    | HostingCall::CreateTree { .. }
                    | HostingCall::CreateCommit { .. }
                    | HostingCall::UpdateRef { .. }
            )
        })
    }

    fn record(&self, call: HostingCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn stage_result(&self, stage: Stage) -> HostingResult<()> {
        match self.state.lock().unwrap().stage_failures.get(&stage) {
            Some((status, message)) => Err(HostingError::status(*status, message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HostingApi for MockHosting {
    async fn put_file_contents(
        &self,
        _target: &RepoTarget,
        path: &str,
        _message: &str,
        _content_base64: &str,
    ) -> HostingResult<()> {
        self.record(HostingCall::PutFile {
            path: path.to_string(),
        });
        match &self.state.lock().unwrap().put_file_failure {
            Some((status, message)) => Err(HostingError::status(*status, message.clone())),
            None => Ok(()),
        }
    }

    async fn create_blob(&self, _target: &RepoTarget, content_base64: &str) -> HostingResult<String> {
        let decoded = STANDARD
            .decode(content_base64)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        self.record(HostingCall::CreateBlob {
            content: decoded.clone(),
        });

        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.blob_failures.get_mut(&decoded) {
            let active = match failure.remaining {
                None => true,
                Some(0) => false,
                Some(ref mut n) => {
                    *n -= 1;
                    true
                }
            };
            if active {
                return Err(HostingError::status(failure.status, failure.message.clone()));
            }
        }

        state.blob_counter += 1;
        Ok(format!("blob-{}", state.blob_counter))
    }

    async fn get_ref(&self, _target: &RepoTarget) -> HostingResult<String> {
        self.record(HostingCall::GetRef);
        self.stage_result(Stage::GetRef)?;
        Ok(self.tip_sha.clone())
    }

    async fn get_commit(&self, _target: &RepoTarget, commit_sha: &str) -> HostingResult<String> {
        self.record(HostingCall::GetCommit {
            sha: commit_sha.to_string(),
        });
        self.stage_result(Stage::GetCommit)?;
        Ok(self.base_tree_sha.clone())
    }

    async fn create_tree(
        &self,
        _target: &RepoTarget,
        base_tree: &str,
        items: &[TreeItem],
    ) -> HostingResult<String> {
        self.record(HostingCall::CreateTree {
            base_tree: base_tree.to_string(),
            items: items.to_vec(),
        });
        self.stage_result(Stage::CreateTree)?;
        Ok("new-tree".to_string())
    }

    async fn create_commit(
        &self,
        _target: &RepoTarget,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> HostingResult<String> {
        self.record(HostingCall::CreateCommit {
            message: message.to_string(),
            tree: tree_sha.to_string(),
            parents: parents.to_vec(),
        });
        self.stage_result(Stage::CreateCommit)?;
        Ok("new-commit".to_string())
    }

    async fn update_ref(&self, _target: &RepoTarget, commit_sha: &str, force: bool) -> HostingResult<()> {
        self.record(HostingCall::UpdateRef {
            sha: commit_sha.to_string(),
            force,
        });
        self.stage_result(Stage::UpdateRef)
    }
}
