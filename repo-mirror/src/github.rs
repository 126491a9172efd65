// ABOUTME: Hosting API abstraction and the GitHub REST implementation used by the mirror.
// ABOUTME: Covers contents, blobs, trees, commits and refs with typed status errors.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// GitHub API base URL
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// File mode for a regular, non-executable file in a git tree
pub const FILE_MODE: &str = "100644";

/// Object type for file content in a git tree
pub const BLOB_TYPE: &str = "blob";

/// Errors from the hosting API.
///
/// The upload loop inspects these to tell a rate limit apart from other failures,
/// so the HTTP status and the API's message are kept separate.
#[derive(Debug, Error)]
pub enum HostingError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl HostingError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code, if the API answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }

    /// A 403 whose message mentions a rate limit
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Status { status, message } => {
                *status == 403 && message.to_ascii_lowercase().contains("rate limit")
            }
            Self::Transport(_) => false,
        }
    }
}

pub type HostingResult<T> = std::result::Result<T, HostingError>;

/// Owner/repository/branch the mirror writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// `owner/repo`, as used in API paths and logs
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// One uploaded file's placement in the new tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

impl TreeItem {
    /// A regular file blob at `path`
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE.to_string(),
            kind: BLOB_TYPE.to_string(),
            sha: sha.into(),
        }
    }
}

/// Operations the mirror needs from a hosted repository.
///
/// Abstracted so the upload loop can run against the real GitHub API or a
/// scripted mock in tests.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Create or update a single file through the contents endpoint.
    /// `content_base64` is the already-encoded file body.
    async fn put_file_contents(
        &self,
        target: &RepoTarget,
        path: &str,
        message: &str,
        content_base64: &str,
    ) -> HostingResult<()>;

    /// Upload base64 content as a blob, returning its sha
    async fn create_blob(&self, target: &RepoTarget, content_base64: &str) -> HostingResult<String>;

    /// Resolve `heads/<branch>` to the commit sha it points at
    async fn get_ref(&self, target: &RepoTarget) -> HostingResult<String>;

    /// Fetch a commit and return the sha of its tree
    async fn get_commit(&self, target: &RepoTarget, commit_sha: &str) -> HostingResult<String>;

    /// Create a tree layered on `base_tree`, returning the new tree sha
    async fn create_tree(
        &self,
        target: &RepoTarget,
        base_tree: &str,
        items: &[TreeItem],
    ) -> HostingResult<String>;

    /// Create a commit with the given tree and parents, returning its sha
    async fn create_commit(
        &self,
        target: &RepoTarget,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> HostingResult<String>;

    /// Point `heads/<branch>` at `commit_sha`
    async fn update_ref(&self, target: &RepoTarget, commit_sha: &str, force: bool) -> HostingResult<()>;
}

/// Response carrying only a sha (blobs, trees, commits)
#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

/// Response from the get-ref endpoint
#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

/// Response from the get-commit endpoint
#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

/// Error body returned by the GitHub API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// GitHub REST client authenticated with a bearer token
pub struct GitHubClient {
    http_client: Client,
    token: String,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> HostingResult<Self> {
        Self::with_base_url(token, GITHUB_API_URL)
    }

    /// Client against a different API root (GitHub Enterprise, test servers)
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> HostingResult<Self> {
        let http_client = Client::builder().user_agent("repo-mirror").build()?;

        Ok(Self {
            http_client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, target: &RepoTarget, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url, target.owner, target.repo, rest
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Turn a non-success response into `HostingError::Status`, keeping the API message
    async fn check(response: reqwest::Response) -> HostingResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    text
                }
            });

        Err(HostingError::status(status.as_u16(), message))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> HostingResult<T> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn put_file_contents(
        &self,
        target: &RepoTarget,
        path: &str,
        message: &str,
        content_base64: &str,
    ) -> HostingResult<()> {
        let url = self.repo_url(target, &format!("contents/{path}"));
        debug!(url = %url, "PUT file contents");

        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&json!({
                "message": message,
                "content": content_base64,
                "branch": target.branch,
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_blob(&self, target: &RepoTarget, content_base64: &str) -> HostingResult<String> {
        let url = self.repo_url(target, "git/blobs");
        let blob: ShaResponse = self
            .send_json(
                self.request(reqwest::Method::POST, &url)
                    .json(&json!({ "content": content_base64, "encoding": "base64" })),
            )
            .await?;
        Ok(blob.sha)
    }

    async fn get_ref(&self, target: &RepoTarget) -> HostingResult<String> {
        let url = self.repo_url(target, &format!("git/ref/heads/{}", target.branch));
        let git_ref: RefResponse = self
            .send_json(self.request(reqwest::Method::GET, &url))
            .await?;
        Ok(git_ref.object.sha)
    }

    async fn get_commit(&self, target: &RepoTarget, commit_sha: &str) -> HostingResult<String> {
        let url = self.repo_url(target, &format!("git/commits/{commit_sha}"));
        let commit: CommitResponse = self
            .send_json(self.request(reqwest::Method::GET, &url))
            .await?;
        Ok(commit.tree.sha)
    }

    async fn create_tree(
        &self,
        target: &RepoTarget,
        base_tree: &str,
        items: &[TreeItem],
    ) -> HostingResult<String> {
        let url = self.repo_url(target, "git/trees");
        let tree: ShaResponse = self
            .send_json(
                self.request(reqwest::Method::POST, &url)
                    .json(&json!({ "base_tree": base_tree, "tree": items })),
            )
            .await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        target: &RepoTarget,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> HostingResult<String> {
        let url = self.repo_url(target, "git/commits");
        let commit: ShaResponse = self
            .send_json(self.request(reqwest::Method::POST, &url).json(&json!({
                "message": message,
                "tree": tree_sha,
                "parents": parents,
            })))
            .await?;
        Ok(commit.sha)
    }

    async fn update_ref(&self, target: &RepoTarget, commit_sha: &str, force: bool) -> HostingResult<()> {
        let url = self.repo_url(target, &format!("git/refs/heads/{}", target.branch));
        let response = self
            .request(reqwest::Method::PATCH, &url)
            .json(&json!({ "sha": commit_sha, "force": force }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// True when a status is one the API uses for "file already exists" style conflicts
pub fn is_conflict(status: Option<u16>) -> bool {
    matches!(
        status.and_then(|s| StatusCode::from_u16(s).ok()),
        Some(StatusCode::CONFLICT) | Some(StatusCode::UNPROCESSABLE_ENTITY)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        let err = HostingError::status(403, "API rate limit exceeded for installation ID 1");
        assert!(err.is_rate_limit());

        let secondary = HostingError::status(403, "You have exceeded a secondary Rate Limit.");
        assert!(secondary.is_rate_limit());
    }

    #[test]
    fn test_forbidden_without_rate_limit_is_not_rate_limit() {
        let err = HostingError::status(403, "Resource not accessible by integration");
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_rate_limit_message_on_other_status_is_not_rate_limit() {
        let err = HostingError::status(429, "rate limit");
        assert!(!err.is_rate_limit());
        assert_eq!(err.status_code(), Some(429));
    }

    #[test]
    fn test_tree_item_blob_constants() {
        let item = TreeItem::blob("src/index.html", "abc123");
        assert_eq!(item.mode, "100644");
        assert_eq!(item.kind, "blob");

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "blob");
        assert_eq!(value["path"], "src/index.html");
    }

    #[test]
    fn test_repo_target_full_name() {
        let target = RepoTarget::new("acme", "site", "main");
        assert_eq!(target.full_name(), "acme/site");
    }

    #[test]
    fn test_is_conflict() {
        assert!(is_conflict(Some(409)));
        assert!(is_conflict(Some(422)));
        assert!(!is_conflict(Some(500)));
        assert!(!is_conflict(None));
    }

    #[test]
    fn test_repo_url_trims_trailing_slash() {
        let client = GitHubClient::with_base_url("t", "http://localhost:9000/").unwrap();
        let url = client.repo_url(&RepoTarget::new("o", "r", "main"), "git/blobs");
        assert_eq!(url, "http://localhost:9000/repos/o/r/git/blobs");
    }
}
