// ABOUTME: Mirror a local file tree onto a hosted git branch as a single commit.
// ABOUTME: Token broker, hosting API client, file enumeration and the paced upload loop.

pub mod connector;
pub mod github;
pub mod metrics;
pub mod testing;
pub mod upload;
pub mod walk;

pub use github::{GitHubClient, HostingApi, HostingError, RepoTarget, TreeItem};
pub use upload::{Mirror, MirrorOptions, MirrorReport, Pacing};
pub use walk::{enumerate, ExclusionRules, FileCandidate};
