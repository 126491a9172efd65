// ABOUTME: Tests for the mirror run against the scripted MockHosting API.
// ABOUTME: Covers pacing, rate-limit retries, skip-and-continue, zero-upload abort and commit assembly.

use repo_mirror::testing::{HostingCall, MockHosting, Stage};
use repo_mirror::{Mirror, MirrorOptions, RepoTarget};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn target() -> RepoTarget {
    RepoTarget::new("harbour", "site", "main")
}

fn mirror(mock: &Arc<MockHosting>, root: &Path) -> Mirror {
    Mirror::new(mock.clone(), MirrorOptions::new(target(), root))
}

fn tree_paths(mock: &MockHosting) -> Vec<String> {
    mock.calls()
        .into_iter()
        .find_map(|call| match call {
            HostingCall::CreateTree { items, .. } => {
                Some(items.into_iter().map(|i| i.path).collect())
            }
            _ => None,
        })
        .expect("create_tree was not called")
}

#[tokio::test(start_paused = true)]
async fn test_mirror_uploads_eligible_files_and_commits() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "index.html", b"<h1>Home</h1>");
    write(root, "css/site.css", b"body {}");
    write(root, "node_modules/lib/index.js", b"module.exports = 1");
    write(root, ".git/HEAD", b"ref: refs/heads/main");
    write(root, "package-lock.json", b"{}");
    write(root, "media/hero.jpg", &vec![0u8; 300 * 1024]);

    let mock = Arc::new(MockHosting::new());
    let report = mirror(&mock, root).run().await.unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.uploaded, 2);
    assert!(report.skipped.is_empty());
    assert_eq!(report.commit_sha, "new-commit");
    assert_eq!(tree_paths(&mock), vec!["css/site.css", "index.html"]);

    let calls = mock.calls();
    assert_eq!(
        calls.first(),
        Some(&HostingCall::PutFile {
            path: "README.md".to_string()
        })
    );
    assert!(calls.contains(&HostingCall::GetCommit {
        sha: "tip-commit".to_string()
    }));
    assert!(calls.iter().any(|c| matches!(
        c,
        HostingCall::CreateTree { base_tree, .. } if base_tree == "base-tree"
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        HostingCall::CreateCommit { tree, parents, .. }
            if tree == "new-tree" && parents == &vec!["tip-commit".to_string()]
    )));
    assert_eq!(
        calls.last(),
        Some(&HostingCall::UpdateRef {
            sha: "new-commit".to_string(),
            force: true
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_tree_items_use_blob_mode_and_returned_sha() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");

    let mock = Arc::new(MockHosting::new());
    mirror(&mock, dir.path()).run().await.unwrap();

    let items = mock
        .calls()
        .into_iter()
        .find_map(|call| match call {
            HostingCall::CreateTree { items, .. } => Some(items),
            _ => None,
        })
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].mode, "100644");
    assert_eq!(items[0].kind, "blob");
    assert_eq!(items[0].sha, "blob-1");
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_pauses_and_retries_same_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "b.txt", b"bravo");
    write(dir.path(), "c.txt", b"charlie");

    let mock = Arc::new(MockHosting::new().rate_limit_blob("bravo", 1));
    let start = tokio::time::Instant::now();
    let report = mirror(&mock, dir.path()).run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(mock.blob_attempts(), vec!["alpha", "bravo", "bravo", "charlie"]);
    assert_eq!(report.uploaded, 3);
    assert_eq!(report.rate_limited, 1);
    assert!(report.skipped.is_empty());
    assert!(elapsed >= Duration::from_secs(65), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(66), "elapsed {elapsed:?}");
    assert_eq!(tree_paths(&mock), vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_rate_limits_keep_retrying() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");

    let mock = Arc::new(MockHosting::new().rate_limit_blob("alpha", 3));
    let report = mirror(&mock, dir.path()).run().await.unwrap();

    assert_eq!(mock.blob_attempts().len(), 4);
    assert_eq!(report.rate_limited, 3);
    assert_eq!(report.uploaded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_failures_skip_file_and_continue() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "b.txt", b"bravo");
    write(dir.path(), "c.txt", b"charlie");

    let mock = Arc::new(
        MockHosting::new()
            .fail_blob("bravo", 500, "Server Error", None)
            .fail_blob("charlie", 403, "Resource not accessible by integration", None),
    );
    let report = mirror(&mock, dir.path()).run().await.unwrap();

    // each failing file is attempted exactly once
    assert_eq!(mock.blob_attempts(), vec!["alpha", "bravo", "charlie"]);
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, vec!["b.txt", "c.txt"]);
    assert_eq!(report.rate_limited, 0);
    assert_eq!(tree_paths(&mock), vec!["a.txt"]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_uploads_aborts_before_history_calls() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");
    write(dir.path(), "b.txt", b"bravo");

    let mock = Arc::new(
        MockHosting::new()
            .fail_blob("alpha", 500, "Server Error", None)
            .fail_blob("bravo", 422, "Unprocessable", None),
    );
    let err = mirror(&mock, dir.path()).run().await.unwrap_err();

    assert!(err.to_string().contains("No files uploaded"));
    assert!(!mock.touched_history());
}

#[tokio::test(start_paused = true)]
async fn test_empty_tree_aborts() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "node_modules/x.js", b"x");

    let mock = Arc::new(MockHosting::new());
    let err = mirror(&mock, dir.path()).run().await.unwrap_err();

    assert!(err.to_string().contains("No files uploaded"));
    assert!(mock.blob_attempts().is_empty());
    assert!(!mock.touched_history());
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_failure_is_tolerated() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");

    let mock = Arc::new(MockHosting::new().fail_put_file(422, "\"sha\" wasn't supplied."));
    let report = mirror(&mock, dir.path()).run().await.unwrap();
    assert_eq!(report.uploaded, 1);

    let mock = Arc::new(MockHosting::new().fail_put_file(500, "Server Error"));
    let report = mirror(&mock, dir.path()).run().await.unwrap();
    assert_eq!(report.uploaded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pacing_pauses_at_fixed_checkpoints() {
    let dir = TempDir::new().unwrap();
    for i in 0..25 {
        write(dir.path(), &format!("page-{i:02}.md"), format!("page {i}").as_bytes());
    }

    let mock = Arc::new(MockHosting::new());
    let start = tokio::time::Instant::now();
    let report = mirror(&mock, dir.path()).run().await.unwrap();
    let elapsed = start.elapsed();

    // 4 minor pauses (5, 10, 15, 20) and one major pause (25)
    assert_eq!(report.uploaded, 25);
    assert!(elapsed >= Duration::from_millis(3200), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3300), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_skipped_files_do_not_advance_pacing() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        write(dir.path(), &format!("ok-{i}.txt"), format!("ok {i}").as_bytes());
    }
    write(dir.path(), "zz-bad.txt", b"bad");

    let mock = Arc::new(MockHosting::new().fail_blob("bad", 500, "Server Error", None));
    let start = tokio::time::Instant::now();
    mirror(&mock, dir.path()).run().await.unwrap();

    // exactly one minor pause after the fifth success
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_ref_update_failure_propagates() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");

    let mock = Arc::new(MockHosting::new().fail_stage(Stage::UpdateRef, 422, "Reference does not exist"));
    let err = mirror(&mock, dir.path()).run().await.unwrap_err();

    assert!(format!("{err:#}").contains("Reference does not exist"));
    assert!(mock
        .calls()
        .iter()
        .any(|c| matches!(c, HostingCall::CreateCommit { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_tree_failure_stops_before_commit() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");

    let mock = Arc::new(MockHosting::new().fail_stage(Stage::CreateTree, 500, "Server Error"));
    assert!(mirror(&mock, dir.path()).run().await.is_err());
    assert!(!mock
        .calls()
        .iter()
        .any(|c| matches!(c, HostingCall::CreateCommit { .. } | HostingCall::UpdateRef { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_custom_commit_message() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", b"alpha");

    let mock = Arc::new(MockHosting::new());
    let mut options = MirrorOptions::new(target(), dir.path());
    options.message = Some("Publish site".to_string());
    Mirror::new(mock.clone(), options).run().await.unwrap();

    assert!(mock.calls().iter().any(|c| matches!(
        c,
        HostingCall::CreateCommit { message, .. } if message == "Publish site"
    )));
}
