// ABOUTME: The `upload` command: mirror the configured tree onto the hosted branch
// ABOUTME: Dry runs go through the mock hosting API so nothing leaves the machine

use anyhow::{Context, Result};
use std::sync::Arc;

use brokersite_core::config::MirrorConfig;
use repo_mirror::connector::resolve_access_token;
use repo_mirror::testing::MockHosting;
use repo_mirror::{GitHubClient, HostingApi, Mirror, MirrorOptions, MirrorReport, Pacing};

/// Flags the CLI passes through
#[derive(Debug, Clone, Default)]
pub struct UploadArgs {
    pub dry_run: bool,
    pub message: Option<String>,
}

pub fn mirror_options(config: &MirrorConfig, args: &UploadArgs) -> Result<MirrorOptions> {
    let mut options = MirrorOptions::new(config.target()?, &config.root);
    options.rules = config.exclude.clone();
    options.message = args.message.clone();
    if args.dry_run {
        options.pacing = Pacing::none();
    }
    Ok(options)
}

/// Run the mirror and log the outcome
pub async fn run_upload(config: &MirrorConfig, args: UploadArgs) -> Result<MirrorReport> {
    let options = mirror_options(config, &args)?;

    let api: Arc<dyn HostingApi> = if args.dry_run {
        tracing::info!("Dry run: no requests will be sent to the hosting API");
        Arc::new(MockHosting::new())
    } else {
        let token = resolve_access_token()
            .await
            .context("Failed to obtain a hosting access token")?;
        Arc::new(GitHubClient::new(token).context("Failed to build GitHub client")?)
    };

    let report = Mirror::new(api, options).run().await?;

    for path in &report.skipped {
        tracing::warn!(path = %path, "Skipped");
    }
    tracing::info!(
        uploaded = report.uploaded,
        candidates = report.candidates,
        skipped = report.skipped.len(),
        rate_limited = report.rate_limited,
        commit = %report.commit_sha,
        dry_run = args.dry_run,
        "Mirror complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &std::path::Path) -> MirrorConfig {
        MirrorConfig {
            owner: "harbour".to_string(),
            repo: "site".to_string(),
            root: root.to_string_lossy().into_owned(),
            ..MirrorConfig::default()
        }
    }

    #[test]
    fn test_options_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.exclude.max_file_bytes = 10;

        let args = UploadArgs {
            dry_run: false,
            message: Some("Publish".to_string()),
        };
        let options = mirror_options(&cfg, &args).unwrap();

        assert_eq!(options.target.full_name(), "harbour/site");
        assert_eq!(options.rules.max_file_bytes, 10);
        assert_eq!(options.message.as_deref(), Some("Publish"));
        assert_eq!(options.pacing, Pacing::default());
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.owner.clear();
        assert!(mirror_options(&cfg, &UploadArgs::default()).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_mirrors_against_mock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Home</h1>").unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();

        let args = UploadArgs {
            dry_run: true,
            message: None,
        };
        let report = run_upload(&config(dir.path()), args).await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.commit_sha, "new-commit");
    }

    #[tokio::test]
    async fn test_dry_run_with_nothing_to_upload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = UploadArgs {
            dry_run: true,
            message: None,
        };
        let err = run_upload(&config(dir.path()), args).await.unwrap_err();
        assert!(err.to_string().contains("No files uploaded"));
    }
}
