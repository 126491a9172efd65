// ABOUTME: IP whitelist parsing and the sources it can be fetched from
// ABOUTME: Plain text, one address per line, '#' comments, first comma field only

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// A single whitelisted network address, as written in the resource
pub type WhitelistEntry = String;

/// Parsed whitelist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    pub fn parse(text: &str) -> Self {
        Self {
            entries: parse_whitelist(text),
        }
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact string match. The candidate is not trimmed or normalised.
    pub fn contains(&self, address: &str) -> bool {
        self.entries.iter().any(|entry| entry == address)
    }
}

/// Extract the address from each meaningful line.
///
/// Blank lines and lines starting with `#` (after trimming) are skipped.
/// Anything after the first comma is ignored and the remaining token is trimmed.
pub fn parse_whitelist(text: &str) -> Vec<WhitelistEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let first = line.split(',').next().unwrap_or("").trim();
            (!first.is_empty()).then(|| first.to_string())
        })
        .collect()
}

/// Where the whitelist text comes from
#[async_trait]
pub trait WhitelistSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Whitelist read from the local filesystem
#[derive(Debug, Clone)]
pub struct FileWhitelist {
    path: PathBuf,
}

impl FileWhitelist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WhitelistSource for FileWhitelist {
    async fn fetch(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read whitelist {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Whitelist fetched over HTTP
#[derive(Debug, Clone)]
pub struct HttpWhitelist {
    url: String,
    http_client: reqwest::Client,
}

impl HttpWhitelist {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WhitelistSource for HttpWhitelist {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch whitelist from {}", self.url))?;

        if !response.status().is_success() {
            bail!("Whitelist fetch returned {}", response.status());
        }

        response
            .text()
            .await
            .context("Failed to read whitelist body")
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Config value naming a whitelist location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistLocation {
    File(PathBuf),
    Url(url::Url),
}

impl WhitelistLocation {
    /// `http://` and `https://` values are URLs; anything else is a path
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = url::Url::parse(trimmed)
                .with_context(|| format!("Invalid whitelist URL: {trimmed}"))?;
            Ok(Self::Url(url))
        } else if trimmed.is_empty() {
            bail!("admin.whitelist must not be empty");
        } else {
            Ok(Self::File(PathBuf::from(trimmed)))
        }
    }

    pub fn into_source(self) -> Box<dyn WhitelistSource> {
        match self {
            Self::File(path) => Box::new(FileWhitelist::new(path)),
            Self::Url(url) => Box::new(HttpWhitelist::new(url.as_str())),
        }
    }
}
