// ABOUTME: Access token acquisition through the host's connector broker.
// ABOUTME: Exchanges the environment's identity token for a GitHub access token.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// Env var naming the connector broker host
pub const CONNECTORS_HOSTNAME_VAR: &str = "REPLIT_CONNECTORS_HOSTNAME";

/// Identity token for interactive sessions; takes precedence
pub const REPL_IDENTITY_VAR: &str = "REPL_IDENTITY";

/// Identity token for deployments
pub const DEPLOY_RENEWAL_VAR: &str = "WEB_REPL_RENEWAL";

/// Direct token override, skipping the broker entirely
pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Connector the broker is asked for
const CONNECTOR_NAME: &str = "github";

/// Identity presented to the connector broker
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityToken {
    Repl(String),
    Deployment(String),
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repl(_) => f.write_str("IdentityToken::Repl([REDACTED])"),
            Self::Deployment(_) => f.write_str("IdentityToken::Deployment([REDACTED])"),
        }
    }
}

impl IdentityToken {
    /// Pick the identity from the environment; the interactive identity wins
    pub fn from_env() -> Option<Self> {
        Self::from_values(
            std::env::var(REPL_IDENTITY_VAR).ok(),
            std::env::var(DEPLOY_RENEWAL_VAR).ok(),
        )
    }

    pub fn from_values(repl: Option<String>, deployment: Option<String>) -> Option<Self> {
        match (repl, deployment) {
            (Some(token), _) if !token.is_empty() => Some(Self::Repl(token)),
            (_, Some(token)) if !token.is_empty() => Some(Self::Deployment(token)),
            _ => None,
        }
    }

    /// Header value the broker expects, e.g. `repl <token>`
    pub fn header_value(&self) -> String {
        match self {
            Self::Repl(token) => format!("repl {token}"),
            Self::Deployment(token) => format!("depl {token}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionsResponse {
    #[serde(default)]
    items: Vec<Connection>,
}

#[derive(Debug, Deserialize)]
struct Connection {
    #[serde(default)]
    settings: ConnectionSettings,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectionSettings {
    access_token: Option<String>,
    oauth: Option<OAuthSettings>,
}

#[derive(Debug, Deserialize)]
struct OAuthSettings {
    credentials: Option<OAuthCredentials>,
}

#[derive(Debug, Deserialize)]
struct OAuthCredentials {
    access_token: Option<String>,
}

/// Client for the host-provided connector broker
#[derive(Debug, Clone)]
pub struct ConnectorBroker {
    hostname: String,
    identity: IdentityToken,
    http_client: Client,
}

impl ConnectorBroker {
    pub fn new(hostname: impl Into<String>, identity: IdentityToken) -> Self {
        Self {
            hostname: hostname.into(),
            identity,
            http_client: Client::new(),
        }
    }

    /// Build from `REPLIT_CONNECTORS_HOSTNAME` plus one of the identity variables
    pub fn from_env() -> Result<Self> {
        let hostname = std::env::var(CONNECTORS_HOSTNAME_VAR)
            .with_context(|| format!("{CONNECTORS_HOSTNAME_VAR} is not set"))?;
        let identity = IdentityToken::from_env().ok_or_else(|| {
            anyhow!("Neither {REPL_IDENTITY_VAR} nor {DEPLOY_RENEWAL_VAR} is set")
        })?;
        Ok(Self::new(hostname, identity))
    }

    fn connection_url(&self) -> String {
        let host = self.hostname.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        format!("{base}/api/v2/connection?include_secrets=true&connector_names={CONNECTOR_NAME}")
    }

    /// Exchange the identity for a GitHub access token
    pub async fn fetch_access_token(&self) -> Result<String> {
        let url = self.connection_url();
        debug!(url = %url, "Requesting connector credentials");

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .header("X_REPLIT_TOKEN", self.identity.header_value())
            .send()
            .await
            .context("Failed to reach connector broker")?;

        if !response.status().is_success() {
            bail!("Connector broker returned {}", response.status());
        }

        let body: ConnectionsResponse = response
            .json()
            .await
            .context("Failed to parse connector broker response")?;

        extract_access_token(body).ok_or_else(|| anyhow!("GitHub connection has no access token"))
    }
}

fn extract_access_token(body: ConnectionsResponse) -> Option<String> {
    let settings = body.items.into_iter().next()?.settings;
    settings
        .access_token
        .or_else(|| settings.oauth?.credentials?.access_token)
        .filter(|t| !t.is_empty())
}

/// Resolve the token for this run: `GITHUB_TOKEN` if set, otherwise the broker
pub async fn resolve_access_token() -> Result<String> {
    if let Ok(token) = std::env::var(GITHUB_TOKEN_VAR) {
        if !token.is_empty() {
            info!("Using access token from {GITHUB_TOKEN_VAR}");
            return Ok(token);
        }
    }

    let broker = ConnectorBroker::from_env()?;
    let token = broker.fetch_access_token().await?;
    info!("Obtained access token from connector broker");
    Ok(token)
}
