// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::gate::DEFAULT_ADMIN_PASSWORD;
use crate::paths;
use crate::whitelist::WhitelistLocation;
use anyhow::{bail, Context, Result};
use repo_mirror::{ExclusionRules, RepoTarget};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "BROKERSITE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Static assets served for any unmatched public path
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Mark the session cookie `Secure`; enable when served over HTTPS
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: default_public_dir(),
            site_name: default_site_name(),
            secure_cookies: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Filesystem path or http(s) URL of the IP whitelist. A file must live
    /// outside `server.public_dir`.
    #[serde(default = "default_whitelist")]
    pub whitelist: String,
    /// Honour the hop a reverse proxy appends to `X-Forwarded-For`. Off, the header is ignored.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Static CMS bundle served under /admin/cms/
    #[serde(default = "default_cms_dir")]
    pub cms_dir: String,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("whitelist", &self.whitelist)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("cms_dir", &self.cms_dir)
            .finish()
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: None,
            whitelist: default_whitelist(),
            trust_forwarded_for: false,
            cms_dir: default_cms_dir(),
        }
    }
}

impl AdminConfig {
    /// The configured password, or the built-in fallback.
    /// The flag is true when the fallback is in use.
    pub fn password_or_default(&self) -> (&str, bool) {
        match self.password.as_deref() {
            Some(p) if !p.is_empty() => (p, false),
            _ => (DEFAULT_ADMIN_PASSWORD, true),
        }
    }

    pub fn whitelist_location(&self) -> Result<WhitelistLocation> {
        WhitelistLocation::parse(&self.whitelist).context("Invalid admin.whitelist")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Directory mirrored onto the branch
    #[serde(default = "default_mirror_root")]
    pub root: String,
    #[serde(default)]
    pub exclude: ExclusionRules,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            root: default_mirror_root(),
            exclude: ExclusionRules::default(),
        }
    }
}

impl MirrorConfig {
    /// Owner and repo are only needed by the upload command, so they are checked here
    pub fn target(&self) -> Result<RepoTarget> {
        if self.owner.trim().is_empty() {
            bail!("mirror.owner is required (set in config.toml or MIRROR_OWNER env var)");
        }
        if self.repo.trim().is_empty() {
            bail!("mirror.repo is required (set in config.toml or MIRROR_REPO env var)");
        }
        Ok(RepoTarget::new(
            self.owner.trim(),
            self.repo.trim(),
            self.branch.trim(),
        ))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_dir() -> String {
    "./public".to_string()
}

fn default_site_name() -> String {
    "Harbour Mortgage Brokers".to_string()
}

fn default_whitelist() -> String {
    "./ip-whitelist.txt".to_string()
}

fn default_cms_dir() -> String {
    "./admin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_mirror_root() -> String {
    ".".to_string()
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest).to_string_lossy().into_owned();
        }
    } else if path == "~" {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Component-wise prefix check that ignores `.` segments
fn lexically_within(path: &Path, dir: &Path) -> bool {
    let normal = |p: &Path| -> Vec<PathBuf> {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .map(|c| PathBuf::from(c.as_os_str()))
            .collect()
    };
    let (path, dir) = (normal(path), normal(dir));
    !dir.is_empty() && path.starts_with(&dir)
}

impl Config {
    /// Find config file in order of precedence:
    /// 1. BROKERSITE_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory)
    /// 3. ~/.config/brokersite/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %path.display(), "{} set but file does not exist", CONFIG_PATH_ENV);
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Some(local);
        }

        let xdg = paths::config_file();
        if xdg.exists() {
            return Some(xdg);
        }

        None
    }

    /// Load configuration, searching the standard locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file, or search when `path` is None.
    /// An explicit path that does not exist is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file {} does not exist", p.display());
                }
                Some(p.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let mut config = if let Some(config_path) = file {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;

        config.server.public_dir = expand_tilde(&config.server.public_dir);
        config.admin.cms_dir = expand_tilde(&config.admin.cms_dir);
        config.mirror.root = expand_tilde(&config.mirror.root);
        if config.admin.whitelist_location().is_ok_and(|l| matches!(l, WhitelistLocation::File(_))) {
            config.admin.whitelist = expand_tilde(&config.admin.whitelist);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration TOML")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("SERVER_PORT") {
            self.server.port = val.parse().with_context(|| {
                format!("SERVER_PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("ADMIN_PASSWORD") {
            self.admin.password = Some(val);
            // Clear from environment to prevent exposure via /proc or ps
            std::env::remove_var("ADMIN_PASSWORD");
        }
        if let Ok(val) = std::env::var("ADMIN_WHITELIST") {
            self.admin.whitelist = val;
        }
        if let Ok(val) = std::env::var("MIRROR_OWNER") {
            self.mirror.owner = val;
        }
        if let Ok(val) = std::env::var("MIRROR_REPO") {
            self.mirror.repo = val;
        }
        Ok(())
    }

    /// Checks that apply to every command
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        if self.server.public_dir.trim().is_empty() {
            bail!("server.public_dir must not be empty");
        }
        if let WhitelistLocation::File(path) = self.admin.whitelist_location()? {
            if lexically_within(&path, Path::new(&self.server.public_dir)) {
                bail!(
                    "admin.whitelist ({}) must not be inside server.public_dir ({})",
                    path.display(),
                    self.server.public_dir
                );
            }
        }
        if self.mirror.branch.trim().is_empty() {
            bail!("mirror.branch must not be empty");
        }
        if self.mirror.exclude.max_file_bytes == 0 {
            bail!("mirror.exclude.max_file_bytes must be greater than zero");
        }
        Ok(())
    }

    /// Commented starter file written by `init-config`
    pub fn default_toml() -> String {
        format!(
            r#"# brokersite configuration
# Every value below can also be set through the environment variable noted beside it.

[server]
host = "127.0.0.1"            # SERVER_HOST
port = 3000                   # SERVER_PORT
public_dir = "./public"
site_name = "Harbour Mortgage Brokers"
secure_cookies = false        # set true when served over HTTPS

[admin]
# Shared admin password (ADMIN_PASSWORD). When unset the built-in fallback is used.
# password = "change me"
whitelist = "./ip-whitelist.txt"   # ADMIN_WHITELIST, path outside public_dir or http(s) URL
trust_forwarded_for = false   # only behind a reverse proxy that appends X-Forwarded-For
cms_dir = "./admin"

[mirror]
owner = ""                    # MIRROR_OWNER
repo = ""                     # MIRROR_REPO
branch = "main"
root = "."

[mirror.exclude]
dirs = [".git", "node_modules", ".cache", ".local", ".config", ".upm", "dist", "target"]
path_fragments = ["__generated__"]
files = ["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"]
max_file_bytes = {max}
"#,
            max = repo_mirror::walk::DEFAULT_MAX_FILE_BYTES,
        )
    }
}
