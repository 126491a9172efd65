// ABOUTME: XDG Base Directory paths plus the admin route prefix
// ABOUTME: Provides standardized paths for logs and configuration

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "harbour";
const APPLICATION: &str = "brokersite";

/// Every route under this prefix sits behind the access gate
pub const ADMIN_PREFIX: &str = "/admin";

/// True for `/admin` and anything beneath it, but not `/administrator`
pub fn is_admin_path(path: &str) -> bool {
    match path.strip_prefix(ADMIN_PREFIX) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Get XDG-compliant directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the data directory path (e.g., ~/.local/share/brokersite/)
/// Falls back to ./data if XDG directories unavailable
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// e.g., ~/.local/share/brokersite/logs/
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the config directory path (e.g., ~/.config/brokersite/)
/// Falls back to current directory if XDG directories unavailable
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_paths() {
        assert!(is_admin_path("/admin"));
        assert!(is_admin_path("/admin/"));
        assert!(is_admin_path("/admin/cms/index.html"));
        assert!(!is_admin_path("/"));
        assert!(!is_admin_path("/about"));
        assert!(!is_admin_path("/administrator"));
        assert!(!is_admin_path("admin"));
    }

    #[test]
    fn test_log_dir_inside_data_dir() {
        assert!(log_dir().starts_with(data_dir()));
        assert!(log_dir().ends_with("logs"));
    }

    #[test]
    fn test_config_file_name() {
        assert!(config_file().ends_with("config.toml"));
    }
}
