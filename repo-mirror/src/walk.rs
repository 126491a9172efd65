// ABOUTME: Recursive enumeration of local files eligible for mirroring.
// ABOUTME: Applies directory, path-fragment, filename and size exclusions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Files at or above this size are never uploaded (300 KiB)
pub const DEFAULT_MAX_FILE_BYTES: u64 = 300 * 1024;

/// A file that passed every exclusion rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Path relative to the walk root, `/`-separated
    pub path: String,
    pub size: u64,
}

/// Static exclusion list applied during enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRules {
    /// Directory names skipped wherever they appear
    #[serde(default = "default_exclude_dirs")]
    pub dirs: Vec<String>,
    /// Substrings of the relative path marking generated content
    #[serde(default = "default_exclude_path_fragments")]
    pub path_fragments: Vec<String>,
    /// Exact filenames skipped wherever they appear
    #[serde(default = "default_exclude_files")]
    pub files: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

pub fn default_exclude_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        ".cache",
        ".local",
        ".config",
        ".upm",
        "dist",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_exclude_path_fragments() -> Vec<String> {
    vec!["__generated__".to_string()]
}

pub fn default_exclude_files() -> Vec<String> {
    ["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            dirs: default_exclude_dirs(),
            path_fragments: default_exclude_path_fragments(),
            files: default_exclude_files(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl ExclusionRules {
    fn excludes_dir(&self, name: &str, relative: &str) -> bool {
        self.dirs.iter().any(|d| d == name) || self.matches_fragment(relative)
    }

    fn excludes_file(&self, name: &str, relative: &str, size: u64) -> bool {
        self.files.iter().any(|f| f == name)
            || self.matches_fragment(relative)
            || size >= self.max_file_bytes
    }

    fn matches_fragment(&self, relative: &str) -> bool {
        self.path_fragments
            .iter()
            .any(|fragment| !fragment.is_empty() && relative.contains(fragment.as_str()))
    }
}

fn relative_path(root: &Path, entry: &DirEntry) -> String {
    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and return every file that survives `rules`, in sorted order.
///
/// Excluded directories are pruned before descent, so nothing beneath them
/// is ever read.
pub fn enumerate(root: &Path, rules: &ExclusionRules) -> Result<Vec<FileCandidate>> {
    let mut candidates = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !rules.excludes_dir(&name, &relative_path(root, entry))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        let name = entry.file_name().to_string_lossy();
        let relative = relative_path(root, &entry);

        if rules.excludes_file(&name, &relative, metadata.len()) {
            tracing::debug!(path = %relative, size = metadata.len(), "Excluded from mirror");
            continue;
        }

        candidates.push(FileCandidate {
            path: relative,
            size: metadata.len(),
        });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = ExclusionRules::default();
        assert!(rules.dirs.contains(&".git".to_string()));
        assert!(rules.dirs.contains(&"node_modules".to_string()));
        assert!(rules.files.contains(&"package-lock.json".to_string()));
        assert_eq!(rules.max_file_bytes, 307_200);
    }

    #[test]
    fn test_size_boundary() {
        let rules = ExclusionRules::default();
        assert!(!rules.excludes_file("a.txt", "a.txt", 307_199));
        assert!(rules.excludes_file("a.txt", "a.txt", 307_200));
    }

    #[test]
    fn test_fragment_match_is_substring() {
        let rules = ExclusionRules::default();
        assert!(rules.excludes_dir("__generated__", "tina/__generated__"));
        assert!(rules.excludes_file("types.ts", "tina/__generated__/types.ts", 10));
        assert!(!rules.excludes_file("types.ts", "tina/types.ts", 10));
    }

    #[test]
    fn test_empty_fragment_never_matches() {
        let rules = ExclusionRules {
            path_fragments: vec![String::new()],
            ..ExclusionRules::default()
        };
        assert!(!rules.excludes_file("a.txt", "a.txt", 1));
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let rules: ExclusionRules = toml::from_str("max_file_bytes = 1024").unwrap();
        assert_eq!(rules.max_file_bytes, 1024);
        assert_eq!(rules.dirs, default_exclude_dirs());
    }
}
