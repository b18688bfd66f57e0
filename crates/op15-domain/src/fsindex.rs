//! Shallow snapshot of a user's home directory layout, taken once at
//! session start and used for fast name resolution ("Desktop" etc.)
//! without the orchestrator needing to qualify a full path.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conventional user directory, e.g. `{name: "Desktop", path: "/home/u/Desktop"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MainDirectory {
    pub name: String,
    pub path: PathBuf,
}

/// Immutable after creation. A new index only arrives with a new Session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsIndex {
    pub main_directories: Vec<MainDirectory>,
    pub indexed_paths: BTreeSet<PathBuf>,
    pub indexed_at: DateTime<Utc>,
}

/// Conventional directory names probed under `home` when building an index.
const CONVENTIONAL_DIRS: &[&str] = &["Desktop", "Documents", "Downloads", "Projects", "Code"];

impl FsIndex {
    /// Build a shallow index (depth <= 2 under `home`) of whatever
    /// conventional directories and top-level entries actually exist.
    /// Never fails: unreadable entries are simply skipped.
    pub fn build(home: &Path) -> Self {
        let mut main_directories = vec![MainDirectory {
            name: "home".to_string(),
            path: home.to_path_buf(),
        }];

        let mut indexed_paths = BTreeSet::new();
        indexed_paths.insert(home.to_path_buf());

        for name in CONVENTIONAL_DIRS {
            let candidate = home.join(name);
            if candidate.is_dir() {
                main_directories.push(MainDirectory {
                    name: name.to_string(),
                    path: candidate.clone(),
                });
                index_shallow(&candidate, 2, &mut indexed_paths);
            }
        }

        // Depth <= 2 under home itself, regardless of conventional dirs.
        index_shallow(home, 2, &mut indexed_paths);

        Self {
            main_directories,
            indexed_paths,
            indexed_at: Utc::now(),
        }
    }

    /// Resolve a bare conventional name (e.g. "Desktop") to its absolute path.
    pub fn resolve_name(&self, name: &str) -> Option<&Path> {
        self.main_directories
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.path.as_path())
    }
}

fn index_shallow(root: &Path, depth: usize, out: &mut BTreeSet<PathBuf>) {
    if depth == 0 {
        return;
    }
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        out.insert(path.clone());
        if depth > 1 && path.is_dir() {
            index_shallow(&path, depth - 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn build_includes_home_and_existing_conventional_dirs() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("Desktop")).unwrap();
        std::fs::write(tmp.path().join("Desktop/a.txt"), "x").unwrap();

        let idx = FsIndex::build(tmp.path());
        assert!(idx.resolve_name("home").is_some());
        assert_eq!(idx.resolve_name("Desktop"), Some(tmp.path().join("Desktop").as_path()));
        assert!(idx.indexed_paths.contains(&tmp.path().join("Desktop")));
        assert!(idx.indexed_paths.contains(&tmp.path().join("Desktop/a.txt")));
    }

    #[test]
    fn build_skips_missing_conventional_dirs() {
        let tmp = TempDir::new().unwrap();
        let idx = FsIndex::build(tmp.path());
        assert!(idx.resolve_name("Projects").is_none());
    }

    #[test]
    fn resolve_name_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let idx = FsIndex::build(tmp.path());
        assert!(idx.resolve_name("HOME").is_some());
    }
}
