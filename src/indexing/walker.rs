//! File system walker for discovering documents to index
//!
//! This module provides directory traversal with support for:
//! - .gitignore and .docsiftignore rules
//! - Custom ignore patterns from configuration
//! - Hidden file handling

use crate::config::IndexingConfig;
use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Walks roots to find files to index
#[derive(Debug, Clone)]
pub struct FileWalker {
    ignore_patterns: Vec<String>,
}

impl FileWalker {
    /// Create a new file walker with the given settings
    pub fn new(config: &IndexingConfig) -> Self {
        Self {
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Walk a directory (or a single file) and return an iterator of files to index
    pub fn walk(&self, root: &Path) -> impl Iterator<Item = PathBuf> {
        let mut builder = WalkBuilder::new(root);

        builder
            .hidden(true) // Skip hidden files and directories
            .git_ignore(true) // Respect .gitignore files
            .git_global(true) // Respect global gitignore
            .git_exclude(true) // Respect .git/info/exclude
            .follow_links(false)
            .max_depth(None)
            .require_git(false); // Allow gitignore to work in non-git directories

        builder.add_custom_ignore_filename(".docsiftignore");

        if let Some(overrides) = self.overrides(root) {
            builder.overrides(overrides);
        }

        builder
            .build()
            .filter_map(Result::ok) // Skip files we can't access
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
    }

    /// Sorted, de-duplicated files under every root
    pub fn discover(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let files: BTreeSet<PathBuf> = roots.iter().flat_map(|root| self.walk(root)).collect();
        files.into_iter().collect()
    }

    /// Count files that would be indexed (useful for dry runs)
    pub fn count_files(&self, root: &Path) -> usize {
        self.walk(root).count()
    }

    /// Configured patterns as exclusion overrides rooted at `root`
    fn overrides(&self, root: &Path) -> Option<Override> {
        if self.ignore_patterns.is_empty() {
            return None;
        }
        let mut builder = OverrideBuilder::new(root);
        for pattern in &self.ignore_patterns {
            if let Err(e) = builder.add(&format!("!{pattern}")) {
                tracing::warn!("ignoring invalid pattern '{pattern}': {e}");
            }
        }
        match builder.build() {
            Ok(overrides) => Some(overrides),
            Err(e) => {
                tracing::warn!("ignore patterns disabled: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn walker(patterns: &[&str]) -> FileWalker {
        let config = IndexingConfig {
            ignore_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            ..IndexingConfig::default()
        };
        FileWalker::new(&config)
    }

    #[test]
    fn test_walk_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("notes")).unwrap();
        fs::write(root.join("a.txt"), "alpha").unwrap();
        fs::write(root.join("notes").join("b.md"), "beta").unwrap();

        let files = walker(&[]).discover(&[root.to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert!(files[1].ends_with("notes/b.md"));
    }

    #[test]
    fn test_ignore_hidden_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".hidden.txt"), "secret").unwrap();
        fs::write(root.join("visible.txt"), "shown").unwrap();

        let files: Vec<_> = walker(&[]).walk(root).collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("visible.txt"));
    }

    #[test]
    fn test_gitignore_and_patterns_respected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".gitignore"), "ignored.txt\n").unwrap();
        fs::create_dir(root.join("node_modules")).unwrap();
        fs::write(root.join("node_modules").join("dep.txt"), "dep").unwrap();
        fs::write(root.join("ignored.txt"), "no").unwrap();
        fs::write(root.join("included.txt"), "yes").unwrap();

        let files: Vec<_> = walker(&["node_modules/**"]).walk(root).collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("included.txt"));
    }

    #[test]
    fn test_discover_dedups_overlapping_roots() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("x.txt"), "x").unwrap();

        let files = walker(&[]).discover(&[root.to_path_buf(), root.join("sub")]);
        assert_eq!(files.len(), 1);
        assert_eq!(walker(&[]).count_files(root), 1);
    }
}
