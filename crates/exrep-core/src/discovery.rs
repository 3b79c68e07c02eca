//! Recursive discovery of input documents.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::{glob_with, MatchOptions, Pattern};
use tracing::{info, warn};

use crate::error::DiscoveryError;

/// Find every file under `root` whose extension is one of `extensions`.
///
/// Extensions are given without the dot and matched case-insensitively. The
/// result is sorted and free of duplicates.
pub fn discover<S: AsRef<str>>(root: &Path, extensions: &[S]) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    let root_str = root.to_str().ok_or_else(|| DiscoveryError::InvalidPath {
        path: root.to_path_buf(),
        reason: "path is not valid UTF-8".to_string(),
    })?;
    let base = Pattern::escape(root_str.trim_end_matches(std::path::MAIN_SEPARATOR));

    let extensions: Vec<&str> = extensions
        .iter()
        .map(|e| e.as_ref().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .collect();
    info!(
        "Searching for files with extensions: {:?} in {}",
        extensions,
        root.display()
    );

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut found = BTreeSet::new();
    for extension in extensions {
        let pattern = format!("{}/**/*.{}", base, Pattern::escape(extension));
        let paths = glob_with(&pattern, options).map_err(|e| DiscoveryError::InvalidPath {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path: {}", e),
            }
        }
    }

    info!("Found {} files", found.len());
    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_discovers_recursively() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.png");
        let b = touch(dir.path(), "nested/deeper/b.pdf");
        let c = touch(dir.path(), "nested/C.JPG");
        touch(dir.path(), "notes.txt");

        let files = discover(dir.path(), &["png", "jpg", "pdf"]).unwrap();

        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(files, expected);
    }

    #[test]
    fn test_accepts_dotted_extensions_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.png");

        let files = discover(dir.path(), &[".png", "png", "PNG"]).unwrap();
        assert_eq!(files, vec![a]);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path(), &["png"]).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = discover(&missing, &["png"]).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotADirectory(p) if p == missing));
    }

    #[test]
    fn test_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "a.png");

        assert!(matches!(
            discover(&file, &["png"]),
            Err(DiscoveryError::NotADirectory(_))
        ));
    }
}
