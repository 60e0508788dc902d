//! Repository walking: supported extensions, ignored directories, gitignore.

use std::path::{Component, Path, PathBuf};

use crate::languages::is_supported;

/// Directory names never descended into, matched per path component.
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "env",
    "dist",
    "build",
    ".git",
    "__pycache__",
    ".next",
    ".vscode",
    "vendor",
    ".idea",
    ".tox",
    ".nvm",
    ".docker",
    "logs",
    ".history",
    ".mypy_cache",
    ".pytest_cache",
    ".serverless",
    "tmp",
    "cache",
    ".cache",
    ".sass-cache",
    "bower_components",
    "public",
    "out",
    "coverage",
];

/// A file found under the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub abs_path: PathBuf,
    /// Relative to the root, `/`-separated.
    pub rel_path: String,
}

fn is_ignored(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| IGNORED_DIRS.contains(&n)),
        _ => false,
    })
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Collect supported source files under `root`, sorted by relative path.
///
/// Respects `.gitignore`, skips hidden entries and everything below an
/// ignored directory.
#[must_use]
pub fn collect_files(root: &Path) -> Vec<WalkedFile> {
    let walk_root = root.to_path_buf();
    let mut files: Vec<WalkedFile> = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(move |entry| {
            let rel = entry.path().strip_prefix(&walk_root).unwrap_or(entry.path());
            !is_ignored(rel)
        })
        .build()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!("walk error: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && is_supported(e.path()))
        .map(|e| WalkedFile {
            rel_path: relative_path(root, e.path()),
            abs_path: e.into_path(),
        })
        .collect();

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn collects_supported_files_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/index.js", "function a() {}");
        write(dir.path(), "src/app.tsx", "const A = () => null;");
        write(dir.path(), "README.md", "# readme");
        write(dir.path(), "main.py", "def main(): pass");

        let files = collect_files(dir.path());
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, ["main.py", "src/app.tsx", "src/index.js"]);
        assert!(files.iter().all(|f| f.abs_path.exists()));
    }

    #[test]
    fn skips_ignored_directories_by_component() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/lib/index.js", "function x() {}");
        write(dir.path(), "packages/a/dist/out.js", "function y() {}");
        write(dir.path(), "src/distance.js", "function z() {}");

        let files = collect_files(dir.path());
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, ["src/distance.js"]);
    }

    #[test]
    fn respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "generated/api.ts", "export const f = () => 1;");
        write(dir.path(), "src/keep.ts", "export const g = () => 2;");

        let files = collect_files(dir.path());
        let rels: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, ["src/keep.ts"]);
    }

    #[test]
    fn ignored_match_is_component_not_substring() {
        assert!(is_ignored(Path::new("a/node_modules/b.js")));
        assert!(!is_ignored(Path::new("a/my_node_modules_copy/b.js")));
        assert!(!is_ignored(Path::new("src/outline.js")));
    }
}
