//! Output directory writer: atomic writes, unchanged-file skipping and
//! pruning of files a build no longer produces.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to read {path:?}: {source}")]
    ReadSource { path: PathBuf, source: io::Error },

    #[error("Failed to remove stale {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("Output path escapes the output directory: {0}")]
    UnsafePath(String),
}

/// Writes files below one output root and remembers what it wrote
pub struct OutputWriter {
    root: PathBuf,
    written: BTreeSet<String>,
}

impl OutputWriter {
    pub fn new(root: &Path) -> Result<Self, WriteError> {
        fs::create_dir_all(root).map_err(|source| WriteError::CreateDir {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            written: BTreeSet::new(),
        })
    }

    /// Write `contents` to `rel` (a `/`-separated path below the root).
    /// Returns false when the file already had exactly these contents.
    pub fn write(&mut self, rel: &str, contents: &[u8]) -> Result<bool, WriteError> {
        let dest = self.destination(rel)?;
        self.written.insert(rel.to_string());

        if fs::read(&dest).is_ok_and(|existing| existing == contents) {
            tracing::debug!("Unchanged: {}", rel);
            return Ok(false);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dest.with_file_name(format!(".{file_name}.tmp"));
        let result = fs::write(&temp, contents).and_then(|_| fs::rename(&temp, &dest));
        if let Err(source) = result {
            let _ = fs::remove_file(&temp);
            return Err(WriteError::Write { path: dest, source });
        }

        tracing::debug!("Wrote: {}", rel);
        Ok(true)
    }

    /// Copy a source file into the output
    pub fn copy_file(&mut self, rel: &str, source: &Path) -> Result<bool, WriteError> {
        let contents = fs::read(source).map_err(|err| WriteError::ReadSource {
            path: source.to_path_buf(),
            source: err,
        })?;
        self.write(rel, &contents)
    }

    /// Remove every file below the root that was not written by this run,
    /// then any directories left empty. Dot-entries are never touched except
    /// temp files left by an interrupted write. Markdown files are kept.
    pub fn prune(&self) -> Result<Vec<String>, WriteError> {
        let mut removed = Vec::new();

        let entries: Vec<_> = WalkDir::new(&self.root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') || (e.file_type().is_file() && name.ends_with(".tmp"))
            })
            .filter_map(|e| e.ok())
            .collect();

        for entry in entries {
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                // Only succeeds when empty
                if fs::remove_dir(path).is_ok() {
                    tracing::debug!("Removed empty directory: {}", rel);
                }
                continue;
            }

            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("md")) {
                tracing::warn!("Leaving markdown file in output: {}", rel);
                continue;
            }

            if !self.written.contains(&rel) {
                fs::remove_file(path).map_err(|source| WriteError::Remove {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::info!("Removed stale output: {}", rel);
                removed.push(rel);
            }
        }

        Ok(removed)
    }

    /// Prune stale files and return the manifest of written paths
    pub fn finish(self) -> Result<Vec<String>, WriteError> {
        self.prune()?;
        Ok(self.written.into_iter().collect())
    }

    fn destination(&self, rel: &str) -> Result<PathBuf, WriteError> {
        let path = Path::new(rel);
        let safe = !rel.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(WriteError::UnsafePath(rel.to_string()));
        }
        Ok(self.root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents_and_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = OutputWriter::new(dir.path()).unwrap();

        assert!(writer.write("pages/a.html", b"one").unwrap());
        assert!(!writer.write("pages/a.html", b"one").unwrap());
        assert!(writer.write("pages/a.html", b"two").unwrap());
        assert_eq!(fs::read(dir.path().join("pages/a.html")).unwrap(), b"two");
        assert!(!dir.path().join("pages/.a.html.tmp").exists());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = OutputWriter::new(dir.path()).unwrap();

        assert!(matches!(
            writer.write("../evil.html", b"x"),
            Err(WriteError::UnsafePath(_))
        ));
        assert!(matches!(
            writer.write("/abs.html", b"x"),
            Err(WriteError::UnsafePath(_))
        ));
    }

    #[test]
    fn test_finish_prunes_stale_files_and_returns_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pages/old")).unwrap();
        fs::write(root.join("pages/old/secret.html"), "stale").unwrap();
        fs::write(root.join("pages/keep.html"), "stale").unwrap();
        fs::write(root.join(".nojekyll"), "").unwrap();

        let mut writer = OutputWriter::new(root).unwrap();
        writer.write("index.html", b"index").unwrap();
        writer.write("pages/keep.html", b"fresh").unwrap();
        let manifest = writer.finish().unwrap();

        assert_eq!(manifest, vec!["index.html", "pages/keep.html"]);
        assert!(!root.join("pages/old").exists());
        assert!(root.join(".nojekyll").exists());
        assert_eq!(fs::read_to_string(root.join("pages/keep.html")).unwrap(), "fresh");
    }

    #[test]
    fn test_prune_removes_leftover_temp_files_but_keeps_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pages")).unwrap();
        fs::write(root.join("pages/.tavern.html.tmp"), "partial").unwrap();
        fs::write(root.join("pages/Home.md"), "- Home").unwrap();
        fs::write(root.join(".keep"), "").unwrap();

        let mut writer = OutputWriter::new(root).unwrap();
        writer.write("pages/harbor.html", b"done").unwrap();
        let removed = writer.prune().unwrap();

        assert_eq!(removed, vec!["pages/.tavern.html.tmp"]);
        assert!(root.join("pages/Home.md").exists());
        assert!(root.join(".keep").exists());
    }

    #[test]
    fn test_copy_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("map.png");
        fs::write(&source, b"png").unwrap();

        let out = dir.path().join("out");
        let mut writer = OutputWriter::new(&out).unwrap();
        writer.copy_file("assets/map.png", &source).unwrap();
        assert_eq!(fs::read(out.join("assets/map.png")).unwrap(), b"png");
    }
}
