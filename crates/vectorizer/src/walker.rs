use crate::config::WalkerConfig;
use crate::error::{Result, VectorizerError};
use crate::source::{decode, SourceFile};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Enumerates source files below a root directory
pub struct FileWalker {
    root: PathBuf,
    config: WalkerConfig,
}

impl FileWalker {
    /// Fails with `PathNotFound` unless `root` is an existing directory
    pub fn new(root: impl AsRef<Path>, config: WalkerConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(VectorizerError::PathNotFound(root));
        }
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate files in lexicographic depth-first order.
    ///
    /// Lazy; every call starts a fresh walk.
    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !self.is_ignored_dir(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Failed to read entry: {err}");
                    None
                }
            })
            .filter(move |entry| entry.file_type().is_file() && self.is_candidate(entry))
            .map(DirEntry::into_path)
    }

    fn is_ignored_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.config.ignore_dirs.contains(name))
    }

    fn is_candidate(&self, entry: &DirEntry) -> bool {
        let Some(name) = entry.file_name().to_str() else {
            return false;
        };
        if self.config.ignore_files.contains(name) || !self.config.allows_extension(name) {
            return false;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > self.config.max_file_bytes => {
                log::debug!(
                    "Skipping large file {} ({} bytes > {})",
                    entry.path().display(),
                    meta.len(),
                    self.config.max_file_bytes
                );
                false
            }
            _ => true,
        }
    }

    /// `/`-separated path below the root
    pub fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Read and decode one candidate; the error is a message for the read stage
    pub async fn read(&self, path: &Path) -> std::result::Result<SourceFile, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("failed to read: {e}"))?;
        let (text, encoding) = decode(&bytes)?;
        Ok(SourceFile {
            path: path.to_path_buf(),
            relative_path: self.relative_path(path),
            text,
            encoding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_lexicographic_and_filtered() {
        let temp = tempdir().unwrap();
        write(temp.path(), "src/b.js", "b");
        write(temp.path(), "src/a/z.ts", "z");
        write(temp.path(), "src/A.tsx", "A");
        write(temp.path(), "node_modules/lib/index.js", "x");
        write(temp.path(), "src/node_modules/index.js", "x");
        write(temp.path(), "README.md", "docs");
        write(temp.path(), "yarn.lock", "lock");
        write(temp.path(), "app.js", "app");

        let walker = FileWalker::new(temp.path(), WalkerConfig::default()).unwrap();
        let files: Vec<String> = walker
            .candidates()
            .map(|path| walker.relative_path(&path))
            .collect();

        assert_eq!(files, vec!["app.js", "src/A.tsx", "src/a/z.ts", "src/b.js"]);

        let again: Vec<String> = walker
            .candidates()
            .map(|path| walker.relative_path(&path))
            .collect();
        assert_eq!(files, again);
    }

    #[test]
    fn test_large_files_are_skipped() {
        let temp = tempdir().unwrap();
        write(temp.path(), "small.js", "x");
        write(temp.path(), "big.js", &"x".repeat(64));

        let config = WalkerConfig {
            max_file_bytes: 16,
            ..WalkerConfig::default()
        };
        let walker = FileWalker::new(temp.path(), config).unwrap();
        let files: Vec<PathBuf> = walker.candidates().collect();

        assert_eq!(files, vec![temp.path().join("small.js")]);
    }

    #[test]
    fn test_missing_root_is_path_not_found() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            FileWalker::new(&missing, WalkerConfig::default()),
            Err(VectorizerError::PathNotFound(path)) if path == missing
        ));

        write(temp.path(), "file.js", "x");
        assert!(matches!(
            FileWalker::new(temp.path().join("file.js"), WalkerConfig::default()),
            Err(VectorizerError::PathNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_decodes_latin1_and_rejects_binary() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("legacy.js"), b"// \xE9t\xE9\n").unwrap();
        fs::write(temp.path().join("blob.js"), b"\x00\x01\x02").unwrap();
        let walker = FileWalker::new(temp.path(), WalkerConfig::default()).unwrap();

        let source = walker.read(&temp.path().join("legacy.js")).await.unwrap();
        assert_eq!(source.relative_path, "legacy.js");
        assert_eq!(source.text, "// été\n");
        assert_eq!(source.encoding, crate::source::Encoding::Latin1);

        assert!(walker.read(&temp.path().join("blob.js")).await.is_err());
    }
}
