use std::path::{Component, Path, PathBuf};

use super::{DocumentStorage, StorageArea};
use crate::error::StorageError;

/// Stores documents under a root directory. Handles are paths relative to
/// that root, `/`-separated.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores content using atomic file creation so concurrent writers never
    /// clobber each other; a taken name gets a `_N` suffix.
    fn store_with_atomic_creation(
        &self,
        dir_path: &Path,
        base: &str,
        extension: &str,
        content: &[u8],
    ) -> Result<String, StorageError> {
        use std::io::Write;

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                format!("{}.{}", base, extension)
            } else {
                format!("{}_{}.{}", base, counter, extension)
            };

            let try_path = dir_path.join(&try_filename);

            // O_CREAT | O_EXCL
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_filename);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(
            dir_path.join(format!("{}.{}", base, extension)),
        ))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Maps a handle back to a path under the root, refusing anything that
    /// could escape it.
    fn resolve(&self, handle: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(handle);
        let escapes = handle.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StorageError::InvalidHandle(handle.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl DocumentStorage for FileStorage {
    fn store(
        &self,
        content: &[u8],
        area: StorageArea,
        stem: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let dir_path = self.root.join(area.as_str());
        self.ensure_directory(&dir_path)?;

        let base = safe_stem(stem);
        let filename = self.store_with_atomic_creation(&dir_path, &base, extension, content)?;

        Ok(format!("{}/{}", area.as_str(), filename))
    }

    fn retrieve(&self, handle: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(handle)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(handle.to_string())
            } else {
                StorageError::ReadFile { path, source: e }
            }
        })
    }

    fn exists(&self, handle: &str) -> Result<bool, StorageError> {
        let path = self.resolve(handle)?;
        Ok(path.is_file())
    }
}

/// Keeps filename stems to `[A-Za-z0-9_-]`.
fn safe_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
