use std::path::{Component, Path};

use walkdir::WalkDir;

use super::IsoError;

/// Relative directory and file paths of a source tree, both sorted
/// lexicographically.
///
/// Sorting is a determinism invariant: two scans of the same tree must yield
/// the same manifest regardless of the filesystem's enumeration order, so
/// the image layout is reproducible across hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryManifest {
    directories: Vec<String>,
    files: Vec<String>,
}

impl DirectoryManifest {
    /// Walk `source` recursively, recording every directory and file path
    /// relative to it, with `/` separators.
    pub fn scan(source: &Path) -> Result<Self, IsoError> {
        let mut directories = Vec::new();
        let mut files = Vec::new();

        for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|err| {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source.to_path_buf());
                IsoError::Filesystem {
                    path,
                    source: err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk failed")),
                }
            })?;

            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| IsoError::InvalidPath(entry.path().display().to_string()))?;
            let rel = relative_string(rel)
                .ok_or_else(|| IsoError::InvalidPath(entry.path().display().to_string()))?;

            if entry.file_type().is_dir() {
                directories.push(rel);
            } else if entry.file_type().is_file() {
                files.push(rel);
            }
            // Symlinks and special files are skipped; they have no ISO-9660
            // representation in this writer.
        }

        directories.sort();
        files.sort();

        Ok(Self { directories, files })
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }
}

fn relative_string(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
