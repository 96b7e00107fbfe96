//! Directory tree snapshots.
//!
//! A snapshot is a point-in-time, read-only map of a directory tree. File
//! contents are not captured; a [`FileEntry`] reads them lazily on demand.
//! Staleness between snapshot and use is accepted by design - the
//! orchestrator re-snapshots after every mutating batch rather than trying
//! to keep a live view.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{KeychainError, Result};

/// Read-only view over one file captured in a snapshot.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path at snapshot time
    pub path: PathBuf,
    /// File name without extension
    pub base: String,
    /// Extension without the dot, empty if none
    pub ext: String,
}

impl FileEntry {
    /// Build an entry from a path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, base, ext }
    }

    /// Full file name including extension.
    #[must_use]
    pub fn file_name(&self) -> String {
        if self.ext.is_empty() {
            self.base.clone()
        } else {
            format!("{}.{}", self.base, self.ext)
        }
    }

    /// Read the file's current content.
    pub async fn content(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| KeychainError::io(&self.path, e))
    }

    /// Synchronous variant of [`Self::content`].
    pub fn content_sync(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| KeychainError::io(&self.path, e))
    }
}

/// Nested snapshot of one directory: files by full name, subfolders by name.
#[derive(Debug, Clone, Default)]
pub struct FolderMap {
    files: HashMap<String, FileEntry>,
    folders: HashMap<String, FolderMap>,
}

impl FolderMap {
    /// Look up a file in this directory by full name.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    /// Look up a direct subfolder by name.
    #[must_use]
    pub fn folder(&self, name: &str) -> Option<&FolderMap> {
        self.folders.get(name)
    }

    /// Look up a file inside a subfolder; an empty subfolder name addresses
    /// this directory itself.
    #[must_use]
    pub fn lookup(&self, subfolder: &str, file_name: &str) -> Option<&FileEntry> {
        if subfolder.is_empty() {
            self.file(file_name)
        } else {
            self.folder(subfolder)?.file(file_name)
        }
    }

    /// Iterate over files in this directory.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    /// True when the snapshot holds no files and no subfolders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    fn insert_file(&mut self, entry: FileEntry) {
        self.files.insert(entry.file_name(), entry);
    }

    fn subfolder_mut(&mut self, name: &str) -> &mut FolderMap {
        self.folders.entry(name.to_string()).or_default()
    }
}

/// Snapshot a directory tree. An absent directory yields an empty map.
pub async fn map_tree(dir: &Path) -> Result<FolderMap> {
    let mut map = FolderMap::default();
    if !tokio::fs::try_exists(dir)
        .await
        .map_err(|e| KeychainError::io(dir, e))?
    {
        debug!(path = %dir.display(), "snapshot target absent, empty map");
        return Ok(map);
    }
    fill_map(dir.to_path_buf(), &mut map).await?;
    Ok(map)
}

fn fill_map<'a>(
    dir: PathBuf,
    map: &'a mut FolderMap,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| KeychainError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KeychainError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| KeychainError::io(&path, e))?;
            if file_type.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                fill_map(path, map.subfolder_mut(&name)).await?;
            } else if file_type.is_file() {
                map.insert_file(FileEntry::new(path));
            }
        }
        Ok(())
    })
}

/// Synchronous snapshot built with a directory walk.
pub fn map_tree_sync(dir: &Path) -> Result<FolderMap> {
    let mut map = FolderMap::default();
    if !dir.exists() {
        return Ok(map);
    }
    for entry in walkdir::WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            match e.into_io_error() {
                Some(io) => KeychainError::io(&path, io),
                None => KeychainError::io(
                    &path,
                    std::io::Error::other("walk loop"),
                ),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or_else(|_| entry.path());
        let mut node = &mut map;
        let mut components = rel.components().peekable();
        while let Some(part) = components.next() {
            let part = part.as_os_str().to_string_lossy().into_owned();
            if components.peek().is_some() {
                node = node.subfolder_mut(&part);
            } else {
                node.insert_file(FileEntry::new(entry.path()));
            }
        }
    }
    Ok(map)
}

/// Idempotent recursive directory create.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| KeychainError::io(dir, e))
}

/// Recursive delete. Deleting an absent path is success.
pub async fn clear_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(KeychainError::io(dir, e)),
    }
}
