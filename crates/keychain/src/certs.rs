//! Queryable certificate map rebuilt after every initialization pass.

use std::collections::HashMap;

use keychain_core::{FileEntry, FileKind};

/// Snapshot-backed views of one identity's files.
#[derive(Debug, Clone, Default)]
pub struct IdentityFiles {
    /// Private key
    pub key: Option<FileEntry>,
    /// Certificate
    pub certificate: Option<FileEntry>,
    /// Signing request
    pub request: Option<FileEntry>,
}

impl IdentityFiles {
    /// Entry of the given kind, if present.
    #[must_use]
    pub const fn get(&self, kind: FileKind) -> Option<&FileEntry> {
        match kind {
            FileKind::Key => self.key.as_ref(),
            FileKind::Certificate => self.certificate.as_ref(),
            FileKind::Request => self.request.as_ref(),
        }
    }

    pub(crate) fn set(&mut self, kind: FileKind, entry: FileEntry) {
        match kind {
            FileKind::Key => self.key = Some(entry),
            FileKind::Certificate => self.certificate = Some(entry),
            FileKind::Request => self.request = Some(entry),
        }
    }
}

/// `name → kind → FileEntry` lookup over the managed tree.
///
/// An explicit lookup table; entries reflect the last snapshot and are
/// replaced wholesale on every pass.
#[derive(Debug, Clone, Default)]
pub struct CertMap {
    entries: HashMap<String, IdentityFiles>,
}

impl CertMap {
    /// All files known for an identity.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<&IdentityFiles> {
        self.entries.get(name)
    }

    /// Entry for one identity/kind combination.
    #[must_use]
    pub fn get(&self, name: &str, kind: FileKind) -> Option<&FileEntry> {
        self.entries.get(name)?.get(kind)
    }

    /// Identity names present in the map.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// True when no identity has any file recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn set(&mut self, name: &str, kind: FileKind, entry: FileEntry) {
        self.entries
            .entry(name.to_string())
            .or_default()
            .set(kind, entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
