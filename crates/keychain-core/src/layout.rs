//! Deterministic on-disk layout.
//!
//! Every artifact path is a pure function of the layout plus the identity's
//! name and subfolder. Paths are never persisted; they are recomputed
//! whenever needed so the filesystem stays the single source of truth.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of artifact file belonging to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Private key (`.key`)
    Key,
    /// Certificate (`.crt`)
    #[serde(alias = "crt")]
    Certificate,
    /// Certificate signing request (`.csr`)
    #[serde(alias = "csr")]
    Request,
}

impl FileKind {
    /// File extension for this kind, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Certificate => "crt",
            Self::Request => "csr",
        }
    }

    /// Map a file extension back to a kind.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "key" => Some(Self::Key),
            "crt" => Some(Self::Certificate),
            "csr" => Some(Self::Request),
            _ => None,
        }
    }
}

/// Absolute paths of one identity's artifacts.
///
/// Derived from [`Layout::pair`], never stored. The `created` flag is set by
/// engine operations that materialized at least one of the files during the
/// current pass; it drives the force-cascade rule for dependents.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Private key path
    pub key: PathBuf,
    /// Certificate path
    pub certificate: PathBuf,
    /// Signing request path
    pub request: PathBuf,
    /// Whether any part was freshly generated this pass
    pub created: bool,
}

impl KeyPair {
    /// Path of the artifact of the given kind.
    #[must_use]
    pub fn path(&self, kind: FileKind) -> &Path {
        match kind {
            FileKind::Key => &self.key,
            FileKind::Certificate => &self.certificate,
            FileKind::Request => &self.request,
        }
    }
}

/// Root directory layout shared by the engine and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    /// Base directory everything lives under.
    pub root: PathBuf,
    /// Managed folder under the root (default `certs`).
    pub folder: String,
    /// Subfolder for unclassified runtime submissions (default `incoming`).
    pub incoming: String,
}

impl Layout {
    /// Create a layout with default folder names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folder: String::from("certs"),
            incoming: String::from("incoming"),
        }
    }

    /// The managed directory: `<root>/<folder>`.
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.root.join(&self.folder)
    }

    /// Directory holding one identity's files. An empty subfolder means
    /// flat files directly under the managed directory.
    #[must_use]
    pub fn identity_dir(&self, subfolder: &str) -> PathBuf {
        if subfolder.is_empty() {
            self.base_dir()
        } else {
            self.base_dir().join(subfolder)
        }
    }

    /// Directory for runtime-received files.
    #[must_use]
    pub fn incoming_dir(&self) -> PathBuf {
        self.base_dir().join(&self.incoming)
    }

    /// Artifact paths for a named identity in a subfolder.
    #[must_use]
    pub fn pair(&self, subfolder: &str, name: &str) -> KeyPair {
        let dir = self.identity_dir(subfolder);
        KeyPair {
            key: dir.join(format!("{name}.key")),
            certificate: dir.join(format!("{name}.crt")),
            request: dir.join(format!("{name}.csr")),
            created: false,
        }
    }

    /// Artifact paths in the incoming area.
    #[must_use]
    pub fn incoming_pair(&self, name: &str) -> KeyPair {
        let dir = self.incoming_dir();
        KeyPair {
            key: dir.join(format!("{name}.key")),
            certificate: dir.join(format!("{name}.crt")),
            request: dir.join(format!("{name}.csr")),
            created: false,
        }
    }
}
