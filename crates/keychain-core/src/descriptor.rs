//! Identity declarations.
//!
//! Descriptors are the immutable configuration half of the model: they say
//! which identities the chain manages and how each one is handled during an
//! initialization pass. The mutable half (which files actually exist) lives
//! in the snapshot and is recomputed on every pass.

use serde::{Deserialize, Serialize};

/// Role of an identity within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Certificate authority - self-signed, signs other identities
    Ca,
    /// Leaf certificate signed by a CA (or self-signed when no signer given)
    #[default]
    #[serde(alias = "crt")]
    Certificate,
    /// Key plus signing request only, no certificate
    #[serde(alias = "csr")]
    Request,
}

impl Role {
    /// File extensions an identity of this role is expected to have on disk.
    #[must_use]
    pub const fn expected_kinds(self) -> &'static [crate::FileKind] {
        match self {
            Self::Ca | Self::Certificate => {
                &[crate::FileKind::Key, crate::FileKind::Certificate]
            }
            Self::Request => &[crate::FileKind::Key, crate::FileKind::Request],
        }
    }
}

/// One declared identity.
///
/// Declared once at construction and immutable afterwards; the orchestrator
/// diffs the declared set against a directory snapshot on every pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    /// Unique identity name; also the file stem of its artifacts.
    pub name: String,

    /// Role of the identity.
    #[serde(default)]
    pub role: Role,

    /// Name of the declared CA that signs this identity, if any.
    #[serde(default)]
    pub signer: Option<String>,

    /// Subfolder under the managed root holding this identity's files.
    /// Empty means flat files directly under the root.
    #[serde(default)]
    pub folder: String,

    /// Initialization fails (or reports, in suppressed mode) when this
    /// identity's files are absent.
    #[serde(default)]
    pub required: bool,

    /// Missing files are created during initialization. Only consulted
    /// when `required` is false.
    #[serde(default, alias = "create")]
    pub auto_create: bool,

    /// Regenerate this identity on every pass, present or not.
    #[serde(default, alias = "force")]
    pub force_recreate: bool,

    /// Delete this identity's folder before each pass.
    #[serde(default = "default_clear", alias = "clear")]
    pub clear_before_run: bool,
}

const fn default_clear() -> bool {
    true
}

impl IdentityDescriptor {
    /// Create a descriptor with defaults, placed in a subfolder named
    /// after the identity.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            folder: name.clone(),
            name,
            role: Role::Certificate,
            signer: None,
            required: false,
            auto_create: false,
            force_recreate: false,
            clear_before_run: true,
        }
    }

    /// Set the role.
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the signing CA reference.
    #[must_use]
    pub fn signer(mut self, signer: impl Into<String>) -> Self {
        self.signer = Some(signer.into());
        self
    }

    /// Set the subfolder.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Mark the identity as required.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Enable or disable automatic creation.
    #[must_use]
    pub const fn auto_create(mut self, create: bool) -> Self {
        self.auto_create = create;
        self
    }

    /// Enable or disable forced regeneration.
    #[must_use]
    pub const fn force_recreate(mut self, force: bool) -> Self {
        self.force_recreate = force;
        self
    }

    /// Enable or disable folder clearing before each pass.
    #[must_use]
    pub const fn clear_before_run(mut self, clear: bool) -> Self {
        self.clear_before_run = clear;
        self
    }
}
