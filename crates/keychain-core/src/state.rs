//! Presence-state classification.
//!
//! The per-identity state machine (`absent → key-only → key+CSR → signed`)
//! is never persisted; it is inferred from a snapshot. Keeping it a pure
//! function makes the scheduler's input testable without touching storage.

use crate::descriptor::{IdentityDescriptor, Role};
use crate::snapshot::FolderMap;

/// Materialization state of one identity, as of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    /// No artifacts on disk
    Missing,
    /// Private key only
    KeyOnly,
    /// Key and signing request, no certificate
    KeyAndRequest,
    /// Everything the role expects is present
    Signed,
}

impl IdentityState {
    /// True when the identity is fully materialized for its role.
    #[must_use]
    pub fn is_complete(self, role: Role) -> bool {
        match role {
            Role::Ca | Role::Certificate => self == Self::Signed,
            Role::Request => matches!(self, Self::KeyAndRequest | Self::Signed),
        }
    }
}

/// Classify an identity's state against a snapshot of the managed tree.
#[must_use]
pub fn classify(descriptor: &IdentityDescriptor, map: &FolderMap) -> IdentityState {
    let has = |ext: &str| {
        map.lookup(&descriptor.folder, &format!("{}.{}", descriptor.name, ext))
            .is_some()
    };

    let key = has("key");
    let crt = has("crt");
    let csr = has("csr");

    if key && crt {
        IdentityState::Signed
    } else if key && csr {
        IdentityState::KeyAndRequest
    } else if key {
        IdentityState::KeyOnly
    } else {
        IdentityState::Missing
    }
}
