//! Core types for the keychain certificate lifecycle manager.
//!
//! This crate carries everything the engine and the orchestrator share:
//! the error taxonomy, identity declarations, the deterministic on-disk
//! layout, directory snapshots, and the pure presence-state classifier.
//! Nothing here invokes the external certificate tool.

mod descriptor;
mod error;
mod layout;
mod snapshot;
mod state;

pub use descriptor::{IdentityDescriptor, Role};
pub use error::{KeychainError, Result};
pub use layout::{FileKind, KeyPair, Layout};
pub use snapshot::{clear_dir, ensure_dir, map_tree, map_tree_sync, FileEntry, FolderMap};
pub use state::{classify, IdentityState};
