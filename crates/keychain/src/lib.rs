//! Declarative key/certificate lifecycle management over the external
//! `openssl` tool.
//!
//! A [`KeyChain`] owns a declared set of named key/certificate identities
//! persisted under a directory tree. Each initialization pass verifies
//! required identities exist, creates missing auto-managed ones (keys,
//! CSRs, self-signed or CA-signed certificates) with CA-before-dependent
//! ordering, and rebuilds a queryable certificate map. At runtime the
//! chain also ingests submitted files and signs CSRs against a declared CA.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keychain::{FileKind, IdentityDescriptor, InitOptions, KeyChain, KeyChainConfig, Role};
//!
//! #[tokio::main]
//! async fn main() -> keychain::Result<()> {
//!     let config = KeyChainConfig::new("/srv/pki")
//!         .identity(IdentityDescriptor::new("ca").role(Role::Ca).auto_create(true))
//!         .identity(IdentityDescriptor::new("sec").signer("ca").auto_create(true));
//!
//!     let mut chain = KeyChain::new(config)?;
//!     chain.initialize(InitOptions::new()).await?;
//!
//!     let cert = chain.content("sec", FileKind::Certificate).await?;
//!     println!("{cert}");
//!     Ok(())
//! }
//! ```

mod certs;
mod chain;
mod config;

pub use certs::{CertMap, IdentityFiles};
pub use chain::{anonymous_name, InitOptions, InitReport, KeyChain, SignerRef};
pub use config::KeyChainConfig;

// Re-export core types
pub use keychain_core::{
    classify, map_tree, map_tree_sync, FileEntry, FileKind, FolderMap, IdentityDescriptor,
    IdentityState, KeyPair, KeychainError, Layout, Result, Role,
};

// Re-export the generation engine
pub use keychain_gen::{KeyGen, Subject, DEFAULT_KEY_SIZE, VALIDITY_DAYS};
