//! Chain configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use keychain_core::{IdentityDescriptor, KeychainError, Layout, Result};
use keychain_gen::Subject;

/// Configuration for a [`KeyChain`](crate::KeyChain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyChainConfig {
    /// Base directory everything lives under (default: current directory).
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Managed folder under the root (default: `certs`).
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Subfolder for runtime submissions (default: `incoming`).
    #[serde(default = "default_incoming")]
    pub incoming: String,

    /// Keep the incoming area across initialization passes instead of
    /// clearing it.
    #[serde(default)]
    pub keep_incoming: bool,

    /// Subject fields applied to every generated CSR and certificate.
    #[serde(default)]
    pub subject: Subject,

    /// RSA key size in bits.
    #[serde(default = "default_key_size")]
    pub key_size: u32,

    /// Declared identities.
    #[serde(default, alias = "ns")]
    pub identities: Vec<IdentityDescriptor>,
}

impl Default for KeyChainConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            folder: default_folder(),
            incoming: default_incoming(),
            keep_incoming: false,
            subject: Subject::default(),
            key_size: default_key_size(),
            identities: Vec::new(),
        }
    }
}

impl KeyChainConfig {
    /// Configuration rooted at a directory, no identities yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Declare an identity.
    #[must_use]
    pub fn identity(mut self, descriptor: IdentityDescriptor) -> Self {
        self.identities.push(descriptor);
        self
    }

    /// Load config from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| KeychainError::io(path, e))?;
            toml::from_str(&content).map_err(|e| KeychainError::config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// The on-disk layout this configuration describes.
    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout {
            root: self.root.clone(),
            folder: self.folder.clone(),
            incoming: self.incoming.clone(),
        }
    }
}

// Default value functions for serde.
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_folder() -> String {
    String::from("certs")
}

fn default_incoming() -> String {
    String::from("incoming")
}

const fn default_key_size() -> u32 {
    4096
}
