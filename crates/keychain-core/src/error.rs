use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for keychain operations
pub type Result<T> = std::result::Result<T, KeychainError>;

/// Errors that can occur while managing a key chain
#[derive(Error, Debug)]
pub enum KeychainError {
    /// Invalid identity declaration - duplicate name, undeclared or
    /// unresolvable signer reference. Always fatal, reported before any
    /// creation is attempted.
    #[error("configuration error: {reason}")]
    Config {
        /// What is wrong with the declaration
        reason: String,
    },

    /// A file expected for a `required` identity is absent
    #[error("{} missing", path.display())]
    RequiredFileMissing {
        /// Resolved path of the absent file
        path: PathBuf,
    },

    /// A dependent identity was abandoned because the CA it references
    /// was scheduled for creation this pass but failed
    #[error("missing created CA '{ca}' for identity '{identity}'")]
    MissingCreatedCa {
        /// The abandoned identity
        identity: String,
        /// The CA that failed to materialize
        ca: String,
    },

    /// The external certificate tool exited unsuccessfully
    #[error("external tool failed ({command}): {stderr}")]
    Tool {
        /// The command line that was executed
        command: String,
        /// Exit status, if the process ran at all
        status: Option<i32>,
        /// Captured standard error, verbatim
        stderr: String,
    },

    /// Filesystem operation failed
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path the operation was addressing
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Aggregate of every failure collected during one batch or pass
    #[error("{} operation(s) failed", .0.len())]
    Batch(Vec<KeychainError>),
}

impl KeychainError {
    /// Construct an I/O error tagged with the offending path
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Construct a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if the error must abort a pass even in
    /// suppressed-error mode
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Flatten a collection of errors into a single result
    pub fn collect(errors: Vec<KeychainError>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::Batch(errors))
        }
    }
}
