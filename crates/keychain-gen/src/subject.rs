//! Certificate subject construction.

use serde::{Deserialize, Serialize};

/// Fixed organizational subject fields used for every generated CSR and
/// self-signed certificate. The common name is appended per identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// Country code (C)
    pub country: String,
    /// State or province (ST)
    pub state: String,
    /// Locality (L)
    pub locality: String,
    /// Organization (O)
    pub organization: String,
    /// Organizational unit (OU)
    pub organizational_unit: String,
    /// Contact email (emailAddress)
    pub email: String,
}

impl Default for Subject {
    fn default() -> Self {
        Self {
            country: String::from("EE"),
            state: String::from("Harjumaa"),
            locality: String::from("Tallinn"),
            organization: String::from("Guardtime"),
            organizational_unit: String::from("Backup-restore"),
            email: String::from("admin@email.address"),
        }
    }
}

impl Subject {
    /// Render the `-subj` argument for an identity.
    ///
    /// The common name carries a millisecond timestamp suffix so that
    /// regenerated identities never collide on subject, which some
    /// signing setups reject.
    #[must_use]
    pub fn arg_for(&self, name: &str) -> String {
        format!(
            "/C={}/ST={}/L={}/O={}/OU={}/emailAddress={}/CN={}",
            self.country,
            self.state,
            self.locality,
            self.organization,
            self.organizational_unit,
            self.email,
            common_name(name)
        )
    }
}

/// Per-generation-unique common name: sanitized identity name plus the
/// current unix-millisecond timestamp.
#[must_use]
pub fn common_name(name: &str) -> String {
    format!(
        "{}-{}",
        name.replace('/', "_"),
        chrono::Utc::now().timestamp_millis()
    )
}
