//! Key and certificate generation engine.
//!
//! [`KeyGen`] turns a logical identity name into the key / CSR / sign
//! operations needed to materialize it on disk, delegating the actual
//! cryptography to the external `openssl` binary. Every `check_*` variant
//! is idempotent and reports whether the artifact pre-existed; the
//! composite operations return a [`KeyPair`] whose `created` flag says
//! whether anything was freshly generated - the orchestrator's
//! force-cascade rule keys off that flag.

mod openssl;
mod subject;

pub use openssl::VALIDITY_DAYS;
pub use subject::{common_name, Subject};

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use keychain_core::{ensure_dir, KeyPair, KeychainError, Layout, Result};

/// Default RSA key size in bits.
pub const DEFAULT_KEY_SIZE: u32 = 4096;

/// The generation engine.
///
/// Holds an instance-scoped serial counter, randomly seeded per
/// construction, used to assign distinct serial numbers to certificates
/// signed within one run. Uniqueness is only guaranteed within one engine
/// instance's lifetime.
#[derive(Debug)]
pub struct KeyGen {
    layout: Layout,
    subject: Subject,
    key_size: u32,
    serial: AtomicU64,
}

impl KeyGen {
    /// Create an engine over a layout with default subject, key size and a
    /// random serial seed.
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            subject: Subject::default(),
            key_size: DEFAULT_KEY_SIZE,
            serial: AtomicU64::new(random_seed()),
        }
    }

    /// Override the subject fields.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    /// Override the RSA key size.
    #[must_use]
    pub const fn with_key_size(mut self, size: u32) -> Self {
        self.key_size = size;
        self
    }

    /// Seed the serial counter explicitly, for reproducible signing runs.
    #[must_use]
    pub fn with_serial_seed(self, seed: u64) -> Self {
        self.serial.store(seed, Ordering::Relaxed);
        self
    }

    /// The layout this engine writes into.
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Artifact paths for an identity.
    #[must_use]
    pub fn pair(&self, subfolder: &str, name: &str) -> KeyPair {
        self.layout.pair(subfolder, name)
    }

    fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed)
    }

    /// Unconditionally (re)generate a private key.
    pub async fn create_key(&self, pair: &KeyPair) -> Result<()> {
        debug!(key = %pair.key.display(), "generating key");
        ensure_parent(&pair.key).await?;
        openssl::run(&openssl::genrsa_args(&pair.key, self.key_size)).await
    }

    /// Generate the key only if absent. Returns whether it pre-existed.
    pub async fn check_create_key(&self, pair: &KeyPair) -> Result<bool> {
        if exists(&pair.key).await? {
            Ok(true)
        } else {
            self.create_key(pair).await?;
            Ok(false)
        }
    }

    /// Produce a CSR for the identity, generating the key first if needed.
    pub async fn create_sign_request(&self, pair: &KeyPair, name: &str) -> Result<()> {
        self.check_create_key(pair).await?;
        debug!(csr = %pair.request.display(), "creating sign request");
        openssl::run(&openssl::req_args(
            &self.subject.arg_for(name),
            &pair.key,
            &pair.request,
        ))
        .await
    }

    /// Self-sign the identity's key into a root certificate.
    pub async fn sign_ca(&self, pair: &KeyPair, name: &str) -> Result<()> {
        debug!(crt = %pair.certificate.display(), "self-signing CA certificate");
        openssl::run(&openssl::self_sign_args(
            &self.subject.arg_for(name),
            &pair.key,
            &pair.certificate,
        ))
        .await
    }

    /// Sign the identity's CSR against a CA pair, consuming the next serial.
    pub async fn sign_request(&self, pair: &KeyPair, ca: &KeyPair) -> Result<()> {
        let serial = self.next_serial();
        debug!(
            crt = %pair.certificate.display(),
            ca = %ca.certificate.display(),
            serial,
            "signing request against CA"
        );
        openssl::run(&openssl::ca_sign_args(
            &pair.request,
            &ca.certificate,
            &ca.key,
            serial,
            &pair.certificate,
        ))
        .await
    }

    /// Sign dispatch: self-sign when no CA is given, otherwise sign the
    /// CSR against the CA.
    pub async fn sign(&self, pair: &KeyPair, name: &str, ca: Option<&KeyPair>) -> Result<()> {
        match ca {
            None => self.sign_ca(pair, name).await,
            Some(ca) => self.sign_request(pair, ca).await,
        }
    }

    /// Sign only when the certificate is absent or `force` is set.
    /// Returns whether it pre-existed.
    pub async fn check_sign(
        &self,
        pair: &KeyPair,
        name: &str,
        ca: Option<&KeyPair>,
        force: bool,
    ) -> Result<bool> {
        if !force && exists(&pair.certificate).await? {
            return Ok(true);
        }
        self.sign(pair, name, ca).await?;
        Ok(false)
    }

    /// CSR then sign: the full certificate path for an existing key.
    pub async fn create_cert(
        &self,
        pair: &KeyPair,
        name: &str,
        ca: Option<&KeyPair>,
    ) -> Result<()> {
        self.create_sign_request(pair, name).await?;
        self.sign(pair, name, ca).await
    }

    /// Certificate creation gated on presence or `force`.
    /// Returns whether it pre-existed.
    pub async fn check_create_cert(
        &self,
        pair: &KeyPair,
        name: &str,
        ca: Option<&KeyPair>,
        force: bool,
    ) -> Result<bool> {
        if !force && exists(&pair.certificate).await? {
            return Ok(true);
        }
        self.create_cert(pair, name, ca).await?;
        Ok(false)
    }

    /// Unconditionally create a self-signed CA: fresh key plus root
    /// certificate. The returned pair is flagged `created`.
    pub async fn create_ca(&self, subfolder: &str, name: &str) -> Result<KeyPair> {
        let mut pair = self.pair(subfolder, name);
        self.create_key(&pair).await?;
        self.sign_ca(&pair, name).await?;
        pair.created = true;
        Ok(pair)
    }

    /// Idempotent CA creation: regenerates only missing parts. A
    /// regenerated key forces the certificate to be re-signed. The
    /// returned `created` flag is true iff anything was (re)generated.
    pub async fn check_create_ca(&self, subfolder: &str, name: &str) -> Result<KeyPair> {
        let mut pair = self.pair(subfolder, name);
        let key_existed = self.check_create_key(&pair).await?;
        let cert_existed = self.check_sign(&pair, name, None, !key_existed).await?;
        pair.created = !(key_existed && cert_existed);
        Ok(pair)
    }

    /// Create or complete a certificate identity under a signer.
    ///
    /// When the signer was freshly created this pass (or `force` is set),
    /// the identity is force-recreated regardless of what exists - a
    /// certificate signed by a superseded CA key is invalid. When the
    /// signer pre-existed, only missing pieces are filled in.
    pub async fn create_self_signed(
        &self,
        subfolder: &str,
        name: &str,
        ca: Option<&KeyPair>,
        force: bool,
    ) -> Result<KeyPair> {
        let mut pair = self.pair(subfolder, name);
        if force || ca.is_some_and(|c| c.created) {
            self.create_key(&pair).await?;
            self.create_cert(&pair, name, ca).await?;
            pair.created = true;
        } else {
            let key_existed = self.check_create_key(&pair).await?;
            let cert_existed = self
                .check_create_cert(&pair, name, ca, !key_existed)
                .await?;
            pair.created = !(key_existed && cert_existed);
        }
        Ok(pair)
    }

    /// Create or complete a key+CSR identity (no certificate). A
    /// regenerated key forces the CSR to be regenerated as well.
    pub async fn create_request_pair(
        &self,
        subfolder: &str,
        name: &str,
        force: bool,
    ) -> Result<KeyPair> {
        let mut pair = self.pair(subfolder, name);
        if force {
            self.create_key(&pair).await?;
            self.create_sign_request(&pair, name).await?;
            pair.created = true;
            return Ok(pair);
        }
        let key_existed = self.check_create_key(&pair).await?;
        let csr_existed = exists(&pair.request).await?;
        if !key_existed || !csr_existed {
            self.create_sign_request(&pair, name).await?;
        }
        pair.created = !(key_existed && csr_existed);
        Ok(pair)
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| KeychainError::io(path, e))
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    Ok(())
}

fn random_seed() -> u64 {
    use ring::rand::SecureRandom;
    let rng = ring::rand::SystemRandom::new();
    let mut buf = [0u8; 8];
    if rng.fill(&mut buf).is_ok() {
        u64::from_le_bytes(buf) % 10_000
    } else {
        chrono::Utc::now().timestamp_millis().unsigned_abs() % 10_000
    }
}
