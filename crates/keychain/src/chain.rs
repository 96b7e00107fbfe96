//! The KeyChain orchestrator.
//!
//! Owns the identity registry and drives each initialization pass: clear
//! flagged folders, snapshot the tree, diff declared identities against it,
//! dispatch missing-but-creatable identities to the engine in
//! CA-then-dependent batches, re-snapshot, and expose the resulting
//! certificate map. Also ingests runtime submissions (received files and
//! CSR signing).

use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use keychain_core::{
    classify, clear_dir, ensure_dir, map_tree, FileEntry, FileKind, FolderMap,
    IdentityDescriptor, KeyPair, KeychainError, Layout, Result, Role,
};
use keychain_gen::KeyGen;

use crate::certs::CertMap;
use crate::config::KeyChainConfig;

/// Options for one initialization pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Report what would be created without creating anything.
    pub skip_create: bool,
    /// Collect required-file and creation errors into the report instead
    /// of failing the pass. Configuration errors stay fatal.
    pub suppress_errors: bool,
}

impl InitOptions {
    /// Default options: create, fail on errors.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            skip_create: false,
            suppress_errors: false,
        }
    }

    /// Set the skip-create flag.
    #[must_use]
    pub const fn skip_create(mut self, skip: bool) -> Self {
        self.skip_create = skip;
        self
    }

    /// Set the suppress-errors flag.
    #[must_use]
    pub const fn suppress_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }
}

/// Outcome of one initialization pass.
#[derive(Debug, Default)]
pub struct InitReport {
    /// Identities that were scheduled for creation.
    pub scheduled: Vec<String>,
    /// Identities actually materialized (at least one file generated).
    pub created: Vec<String>,
    /// Errors collected in suppressed mode.
    pub errors: Vec<KeychainError>,
}

/// Reference to the CA signing a runtime-submitted request.
pub enum SignerRef<'a> {
    /// A declared identity, resolved through the registry.
    Name(&'a str),
    /// An explicit key/certificate pair.
    Pair(&'a KeyPair),
}

impl<'a> From<&'a str> for SignerRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a KeyPair> for SignerRef<'a> {
    fn from(pair: &'a KeyPair) -> Self {
        Self::Pair(pair)
    }
}

/// Lifecycle manager for a declared set of key/certificate identities.
#[derive(Debug)]
pub struct KeyChain {
    layout: Layout,
    descriptors: Vec<IdentityDescriptor>,
    keep_incoming: bool,
    gen: KeyGen,
    map: FolderMap,
    certs: CertMap,
    added: HashMap<String, FileEntry>,
    created: Vec<String>,
}

impl KeyChain {
    /// Build a chain from configuration.
    ///
    /// Fails with a configuration error on duplicate identity names.
    pub fn new(config: KeyChainConfig) -> Result<Self> {
        let mut seen = HashSet::new();
        for d in &config.identities {
            if !seen.insert(d.name.as_str()) {
                return Err(KeychainError::config(format!(
                    "duplicate identity '{}'",
                    d.name
                )));
            }
        }

        let layout = config.layout();
        let gen = KeyGen::new(layout.clone())
            .with_subject(config.subject.clone())
            .with_key_size(config.key_size);

        Ok(Self {
            layout,
            descriptors: config.identities,
            keep_incoming: config.keep_incoming,
            gen,
            map: FolderMap::default(),
            certs: CertMap::default(),
            added: HashMap::new(),
            created: Vec::new(),
        })
    }

    /// The declared descriptor with the given name.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&IdentityDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// The certificate map built by the last pass.
    #[must_use]
    pub const fn certs(&self) -> &CertMap {
        &self.certs
    }

    /// Entry for one identity/kind combination.
    #[must_use]
    pub fn get(&self, name: &str, kind: FileKind) -> Option<&FileEntry> {
        self.certs.get(name, kind)
    }

    /// Raw content of one identity's file.
    pub async fn content(&self, name: &str, kind: FileKind) -> Result<String> {
        match self.certs.get(name, kind) {
            Some(entry) => entry.content().await,
            None => {
                let folder = self
                    .descriptor(name)
                    .map(|d| d.folder.clone())
                    .unwrap_or_default();
                Err(KeychainError::RequiredFileMissing {
                    path: self
                        .layout
                        .identity_dir(&folder)
                        .join(format!("{name}.{}", kind.extension())),
                })
            }
        }
    }

    /// Runtime-received files, keyed by file name.
    #[must_use]
    pub const fn added(&self) -> &HashMap<String, FileEntry> {
        &self.added
    }

    /// Names of identities materialized by the last pass.
    #[must_use]
    pub fn created(&self) -> &[String] {
        &self.created
    }

    /// Run one initialization pass.
    pub async fn initialize(&mut self, opts: InitOptions) -> Result<InitReport> {
        info!(root = %self.layout.base_dir().display(), "initializing key chain");
        self.clear_folders().await?;
        self.map = map_tree(&self.layout.base_dir()).await?;

        let mut report = InitReport::default();

        // Required takes precedence over auto-create: a required identity
        // is never silently created.
        let mut schedule = Vec::new();
        for d in &self.descriptors {
            if d.required {
                report.errors.extend(self.check_files(d));
                continue;
            }
            if d.auto_create {
                let state = classify(d, &self.map);
                if d.force_recreate || !state.is_complete(d.role) {
                    schedule.push(d.clone());
                }
            }
        }
        // Dependents of a scheduled CA join the batch even when complete:
        // if the CA really gets regenerated they must cascade, and if it
        // turns out to pre-exist they no-op inside the engine.
        let scheduled_cas: HashSet<String> = schedule
            .iter()
            .filter(|d| d.role == Role::Ca)
            .map(|d| d.name.clone())
            .collect();
        for d in &self.descriptors {
            if d.required || !d.auto_create {
                continue;
            }
            if schedule.iter().any(|s| s.name == d.name) {
                continue;
            }
            if d.signer
                .as_deref()
                .is_some_and(|s| scheduled_cas.contains(s))
            {
                schedule.push(d.clone());
            }
        }

        report.scheduled = schedule.iter().map(|d| d.name.clone()).collect();

        if !report.errors.is_empty() && !opts.suppress_errors {
            for e in &report.errors {
                warn!(error = %e, "required file missing");
            }
            return Err(KeychainError::Batch(report.errors));
        }

        if opts.skip_create {
            return Ok(report);
        }

        // Undeclared or unresolvable signers abort before any creation,
        // even in suppressed mode.
        self.validate_signers(&schedule)?;

        let (ca_batch, dep_batch): (Vec<_>, Vec<_>) =
            schedule.into_iter().partition(|d| d.role == Role::Ca);

        let attempted_cas: HashSet<String> =
            ca_batch.iter().map(|d| d.name.clone()).collect();
        let created_cas = self.run_ca_batch(&ca_batch, &mut report).await;
        self.run_dependent_batch(&dep_batch, &attempted_cas, &created_cas, &mut report)
            .await;

        self.map = map_tree(&self.layout.base_dir()).await?;
        self.rebuild_certs();
        self.created.clone_from(&report.created);

        info!(
            created = report.created.len(),
            errors = report.errors.len(),
            "pass complete"
        );

        if report.errors.is_empty() || opts.suppress_errors {
            Ok(report)
        } else {
            Err(KeychainError::Batch(report.errors))
        }
    }

    /// Pure diagnostic: one missing-file finding per absent expected
    /// extension for the descriptor, against the current snapshot.
    #[must_use]
    pub fn check_files(&self, descriptor: &IdentityDescriptor) -> Vec<KeychainError> {
        let mut findings = Vec::new();
        for kind in descriptor.role.expected_kinds() {
            let file_name = format!("{}.{}", descriptor.name, kind.extension());
            if self.map.lookup(&descriptor.folder, &file_name).is_none() {
                findings.push(KeychainError::RequiredFileMissing {
                    path: self.layout.identity_dir(&descriptor.folder).join(file_name),
                });
            }
        }
        findings
    }

    /// Write a file into the incoming area (default) or a target folder.
    ///
    /// When the target names a registered identity, the write lands in
    /// that identity's folder and is recorded in the certificate map. An
    /// existing destination with `overwrite` unset is a no-op returning
    /// the pre-existing entry, not an error.
    pub async fn receive_file(
        &mut self,
        file_name: &str,
        content: &str,
        target: Option<&str>,
        overwrite: bool,
    ) -> Result<FileEntry> {
        let registered = target.and_then(|t| self.descriptor(t)).cloned();
        let dir = match (target, &registered) {
            (_, Some(d)) => self.layout.identity_dir(&d.folder),
            (Some(folder), None) => self.layout.base_dir().join(folder),
            (None, None) => self.layout.incoming_dir(),
        };

        ensure_dir(&dir).await?;
        let path = dir.join(file_name);

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| KeychainError::io(&path, e))?;
        if exists && !overwrite {
            debug!(path = %path.display(), "destination exists, not overwriting");
            return Ok(FileEntry::new(path));
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| KeychainError::io(&path, e))?;
        let entry = FileEntry::new(path);
        debug!(path = %entry.path.display(), "received file");

        self.added.insert(entry.file_name(), entry.clone());
        if let Some(d) = registered {
            if let Some(kind) = FileKind::from_extension(&entry.ext) {
                self.certs.set(&d.name, kind, entry.clone());
            }
        }
        Ok(entry)
    }

    /// Persist a runtime-submitted CSR and sign it against a declared CA
    /// (or an explicit pair). Returns the resulting certificate content.
    pub async fn sign_request<'a>(
        &mut self,
        csr_content: &str,
        signer: impl Into<SignerRef<'a>>,
    ) -> Result<String> {
        let ca = match signer.into() {
            SignerRef::Pair(pair) => pair.clone(),
            SignerRef::Name(name) => {
                let descriptor = self.descriptor(name).ok_or_else(|| {
                    KeychainError::config(format!("unknown signer '{name}'"))
                })?;
                self.layout.pair(&descriptor.folder, &descriptor.name)
            }
        };

        let name = anonymous_name(None);
        let csr_file = format!("{name}.csr");
        self.receive_file(&csr_file, csr_content, None, false).await?;

        let pair = self.layout.incoming_pair(&name);
        self.gen.sign_request(&pair, &ca).await?;

        let cert = tokio::fs::read_to_string(&pair.certificate)
            .await
            .map_err(|e| KeychainError::io(&pair.certificate, e))?;
        let entry = FileEntry::new(&pair.certificate);
        self.added.insert(entry.file_name(), entry);
        Ok(cert)
    }

    async fn clear_folders(&self) -> Result<()> {
        let mut targets: Vec<_> = self
            .descriptors
            .iter()
            .filter(|d| d.clear_before_run)
            .map(|d| self.layout.identity_dir(&d.folder))
            .collect();
        if !self.keep_incoming {
            targets.push(self.layout.incoming_dir());
        }

        debug!(count = targets.len(), "clearing folders");
        let results = join_all(targets.iter().map(|dir| clear_dir(dir))).await;
        KeychainError::collect(results.into_iter().filter_map(Result::err).collect())
    }

    fn validate_signers(&self, schedule: &[IdentityDescriptor]) -> Result<()> {
        let scheduled_cas: HashSet<&str> = schedule
            .iter()
            .filter(|d| d.role == Role::Ca)
            .map(|d| d.name.as_str())
            .collect();

        for d in schedule {
            let Some(signer_name) = d.signer.as_deref() else {
                continue;
            };
            let Some(signer) = self.descriptor(signer_name) else {
                return Err(KeychainError::config(format!(
                    "identity '{}' references undeclared signer '{signer_name}'",
                    d.name
                )));
            };
            if signer.role != Role::Ca {
                return Err(KeychainError::config(format!(
                    "signer '{signer_name}' of identity '{}' is not a CA",
                    d.name
                )));
            }
            if !scheduled_cas.contains(signer_name)
                && !classify(signer, &self.map).is_complete(Role::Ca)
            {
                return Err(KeychainError::config(format!(
                    "missing CA '{signer_name}' for identity '{}'",
                    d.name
                )));
            }
        }
        Ok(())
    }

    /// Run the CA batch to completion. Returns the freshly resolved pair
    /// per CA name; failed CAs are recorded as errors and omitted.
    async fn run_ca_batch(
        &self,
        batch: &[IdentityDescriptor],
        report: &mut InitReport,
    ) -> HashMap<String, KeyPair> {
        let gen = &self.gen;
        let results = join_all(batch.iter().map(|d| async move {
            let result = if d.force_recreate {
                gen.create_ca(&d.folder, &d.name).await
            } else {
                gen.check_create_ca(&d.folder, &d.name).await
            };
            (d.name.clone(), result)
        }))
        .await;

        let mut pairs = HashMap::new();
        for (name, result) in results {
            match result {
                Ok(pair) => {
                    if pair.created {
                        report.created.push(name.clone());
                    }
                    pairs.insert(name, pair);
                }
                Err(e) => {
                    warn!(identity = %name, error = %e, "CA creation failed");
                    report.errors.push(e);
                }
            }
        }
        pairs
    }

    /// Run the dependent batch after the CA barrier. Dependents whose CA
    /// was scheduled but did not materialize are abandoned, not attempted.
    async fn run_dependent_batch(
        &self,
        batch: &[IdentityDescriptor],
        attempted_cas: &HashSet<String>,
        created_cas: &HashMap<String, KeyPair>,
        report: &mut InitReport,
    ) {
        let gen = &self.gen;
        let mut runnable = Vec::new();

        for d in batch {
            let ca = match d.signer.as_deref() {
                None => None,
                Some(s) => {
                    if let Some(pair) = created_cas.get(s) {
                        Some(pair.clone())
                    } else if attempted_cas.contains(s) {
                        // the CA ran this pass and failed; the pre-pass
                        // snapshot may still show its superseded files
                        report.errors.push(KeychainError::MissingCreatedCa {
                            identity: d.name.clone(),
                            ca: s.to_string(),
                        });
                        continue;
                    } else {
                        let signer = self.descriptor(s);
                        let present = signer.is_some_and(|x| {
                            classify(x, &self.map).is_complete(Role::Ca)
                        });
                        if present {
                            // pre-existing CA, untouched this pass
                            let folder = signer.map_or("", |x| x.folder.as_str());
                            Some(self.layout.pair(folder, s))
                        } else {
                            report.errors.push(KeychainError::MissingCreatedCa {
                                identity: d.name.clone(),
                                ca: s.to_string(),
                            });
                            continue;
                        }
                    }
                }
            };
            runnable.push((d, ca));
        }

        let results = join_all(runnable.into_iter().map(|(d, ca)| async move {
            let result = match d.role {
                Role::Request => {
                    gen.create_request_pair(&d.folder, &d.name, d.force_recreate)
                        .await
                }
                _ => {
                    gen.create_self_signed(
                        &d.folder,
                        &d.name,
                        ca.as_ref(),
                        d.force_recreate,
                    )
                    .await
                }
            };
            (d.name.clone(), result)
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(pair) if pair.created => report.created.push(name),
                Ok(_) => {}
                Err(e) => {
                    warn!(identity = %name, error = %e, "identity creation failed");
                    report.errors.push(e);
                }
            }
        }
    }

    fn rebuild_certs(&mut self) {
        self.certs.clear();
        for d in &self.descriptors {
            for kind in [FileKind::Key, FileKind::Certificate, FileKind::Request] {
                let file_name = format!("{}.{}", d.name, kind.extension());
                if let Some(entry) = self.map.lookup(&d.folder, &file_name) {
                    self.certs.set(&d.name, kind, entry.clone());
                }
            }
        }
    }
}

/// Identifier for anonymously submitted material: hex digest of a one-way
/// hash over the peer certificate fingerprint when available, otherwise
/// over the current timestamp plus a random value. Collisions are treated
/// as negligible, not eliminated.
#[must_use]
pub fn anonymous_name(peer_fingerprint: Option<&str>) -> String {
    use ring::rand::SecureRandom;

    let material = peer_fingerprint.map_or_else(
        || {
            let mut buf = [0u8; 16];
            // timestamp still varies even if the fill fails
            let _ = ring::rand::SystemRandom::new().fill(&mut buf);
            format!(
                "{} {}",
                chrono::Utc::now().timestamp_millis(),
                hex::encode(buf)
            )
        },
        ToString::to_string,
    );
    let digest = ring::digest::digest(&ring::digest::SHA256, material.as_bytes());
    hex::encode(digest.as_ref())
}
