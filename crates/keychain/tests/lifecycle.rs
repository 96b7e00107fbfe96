//! End-to-end lifecycle tests against a sandbox directory.
//!
//! Tests that generate real keys and certificates need the `openssl`
//! binary; they skip with a notice when it is not installed.

use std::path::Path;

use keychain::{
    FileKind, IdentityDescriptor, InitOptions, KeyChain, KeyChainConfig, KeychainError, Role,
};

fn openssl_available() -> bool {
    std::process::Command::new("openssl")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! require_openssl {
    () => {
        if !openssl_available() {
            eprintln!("openssl binary not found, skipping");
            return;
        }
    };
}

/// `openssl verify -CAfile <ca> <cert>`
fn verifies_against(ca: &Path, cert: &Path) -> bool {
    std::process::Command::new("openssl")
        .arg("verify")
        .arg("-CAfile")
        .arg(ca)
        .arg(cert)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Extract the public key PEM from a CSR (`req`) or certificate (`x509`).
fn public_key_of(kind: &str, path: &Path) -> String {
    let out = std::process::Command::new("openssl")
        .args([kind, "-noout", "-pubkey", "-in"])
        .arg(path)
        .output()
        .unwrap();
    assert!(out.status.success(), "pubkey extraction failed for {}", path.display());
    String::from_utf8(out.stdout).unwrap()
}

fn ca_and_sec_config(root: &Path) -> KeyChainConfig {
    KeyChainConfig::new(root)
        .identity(
            IdentityDescriptor::new("ca")
                .role(Role::Ca)
                .auto_create(true)
                .clear_before_run(false),
        )
        .identity(
            IdentityDescriptor::new("sec")
                .signer("ca")
                .auto_create(true)
                .clear_before_run(false),
        )
}

// smaller keys keep generation fast in tests
fn small_keys(mut config: KeyChainConfig) -> KeyChainConfig {
    config.key_size = 2048;
    config
}

#[tokio::test]
async fn test_ca_and_dependent_created_from_empty_root() {
    require_openssl!();
    let tmp = tempfile::tempdir().unwrap();
    let mut chain = KeyChain::new(small_keys(ca_and_sec_config(tmp.path()))).unwrap();

    let report = chain.initialize(InitOptions::new()).await.unwrap();
    assert_eq!(report.created.len(), 2);

    for (name, kind) in [
        ("ca", FileKind::Key),
        ("ca", FileKind::Certificate),
        ("sec", FileKind::Key),
        ("sec", FileKind::Certificate),
    ] {
        let entry = chain.get(name, kind).unwrap();
        assert!(entry.path.exists(), "{name} {kind:?} missing");
        assert!(!entry.content().await.unwrap().is_empty());
    }

    // the dependent certificate must chain to the CA created in the same pass
    let ca_cert = &chain.get("ca", FileKind::Certificate).unwrap().path;
    let sec_cert = &chain.get("sec", FileKind::Certificate).unwrap().path;
    assert!(verifies_against(ca_cert, sec_cert));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    require_openssl!();
    let tmp = tempfile::tempdir().unwrap();
    let mut chain = KeyChain::new(small_keys(ca_and_sec_config(tmp.path()))).unwrap();

    chain.initialize(InitOptions::new()).await.unwrap();
    let ca_before = chain.content("ca", FileKind::Certificate).await.unwrap();
    let sec_before = chain.content("sec", FileKind::Certificate).await.unwrap();

    let report = chain.initialize(InitOptions::new()).await.unwrap();
    assert!(report.created.is_empty(), "second pass regenerated identities");

    assert_eq!(ca_before, chain.content("ca", FileKind::Certificate).await.unwrap());
    assert_eq!(sec_before, chain.content("sec", FileKind::Certificate).await.unwrap());
}

#[tokio::test]
async fn test_force_cascade_regenerates_dependent() {
    require_openssl!();
    let tmp = tempfile::tempdir().unwrap();
    let mut chain = KeyChain::new(small_keys(ca_and_sec_config(tmp.path()))).unwrap();

    chain.initialize(InitOptions::new()).await.unwrap();
    let sec_before = chain.content("sec", FileKind::Certificate).await.unwrap();

    // wipe the CA; the next pass recreates it and must cascade to sec
    let ca_dir = tmp.path().join("certs/ca");
    std::fs::remove_dir_all(&ca_dir).unwrap();

    let report = chain.initialize(InitOptions::new()).await.unwrap();
    assert!(report.created.contains(&String::from("ca")));
    assert!(
        report.created.contains(&String::from("sec")),
        "dependent not regenerated after its CA was recreated"
    );

    let sec_after = chain.content("sec", FileKind::Certificate).await.unwrap();
    assert_ne!(sec_before, sec_after);

    let ca_cert = &chain.get("ca", FileKind::Certificate).unwrap().path;
    let sec_cert = &chain.get("sec", FileKind::Certificate).unwrap().path;
    assert!(verifies_against(ca_cert, sec_cert));
}

#[tokio::test]
async fn test_request_role_creates_key_and_csr() {
    require_openssl!();
    let tmp = tempfile::tempdir().unwrap();
    let config = small_keys(KeyChainConfig::new(tmp.path()).identity(
        IdentityDescriptor::new("agent")
            .role(Role::Request)
            .auto_create(true)
            .clear_before_run(false),
    ));
    let mut chain = KeyChain::new(config).unwrap();

    chain.initialize(InitOptions::new()).await.unwrap();
    assert!(chain.get("agent", FileKind::Key).is_some());
    assert!(chain.get("agent", FileKind::Request).is_some());
    assert!(chain.get("agent", FileKind::Certificate).is_none());
}

#[tokio::test]
async fn test_sign_request_round_trip() {
    require_openssl!();
    let tmp = tempfile::tempdir().unwrap();
    let config = small_keys(ca_and_sec_config(tmp.path())).identity(
        IdentityDescriptor::new("agent")
            .role(Role::Request)
            .auto_create(true)
            .clear_before_run(false),
    );
    let mut chain = KeyChain::new(config).unwrap();
    chain.initialize(InitOptions::new()).await.unwrap();

    let csr = chain.content("agent", FileKind::Request).await.unwrap();
    let cert = chain.sign_request(&csr, "ca").await.unwrap();
    assert!(cert.contains("BEGIN CERTIFICATE"));

    // both the persisted CSR and the signed certificate land in added
    assert!(chain.added().keys().any(|k| k.ends_with(".csr")));
    assert!(chain.added().keys().any(|k| k.ends_with(".crt")));

    // the issued certificate chains to the declared CA
    let issued = chain
        .added()
        .values()
        .find(|e| e.ext == "crt")
        .unwrap()
        .path
        .clone();
    let ca_cert = &chain.get("ca", FileKind::Certificate).unwrap().path;
    assert!(verifies_against(ca_cert, &issued));

    // the issued certificate carries the submitted request's key material
    let agent_csr = &chain.get("agent", FileKind::Request).unwrap().path;
    assert_eq!(
        public_key_of("req", agent_csr),
        public_key_of("x509", &issued)
    );
}

#[tokio::test]
async fn test_required_missing_is_fatal_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path()).identity(
        IdentityDescriptor::new("root")
            .folder("main")
            .required(true)
            .clear_before_run(false),
    );
    let mut chain = KeyChain::new(config).unwrap();

    let err = chain.initialize(InitOptions::new()).await.unwrap_err();
    match err {
        KeychainError::Batch(errors) => {
            assert_eq!(errors.len(), 2); // key and certificate
            assert!(errors[0].to_string().contains("root.key"));
        }
        other => panic!("expected batch of missing-file errors, got {other}"),
    }
}

#[tokio::test]
async fn test_required_missing_collected_when_suppressed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path()).identity(
        IdentityDescriptor::new("root")
            .folder("main")
            .required(true)
            .clear_before_run(false),
    );
    let mut chain = KeyChain::new(config).unwrap();

    let report = chain
        .initialize(InitOptions::new().suppress_errors(true))
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 2);
    assert!(report.created.is_empty());
}

#[tokio::test]
async fn test_required_wins_over_auto_create() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path()).identity(
        IdentityDescriptor::new("root")
            .required(true)
            .auto_create(true)
            .clear_before_run(false),
    );
    let mut chain = KeyChain::new(config).unwrap();

    let report = chain
        .initialize(InitOptions::new().suppress_errors(true))
        .await
        .unwrap();
    // reported missing, never scheduled for creation
    assert_eq!(report.errors.len(), 2);
    assert!(report.scheduled.is_empty());
    assert!(!tmp.path().join("certs/root/root.key").exists());
}

#[tokio::test]
async fn test_skip_create_reports_without_creating() {
    let tmp = tempfile::tempdir().unwrap();
    let mut chain = KeyChain::new(ca_and_sec_config(tmp.path())).unwrap();

    let report = chain
        .initialize(InitOptions::new().skip_create(true))
        .await
        .unwrap();
    assert_eq!(report.scheduled, vec!["ca".to_string(), "sec".to_string()]);
    assert!(report.created.is_empty());
    assert!(!tmp.path().join("certs/ca/ca.key").exists());
}

#[tokio::test]
async fn test_missing_signer_declaration_is_fatal_even_suppressed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path()).identity(
        IdentityDescriptor::new("sec")
            .signer("ca")
            .auto_create(true)
            .clear_before_run(false),
    );
    let mut chain = KeyChain::new(config).unwrap();

    let err = chain
        .initialize(InitOptions::new().suppress_errors(true))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("undeclared signer 'ca'"));
}

#[tokio::test]
async fn test_declared_but_absent_ca_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path())
        .identity(
            IdentityDescriptor::new("ca")
                .role(Role::Ca)
                .clear_before_run(false),
        )
        .identity(
            IdentityDescriptor::new("sec")
                .signer("ca")
                .auto_create(true)
                .clear_before_run(false),
        );
    let mut chain = KeyChain::new(config).unwrap();

    // ca is declared but neither on disk nor scheduled for creation
    let err = chain.initialize(InitOptions::new()).await.unwrap_err();
    assert!(err.to_string().contains("missing CA 'ca'"));
}

#[tokio::test]
async fn test_receive_file_no_overwrite_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let mut chain = KeyChain::new(KeyChainConfig::new(tmp.path())).unwrap();

    let first = chain
        .receive_file("test.csr", "Hello", None, false)
        .await
        .unwrap();
    assert_eq!(first.content().await.unwrap(), "Hello");
    assert!(chain.added().contains_key("test.csr"));

    // existing destination, overwrite unset: existing entry returned unchanged
    let second = chain
        .receive_file("test.csr", "World", None, false)
        .await
        .unwrap();
    assert_eq!(second.content().await.unwrap(), "Hello");

    // explicit overwrite replaces the content
    let third = chain
        .receive_file("test.csr", "World", None, true)
        .await
        .unwrap();
    assert_eq!(third.content().await.unwrap(), "World");
}

#[tokio::test]
async fn test_receive_file_into_identity_folder_updates_certs() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path()).identity(
        IdentityDescriptor::new("peer")
            .folder("peers")
            .clear_before_run(false),
    );
    let mut chain = KeyChain::new(config).unwrap();

    let entry = chain
        .receive_file("peer.crt", "CERT", Some("peer"), false)
        .await
        .unwrap();
    assert_eq!(entry.path, tmp.path().join("certs/peers/peer.crt"));
    assert!(chain.get("peer", FileKind::Certificate).is_some());
}

#[tokio::test]
async fn test_incoming_cleared_between_passes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut chain = KeyChain::new(KeyChainConfig::new(tmp.path())).unwrap();

    chain
        .receive_file("stray.csr", "x", None, false)
        .await
        .unwrap();
    let incoming = tmp.path().join("certs/incoming/stray.csr");
    assert!(incoming.exists());

    chain.initialize(InitOptions::new()).await.unwrap();
    assert!(!incoming.exists());
}

#[tokio::test]
async fn test_incoming_kept_when_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = KeyChainConfig::new(tmp.path());
    config.keep_incoming = true;
    let mut chain = KeyChain::new(config).unwrap();

    chain
        .receive_file("stray.csr", "x", None, false)
        .await
        .unwrap();
    chain.initialize(InitOptions::new()).await.unwrap();
    assert!(tmp.path().join("certs/incoming/stray.csr").exists());
}

#[tokio::test]
async fn test_clear_before_run_wipes_identity_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let config = KeyChainConfig::new(tmp.path())
        .identity(IdentityDescriptor::new("agent").clear_before_run(true));
    let mut chain = KeyChain::new(config).unwrap();

    let stale = tmp.path().join("certs/agent/agent.key");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "stale").unwrap();

    chain.initialize(InitOptions::new()).await.unwrap();
    assert!(!stale.exists());
    assert!(chain.get("agent", FileKind::Key).is_none());
}
