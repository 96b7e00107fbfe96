//! Invocation of the external `openssl` binary.
//!
//! The tool is a black box: arguments in, exit status and stderr out.
//! Argument construction is kept separate from execution so command lines
//! are testable without the binary present.

use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use keychain_core::{KeychainError, Result};

/// Certificate validity window in days for self-signed and CA-signed
/// certificates.
pub const VALIDITY_DAYS: u32 = 365;

/// `openssl genrsa` - generate an RSA private key.
pub fn genrsa_args(key: &Path, size: u32) -> Vec<String> {
    vec![
        "genrsa".into(),
        "-out".into(),
        key.display().to_string(),
        size.to_string(),
    ]
}

/// `openssl req -new` - produce a CSR from a key.
pub fn req_args(subject: &str, key: &Path, csr: &Path) -> Vec<String> {
    vec![
        "req".into(),
        "-new".into(),
        "-subj".into(),
        subject.into(),
        "-key".into(),
        key.display().to_string(),
        "-out".into(),
        csr.display().to_string(),
    ]
}

/// `openssl req -new -x509` - self-sign a key into a root certificate.
pub fn self_sign_args(subject: &str, key: &Path, crt: &Path) -> Vec<String> {
    vec![
        "req".into(),
        "-new".into(),
        "-subj".into(),
        subject.into(),
        "-x509".into(),
        "-days".into(),
        VALIDITY_DAYS.to_string(),
        "-key".into(),
        key.display().to_string(),
        "-out".into(),
        crt.display().to_string(),
    ]
}

/// `openssl x509 -req` - sign a CSR with a CA key and certificate.
pub fn ca_sign_args(
    csr: &Path,
    ca_cert: &Path,
    ca_key: &Path,
    serial: u64,
    crt: &Path,
) -> Vec<String> {
    vec![
        "x509".into(),
        "-req".into(),
        "-days".into(),
        VALIDITY_DAYS.to_string(),
        "-in".into(),
        csr.display().to_string(),
        "-CA".into(),
        ca_cert.display().to_string(),
        "-CAkey".into(),
        ca_key.display().to_string(),
        "-set_serial".into(),
        format!("0{serial}"),
        "-out".into(),
        crt.display().to_string(),
    ]
}

/// Run `openssl` with the given arguments, capturing stderr.
pub async fn run(args: &[String]) -> Result<()> {
    let command = format!("openssl {}", args.join(" "));
    debug!(command = %command, "exec");

    let output = Command::new("openssl")
        .args(args)
        .output()
        .await
        .map_err(|e| KeychainError::Tool {
            command: command.clone(),
            status: None,
            stderr: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(KeychainError::Tool {
            command,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_genrsa_command_line() {
        let args = genrsa_args(&PathBuf::from("/c/ca.key"), 4096);
        assert_eq!(args, ["genrsa", "-out", "/c/ca.key", "4096"]);
    }

    #[test]
    fn test_req_command_line() {
        let args = req_args("/C=EE/CN=x", &PathBuf::from("a.key"), &PathBuf::from("a.csr"));
        assert_eq!(
            args,
            ["req", "-new", "-subj", "/C=EE/CN=x", "-key", "a.key", "-out", "a.csr"]
        );
    }

    #[test]
    fn test_self_sign_includes_x509_and_days() {
        let args = self_sign_args("/CN=ca", &PathBuf::from("ca.key"), &PathBuf::from("ca.crt"));
        assert!(args.contains(&String::from("-x509")));
        let days_at = args.iter().position(|a| a == "-days").unwrap();
        assert_eq!(args[days_at + 1], VALIDITY_DAYS.to_string());
    }

    #[test]
    fn test_ca_sign_serial_format() {
        let args = ca_sign_args(
            &PathBuf::from("a.csr"),
            &PathBuf::from("ca.crt"),
            &PathBuf::from("ca.key"),
            42,
            &PathBuf::from("a.crt"),
        );
        let at = args.iter().position(|a| a == "-set_serial").unwrap();
        assert_eq!(args[at + 1], "042");
    }
}
