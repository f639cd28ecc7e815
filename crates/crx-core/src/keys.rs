//! RSA key handling: public key derivation, signing and verification.
//!
//! Public key derivation sits behind the [`KeyFacility`] trait so the pipeline
//! does not depend on a particular tool. [`OpensslCli`] shells out to
//! `openssl rsa -pubout -outform DER`; [`InProcess`] does the same work through
//! the `openssl` crate. Both produce a DER `SubjectPublicKeyInfo`.
//!
//! Signing always runs in-process: CRX2 signatures are PKCS#1 v1.5 RSA over
//! the SHA-1 digest of the zip contents.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{CrxError, Result};

/// DER-encoded `SubjectPublicKeyInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap DER bytes obtained elsewhere.
    pub fn from_der(der: Vec<u8>) -> Self {
        Self(der)
    }

    /// The DER bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Raw signature bytes; the length follows from the key size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Capability that extracts a public key from private key material.
#[async_trait]
pub trait KeyFacility: Send + Sync {
    /// Derive the DER public key for `private_key`.
    async fn derive_public_key(&self, private_key: &[u8]) -> Result<PublicKey>;
}

/// Derives public keys by running the `openssl` executable.
#[derive(Debug, Clone)]
pub struct OpensslCli {
    program: PathBuf,
}

impl OpensslCli {
    /// Use the given `openssl` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `openssl` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::KeyDerivation`] if no executable is found.
    pub fn from_path() -> Result<Self> {
        which::which("openssl")
            .map(Self::new)
            .map_err(|e| CrxError::KeyDerivation(format!("openssl not found: {e}")))
    }
}

impl Default for OpensslCli {
    fn default() -> Self {
        Self::new("openssl")
    }
}

#[async_trait]
impl KeyFacility for OpensslCli {
    async fn derive_public_key(&self, private_key: &[u8]) -> Result<PublicKey> {
        let mut child = Command::new(&self.program)
            .args(["rsa", "-pubout", "-outform", "DER"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CrxError::KeyDerivation(format!("Failed to spawn {}: {e}", self.program.display()))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CrxError::KeyDerivation("stdin not captured".to_string()))?;

        // Feed stdin while draining stdout so neither pipe can fill up and stall.
        let key = private_key.to_vec();
        let feed = async move {
            stdin.write_all(&key).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output
            .map_err(|e| CrxError::KeyDerivation(format!("Failed to read openssl output: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CrxError::KeyDerivation(format!(
                "openssl exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        fed.map_err(|e| CrxError::KeyDerivation(format!("Failed to write private key: {e}")))?;

        if output.stdout.is_empty() {
            return Err(CrxError::KeyDerivation(
                "openssl produced no output".to_string(),
            ));
        }

        tracing::debug!("Derived {}-byte public key via openssl", output.stdout.len());
        Ok(PublicKey(output.stdout))
    }
}

/// Derives public keys with the linked OpenSSL library.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcess;

#[async_trait]
impl KeyFacility for InProcess {
    async fn derive_public_key(&self, private_key: &[u8]) -> Result<PublicKey> {
        let pkey = load_private_key(private_key)
            .map_err(|e| CrxError::KeyDerivation(e.to_string()))?;
        let der = pkey
            .public_key_to_der()
            .map_err(|e| CrxError::KeyDerivation(e.to_string()))?;
        Ok(PublicKey(der))
    }
}

/// Parse an RSA private key in PEM (PKCS#1 or PKCS#8) or DER form.
///
/// # Errors
///
/// Returns [`CrxError::Signing`] if the bytes are not a private key or the key
/// is not RSA.
pub fn load_private_key(private_key: &[u8]) -> Result<PKey<Private>> {
    if private_key.is_empty() {
        return Err(CrxError::Signing("private key is empty".to_string()));
    }

    let pkey = PKey::private_key_from_pem(private_key)
        .or_else(|_| PKey::private_key_from_der(private_key))
        .map_err(|e| CrxError::Signing(format!("unreadable private key: {e}")))?;

    if pkey.id() != Id::RSA {
        return Err(CrxError::Signing(
            "CRX2 packages require an RSA key".to_string(),
        ));
    }
    Ok(pkey)
}

/// Sign `contents` with SHA-1/RSA.
///
/// # Errors
///
/// Returns [`CrxError::Signing`] if the key cannot be parsed or signing fails.
pub fn sign(contents: &[u8], private_key: &[u8]) -> Result<Signature> {
    let pkey = load_private_key(private_key)?;
    let mut signer = Signer::new(MessageDigest::sha1(), &pkey)?;
    signer.update(contents)?;
    Ok(Signature(signer.sign_to_vec()?))
}

/// Check a SHA-1/RSA signature over `contents` against a DER public key.
///
/// Returns `Ok(false)` for a well-formed but non-matching signature.
///
/// # Errors
///
/// Returns [`CrxError::Signing`] if the public key cannot be parsed.
pub fn verify(public_key: &[u8], signature: &[u8], contents: &[u8]) -> Result<bool> {
    let pkey = PKey::public_key_from_der(public_key)?;
    let mut verifier = Verifier::new(MessageDigest::sha1(), &pkey)?;
    verifier.update(contents)?;
    // OpenSSL reports a malformed signature as an error rather than `false`.
    Ok(verifier.verify(signature).unwrap_or(false))
}

/// Generate a new RSA private key as PKCS#1 PEM.
///
/// # Errors
///
/// Returns [`CrxError::Signing`] if key generation fails.
pub fn generate_private_key(bits: u32) -> Result<Vec<u8>> {
    let rsa = Rsa::generate(bits)?;
    Ok(rsa.private_key_to_pem()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Vec<u8> {
        generate_private_key(2048).unwrap()
    }

    #[tokio::test]
    async fn sign_and_verify() {
        let key = test_key();
        let public = InProcess.derive_public_key(&key).await.unwrap();

        let sig = sign(b"zip bytes", &key).unwrap();
        assert_eq!(sig.as_bytes().len(), 256);
        assert!(verify(public.as_bytes(), sig.as_bytes(), b"zip bytes").unwrap());
        assert!(!verify(public.as_bytes(), sig.as_bytes(), b"other bytes").unwrap());
    }

    #[test]
    fn signature_length_follows_key_size() {
        let key = generate_private_key(1024).unwrap();
        assert_eq!(sign(b"data", &key).unwrap().as_bytes().len(), 128);
    }

    #[test]
    fn signing_is_deterministic_and_pure() {
        let key = test_key();
        let contents = b"contents".to_vec();
        let a = sign(&contents, &key).unwrap();
        let b = sign(&contents, &key).unwrap();
        assert_eq!(a, b);
        assert_eq!(contents, b"contents");
    }

    #[tokio::test]
    async fn pkcs8_and_der_keys_are_accepted() {
        let rsa = Rsa::generate(2048).unwrap();
        let pkey = PKey::from_rsa(rsa).unwrap();
        let pkcs8 = pkey.private_key_to_pem_pkcs8().unwrap();
        let der = pkey.private_key_to_der().unwrap();

        let from_pem = InProcess.derive_public_key(&pkcs8).await.unwrap();
        let from_der = InProcess.derive_public_key(&der).await.unwrap();
        assert_eq!(from_pem, from_der);
        assert_eq!(from_pem.as_bytes(), pkey.public_key_to_der().unwrap());
    }

    #[tokio::test]
    async fn garbage_key_fails_derivation() {
        let err = InProcess
            .derive_public_key(b"not a key")
            .await
            .unwrap_err();
        assert!(matches!(err, CrxError::KeyDerivation(_)));
        assert!(matches!(sign(b"x", b"not a key"), Err(CrxError::Signing(_))));
    }

    #[test]
    fn non_rsa_keys_are_rejected() {
        let ec = openssl::ec::EcKey::generate(
            &openssl::ec::EcGroup::from_curve_name(openssl::nid::Nid::X9_62_PRIME256V1).unwrap(),
        )
        .unwrap();
        let pem = PKey::from_ec_key(ec).unwrap().private_key_to_pem_pkcs8().unwrap();
        assert!(matches!(sign(b"x", &pem), Err(CrxError::Signing(_))));
    }

    #[tokio::test]
    async fn missing_program_is_a_derivation_error() {
        let cli = OpensslCli::new("/nonexistent/openssl-binary");
        let err = cli.derive_public_key(&test_key()).await.unwrap_err();
        assert!(matches!(err, CrxError::KeyDerivation(_)));
    }

    #[tokio::test]
    async fn openssl_cli_matches_in_process() {
        let Ok(cli) = OpensslCli::from_path() else {
            eprintln!("openssl not on PATH; skipping");
            return;
        };
        let key = test_key();
        let external = cli.derive_public_key(&key).await.unwrap();
        let internal = InProcess.derive_public_key(&key).await.unwrap();
        assert_eq!(external, internal);
    }

    #[tokio::test]
    async fn openssl_cli_rejects_garbage() {
        let Ok(cli) = OpensslCli::from_path() else {
            return;
        };
        let err = cli.derive_public_key(b"garbage").await.unwrap_err();
        assert!(matches!(err, CrxError::KeyDerivation(_)));
    }
}
