use crate::error::{Result, RyeError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

const PRIVATE_KEY_FILE: &str = "private_key.pem";
const PUBLIC_KEY_FILE: &str = "public_key.pem";
const PEM_PRIVATE_LABEL: &str = "RYE ED25519 PRIVATE KEY";
const PEM_PUBLIC_LABEL: &str = "RYE ED25519 PUBLIC KEY";

/// An Ed25519 keypair used to sign and verify content hashes.
///
/// Signatures are always taken over the ASCII bytes of a hex content hash,
/// never over raw file content — this is what lets [`crate::verifier`]
/// re-derive and check a signature without re-reading the whole file twice.
pub struct Signer {
    signing_key: SigningKey,
    verifying_key_pem: Vec<u8>,
}

impl Signer {
    /// Load an existing keypair from `key_dir`, or generate and save one.
    pub fn ensure(key_dir: &Path) -> Result<Self> {
        let private_path = key_dir.join(PRIVATE_KEY_FILE);
        let public_path = key_dir.join(PUBLIC_KEY_FILE);

        if private_path.exists() && public_path.exists() {
            return Self::load(key_dir);
        }

        fs::create_dir_all(key_dir).map_err(|e| RyeError::io(key_dir, e))?;
        set_dir_permissions(key_dir);

        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        let private_pem = encode_pem(PEM_PRIVATE_LABEL, signing_key.to_bytes().as_slice());
        let public_pem = encode_pem(PEM_PUBLIC_LABEL, verifying_key.to_bytes().as_slice());

        fs::write(&private_path, &private_pem).map_err(|e| RyeError::io(&private_path, e))?;
        set_file_permissions(&private_path, 0o600);
        fs::write(&public_path, &public_pem).map_err(|e| RyeError::io(&public_path, e))?;
        set_file_permissions(&public_path, 0o644);

        Ok(Signer {
            signing_key,
            verifying_key_pem: public_pem,
        })
    }

    /// Load a keypair that is known to already exist on disk.
    pub fn load(key_dir: &Path) -> Result<Self> {
        let private_path = key_dir.join(PRIVATE_KEY_FILE);
        let public_path = key_dir.join(PUBLIC_KEY_FILE);

        let private_pem = fs::read(&private_path).map_err(|e| RyeError::io(&private_path, e))?;
        let public_pem = fs::read(&public_path).map_err(|e| RyeError::io(&public_path, e))?;

        let key_bytes: Zeroizing<Vec<u8>> = Zeroizing::new(decode_pem(&private_pem)?);
        let array: [u8; 32] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| RyeError::ValidationFailed("private key is not 32 bytes".into()))?;
        let signing_key = SigningKey::from_bytes(&array);

        Ok(Signer {
            signing_key,
            verifying_key_pem: public_pem,
        })
    }

    /// Sign the ASCII bytes of a hex content hash. Returns a base64url
    /// (no padding) encoded signature.
    pub fn sign_hash(&self, content_hash: &str) -> String {
        let signature = self.signing_key.sign(content_hash.as_bytes());
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    }

    pub fn public_key_pem(&self) -> &[u8] {
        &self.verifying_key_pem
    }

    /// First 16 hex characters of SHA-256(public key PEM bytes).
    pub fn fingerprint(&self) -> String {
        fingerprint_of_pem(&self.verifying_key_pem)
    }
}

/// First 16 hex characters of SHA-256 over PEM-encoded public key bytes.
pub fn fingerprint_of_pem(public_key_pem: &[u8]) -> String {
    let digest = Sha256::digest(public_key_pem);
    hex::encode(digest)[..16].to_string()
}

/// Verify an Ed25519 signature over a content hash. Any failure mode —
/// malformed base64, malformed key bytes, or a genuinely invalid signature
/// — collapses to `false`, by contract: callers that need to distinguish
/// causes use [`crate::verifier::Verifier`], which wraps this with the
/// full ordered-checks algorithm.
pub fn verify_hash(content_hash: &str, signature_b64: &str, public_key_pem: &[u8]) -> bool {
    let Ok(key_bytes) = decode_pem(public_key_pem) else {
        return false;
    };
    let Ok(array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&array) else {
        return false;
    };
    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(signature_b64) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    verifying_key
        .verify(content_hash.as_bytes(), &signature)
        .is_ok()
}

fn encode_pem(label: &str, bytes: &[u8]) -> Vec<u8> {
    let body = general_purpose_standard_encode(bytes);
    format!("-----BEGIN {label}-----\n{body}\n-----END {label}-----\n").into_bytes()
}

fn decode_pem(pem: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| RyeError::ValidationFailed("key file is not valid UTF-8".into()))?;
    let body: String = text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| RyeError::ValidationFailed(format!("invalid PEM body: {e}")))
}

fn general_purpose_standard_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(unix)]
fn set_dir_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(dir) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        let _ = fs::set_permissions(dir, perms);
    }
}

#[cfg(not(unix))]
fn set_dir_permissions(_dir: &Path) {}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(mode);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) {}
