use crate::canonical::hash_bytes;
use crate::error::{Result, RyeError};
use crate::extractors::ExtractorRegistry;
use crate::item::ItemType;
use crate::signature::extract_signature;
use crate::signer::verify_hash;
use crate::trust_store::TrustStore;
use std::fs;
use std::path::Path;

/// A zero-sized marker type: every check is a pure function of its
/// arguments, so there is no state to share across calls or threads.
pub struct Verifier;

impl Verifier {
    /// Verify a file's embedded signature against its content, in the
    /// fixed order the integrity model depends on: locate the signature
    /// format, extract the signature line, strip it, hash what remains,
    /// compare hashes, look up the signing key, then check the Ed25519
    /// signature itself. Returns the verified content hash on success.
    pub fn verify_integrity(
        path: &Path,
        item_type: ItemType,
        extractors: &ExtractorRegistry,
        trust_store: &TrustStore,
    ) -> Result<String> {
        let content = fs::read(path).map_err(|e| RyeError::io(path, e))?;
        let extractor = extractors.get(item_type)?;
        let format = extractor.signature_format_for(path);

        let Some(signature) = extract_signature(&content, &format)? else {
            return Err(RyeError::Unsigned { path: path.to_path_buf() });
        };

        let stripped = crate::signature::strip_signature(&content, &format)?;
        let actual = hash_bytes(&stripped);

        if actual != signature.content_hash {
            return Err(RyeError::HashMismatch {
                path: path.to_path_buf(),
                expected: signature.content_hash.clone(),
                actual,
            });
        }

        let Some(public_key_pem) = trust_store.get_key(&signature.public_key_fingerprint) else {
            return Err(RyeError::UntrustedKey {
                path: path.to_path_buf(),
                fingerprint: signature.public_key_fingerprint.clone(),
            });
        };

        if !verify_hash(&signature.content_hash, &signature.ed25519_signature, &public_key_pem) {
            return Err(RyeError::SignatureInvalid {
                path: path.to_path_buf(),
                fingerprint: signature.public_key_fingerprint.clone(),
            });
        }

        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{embed_signature, Signature, SignatureFormat, SignatureKind};
    use crate::signer::Signer;
    use chrono::Utc;
    use tempfile::tempdir;

    fn tool_format() -> SignatureFormat {
        SignatureFormat {
            prefix: "#".to_string(),
            suffix: None,
            after_shebang: true,
        }
    }

    fn sign_and_write(path: &Path, content: &[u8], signer: &Signer) -> Vec<u8> {
        let stripped = crate::signature::strip_signature(content, &tool_format()).unwrap();
        let hash = hash_bytes(&stripped);
        let sig = Signature {
            kind: SignatureKind::Signed,
            timestamp: Utc::now(),
            content_hash: hash.clone(),
            ed25519_signature: signer.sign_hash(&hash),
            public_key_fingerprint: signer.fingerprint(),
            registry_username: None,
        };
        let embedded = embed_signature(&stripped, &sig, &tool_format()).unwrap();
        fs::write(path, &embedded).unwrap();
        embedded
    }

    #[test]
    fn verifies_a_properly_signed_file() {
        let key_dir = tempdir().unwrap();
        let signer = Signer::ensure(key_dir.path()).unwrap();
        let trust_dir = tempdir().unwrap();
        let trust_store = TrustStore::new(trust_dir.path().to_path_buf());
        trust_store.add_key(signer.public_key_pem()).unwrap();

        let file = tempdir().unwrap();
        let path = file.path().join("tool.py");
        sign_and_write(&path, b"def run():\n    pass\n", &signer);

        let extractors = ExtractorRegistry::with_builtins();
        let hash = Verifier::verify_integrity(&path, ItemType::Tool, &extractors, &trust_store).unwrap();
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn unsigned_file_is_rejected() {
        let file = tempdir().unwrap();
        let path = file.path().join("tool.py");
        fs::write(&path, b"def run():\n    pass\n").unwrap();

        let trust_store = TrustStore::new(tempdir().unwrap().path().to_path_buf());
        let extractors = ExtractorRegistry::with_builtins();
        let result = Verifier::verify_integrity(&path, ItemType::Tool, &extractors, &trust_store);
        assert!(matches!(result, Err(RyeError::Unsigned { .. })));
    }

    #[test]
    fn tampered_content_is_detected() {
        let key_dir = tempdir().unwrap();
        let signer = Signer::ensure(key_dir.path()).unwrap();
        let trust_dir = tempdir().unwrap();
        let trust_store = TrustStore::new(trust_dir.path().to_path_buf());
        trust_store.add_key(signer.public_key_pem()).unwrap();

        let file = tempdir().unwrap();
        let path = file.path().join("tool.py");
        sign_and_write(&path, b"def run():\n    pass\n", &signer);

        let mut content = fs::read(&path).unwrap();
        content.extend_from_slice(b"\nprint('tampered')\n");
        fs::write(&path, content).unwrap();

        let extractors = ExtractorRegistry::with_builtins();
        let result = Verifier::verify_integrity(&path, ItemType::Tool, &extractors, &trust_store);
        assert!(matches!(result, Err(RyeError::HashMismatch { .. })));
    }

    #[test]
    fn untrusted_key_is_rejected() {
        let key_dir = tempdir().unwrap();
        let signer = Signer::ensure(key_dir.path()).unwrap();
        let trust_store = TrustStore::new(tempdir().unwrap().path().to_path_buf());

        let file = tempdir().unwrap();
        let path = file.path().join("tool.py");
        sign_and_write(&path, b"def run():\n    pass\n", &signer);

        let extractors = ExtractorRegistry::with_builtins();
        let result = Verifier::verify_integrity(&path, ItemType::Tool, &extractors, &trust_store);
        assert!(matches!(result, Err(RyeError::UntrustedKey { .. })));
    }

    #[test]
    fn forged_signature_is_rejected() {
        let key_dir = tempdir().unwrap();
        let signer = Signer::ensure(key_dir.path()).unwrap();
        let trust_dir = tempdir().unwrap();
        let trust_store = TrustStore::new(trust_dir.path().to_path_buf());
        trust_store.add_key(signer.public_key_pem()).unwrap();

        let file = tempdir().unwrap();
        let path = file.path().join("tool.py");
        let embedded = sign_and_write(&path, b"def run():\n    pass\n", &signer);

        // Corrupt just the signature field, keeping the hash and
        // fingerprint intact, so only the Ed25519 check can fail.
        let text = String::from_utf8(embedded).unwrap();
        let corrupted = text.replacen(&signer.sign_hash(&hash_bytes(b"def run():\n    pass\n")), "not-a-real-signature", 1);
        fs::write(&path, corrupted).unwrap();

        let extractors = ExtractorRegistry::with_builtins();
        let result = Verifier::verify_integrity(&path, ItemType::Tool, &extractors, &trust_store);
        assert!(matches!(result, Err(RyeError::SignatureInvalid { .. })));
    }
}
