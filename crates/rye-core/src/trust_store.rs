use crate::error::{Result, RyeError};
use crate::signer::fingerprint_of_pem;
use std::fs;
use std::path::{Path, PathBuf};

const REGISTRY_KEY_NAME: &str = "registry.pem";

/// A directory of trusted Ed25519 public keys, keyed by fingerprint.
///
/// Every read re-reads from disk — there is no in-memory cache, so a key
/// added by another process is visible immediately on the next call.
pub struct TrustStore {
    trust_dir: PathBuf,
}

/// One entry returned by [`TrustStore::list_keys`].
#[derive(Debug, Clone)]
pub struct TrustedKey {
    pub fingerprint: String,
    pub path: PathBuf,
    pub is_registry: bool,
}

impl TrustStore {
    pub fn new(trust_dir: PathBuf) -> Self {
        TrustStore { trust_dir }
    }

    fn key_path(&self, fingerprint: &str) -> PathBuf {
        self.trust_dir.join(format!("{fingerprint}.pem"))
    }

    fn registry_path(&self) -> PathBuf {
        self.trust_dir.join(REGISTRY_KEY_NAME)
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.trust_dir).map_err(|e| RyeError::io(&self.trust_dir, e))
    }

    /// True if `fingerprint` names a key in the store, or matches the
    /// pinned registry key.
    pub fn is_trusted(&self, fingerprint: &str) -> bool {
        self.get_key(fingerprint).is_some()
    }

    /// The PEM bytes of a trusted key by fingerprint, if any.
    pub fn get_key(&self, fingerprint: &str) -> Option<Vec<u8>> {
        let path = self.key_path(fingerprint);
        if let Ok(bytes) = fs::read(&path) {
            return Some(bytes);
        }
        if let Ok(registry_pem) = fs::read(self.registry_path()) {
            if fingerprint_of_pem(&registry_pem) == fingerprint {
                return Some(registry_pem);
            }
        }
        None
    }

    /// Add a key to the store. Returns its fingerprint.
    pub fn add_key(&self, public_key_pem: &[u8]) -> Result<String> {
        self.ensure_dir()?;
        let fingerprint = fingerprint_of_pem(public_key_pem);
        let path = self.key_path(&fingerprint);
        write_atomic(&path, public_key_pem)?;
        Ok(fingerprint)
    }

    /// Remove a key from the store. Returns `true` if a key was removed.
    pub fn remove_key(&self, fingerprint: &str) -> Result<bool> {
        let path = self.key_path(fingerprint);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| RyeError::io(&path, e))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Pin the registry key (trust-on-first-use). A no-op if a registry key
    /// is already pinned — returns the existing fingerprint rather than
    /// overwriting it.
    pub fn pin_registry(&self, public_key_pem: &[u8]) -> Result<String> {
        self.ensure_dir()?;
        let path = self.registry_path();
        if let Ok(existing) = fs::read(&path) {
            return Ok(fingerprint_of_pem(&existing));
        }
        write_atomic(&path, public_key_pem)?;
        Ok(fingerprint_of_pem(public_key_pem))
    }

    /// Explicitly replace the pinned registry key, bypassing TOFU. Intended
    /// for deliberate key-rotation operators, not a default code path.
    pub fn force_repin_registry(&self, public_key_pem: &[u8]) -> Result<String> {
        self.ensure_dir()?;
        write_atomic(&self.registry_path(), public_key_pem)?;
        Ok(fingerprint_of_pem(public_key_pem))
    }

    pub fn get_registry_key(&self) -> Option<Vec<u8>> {
        fs::read(self.registry_path()).ok()
    }

    pub fn list_keys(&self) -> Result<Vec<TrustedKey>> {
        if !self.trust_dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.trust_dir).map_err(|e| RyeError::io(&self.trust_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RyeError::io(&self.trust_dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let pem = fs::read(&path).map_err(|e| RyeError::io(&path, e))?;
            keys.push(TrustedKey {
                fingerprint: fingerprint_of_pem(&pem),
                is_registry: path.file_name().and_then(|n| n.to_str()) == Some(REGISTRY_KEY_NAME),
                path,
            });
        }
        Ok(keys)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RyeError::io(dir, e))?;
    use std::io::Write;
    tmp.write_all(bytes).map_err(|e| RyeError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| RyeError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fake_pem(label: &str) -> Vec<u8> {
        format!("-----BEGIN {label}-----\nZm9v\n-----END {label}-----\n").into_bytes()
    }

    #[test]
    fn add_then_trusted() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trusted_keys"));
        let pem = fake_pem("A");
        let fp = store.add_key(&pem).unwrap();
        assert!(store.is_trusted(&fp));
        assert_eq!(store.get_key(&fp).unwrap(), pem);
    }

    #[test]
    fn remove_key_returns_false_when_absent() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trusted_keys"));
        assert!(!store.remove_key("deadbeefdeadbeef").unwrap());
    }

    #[test]
    fn pin_registry_is_tofu() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trusted_keys"));
        let first = fake_pem("A");
        let second = fake_pem("B");
        let fp1 = store.pin_registry(&first).unwrap();
        let fp2 = store.pin_registry(&second).unwrap();
        assert_eq!(fp1, fp2);
        assert_eq!(store.get_registry_key().unwrap(), first);
    }

    #[test]
    fn force_repin_overwrites() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trusted_keys"));
        let first = fake_pem("A");
        let second = fake_pem("B");
        store.pin_registry(&first).unwrap();
        let fp2 = store.force_repin_registry(&second).unwrap();
        assert_eq!(store.get_registry_key().unwrap(), second);
        assert_eq!(fp2, fingerprint_of_pem(&second));
    }

    #[test]
    fn is_trusted_via_registry_fingerprint() {
        let dir = tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("trusted_keys"));
        let pem = fake_pem("REG");
        let fp = store.pin_registry(&pem).unwrap();
        assert!(store.is_trusted(&fp));
    }
}
