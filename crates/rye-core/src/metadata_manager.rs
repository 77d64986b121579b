use crate::error::{Result, RyeError};
use crate::extractors::{parsers, ExtractorRegistry, ValidationError};
use crate::item::ItemType;
use crate::signature::{embed_signature, strip_signature, Signature, SignatureKind};
use crate::signer::Signer;
use crate::trust_store::TrustStore;
use crate::verifier::Verifier;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The orchestration facade over A–F: sign, verify, extract, and validate
/// without the caller wiring a `Signer`/`TrustStore`/`ExtractorRegistry`
/// together by hand each time.
pub struct MetadataManager {
    extractors: ExtractorRegistry,
    trust_store: TrustStore,
    key_dir: PathBuf,
}

impl MetadataManager {
    pub fn new(extractors: ExtractorRegistry, trust_store: TrustStore, key_dir: PathBuf) -> Self {
        MetadataManager {
            extractors,
            trust_store,
            key_dir,
        }
    }

    /// Strip any existing signature, hash the remainder, sign it, and
    /// re-embed using the signature format this item type/extension uses.
    /// Re-signing always drops the prior signature first.
    pub fn sign_item(&self, item_type: ItemType, content: &[u8], path: &Path) -> Result<Vec<u8>> {
        let extractor = self.extractors.get(item_type)?;
        let format = extractor.signature_format_for(path);
        let stripped = strip_signature(content, &format)?;
        let content_hash = crate::canonical::hash_bytes(&stripped);

        let signer = Signer::ensure(&self.key_dir)?;
        let ed25519_signature = signer.sign_hash(&content_hash);
        let signature = Signature {
            kind: SignatureKind::Signed,
            timestamp: Utc::now(),
            content_hash,
            ed25519_signature,
            public_key_fingerprint: signer.fingerprint(),
            registry_username: None,
        };
        embed_signature(&stripped, &signature, &format)
    }

    /// Delegate to [`Verifier::verify_integrity`].
    pub fn verify_item(&self, path: &Path, item_type: ItemType) -> Result<String> {
        Verifier::verify_integrity(path, item_type, &self.extractors, &self.trust_store)
    }

    /// Parse `content` with the parser this item type's extension selects,
    /// then pull fields out via the extractor's `extraction_rules`.
    pub fn extract_metadata(
        &self,
        item_type: ItemType,
        content: &str,
        path: &Path,
    ) -> Result<BTreeMap<String, serde_json::Value>> {
        let extractor = self.extractors.get(item_type)?;
        let parsed = parsers::parse(extractor.parser_for(path), content)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RyeError::ValidationFailed(format!("{path:?} has no file stem")))?;
        Ok(extractor.extract_fields(&parsed, stem))
    }

    /// Validate extracted fields against the item type's schema. Returns
    /// every violation found, not just the first.
    pub fn validate_metadata(
        &self,
        item_type: ItemType,
        fields: &BTreeMap<String, serde_json::Value>,
        filename_stem: &str,
        category_path: &str,
    ) -> std::result::Result<(), Vec<ValidationError>> {
        let extractor = self
            .extractors
            .get(item_type)
            .map_err(|e| vec![ValidationError { field: "*".to_string(), reason: e.to_string() }])?;
        let errors = extractor
            .validation_schema
            .validate(fields, filename_stem, category_path);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
