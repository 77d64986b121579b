mod builtins;
pub mod parsers;
pub mod schema;

pub use schema::{FieldSchema, FieldType, ValidationError, ValidationSchema};

use crate::error::{Result, RyeError};
use crate::item::ItemType;
use crate::signature::SignatureFormat;
use parsers::ParsedDocument;
use std::collections::BTreeMap;
use std::path::Path;

/// Where a field's value comes from when extracting metadata: the parsed
/// document under a dotted key path, or the item's own filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionRule {
    Path(String),
    Filename,
}

/// Data-only configuration for one item type: which extensions it covers,
/// how its signature is embedded, which parser to run, and how to pull
/// fields out of the parsed document. Nothing here is executable code —
/// adding a new item type means adding a value, not a module.
#[derive(Debug, Clone)]
pub struct Extractor {
    pub extensions: Vec<String>,
    pub parsers: BTreeMap<String, String>,
    pub default_parser: String,
    pub signature_format: SignatureFormat,
    pub signature_formats: std::collections::HashMap<String, SignatureFormat>,
    pub extraction_rules: BTreeMap<String, ExtractionRule>,
    pub validation_schema: ValidationSchema,
}

impl Extractor {
    pub fn parser_for(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.parsers.get(ext))
            .map(|s| s.as_str())
            .unwrap_or(&self.default_parser)
    }

    pub fn signature_format_for(&self, path: &Path) -> SignatureFormat {
        crate::signature::format_for_path(path, &self.signature_format, &self.signature_formats)
    }

    /// Apply `extraction_rules` to a parsed document, producing the flat
    /// field map callers validate and store.
    pub fn extract_fields(
        &self,
        parsed: &ParsedDocument,
        filename_stem: &str,
    ) -> BTreeMap<String, serde_json::Value> {
        let mut fields = BTreeMap::new();
        for (field, rule) in &self.extraction_rules {
            let value = match rule {
                ExtractionRule::Filename => serde_json::Value::String(filename_stem.to_string()),
                ExtractionRule::Path(key) => parsed.get(key).cloned().unwrap_or(serde_json::Value::Null),
            };
            fields.insert(field.clone(), value);
        }
        fields
    }
}

/// An owned collection of extractors, one per [`ItemType`]. Constructed
/// fresh by each caller (there is no process-wide singleton) and optionally
/// extended with project/user overlay data files.
pub struct ExtractorRegistry {
    extractors: std::collections::HashMap<ItemType, Extractor>,
}

impl ExtractorRegistry {
    /// Seed a registry with the three built-in extractors.
    pub fn with_builtins() -> Self {
        let mut extractors = std::collections::HashMap::new();
        extractors.insert(ItemType::Directive, builtins::directive_extractor());
        extractors.insert(ItemType::Tool, builtins::tool_extractor());
        extractors.insert(ItemType::Knowledge, builtins::knowledge_extractor());
        ExtractorRegistry { extractors }
    }

    pub fn get(&self, item_type: ItemType) -> Result<&Extractor> {
        self.extractors
            .get(&item_type)
            .ok_or_else(|| RyeError::ValidationFailed(format!("no extractor registered for {item_type}")))
    }

    /// Register or replace the extractor for a given item type. Used both
    /// by tests and by overlay loading to override a built-in definition.
    pub fn register(&mut self, item_type: ItemType, extractor: Extractor) {
        self.extractors.insert(item_type, extractor);
    }

    /// Scan `tier_root/.ai/tools/rye/core/extractors/**/*_extractor.{yaml,json}`
    /// for extractor overlay data files and merge them in, first-found-wins
    /// against whatever is already registered for that item type.
    pub fn load_overlay(&mut self, tier_root: &Path) -> Result<()> {
        let extractors_dir = tier_root.join(".ai/tools/rye/core/extractors");
        if !extractors_dir.exists() {
            return Ok(());
        }
        for item_type in [ItemType::Directive, ItemType::Tool, ItemType::Knowledge] {
            let candidate = extractors_dir
                .join(item_type.as_str())
                .join(format!("{}_extractor.yaml", item_type.as_str()));
            if let Ok(raw) = std::fs::read_to_string(&candidate) {
                let value: serde_yaml::Value = serde_yaml::from_str(&raw)
                    .map_err(|e| RyeError::ValidationFailed(format!("invalid overlay at {candidate:?}: {e}")))?;
                if let Some(extractor) = builtins::extractor_from_overlay(value) {
                    self.extractors.insert(item_type, extractor);
                }
            }
        }
        Ok(())
    }
}
