use crate::error::{Result, RyeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The three kinds of signed content this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Directive,
    Tool,
    Knowledge,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Directive => "directive",
            ItemType::Tool => "tool",
            ItemType::Knowledge => "knowledge",
        }
    }

    /// The directory name under a tier root that holds items of this type.
    pub fn type_dir(&self) -> &'static str {
        match self {
            ItemType::Directive => "directives",
            ItemType::Tool => "tools",
            ItemType::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slash-separated logical name, stable across tiers and file extensions.
///
/// `rye/core/primitives/subprocess` and `agent/review/checklist` are both
/// valid logical ids; `../escape` and empty segments are not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(RyeError::ValidationFailed(
                "logical id must not be empty".into(),
            ));
        }
        for segment in raw.split('/') {
            if segment.is_empty() || segment == ".." || segment == "." {
                return Err(RyeError::ValidationFailed(format!(
                    "logical id '{raw}' has an invalid segment '{segment}'"
                )));
            }
        }
        Ok(LogicalId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final slash-separated segment, used as the filename stem.
    pub fn stem(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which tier an item lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Space {
    Project,
    User,
    System { bundle_id: String },
}

/// A piece of signed content, plus the location it was loaded from.
#[derive(Debug, Clone)]
pub struct Item {
    pub item_type: ItemType,
    pub logical_id: LogicalId,
    pub version: String,
    pub content: Vec<u8>,
    pub content_hash: String,
    pub category: String,
    pub space: Space,
    pub path: std::path::PathBuf,
}

impl Item {
    /// Validates the two filesystem-shape invariants every item must hold:
    /// the filename stem matches the logical id's last segment, and the
    /// declared category is a prefix of the item's directory relative to
    /// its type root.
    pub fn validate_placement(&self, type_root: &Path) -> Result<()> {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem != self.logical_id.stem() {
            return Err(RyeError::ValidationFailed(format!(
                "file stem '{stem}' does not match logical id segment '{}'",
                self.logical_id.stem()
            )));
        }

        let relative = self
            .path
            .parent()
            .and_then(|dir| dir.strip_prefix(type_root).ok())
            .unwrap_or_else(|| Path::new(""));
        let relative_str = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        if !self.category.is_empty() && !relative_str.starts_with(self.category.as_str()) {
            return Err(RyeError::ValidationFailed(format!(
                "category '{}' is not a prefix of directory '{}'",
                self.category, relative_str
            )));
        }
        Ok(())
    }

    /// True if `version` parses as a valid semantic version.
    pub fn has_valid_version(&self) -> bool {
        semver::Version::parse(&self.version).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn logical_id_rejects_empty_and_traversal_segments() {
        assert!(LogicalId::parse("").is_err());
        assert!(LogicalId::parse("a//b").is_err());
        assert!(LogicalId::parse("../escape").is_err());
        assert!(LogicalId::parse("a/./b").is_err());
        assert!(LogicalId::parse("rye/core/primitives/subprocess").is_ok());
    }

    #[test]
    fn logical_id_stem_is_the_final_segment() {
        let id = LogicalId::parse("agent/review/checklist").unwrap();
        assert_eq!(id.stem(), "checklist");
        assert_eq!(id.segments().count(), 3);
    }

    #[test]
    fn item_type_round_trips_through_type_dir() {
        assert_eq!(ItemType::Directive.type_dir(), "directives");
        assert_eq!(ItemType::Tool.type_dir(), "tools");
        assert_eq!(ItemType::Knowledge.type_dir(), "knowledge");
    }

    fn sample_item(path: std::path::PathBuf, category: &str) -> Item {
        Item {
            item_type: ItemType::Tool,
            logical_id: LogicalId::parse("rye/core/registry").unwrap(),
            version: "1.0.0".to_string(),
            content: Vec::new(),
            content_hash: "0".repeat(64),
            category: category.to_string(),
            space: Space::User,
            path,
        }
    }

    #[test]
    fn validate_placement_requires_matching_stem_and_category_prefix() {
        let type_root = Path::new("/tier/.ai/tools");
        let item = sample_item(type_root.join("rye/core/registry.py"), "rye/core");
        assert!(item.validate_placement(type_root).is_ok());

        let mismatched_stem = sample_item(type_root.join("rye/core/other.py"), "rye/core");
        assert!(mismatched_stem.validate_placement(type_root).is_err());

        let mismatched_category = sample_item(type_root.join("rye/core/registry.py"), "agent/review");
        assert!(mismatched_category.validate_placement(type_root).is_err());
    }

    #[test]
    fn has_valid_version_checks_semver() {
        let mut item = sample_item(PathBuf::from("registry.py"), "rye/core");
        assert!(item.has_valid_version());
        item.version = "not-a-version".to_string();
        assert!(!item.has_valid_version());
    }
}
