use super::schema::{FieldSchema, FieldType, ValidationSchema};
use super::{Extractor, ExtractionRule};
use crate::signature::SignatureFormat;
use std::collections::BTreeMap;

fn field(field_type: FieldType, required: bool) -> FieldSchema {
    FieldSchema {
        required,
        field_type,
        nullable: false,
        match_filename: false,
        match_path: false,
    }
}

/// `directive` items: markdown with an XML metadata fence, HTML-comment
/// signature, a richer schema than the other two types (nested `model`,
/// array-typed `permissions`).
pub fn directive_extractor() -> Extractor {
    let mut rules = BTreeMap::new();
    for key in [
        "name",
        "version",
        "description",
        "category",
        "author",
        "model",
        "permissions",
        "inputs",
        "steps",
        "outputs",
        "templates",
    ] {
        rules.insert(key.to_string(), ExtractionRule::Path(key.to_string()));
    }
    rules.insert("content".to_string(), ExtractionRule::Path("content".to_string()));

    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), {
        let mut f = field(FieldType::String, true);
        f.match_filename = true;
        f
    });
    fields.insert("version".to_string(), field(FieldType::Semver, true));
    fields.insert("description".to_string(), field(FieldType::String, true));
    fields.insert("category".to_string(), {
        let mut f = field(FieldType::String, true);
        f.match_path = true;
        f
    });
    fields.insert("author".to_string(), field(FieldType::String, false));
    fields.insert("model".to_string(), field(FieldType::Object, false));
    fields.insert("permissions".to_string(), field(FieldType::Array, false));

    Extractor {
        extensions: vec![".md".to_string()],
        parsers: BTreeMap::new(),
        default_parser: "markdown-with-xml-fence".to_string(),
        signature_format: SignatureFormat {
            prefix: "<!--".to_string(),
            suffix: Some("-->".to_string()),
            after_shebang: false,
        },
        signature_formats: Default::default(),
        extraction_rules: rules,
        validation_schema: ValidationSchema { fields },
    }
}

/// `tool` items: comment-annotated source files in any of several
/// languages, sharing one line-oriented parsing convention.
pub fn tool_extractor() -> Extractor {
    let mut parsers = BTreeMap::new();
    for ext in ["py", "sh"] {
        parsers.insert(ext.to_string(), "python-ast".to_string());
    }
    parsers.insert("js".to_string(), "javascript-ast".to_string());
    for ext in ["yaml", "yml", "json", "toml"] {
        parsers.insert(ext.to_string(), "yaml".to_string());
    }

    let mut rules = BTreeMap::new();
    rules.insert("name".to_string(), ExtractionRule::Filename);
    rules.insert("version".to_string(), ExtractionRule::Path("__version__".to_string()));
    rules.insert("category".to_string(), ExtractionRule::Path("__category__".to_string()));
    rules.insert(
        "description".to_string(),
        ExtractionRule::Path("__tool_description__".to_string()),
    );
    rules.insert("tool_type".to_string(), ExtractionRule::Path("__tool_type__".to_string()));
    rules.insert("executor_id".to_string(), ExtractionRule::Path("__executor_id__".to_string()));

    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), {
        let mut f = field(FieldType::String, true);
        f.match_filename = true;
        f
    });
    fields.insert("category".to_string(), {
        let mut f = field(FieldType::String, true);
        f.match_path = true;
        f
    });
    fields.insert("tool_type".to_string(), field(FieldType::String, true));
    fields.insert("version".to_string(), field(FieldType::Semver, true));
    fields.insert("description".to_string(), field(FieldType::String, true));
    fields.insert("executor_id".to_string(), {
        let mut f = field(FieldType::String, true);
        f.nullable = true;
        f
    });

    Extractor {
        extensions: vec![
            ".py".to_string(),
            ".yaml".to_string(),
            ".yml".to_string(),
            ".json".to_string(),
            ".js".to_string(),
            ".sh".to_string(),
            ".toml".to_string(),
        ],
        parsers,
        default_parser: "python-ast".to_string(),
        signature_format: SignatureFormat {
            prefix: "#".to_string(),
            suffix: None,
            after_shebang: true,
        },
        signature_formats: Default::default(),
        extraction_rules: rules,
        validation_schema: ValidationSchema { fields },
    }
}

/// `knowledge` items: markdown with YAML front matter, HTML-comment
/// signature (same embed rule as directives).
pub fn knowledge_extractor() -> Extractor {
    let mut rules = BTreeMap::new();
    for key in ["id", "title", "version", "entry_type", "category", "tags"] {
        rules.insert(key.to_string(), ExtractionRule::Path(key.to_string()));
    }
    rules.insert("content".to_string(), ExtractionRule::Path("content".to_string()));

    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), {
        let mut f = field(FieldType::String, true);
        f.match_filename = true;
        f
    });
    fields.insert("title".to_string(), field(FieldType::String, true));
    fields.insert("version".to_string(), field(FieldType::Semver, true));
    fields.insert("entry_type".to_string(), field(FieldType::String, true));
    fields.insert("category".to_string(), {
        let mut f = field(FieldType::String, true);
        f.match_path = true;
        f
    });

    Extractor {
        extensions: vec![".md".to_string()],
        parsers: BTreeMap::new(),
        default_parser: "markdown-with-yaml-fence".to_string(),
        signature_format: SignatureFormat {
            prefix: "<!--".to_string(),
            suffix: Some("-->".to_string()),
            after_shebang: false,
        },
        signature_formats: Default::default(),
        extraction_rules: rules,
        validation_schema: ValidationSchema { fields },
    }
}

/// Build an [`Extractor`] from an overlay YAML document shaped the same
/// way the built-ins are: `extensions`, `parser`/`parsers`,
/// `signature_format`, `extraction_rules`, `validation_schema.fields`.
/// Returns `None` if the document is missing the fields required to build
/// a usable extractor, rather than panicking on a partial overlay.
pub fn extractor_from_overlay(value: serde_yaml::Value) -> Option<Extractor> {
    let map = value.as_mapping()?;
    let extensions: Vec<String> = map
        .get("extensions")?
        .as_sequence()?
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();

    let default_parser = map
        .get("parser")
        .and_then(|v| v.as_str())
        .unwrap_or("yaml")
        .to_string();

    let parsers = map
        .get("parsers")
        .and_then(|v| v.as_mapping())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let sig = map.get("signature_format")?.as_mapping()?;
    let signature_format = SignatureFormat {
        prefix: sig.get("prefix")?.as_str()?.to_string(),
        suffix: sig.get("suffix").and_then(|v| v.as_str()).map(String::from),
        after_shebang: sig
            .get("after_shebang")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };

    let extraction_rules = map
        .get("extraction_rules")
        .and_then(|v| v.as_mapping())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| {
                    let key = k.as_str()?.to_string();
                    let rule = v.as_mapping()?;
                    let rule = if rule.get("type")?.as_str()? == "filename" {
                        ExtractionRule::Filename
                    } else {
                        ExtractionRule::Path(rule.get("key")?.as_str()?.to_string())
                    };
                    Some((key, rule))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Extractor {
        extensions,
        parsers,
        default_parser,
        signature_format,
        signature_formats: Default::default(),
        extraction_rules,
        validation_schema: ValidationSchema::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_schema_requires_semver_version() {
        let extractor = directive_extractor();
        let schema = &extractor.validation_schema.fields["version"];
        assert_eq!(schema.field_type, FieldType::Semver);
    }

    #[test]
    fn tool_signature_is_line_comment_after_shebang() {
        let extractor = tool_extractor();
        assert_eq!(extractor.signature_format.prefix, "#");
        assert!(extractor.signature_format.after_shebang);
    }

    #[test]
    fn knowledge_and_directive_share_comment_style() {
        assert_eq!(
            knowledge_extractor().signature_format,
            directive_extractor().signature_format
        );
    }
}
