use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field's validation rule inside a [`ValidationSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub match_filename: bool,
    #[serde(default)]
    pub match_path: bool,
}

/// The closed set of field types a schema can require. `Array` carries no
/// element-type refinement — this mirrors the source schema validator,
/// which only ever checks "is this a list".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Semver,
    Bool,
    Integer,
    Array,
    Object,
}

/// Required/type/constraint rules for the fields an extractor produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSchema {
    pub fields: BTreeMap<String, FieldSchema>,
}

/// One failed field check, accumulated rather than short-circuited so a
/// caller sees every problem with a draft item in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl ValidationSchema {
    /// Validate `fields` against this schema. `filename_stem` and
    /// `category_path` are supplied by the caller so `match_filename`/
    /// `match_path` rules can compare against the file's actual location.
    pub fn validate(
        &self,
        fields: &BTreeMap<String, serde_json::Value>,
        filename_stem: &str,
        category_path: &str,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (name, rule) in &self.fields {
            let value = fields.get(name);

            let is_null = matches!(value, None | Some(serde_json::Value::Null));
            if is_null {
                if rule.required && !rule.nullable {
                    errors.push(ValidationError {
                        field: name.clone(),
                        reason: "required field is missing".to_string(),
                    });
                }
                continue;
            }
            let value = value.unwrap();

            if !matches_type(value, rule.field_type) {
                errors.push(ValidationError {
                    field: name.clone(),
                    reason: format!("expected type {:?}, got {}", rule.field_type, type_name(value)),
                });
                continue;
            }

            if rule.match_filename {
                if let Some(s) = value.as_str() {
                    if s != filename_stem {
                        errors.push(ValidationError {
                            field: name.clone(),
                            reason: format!("'{s}' does not match filename '{filename_stem}'"),
                        });
                    }
                }
            }

            if rule.match_path {
                if let Some(s) = value.as_str() {
                    if !category_path.starts_with(s) {
                        errors.push(ValidationError {
                            field: name.clone(),
                            reason: format!("'{s}' is not a prefix of path '{category_path}'"),
                        });
                    }
                }
            }
        }

        errors
    }
}

fn matches_type(value: &serde_json::Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Semver => value
            .as_str()
            .map(|s| semver::Version::parse(s).is_ok())
            .unwrap_or(false),
        FieldType::Bool => value.is_boolean(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Array => value.is_array(),
        FieldType::Object => value.is_object(),
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
