use crate::error::{Result, RyeError};
use std::collections::BTreeMap;

/// A parsed document: a flat map of top-level fields to JSON values, ready
/// for [`crate::extractors::ExtractionRule`] to pick values out of.
pub type ParsedDocument = BTreeMap<String, serde_json::Value>;

/// Dispatch to one of a closed set of parser implementations by name. This
/// replaces dynamic, importlib-style module loading with a static match:
/// adding a parser means adding an arm here, not dropping a new file
/// somewhere the registry discovers at runtime.
pub fn parse(parser_name: &str, content: &str) -> Result<ParsedDocument> {
    match parser_name {
        "markdown-with-xml-fence" => parse_markdown_xml_fence(content),
        "markdown-with-yaml-fence" => parse_markdown_yaml_fence(content),
        "python-ast" => parse_python_ast(content),
        "javascript-ast" => parse_javascript_ast(content),
        "yaml" => parse_yaml(content),
        other => Err(RyeError::ValidationFailed(format!(
            "unknown parser '{other}'"
        ))),
    }
}

/// `key: value` module-level assignments, `__dunder__` or not, as produced
/// by reading a Python (or shell, which shares the same comment-metadata
/// convention) source file line by line. Values are string, boolean, `None`,
/// or a `[...]` literal list of strings.
fn parse_python_ast(content: &str) -> Result<ParsedDocument> {
    let mut doc = ParsedDocument::new();
    for line in content.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !is_identifier(key) {
            continue;
        }
        let value = value.trim().trim_end_matches(['\r']);
        if let Some(parsed) = parse_python_literal(value) {
            doc.insert(key.to_string(), parsed);
        }
    }
    Ok(doc)
}

/// `export const KEY = value;` / `const KEY = value;` module-level
/// declarations, the JS-side analogue of [`parse_python_ast`].
fn parse_javascript_ast(content: &str) -> Result<ParsedDocument> {
    let mut doc = ParsedDocument::new();
    for raw_line in content.lines() {
        let line = raw_line.trim().trim_end_matches(';');
        let line = line
            .strip_prefix("export const ")
            .or_else(|| line.strip_prefix("export let "))
            .or_else(|| line.strip_prefix("const "))
            .or_else(|| line.strip_prefix("let "))
            .unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !is_identifier(key) {
            continue;
        }
        if let Some(parsed) = parse_python_literal(value.trim()) {
            doc.insert(key.to_string(), parsed);
        }
    }
    Ok(doc)
}

fn parse_yaml(content: &str) -> Result<ParsedDocument> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| RyeError::ValidationFailed(format!("invalid YAML: {e}")))?;
    yaml_value_to_doc(value)
}

/// Markdown with YAML front matter (`---\n...\n---`) followed by body text,
/// the format `knowledge` items use.
fn parse_markdown_yaml_fence(content: &str) -> Result<ParsedDocument> {
    let (front_matter, body) = split_front_matter(content, "---", "---");
    let mut doc = match front_matter {
        Some(fm) => yaml_value_to_doc(
            serde_yaml::from_str(fm)
                .map_err(|e| RyeError::ValidationFailed(format!("invalid front matter: {e}")))?,
        )?,
        None => ParsedDocument::new(),
    };
    doc.insert("content".to_string(), serde_json::Value::String(body.to_string()));
    Ok(doc)
}

/// Markdown with an XML-ish front-matter fence (`<metadata>...</metadata>`),
/// the format `directive` items use; each top-level child element becomes a
/// string field.
fn parse_markdown_xml_fence(content: &str) -> Result<ParsedDocument> {
    let (front_matter, body) = split_front_matter(content, "<metadata>", "</metadata>");
    let mut doc = ParsedDocument::new();
    if let Some(fm) = front_matter {
        for (key, value) in extract_xml_tags(fm) {
            doc.insert(key, value);
        }
    }
    doc.insert("content".to_string(), serde_json::Value::String(body.to_string()));
    Ok(doc)
}

fn split_front_matter<'a>(content: &'a str, open: &str, close: &str) -> (Option<&'a str>, &'a str) {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix(open) else {
        return (None, content);
    };
    let Some(close_idx) = after_open.find(close) else {
        return (None, content);
    };
    let front_matter = &after_open[..close_idx];
    let body = after_open[close_idx + close.len()..].trim_start_matches(['\n', '\r']);
    (Some(front_matter), body)
}

fn extract_xml_tags(block: &str) -> Vec<(String, serde_json::Value)> {
    let mut out = Vec::new();
    let mut rest = block;
    while let Some(open_start) = rest.find('<') {
        let Some(open_end) = rest[open_start..].find('>') else {
            break;
        };
        let tag = &rest[open_start + 1..open_start + open_end];
        if tag.starts_with('/') || tag.is_empty() {
            rest = &rest[open_start + open_end + 1..];
            continue;
        }
        let close_tag = format!("</{tag}>");
        let after_open = &rest[open_start + open_end + 1..];
        let Some(close_start) = after_open.find(&close_tag) else {
            break;
        };
        let value = after_open[..close_start].trim();
        if value.starts_with('[') {
            out.push((tag.to_string(), parse_list_literal(value)));
        } else {
            out.push((tag.to_string(), serde_json::Value::String(value.to_string())));
        }
        rest = &after_open[close_start + close_tag.len()..];
    }
    out
}

fn yaml_value_to_doc(value: serde_yaml::Value) -> Result<ParsedDocument> {
    let serde_yaml::Value::Mapping(map) = value else {
        return Ok(ParsedDocument::new());
    };
    let mut doc = ParsedDocument::new();
    for (k, v) in map {
        if let serde_yaml::Value::String(key) = k {
            let json_value = serde_json::to_value(v)
                .map_err(|e| RyeError::ValidationFailed(format!("could not convert YAML value: {e}")))?;
            doc.insert(key, json_value);
        }
    }
    Ok(doc)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_python_literal(raw: &str) -> Option<serde_json::Value> {
    let raw = raw.trim();
    if raw == "None" || raw == "null" {
        return Some(serde_json::Value::Null);
    }
    if raw == "True" || raw == "true" {
        return Some(serde_json::Value::Bool(true));
    }
    if raw == "False" || raw == "false" {
        return Some(serde_json::Value::Bool(false));
    }
    if (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
        || (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
    {
        return Some(serde_json::Value::String(raw[1..raw.len() - 1].to_string()));
    }
    if raw.starts_with('[') {
        return Some(parse_list_literal(raw));
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(serde_json::Value::Number(n.into()));
    }
    None
}

fn parse_list_literal(raw: &str) -> serde_json::Value {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let items: Vec<serde_json::Value> = inner
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| parse_python_literal(item).unwrap_or_else(|| serde_json::Value::String(item.to_string())))
        .collect();
    serde_json::Value::Array(items)
}
