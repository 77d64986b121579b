use crate::error::{Result, RyeError};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Canonical, deterministic serialization of arbitrary JSON values.
///
/// Object keys are sorted lexicographically, separators carry no
/// insignificant whitespace (`","`/`":"`), and non-ASCII characters are
/// escaped to `\uXXXX`. Two calls on logically-equal values always produce
/// byte-identical output, which is the property every hash and signature in
/// this crate depends on.
pub fn canonicalize_value(value: &serde_json::Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// SHA-256 of [`canonicalize_value`], as lowercase hex.
pub fn hash_value(value: &serde_json::Value) -> Result<String> {
    let bytes = canonicalize_value(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// SHA-256 of raw bytes, as lowercase hex. Used for content hashing, where
/// the input is already a byte string (a file's stripped content) rather
/// than a structured value to canonicalize first.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_canonical(value: &serde_json::Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        serde_json::Value::Null => out.extend_from_slice(b"null"),
        serde_json::Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        serde_json::Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(RyeError::Canonicalization(
                        "non-finite numbers cannot be canonicalized".into(),
                    ));
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        serde_json::Value::String(s) => write_escaped_string(s, out),
        serde_json::Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, &serde_json::Value> = map.iter().collect();
            out.push(b'{');
            for (i, (key, val)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_escaped_string(key, out);
                out.push(b':');
                write_canonical(val, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_escaped_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c if c.is_ascii() => out.push(c as u8),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.extend_from_slice(format!("\\u{:04x}", unit).as_bytes());
                }
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let a = canonicalize_value(&json!({"b": 1, "a": 2})).unwrap();
        let b = canonicalize_value(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(String::from_utf8(a).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn escapes_non_ascii() {
        let v = canonicalize_value(&json!({"name": "caf\u{e9}"})).unwrap();
        assert_eq!(
            String::from_utf8(v).unwrap(),
            "{\"name\":\"caf\\u00e9\"}"
        );
    }

    #[test]
    fn deterministic_across_calls() {
        let v = json!({"z": [1,2,3], "a": {"nested": true}});
        assert_eq!(canonicalize_value(&v).unwrap(), canonicalize_value(&v).unwrap());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let v = serde_json::Value::Number(serde_json::Number::from_f64(1.0).unwrap());
        assert!(canonicalize_value(&v).is_ok());
    }

    #[test]
    fn hash_value_matches_manual_sha256() {
        let v = json!({"a": 1});
        let hash = hash_value(&v).unwrap();
        let expected = hex::encode(Sha256::digest(br#"{"a":1}"#));
        assert_eq!(hash, expected);
    }
}
