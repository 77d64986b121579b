use crate::error::{Result, RyeError};
use chrono::{DateTime, Utc};
use std::path::Path;

/// `signed` is a locally-produced signature; `validated` is the
/// registry-provenance variant (countersigned by a registry identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Signed,
    Validated,
}

impl SignatureKind {
    fn as_str(&self) -> &'static str {
        match self {
            SignatureKind::Signed => "signed",
            SignatureKind::Validated => "validated",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "signed" => Some(SignatureKind::Signed),
            "validated" => Some(SignatureKind::Validated),
            _ => None,
        }
    }
}

/// A parsed embedded signature line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub kind: SignatureKind,
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
    pub ed25519_signature: String,
    pub public_key_fingerprint: String,
    pub registry_username: Option<String>,
}

/// How a signature line is embedded for a given item type / extension: a
/// line-comment prefix for code, or a prefix+suffix pair for HTML-style
/// comments (markdown). This is plain data, read from an [`crate::extractors::Extractor`],
/// never hard-coded per file type at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFormat {
    pub prefix: String,
    pub suffix: Option<String>,
    pub after_shebang: bool,
}

impl Signature {
    pub fn body(&self) -> String {
        let mut body = format!(
            "rye:{}:{}:{}:{}:{}",
            self.kind.as_str(),
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.content_hash,
            self.ed25519_signature,
            self.public_key_fingerprint,
        );
        if let Some(username) = &self.registry_username {
            body.push_str(&format!("|registry@{username}"));
        }
        body
    }

    /// Render the full line as it would appear embedded in a file.
    pub fn render(&self, format: &SignatureFormat) -> String {
        match &format.suffix {
            Some(suffix) => format!("{} {} {}", format.prefix, self.body(), suffix),
            None => format!("{} {}", format.prefix, self.body()),
        }
    }

    fn parse_body(body: &str) -> Result<Self> {
        let (body, registry_username) = match body.split_once("|registry@") {
            Some((head, user)) => (head, Some(user.to_string())),
            None => (body, None),
        };
        let rest = body
            .strip_prefix("rye:")
            .ok_or_else(|| RyeError::ValidationFailed(format!("malformed signature body: {body}")))?;
        let (kind, rest) = rest
            .split_once(':')
            .ok_or_else(|| RyeError::ValidationFailed(format!("malformed signature body: {body}")))?;
        let kind = SignatureKind::parse(kind)
            .ok_or_else(|| RyeError::ValidationFailed(format!("unknown signature kind '{kind}'")))?;

        // `rest` is "{timestamp}:{content_hash}:{ed25519_signature}:{fingerprint}".
        // The timestamp is RFC3339 and contains colons of its own, so the three
        // colon-free trailing fields are split off from the right first, and
        // whatever is left over is the timestamp, colons and all.
        let mut fields = rest.rsplitn(4, ':');
        let malformed = || RyeError::ValidationFailed(format!("malformed signature body: {body}"));
        let public_key_fingerprint = fields.next().ok_or_else(malformed)?;
        let ed25519_signature = fields.next().ok_or_else(malformed)?;
        let content_hash = fields.next().ok_or_else(malformed)?;
        let timestamp = fields.next().ok_or_else(malformed)?;

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| RyeError::ValidationFailed(format!("invalid timestamp '{timestamp}': {e}")))?
            .with_timezone(&Utc);

        Ok(Signature {
            kind,
            timestamp,
            content_hash: content_hash.to_string(),
            ed25519_signature: ed25519_signature.to_string(),
            public_key_fingerprint: public_key_fingerprint.to_string(),
            registry_username,
        })
    }
}

/// Find and parse the embedded signature line in `content`, per `format`.
/// Returns `None` if no line in the expected position matches.
pub fn extract_signature(content: &[u8], format: &SignatureFormat) -> Result<Option<Signature>> {
    let text = std::str::from_utf8(content)
        .map_err(|_| RyeError::ValidationFailed("content is not valid UTF-8".into()))?;
    let Some(line) = signature_line(text, format) else {
        return Ok(None);
    };
    let Some(body) = line_body(line, format) else {
        return Ok(None);
    };
    Signature::parse_body(body).map(Some)
}

/// Return `content` with its embedded signature line removed, so the
/// remainder can be hashed. A no-op if no signature line is present.
pub fn strip_signature(content: &[u8], format: &SignatureFormat) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(content)
        .map_err(|_| RyeError::ValidationFailed("content is not valid UTF-8".into()))?;
    let Some(line) = signature_line(text, format) else {
        return Ok(content.to_vec());
    };
    if line_body(line, format).is_none() {
        return Ok(content.to_vec());
    }
    let start = line.as_ptr() as usize - text.as_ptr() as usize;
    let mut end = start + line.len();
    // also swallow the trailing newline, if any, so stripped content matches
    // what was hashed before the signature was ever embedded
    if text.as_bytes().get(end) == Some(&b'\n') {
        end += 1;
    }
    let mut out = Vec::with_capacity(text.len() - (end - start));
    out.extend_from_slice(&text.as_bytes()[..start]);
    out.extend_from_slice(&text.as_bytes()[end..]);
    Ok(out)
}

/// Embed `signature` into `content`, replacing any prior signature line.
/// Re-signing always removes the prior signature before computing the new
/// hash — callers are expected to have stripped and hashed first.
pub fn embed_signature(content: &[u8], signature: &Signature, format: &SignatureFormat) -> Result<Vec<u8>> {
    let stripped = strip_signature(content, format)?;
    let text = std::str::from_utf8(&stripped)
        .map_err(|_| RyeError::ValidationFailed("content is not valid UTF-8".into()))?;
    let rendered = signature.render(format);

    let mut out = String::with_capacity(text.len() + rendered.len() + 1);
    if format.after_shebang {
        if let Some(shebang_end) = shebang_end(text) {
            out.push_str(&text[..shebang_end]);
            out.push_str(&rendered);
            out.push('\n');
            out.push_str(&text[shebang_end..]);
            return Ok(out.into_bytes());
        }
    }
    out.push_str(&rendered);
    out.push('\n');
    out.push_str(text);
    Ok(out.into_bytes())
}

fn shebang_end(text: &str) -> Option<usize> {
    if text.starts_with("#!") {
        let idx = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
        Some(idx)
    } else {
        None
    }
}

fn signature_line<'a>(text: &'a str, format: &SignatureFormat) -> Option<&'a str> {
    let mut remainder = text;
    if format.after_shebang {
        if let Some(end) = shebang_end(text) {
            remainder = &text[end..];
        }
    }
    let candidate = remainder.lines().next()?;
    if candidate.trim_start().starts_with(&format.prefix) {
        Some(candidate)
    } else {
        None
    }
}

fn line_body<'a>(line: &'a str, format: &SignatureFormat) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix(&format.prefix)?.trim();
    match &format.suffix {
        Some(suffix) => rest.strip_suffix(suffix.as_str()).map(|s| s.trim()),
        None => Some(rest),
    }
}

/// Look up the signature format that applies to a given file path, from a
/// per-extension override map with a default fallback.
pub fn format_for_path(
    path: &Path,
    default_format: &SignatureFormat,
    overrides: &std::collections::HashMap<String, SignatureFormat>,
) -> SignatureFormat {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| overrides.get(ext))
        .cloned()
        .unwrap_or_else(|| default_format.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_format() -> SignatureFormat {
        SignatureFormat {
            prefix: "#".to_string(),
            suffix: None,
            after_shebang: true,
        }
    }

    fn markdown_format() -> SignatureFormat {
        SignatureFormat {
            prefix: "<!--".to_string(),
            suffix: Some("-->".to_string()),
            after_shebang: false,
        }
    }

    fn sample_signature() -> Signature {
        Signature {
            kind: SignatureKind::Signed,
            timestamp: DateTime::parse_from_rfc3339("2026-02-13T08:15:15Z")
                .unwrap()
                .with_timezone(&Utc),
            content_hash: "6".to_string() + &"1".repeat(63),
            ed25519_signature: "3tp2FTQnSwxtGa8nW9ucWmg4-mUAx0Of6q3V6pwVlAZVSbAly2Sr9Ko3b6y_Kewc4fi08MnQWnIOVy35UBR9Cw"
                .to_string(),
            public_key_fingerprint: "440443d0858f0199".to_string(),
            registry_username: None,
        }
    }

    #[test]
    fn embed_then_extract_roundtrips() {
        let content = b"def run():\n    pass\n";
        let format = code_format();
        let embedded = embed_signature(content, &sample_signature(), &format).unwrap();
        let extracted = extract_signature(&embedded, &format).unwrap().unwrap();
        assert_eq!(extracted, sample_signature());
    }

    #[test]
    fn embed_after_shebang() {
        let content = b"#!/usr/bin/env python3\ndef run():\n    pass\n";
        let format = code_format();
        let embedded = embed_signature(content, &sample_signature(), &format).unwrap();
        let text = String::from_utf8(embedded.clone()).unwrap();
        assert!(text.starts_with("#!/usr/bin/env python3\n# rye:signed:"));
        let extracted = extract_signature(&embedded, &format).unwrap().unwrap();
        assert_eq!(extracted, sample_signature());
    }

    #[test]
    fn markdown_signature_uses_html_comment() {
        let content = b"# Title\n\nBody\n";
        let format = markdown_format();
        let embedded = embed_signature(content, &sample_signature(), &format).unwrap();
        let text = String::from_utf8(embedded.clone()).unwrap();
        assert!(text.starts_with("<!-- rye:signed:"));
        assert!(text.lines().next().unwrap().trim_end().ends_with("-->"));
    }

    #[test]
    fn strip_signature_removes_line_and_newline() {
        let content = b"def run():\n    pass\n";
        let format = code_format();
        let embedded = embed_signature(content, &sample_signature(), &format).unwrap();
        let stripped = strip_signature(&embedded, &format).unwrap();
        assert_eq!(stripped, content);
    }

    #[test]
    fn no_signature_present_returns_none() {
        let content = b"def run():\n    pass\n";
        let format = code_format();
        assert!(extract_signature(content, &format).unwrap().is_none());
    }

    #[test]
    fn resigning_replaces_prior_signature() {
        let content = b"def run():\n    pass\n";
        let format = code_format();
        let first = embed_signature(content, &sample_signature(), &format).unwrap();

        let mut second_sig = sample_signature();
        second_sig.content_hash = "f".repeat(64);
        let second = embed_signature(&first, &second_sig, &format).unwrap();

        let extracted = extract_signature(&second, &format).unwrap().unwrap();
        assert_eq!(extracted.content_hash, "f".repeat(64));
        assert_eq!(strip_signature(&second, &format).unwrap(), content);
    }

    #[test]
    fn registry_countersignature_roundtrips() {
        let mut sig = sample_signature();
        sig.kind = SignatureKind::Validated;
        sig.registry_username = Some("alice".to_string());
        let content = b"run()\n";
        let format = code_format();
        let embedded = embed_signature(content, &sig, &format).unwrap();
        let extracted = extract_signature(&embedded, &format).unwrap().unwrap();
        assert_eq!(extracted, sig);
    }
}
