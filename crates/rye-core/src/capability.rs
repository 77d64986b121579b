use crate::canonical::hash_value;
use crate::error::{Result, RyeError};
use crate::signer::{verify_hash, Signer};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validated dotted capability string, e.g. `rye.execute.tool.search`.
/// Grammar: `segment ("." segment)* ("." "*")?`; a wildcard is only valid
/// as the final segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(RyeError::ValidationFailed(format!(
                "capability '{raw}' has an empty segment"
            )));
        }
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i == segments.len() - 1;
            if *segment == "*" {
                if !is_last {
                    return Err(RyeError::ValidationFailed(format!(
                        "capability '{raw}' has a wildcard outside the final segment"
                    )));
                }
                continue;
            }
            if !segment.is_ascii() || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(RyeError::ValidationFailed(format!(
                    "capability '{raw}' has an invalid segment '{segment}'"
                )));
            }
        }
        Ok(Capability(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }

    /// True if `self` (a granted capability, possibly wildcarded) covers
    /// `required` (a specific capability being checked).
    pub fn covers(&self, required: &Capability) -> bool {
        let granted = self.segments();
        let required = required.segments();
        if granted.last() == Some(&"*") {
            let prefix = &granted[..granted.len() - 1];
            required.len() >= prefix.len() && required[..prefix.len()] == *prefix
        } else {
            granted == required
        }
    }
}

/// Fixed table of implied capability expansions: holding `rye.execute.*`
/// implies holding `rye.execute.tool.*`, etc. A static table rather than a
/// runtime-loaded policy, matching how extractors are data, not code.
pub struct CapabilityHierarchy {
    implies: HashMap<&'static str, &'static [&'static str]>,
}

impl CapabilityHierarchy {
    pub fn standard() -> Self {
        let mut implies: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        implies.insert("rye.execute.*", &["rye.execute.tool.*", "rye.execute.directive.*"]);
        implies.insert("rye.read.*", &["rye.read.tool.*", "rye.read.directive.*", "rye.read.knowledge.*"]);
        implies.insert("rye.write.*", &["rye.write.tool.*", "rye.write.directive.*", "rye.write.knowledge.*"]);
        implies.insert("rye.*", &["rye.execute.*", "rye.read.*", "rye.write.*", "rye.admin.*"]);
        CapabilityHierarchy { implies }
    }

    /// Expand `granted` with every capability its entries imply, to a
    /// fixed point (an implication chain like `rye.*` → `rye.execute.*` →
    /// `rye.execute.tool.*` expands fully, not just one level).
    pub fn expand(&self, granted: &[Capability]) -> Vec<Capability> {
        let mut expanded: Vec<Capability> = granted.to_vec();
        let mut frontier: Vec<Capability> = granted.to_vec();
        loop {
            let mut added = Vec::new();
            for cap in &frontier {
                if let Some(implied) = self.implies.get(cap.as_str()) {
                    for s in *implied {
                        let implied_cap = Capability(s.to_string());
                        if !expanded.contains(&implied_cap) {
                            added.push(implied_cap);
                        }
                    }
                }
            }
            if added.is_empty() {
                break;
            }
            expanded.extend(added.iter().cloned());
            frontier = added;
        }
        expanded
    }
}

/// A signed, time-limited, attenuable grant of capabilities to a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub subject: String,
    pub capabilities: Vec<Capability>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub parent_token_hash: Option<String>,
    pub signature: String,
}

impl CapabilityToken {
    fn payload_value(&self) -> serde_json::Value {
        serde_json::json!({
            "subject": self.subject,
            "capabilities": self.capabilities,
            "issued_at": self.issued_at.to_rfc3339(),
            "expires_at": self.expires_at.to_rfc3339(),
            "parent_token_hash": self.parent_token_hash,
        })
    }
}

/// Mint a fresh token for `subject` with the given capabilities and
/// lifetime, signed by `signer`.
pub fn mint(subject: &str, capabilities: Vec<Capability>, ttl: Duration, signer: &Signer) -> Result<CapabilityToken> {
    let issued_at = Utc::now();
    let expires_at = issued_at + ttl;
    let mut token = CapabilityToken {
        subject: subject.to_string(),
        capabilities,
        issued_at,
        expires_at,
        parent_token_hash: None,
        signature: String::new(),
    };
    let hash = hash_value(&token.payload_value())?;
    token.signature = signer.sign_hash(&hash);
    Ok(token)
}

/// Narrow a token: every entry of `new_capabilities` must be covered by
/// some entry of `parent`'s capabilities (after hierarchy expansion), and
/// the new expiry must not exceed the parent's. Attenuation can only
/// narrow, never widen.
pub fn attenuate(
    parent: &CapabilityToken,
    new_capabilities: Vec<Capability>,
    new_expires_at: DateTime<Utc>,
    hierarchy: &CapabilityHierarchy,
    signer: &Signer,
) -> Result<CapabilityToken> {
    let expanded_parent = hierarchy.expand(&parent.capabilities);
    for cap in &new_capabilities {
        if !expanded_parent.iter().any(|granted| granted.covers(cap)) {
            return Err(RyeError::ValidationFailed(format!(
                "cannot attenuate to '{}': not covered by parent capabilities",
                cap.as_str()
            )));
        }
    }
    if new_expires_at > parent.expires_at {
        return Err(RyeError::ValidationFailed(
            "attenuated token cannot outlive its parent".to_string(),
        ));
    }

    let parent_hash = hash_value(&parent.payload_value())?;
    let mut child = CapabilityToken {
        subject: parent.subject.clone(),
        capabilities: new_capabilities,
        issued_at: Utc::now(),
        expires_at: new_expires_at,
        parent_token_hash: Some(parent_hash),
        signature: String::new(),
    };
    let hash = hash_value(&child.payload_value())?;
    child.signature = signer.sign_hash(&hash);
    Ok(child)
}

/// Verify a token's signature and expiry against a trusted issuer key.
/// Ancestry (via `parent_token_hash`) is not re-walked here; callers that
/// attenuate are expected to retain and verify the chain themselves.
pub fn verify(token: &CapabilityToken, now: DateTime<Utc>, issuer_public_key_pem: &[u8]) -> Result<()> {
    let hash = hash_value(&token.payload_value())?;
    if !verify_hash(&hash, &token.signature, issuer_public_key_pem) {
        return Err(RyeError::ValidationFailed(
            "capability token signature is invalid".to_string(),
        ));
    }
    if now >= token.expires_at {
        return Err(RyeError::TokenExpired {
            subject: token.subject.clone(),
            expired_at: token.expires_at.to_rfc3339(),
        });
    }
    Ok(())
}

/// True if `token` is currently valid and grants `required` (after
/// hierarchy expansion).
pub fn check(
    token: &CapabilityToken,
    required: &Capability,
    now: DateTime<Utc>,
    issuer_public_key_pem: &[u8],
    hierarchy: &CapabilityHierarchy,
) -> bool {
    if verify(token, now, issuer_public_key_pem).is_err() {
        return false;
    }
    hierarchy
        .expand(&token.capabilities)
        .iter()
        .any(|granted| granted.covers(required))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn signer() -> Signer {
        Signer::ensure(tempdir().unwrap().path()).unwrap()
    }

    #[test]
    fn parses_valid_capabilities() {
        assert!(Capability::parse("rye.execute.tool").is_ok());
        assert!(Capability::parse("rye.execute.*").is_ok());
    }

    #[test]
    fn rejects_wildcard_outside_final_segment() {
        assert!(Capability::parse("rye.*.tool").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(Capability::parse("rye..tool").is_err());
    }

    #[test]
    fn wildcard_covers_prefixed_children() {
        let granted = Capability::parse("rye.execute.*").unwrap();
        let required = Capability::parse("rye.execute.tool.search").unwrap();
        assert!(granted.covers(&required));
    }

    #[test]
    fn hierarchy_expands_transitively() {
        let hierarchy = CapabilityHierarchy::standard();
        let expanded = hierarchy.expand(&[Capability::parse("rye.*").unwrap()]);
        assert!(expanded.contains(&Capability::parse("rye.execute.tool.*").unwrap()));
    }

    #[test]
    fn mint_then_verify_roundtrip() {
        let s = signer();
        let token = mint("agent-1", vec![Capability::parse("rye.execute.*").unwrap()], Duration::hours(1), &s).unwrap();
        assert!(verify(&token, Utc::now(), s.public_key_pem()).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let s = signer();
        let token = mint("agent-1", vec![Capability::parse("rye.execute.*").unwrap()], Duration::hours(1), &s).unwrap();
        let future = Utc::now() + Duration::hours(2);
        assert!(matches!(verify(&token, future, s.public_key_pem()), Err(RyeError::TokenExpired { .. })));
    }

    #[test]
    fn attenuation_narrows_but_cannot_widen() {
        let s = signer();
        let hierarchy = CapabilityHierarchy::standard();
        let parent = mint("agent-1", vec![Capability::parse("rye.execute.*").unwrap()], Duration::hours(2), &s).unwrap();

        let child = attenuate(
            &parent,
            vec![Capability::parse("rye.execute.tool.search").unwrap()],
            Utc::now() + Duration::hours(1),
            &hierarchy,
            &s,
        ).unwrap();
        assert!(check(&child, &Capability::parse("rye.execute.tool.search").unwrap(), Utc::now(), s.public_key_pem(), &hierarchy));

        let widened = attenuate(
            &parent,
            vec![Capability::parse("rye.admin.*").unwrap()],
            Utc::now() + Duration::hours(1),
            &hierarchy,
            &s,
        );
        assert!(widened.is_err());
    }

    #[test]
    fn attenuation_cannot_outlive_parent() {
        let s = signer();
        let hierarchy = CapabilityHierarchy::standard();
        let parent = mint("agent-1", vec![Capability::parse("rye.execute.*").unwrap()], Duration::hours(1), &s).unwrap();
        let result = attenuate(
            &parent,
            vec![Capability::parse("rye.execute.tool.search").unwrap()],
            parent.expires_at + Duration::hours(1),
            &hierarchy,
            &s,
        );
        assert!(result.is_err());
    }
}
