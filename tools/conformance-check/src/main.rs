//! Replays end-to-end trust-and-resolution scenarios against the real
//! `rye_core` primitives, driven by a JSON fixture file rather than
//! hard-coded Rust assertions, so the vectors themselves stay inspectable
//! independent of the test harness.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use rye_core::{
    capability, chain, Capability, CapabilityHierarchy, ChainError, ExtractorRegistry, Item,
    ItemType, Lockfile, LockfileManager, LockfileRoot, LogicalId, PathResolver, RyeError, Signer,
    Space, SystemBundle, TrustStore, Verifier,
};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize)]
struct FixtureFile {
    scenarios: Vec<Scenario>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Scenario {
    VerifyIntegrity {
        id: String,
        description: String,
        item_type: String,
        content: String,
        #[serde(default)]
        tamper: bool,
        #[serde(default = "default_true")]
        trust_signer: bool,
        expect: String,
    },
    Chain {
        id: String,
        description: String,
        nodes: Vec<ChainNode>,
        start: String,
        expect: String,
    },
    CapabilityAttenuation {
        id: String,
        description: String,
        parent_capabilities: Vec<String>,
        parent_ttl_hours: i64,
        child_capabilities: Vec<String>,
        child_ttl_minutes: i64,
        check_capability: String,
        expect: String,
    },
    LockfileRoundtrip {
        id: String,
        description: String,
        tool_id: String,
        version: String,
        integrity: String,
    },
}

#[derive(Deserialize)]
struct ChainNode {
    logical_id: String,
    executor_id: Option<String>,
}

fn default_true() -> bool {
    true
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tools/conformance-check/fixtures/scenarios.json".to_string());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let fixtures: FixtureFile = serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let mut failures = Vec::new();
    for scenario in &fixtures.scenarios {
        let (id, description, outcome) = run_scenario(scenario);
        match outcome {
            Ok(()) => println!("ok  {id}  {description}"),
            Err(e) => {
                println!("FAIL  {id}  {description}: {e}");
                failures.push(id);
            }
        }
    }

    if !failures.is_empty() {
        bail!("{} scenario(s) failed: {}", failures.len(), failures.join(", "));
    }
    println!("all scenarios passed");
    Ok(())
}

fn run_scenario(scenario: &Scenario) -> (String, String, Result<()>) {
    match scenario {
        Scenario::VerifyIntegrity { id, description, item_type, content, tamper, trust_signer, expect } => {
            let result = run_verify_integrity(item_type, content, *tamper, *trust_signer, expect);
            (id.clone(), description.clone(), result)
        }
        Scenario::Chain { id, description, nodes, start, expect } => {
            let result = run_chain(nodes, start, expect);
            (id.clone(), description.clone(), result)
        }
        Scenario::CapabilityAttenuation {
            id,
            description,
            parent_capabilities,
            parent_ttl_hours,
            child_capabilities,
            child_ttl_minutes,
            check_capability,
            expect,
        } => {
            let result = run_capability_attenuation(
                parent_capabilities,
                *parent_ttl_hours,
                child_capabilities,
                *child_ttl_minutes,
                check_capability,
                expect,
            );
            (id.clone(), description.clone(), result)
        }
        Scenario::LockfileRoundtrip { id, description, tool_id, version, integrity } => {
            let result = run_lockfile_roundtrip(tool_id, version, integrity);
            (id.clone(), description.clone(), result)
        }
    }
}

fn parse_item_type(raw: &str) -> Result<ItemType> {
    match raw {
        "directive" => Ok(ItemType::Directive),
        "tool" => Ok(ItemType::Tool),
        "knowledge" => Ok(ItemType::Knowledge),
        other => bail!("unknown item_type '{other}'"),
    }
}

fn run_verify_integrity(item_type: &str, content: &str, tamper: bool, trust_signer: bool, expect: &str) -> Result<()> {
    let item_type = parse_item_type(item_type)?;
    let extractors = ExtractorRegistry::with_builtins();
    let extractor = extractors.get(item_type)?;
    let extension = extractor.extensions.first().context("extractor has no extensions")?;

    let workdir = tempfile::tempdir()?;
    let path = workdir.path().join(format!("item{extension}"));
    std::fs::write(&path, content)?;

    let signer = Signer::ensure(&workdir.path().join("keys"))?;
    let format = extractor.signature_format_for(&path);
    let stripped = rye_core::signature::strip_signature(content.as_bytes(), &format)?;
    let content_hash = rye_core::hash_bytes(&stripped);
    let signature = rye_core::Signature {
        kind: rye_core::signature::SignatureKind::Signed,
        timestamp: Utc::now(),
        content_hash: content_hash.clone(),
        ed25519_signature: signer.sign_hash(&content_hash),
        public_key_fingerprint: signer.fingerprint(),
        registry_username: None,
    };
    let signed = rye_core::signature::embed_signature(&stripped, &signature, &format)?;
    std::fs::write(&path, &signed)?;

    if tamper {
        let mut bytes = std::fs::read(&path)?;
        bytes[0] ^= 0xFF;
        std::fs::write(&path, bytes)?;
    }

    let trust_store = TrustStore::new(workdir.path().join("trust"));
    if trust_signer {
        trust_store.add_key(signer.public_key_pem())?;
    }

    let result = Verifier::verify_integrity(&path, item_type, &extractors, &trust_store);
    match expect {
        "ok" => result.map(|_| ()).map_err(|e| anyhow::anyhow!("expected ok, got {e}")),
        "hash_mismatch" => match result {
            Err(RyeError::HashMismatch { .. }) => Ok(()),
            Err(e) => bail!("expected HashMismatch, got {e}"),
            Ok(_) => bail!("expected HashMismatch, got Ok"),
        },
        "untrusted_key" => match result {
            Err(RyeError::UntrustedKey { .. }) => Ok(()),
            Err(e) => bail!("expected UntrustedKey, got {e}"),
            Ok(_) => bail!("expected UntrustedKey, got Ok"),
        },
        other => bail!("unknown expect '{other}'"),
    }
}

fn run_chain(nodes: &[ChainNode], start: &str, expect: &str) -> Result<()> {
    let workdir = tempfile::tempdir()?;
    let user_space = workdir.path().join("user");
    let extractors = ExtractorRegistry::with_builtins();
    let extractor = extractors.get(ItemType::Tool)?;
    let extension = extractor.extensions.first().context("tool extractor has no extensions")?;
    let signer = Signer::ensure(&workdir.path().join("keys"))?;
    let trust_store = TrustStore::new(workdir.path().join("trust"));
    trust_store.add_key(signer.public_key_pem())?;

    let mut start_item: Option<Item> = None;
    let mut start_executor_id: Option<String> = None;

    for node in nodes {
        let logical_id = LogicalId::parse(&node.logical_id)?;
        let type_root = user_space.join(".ai").join(ItemType::Tool.type_dir());
        let path = type_root.join(format!("{}{extension}", logical_id.as_str()));
        std::fs::create_dir_all(path.parent().unwrap())?;

        let executor_line = match &node.executor_id {
            Some(e) => format!("__executor_id__ = \"{e}\"\n"),
            None => String::new(),
        };
        let body = format!("__version__ = \"1.0.0\"\n{executor_line}");
        std::fs::write(&path, &body)?;

        let format = extractor.signature_format_for(&path);
        let stripped = rye_core::signature::strip_signature(body.as_bytes(), &format)?;
        let content_hash = rye_core::hash_bytes(&stripped);
        let signature = rye_core::Signature {
            kind: rye_core::signature::SignatureKind::Signed,
            timestamp: Utc::now(),
            content_hash: content_hash.clone(),
            ed25519_signature: signer.sign_hash(&content_hash),
            public_key_fingerprint: signer.fingerprint(),
            registry_username: None,
        };
        let signed = rye_core::signature::embed_signature(&stripped, &signature, &format)?;
        std::fs::write(&path, &signed)?;

        if node.logical_id == start {
            let content = std::fs::read(&path)?;
            start_item = Some(Item {
                item_type: ItemType::Tool,
                logical_id: logical_id.clone(),
                version: "1.0.0".to_string(),
                content_hash: content_hash.clone(),
                content,
                category: String::new(),
                space: Space::User,
                path: path.clone(),
            });
            start_executor_id = node.executor_id.clone();
        }
    }

    let start_item = start_item.with_context(|| format!("start node '{start}' not found in fixture"))?;
    let resolver = PathResolver::new(None, user_space, Vec::<SystemBundle>::new());

    let result = chain::resolve_chain(&start_item, start_executor_id.as_deref(), &resolver, &extractors, &trust_store);
    match expect {
        "ok" => {
            let links = result.map_err(|e| anyhow::anyhow!("expected ok, got {e}"))?;
            if links.len() != nodes.len() {
                bail!("expected chain of length {}, got {}", nodes.len(), links.len());
            }
            Ok(())
        }
        "circular" => match result {
            Err(ChainError::CircularDependency { .. }) => Ok(()),
            Err(e) => bail!("expected CircularDependency, got {e}"),
            Ok(_) => bail!("expected CircularDependency, got Ok"),
        },
        other => bail!("unknown expect '{other}'"),
    }
}

fn run_capability_attenuation(
    parent_capabilities: &[String],
    parent_ttl_hours: i64,
    child_capabilities: &[String],
    child_ttl_minutes: i64,
    check_capability: &str,
    expect: &str,
) -> Result<()> {
    let workdir = tempfile::tempdir()?;
    let signer = Signer::ensure(workdir.path())?;
    let hierarchy = CapabilityHierarchy::standard();

    let parent_caps: Vec<Capability> = parent_capabilities
        .iter()
        .map(|c| Capability::parse(c))
        .collect::<rye_core::Result<_>>()?;
    let parent = capability::mint("agent", parent_caps, Duration::hours(parent_ttl_hours), &signer)?;

    let child_caps: Vec<Capability> = child_capabilities
        .iter()
        .map(|c| Capability::parse(c))
        .collect::<rye_core::Result<_>>()?;
    let child_expiry = Utc::now() + Duration::minutes(child_ttl_minutes);
    let child = capability::attenuate(&parent, child_caps, child_expiry, &hierarchy, &signer)?;

    let required = Capability::parse(check_capability)?;
    let granted = capability::check(&child, &required, Utc::now(), signer.public_key_pem(), &hierarchy);

    match expect {
        "granted" if granted => Ok(()),
        "granted" => bail!("expected capability to be granted, was denied"),
        "denied" if !granted => Ok(()),
        "denied" => bail!("expected capability to be denied, was granted"),
        other => bail!("unknown expect '{other}'"),
    }
}

fn run_lockfile_roundtrip(tool_id: &str, version: &str, integrity: &str) -> Result<()> {
    let workdir = tempfile::tempdir()?;
    let path: PathBuf = workdir.path().join("lockfile.json");

    let lockfile = Lockfile {
        lockfile_version: 1,
        generated_at: Utc::now(),
        root: LockfileRoot {
            tool_id: tool_id.to_string(),
            version: version.to_string(),
            integrity: integrity.to_string(),
        },
        resolved_chain: Vec::new(),
        registry: None,
        verified_deps: None,
    };

    LockfileManager::save(&lockfile, &path)?;
    let loaded = LockfileManager::load(&path)?;

    if loaded.root.tool_id != lockfile.root.tool_id
        || loaded.root.version != lockfile.root.version
        || loaded.root.integrity != lockfile.root.integrity
        || loaded.lockfile_version != lockfile.lockfile_version
    {
        bail!("loaded lockfile does not match the saved one");
    }
    Ok(())
}
