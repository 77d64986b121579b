use chrono::{Duration, Utc};
use rye_core::{
    capability, chain, Capability, CapabilityHierarchy, ExtractorRegistry, Item, ItemType,
    Lockfile, LockfileManager, LockfileRoot, LogicalId, MetadataManager, PathResolver,
    RyeError, Signer, Space, SystemBundle, TrustStore,
};
use tempfile::tempdir;

fn write_tool(user_space: &std::path::Path, logical_id: &str, executor_id: Option<&str>, manager: &MetadataManager) -> std::path::PathBuf {
    let type_root = user_space.join(".ai").join(ItemType::Tool.type_dir());
    std::fs::create_dir_all(&type_root).unwrap();
    let stem = logical_id.rsplit('/').next().unwrap();
    let path = type_root.join(format!("{stem}.py"));
    let executor_line = executor_id
        .map(|e| format!("__executor_id__ = \"{e}\"\n"))
        .unwrap_or_default();
    let body = format!("__version__ = \"1.0.0\"\n{executor_line}");
    let signed = manager.sign_item(ItemType::Tool, body.as_bytes(), &path).unwrap();
    std::fs::write(&path, signed).unwrap();
    path
}

#[test]
fn sign_and_verify_a_tool_across_a_fresh_trust_store() {
    let tmp = tempdir().unwrap();
    let key_dir = tmp.path().join("keys");
    let trust_dir = tmp.path().join("trust");
    let manager = MetadataManager::new(ExtractorRegistry::with_builtins(), TrustStore::new(trust_dir.clone()), key_dir.clone());

    let user_space = tmp.path().join("user");
    let path = write_tool(&user_space, "rye/core/registry", None, &manager);

    let signer = Signer::ensure(&key_dir).unwrap();
    let trust_store = TrustStore::new(trust_dir);
    assert!(manager.verify_item(&path, ItemType::Tool).is_err(), "key is not trusted yet");
    trust_store.add_key(signer.public_key_pem()).unwrap();

    let manager = MetadataManager::new(ExtractorRegistry::with_builtins(), trust_store, key_dir);
    let hash = manager.verify_item(&path, ItemType::Tool).unwrap();
    assert_eq!(hash.len(), 64);
}

#[test]
fn project_tier_shadows_user_tier_for_the_same_logical_id() {
    let tmp = tempdir().unwrap();
    let key_dir = tmp.path().join("keys");
    let trust_dir = tmp.path().join("trust");
    let manager = MetadataManager::new(ExtractorRegistry::with_builtins(), TrustStore::new(trust_dir), key_dir);

    let project_root = tmp.path().join("project");
    let user_space = tmp.path().join("user");
    write_tool(&user_space, "rye/core/registry", None, &manager);
    let project_path = write_tool(&project_root, "rye/core/registry", None, &manager);

    let extractors = ExtractorRegistry::with_builtins();
    let resolver = PathResolver::new(Some(project_root), user_space, Vec::<SystemBundle>::new());
    let logical_id = LogicalId::parse("rye/core/registry").unwrap();
    let resolved = resolver.resolve(ItemType::Tool, &logical_id, &extractors).unwrap().unwrap();
    assert_eq!(resolved, project_path);
}

#[test]
fn chain_resolution_follows_executor_ids_down_to_a_primitive() {
    let tmp = tempdir().unwrap();
    let key_dir = tmp.path().join("keys");
    let trust_dir = tmp.path().join("trust");
    let manager = MetadataManager::new(ExtractorRegistry::with_builtins(), TrustStore::new(trust_dir.clone()), key_dir.clone());

    let user_space = tmp.path().join("user");
    write_tool(&user_space, "rye/core/primitives/subprocess", Some(chain::PRIMITIVE_SUBPROCESS), &manager);
    let middle_path = write_tool(&user_space, "agent/review/runner", Some("rye/core/primitives/subprocess"), &manager);

    let signer = Signer::ensure(&key_dir).unwrap();
    let trust_store = TrustStore::new(trust_dir);
    trust_store.add_key(signer.public_key_pem()).unwrap();

    let extractors = ExtractorRegistry::with_builtins();
    let resolver = PathResolver::new(None, user_space, Vec::<SystemBundle>::new());
    let content = std::fs::read(&middle_path).unwrap();
    let start = Item {
        item_type: ItemType::Tool,
        logical_id: LogicalId::parse("agent/review/runner").unwrap(),
        version: "1.0.0".to_string(),
        content_hash: rye_core::hash_bytes(&content),
        content,
        category: String::new(),
        space: Space::User,
        path: middle_path,
    };

    let links = chain::resolve_chain(&start, Some("rye/core/primitives/subprocess"), &resolver, &extractors, &trust_store).unwrap();
    assert_eq!(links.len(), 2);
    assert!(chain::is_primitive(links[1].executor_id.as_deref().unwrap()));
}

#[test]
fn attenuated_capability_cannot_exceed_its_parent() {
    let tmp = tempdir().unwrap();
    let signer = Signer::ensure(tmp.path()).unwrap();
    let hierarchy = CapabilityHierarchy::standard();

    let parent_caps = vec![Capability::parse("rye.execute.*").unwrap()];
    let parent = capability::mint("agent", parent_caps, Duration::hours(1), &signer).unwrap();

    let child_caps = vec![Capability::parse("rye.execute.tool.registry").unwrap()];
    let child = capability::attenuate(&parent, child_caps, Utc::now() + Duration::minutes(30), &hierarchy, &signer).unwrap();

    let granted = Capability::parse("rye.execute.tool.registry").unwrap();
    assert!(capability::check(&child, &granted, Utc::now(), signer.public_key_pem(), &hierarchy));

    let over_broad = vec![Capability::parse("rye.trust.*").unwrap()];
    let result = capability::attenuate(&parent, over_broad, Utc::now() + Duration::minutes(30), &hierarchy, &signer);
    assert!(matches!(result, Err(RyeError::ValidationFailed(_))));
}

#[test]
fn lockfile_saved_to_disk_reloads_with_the_same_root() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("registry@1.0.0.lock.json");

    let lockfile = Lockfile {
        lockfile_version: 1,
        generated_at: Utc::now(),
        root: LockfileRoot {
            tool_id: "rye/core/registry".to_string(),
            version: "1.0.0".to_string(),
            integrity: "0".repeat(64),
        },
        resolved_chain: Vec::new(),
        registry: None,
        verified_deps: None,
    };

    LockfileManager::save(&lockfile, &path).unwrap();
    let loaded = LockfileManager::load(&path).unwrap();
    assert_eq!(loaded.root.tool_id, lockfile.root.tool_id);
    assert_eq!(loaded.root.integrity, lockfile.root.integrity);
}
