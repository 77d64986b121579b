mod config;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rye_core::{
    capability, chain, Capability, CapabilityHierarchy, ExtractorRegistry, Item, ItemType,
    ListScope, Lockfile, LockfileResolver, LockfileRoot, LockfileWriteScope, LogicalId,
    MetadataManager, NamespaceQuery, PathResolver, Signer, SystemBundle, TrustStore,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rye", about = "Sign, verify, and resolve trust-store items", version)]
struct Cli {
    /// Project root, if operating inside a project tier.
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Reject `validated` (registry-countersigned) signatures; accept only
    /// locally-produced `signed` ones.
    #[arg(long, global = true)]
    require_local_signed: bool,

    /// Collapse integrity failures to a single message instead of the full
    /// variant, for scripting contexts that don't want internal detail.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliItemType {
    Directive,
    Tool,
    Knowledge,
}

impl From<CliItemType> for ItemType {
    fn from(value: CliItemType) -> Self {
        match value {
            CliItemType::Directive => ItemType::Directive,
            CliItemType::Tool => ItemType::Tool,
            CliItemType::Knowledge => ItemType::Knowledge,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Sign a file in place.
    Sign {
        path: PathBuf,
        #[arg(long, value_enum)]
        item_type: CliItemType,
    },
    /// Verify a file's embedded signature.
    Verify {
        path: PathBuf,
        #[arg(long, value_enum)]
        item_type: CliItemType,
    },
    /// Resolve a logical id to the highest-precedence file that has it.
    Resolve {
        #[arg(long, value_enum)]
        item_type: CliItemType,
        logical_id: String,
    },
    /// List items matching a namespace query (e.g. `rye.core.*`).
    List {
        #[arg(long, value_enum)]
        item_type: CliItemType,
        query: String,
    },
    /// Manage the trust store.
    Trust {
        #[command(subcommand)]
        action: TrustAction,
    },
    /// Mint and check capability tokens.
    Capability {
        #[command(subcommand)]
        action: CapabilityAction,
    },
    /// Resolve and validate a tool's executor chain.
    Chain {
        logical_id: String,
    },
    /// Manage lockfiles.
    Lockfile {
        #[command(subcommand)]
        action: LockfileAction,
    },
}

#[derive(Subcommand)]
enum TrustAction {
    Add { pem_path: PathBuf },
    Remove { fingerprint: String },
    List,
    PinRegistry { pem_path: PathBuf },
    ForceRepinRegistry { pem_path: PathBuf },
}

#[derive(Subcommand)]
enum CapabilityAction {
    Mint {
        subject: String,
        capabilities: Vec<String>,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
    Check {
        token_path: PathBuf,
        capability: String,
    },
}

#[derive(Subcommand)]
enum LockfileAction {
    Get { tool_id: String, version: String },
    Save { tool_id: String, version: String, integrity: String },
    List,
    Delete { tool_id: String, version: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "rye_cli=info".to_string()))
        .init();

    if let Err(e) = run() {
        if cli_quiet() {
            eprintln!("error: integrity or resolution failure");
        } else {
            eprintln!("error: {e:#}");
        }
        tracing::error!(error = %e, "rye command failed");
        std::process::exit(1);
    }
}

/// Re-parses just the `--quiet` flag for the top-level error path, since
/// `run()` owns the full parsed `Cli` and may fail before returning it.
fn cli_quiet() -> bool {
    std::env::args().any(|a| a == "--quiet")
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::from_env();
    let extractors = ExtractorRegistry::with_builtins();
    let trust_store = TrustStore::new(config.trust_dir());
    let resolver = PathResolver::new(
        cli.project_root.clone().or_else(|| config.project_root.clone()),
        config.user_space.clone(),
        Vec::<SystemBundle>::new(),
    );
    let manager = MetadataManager::new(ExtractorRegistry::with_builtins(), TrustStore::new(config.trust_dir()), config.key_dir());

    match cli.command {
        Command::Sign { path, item_type } => {
            let content = std::fs::read(&path).with_context(|| format!("reading {path:?}"))?;
            let signed = manager.sign_item(item_type.into(), &content, &path)?;
            std::fs::write(&path, signed).with_context(|| format!("writing {path:?}"))?;
            println!("signed {}", path.display());
        }
        Command::Verify { path, item_type } => {
            let item_type: ItemType = item_type.into();
            let hash = manager.verify_item(&path, item_type)?;
            if cli.require_local_signed {
                reject_validated_signature(&path, item_type, &extractors)?;
            }
            println!("{hash}");
        }
        Command::Resolve { item_type, logical_id } => {
            let logical_id = LogicalId::parse(&logical_id)?;
            match resolver.resolve(item_type.into(), &logical_id, &extractors)? {
                Some(path) => println!("{}", path.display()),
                None => bail!("'{}' was not found in any tier", logical_id.as_str()),
            }
        }
        Command::List { item_type, query } => {
            let item_type: ItemType = item_type.into();
            let query = NamespaceQuery::parse(item_type, &query);
            let items: Vec<Item> = resolver.list_namespace(&query, &extractors)?;
            for item in items {
                println!("{}\t{}", item.logical_id.as_str(), item.path.display());
            }
        }
        Command::Trust { action } => run_trust(action, &trust_store)?,
        Command::Capability { action } => run_capability(action, &config.key_dir())?,
        Command::Chain { logical_id } => {
            let logical_id = LogicalId::parse(&logical_id)?;
            let path = resolver
                .resolve(ItemType::Tool, &logical_id, &extractors)?
                .ok_or_else(|| anyhow::anyhow!("'{}' was not found in any tier", logical_id.as_str()))?;
            let extractor = extractors.get(ItemType::Tool)?;
            let content = std::fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?;
            let parsed = rye_core::extractors::parsers::parse(extractor.parser_for(&path), &content)?;
            let fields = extractor.extract_fields(&parsed, logical_id.stem());
            let executor_id = fields.get("executor_id").and_then(|v| v.as_str()).map(str::to_string);
            let content_bytes = std::fs::read(&path).with_context(|| format!("reading {path:?}"))?;
            let start = Item {
                item_type: ItemType::Tool,
                logical_id,
                version: String::new(),
                content_hash: rye_core::hash_bytes(&content_bytes),
                content: content_bytes,
                category: String::new(),
                space: rye_core::Space::User,
                path,
            };
            let links = chain::resolve_chain(&start, executor_id.as_deref(), &resolver, &extractors, &trust_store)?;
            for link in &links {
                println!("{}\t{}", link.logical_id.as_str(), link.executor_id.as_deref().unwrap_or("-"));
            }
        }
        Command::Lockfile { action } => run_lockfile(action, &config)?,
    }
    Ok(())
}

fn run_trust(action: TrustAction, trust_store: &TrustStore) -> Result<()> {
    match action {
        TrustAction::Add { pem_path } => {
            let pem = std::fs::read(&pem_path).with_context(|| format!("reading {pem_path:?}"))?;
            let fingerprint = trust_store.add_key(&pem)?;
            println!("trusted {fingerprint}");
        }
        TrustAction::Remove { fingerprint } => {
            if trust_store.remove_key(&fingerprint)? {
                println!("removed {fingerprint}");
            } else {
                bail!("no trusted key with fingerprint {fingerprint}");
            }
        }
        TrustAction::List => {
            for key in trust_store.list_keys()? {
                println!("{}\t{}\t{}", key.fingerprint, key.is_registry, key.path.display());
            }
        }
        TrustAction::PinRegistry { pem_path } => {
            let pem = std::fs::read(&pem_path).with_context(|| format!("reading {pem_path:?}"))?;
            let fingerprint = trust_store.pin_registry(&pem)?;
            println!("registry pinned at {fingerprint}");
        }
        TrustAction::ForceRepinRegistry { pem_path } => {
            let pem = std::fs::read(&pem_path).with_context(|| format!("reading {pem_path:?}"))?;
            let fingerprint = trust_store.force_repin_registry(&pem)?;
            println!("registry re-pinned at {fingerprint}");
        }
    }
    Ok(())
}

fn run_capability(action: CapabilityAction, key_dir: &std::path::Path) -> Result<()> {
    match action {
        CapabilityAction::Mint { subject, capabilities, ttl_hours } => {
            let signer = Signer::ensure(key_dir)?;
            let caps = capabilities
                .iter()
                .map(|c| Capability::parse(c))
                .collect::<Result<Vec<_>, _>>()?;
            let token = capability::mint(&subject, caps, Duration::hours(ttl_hours), &signer)?;
            println!("{}", serde_json::to_string_pretty(&token)?);
        }
        CapabilityAction::Check { token_path, capability } => {
            let raw = std::fs::read_to_string(&token_path).with_context(|| format!("reading {token_path:?}"))?;
            let token = serde_json::from_str(&raw).with_context(|| format!("parsing {token_path:?}"))?;
            let signer = Signer::ensure(key_dir)?;
            let required = Capability::parse(&capability)?;
            let hierarchy = CapabilityHierarchy::standard();
            let granted = capability::check(&token, &required, Utc::now(), signer.public_key_pem(), &hierarchy);
            if granted {
                println!("granted");
            } else {
                bail!("capability '{capability}' is not granted");
            }
        }
    }
    Ok(())
}

fn run_lockfile(action: LockfileAction, config: &rye_core::RyeConfig) -> Result<()> {
    let resolver = LockfileResolver::new(
        config.project_root.clone(),
        config.user_space.clone(),
        config.user_space.join("system-lockfiles"),
    );
    match action {
        LockfileAction::Get { tool_id, version } => match resolver.get(&tool_id, &version) {
            Some(lockfile) => println!("{}", serde_json::to_string_pretty(&lockfile)?),
            None => bail!("no lockfile for {tool_id}@{version}"),
        },
        LockfileAction::Save { tool_id, version, integrity } => {
            let lockfile = Lockfile {
                lockfile_version: 1,
                generated_at: Utc::now(),
                root: LockfileRoot { tool_id, version, integrity },
                resolved_chain: Vec::new(),
                registry: None,
                verified_deps: None,
            };
            let scope = if config.project_root.is_some() {
                LockfileWriteScope::Project
            } else {
                LockfileWriteScope::User
            };
            let path = resolver.save(&lockfile, scope)?;
            println!("saved {}", path.display());
        }
        LockfileAction::List => {
            for summary in resolver.list(ListScope::All)? {
                println!("{}@{}\t{}\t{}", summary.tool_id, summary.version, summary.space, summary.path.display());
            }
        }
        LockfileAction::Delete { tool_id, version } => {
            if resolver.delete(&tool_id, &version)? {
                println!("deleted {tool_id}@{version}");
            } else {
                bail!("no lockfile for {tool_id}@{version} in project or user tier");
            }
        }
    }
    Ok(())
}

fn reject_validated_signature(path: &std::path::Path, item_type: ItemType, extractors: &ExtractorRegistry) -> Result<()> {
    let content = std::fs::read(path).with_context(|| format!("reading {path:?}"))?;
    let extractor = extractors.get(item_type)?;
    let format = extractor.signature_format_for(path);
    if let Some(signature) = rye_core::signature::extract_signature(&content, &format)? {
        if signature.kind == rye_core::signature::SignatureKind::Validated {
            bail!("{} is registry-validated but --require-local-signed was given", path.display());
        }
    }
    Ok(())
}
