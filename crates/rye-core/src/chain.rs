use crate::error::RyeError;
use crate::extractors::ExtractorRegistry;
use crate::item::{Item, ItemType, LogicalId};
use crate::resolver::PathResolver;
use crate::trust_store::TrustStore;
use crate::verifier::Verifier;
use std::collections::HashSet;
use std::path::PathBuf;

/// Executor chains terminate at a primitive, recognized by this reserved
/// prefix rather than by any runtime type — primitives are just tool items
/// whose `executor_id` happens to start here.
pub const PRIMITIVE_PREFIX: &str = "rye/core/primitives/";

pub const PRIMITIVE_SUBPROCESS: &str = "rye/core/primitives/subprocess";
pub const PRIMITIVE_HTTP: &str = "rye/core/primitives/http";
pub const PRIMITIVE_LOCKFILE: &str = "rye/core/primitives/lockfile";

pub const MAX_CHAIN_DEPTH: usize = 8;

pub fn is_primitive(executor_id: &str) -> bool {
    executor_id.starts_with(PRIMITIVE_PREFIX)
}

/// One resolved link in an executor chain.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    pub logical_id: LogicalId,
    pub path: PathBuf,
    pub content_hash: String,
    pub executor_id: Option<String>,
}

/// Failure modes specific to chain resolution. Each converts into
/// [`RyeError`] so callers that want the flattened taxonomy get it, while
/// code inside this module can match narrowly.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("circular executor chain detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("chain exceeded maximum depth of {max_depth} starting at '{start}'")]
    ChainTooDeep { start: String, max_depth: usize },

    #[error("executor '{executor_id}' could not be resolved")]
    ExecutorNotFound { executor_id: String },

    #[error("'{logical_id}' has no executor_id and is not a primitive")]
    MissingExecutor { logical_id: String },

    #[error(transparent)]
    Other(#[from] RyeError),
}

impl From<ChainError> for RyeError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::CircularDependency { path } => RyeError::CircularDependency { path },
            ChainError::ChainTooDeep { start, max_depth } => RyeError::ChainTooDeep { start, max_depth },
            ChainError::ExecutorNotFound { executor_id } => RyeError::ExecutorNotFound { executor_id },
            ChainError::MissingExecutor { logical_id } => RyeError::MissingExecutor { logical_id },
            ChainError::Other(e) => e,
        }
    }
}

/// One not-yet-verified step the walk is about to visit: a logical id plus
/// the file path it resolved to (the starting tool is resolved by the
/// caller; every subsequent cursor is resolved by this function).
struct Cursor {
    logical_id: LogicalId,
    path: PathBuf,
}

/// Follow `start`'s `executor_id` references to a terminal primitive,
/// verifying each link's integrity before inspecting its next pointer so a
/// tampered link cannot redirect the chain. Mirrors the reference algorithm
/// step for step: check-visited, verify, record, check-primitive,
/// check-missing-executor, resolve-next, check-found — bounded by
/// `MAX_CHAIN_DEPTH` iterations.
pub fn resolve_chain(
    start: &Item,
    start_executor_id: Option<&str>,
    resolver: &PathResolver,
    extractors: &ExtractorRegistry,
    trust_store: &TrustStore,
) -> Result<Vec<ResolvedLink>, ChainError> {
    let mut visited: HashSet<LogicalId> = HashSet::new();
    let mut chain: Vec<ResolvedLink> = Vec::new();

    let mut cursor = Cursor {
        logical_id: start.logical_id.clone(),
        path: start.path.clone(),
    };
    let mut cursor_executor_id = start_executor_id.map(str::to_string);
    let mut cursor_item_type = start.item_type;

    for _depth in 0..MAX_CHAIN_DEPTH {
        if visited.contains(&cursor.logical_id) {
            let path: Vec<String> = chain.iter().map(|l| l.logical_id.to_string()).collect();
            return Err(ChainError::CircularDependency { path });
        }
        visited.insert(cursor.logical_id.clone());

        let hash = Verifier::verify_integrity(&cursor.path, cursor_item_type, extractors, trust_store)?;
        chain.push(ResolvedLink {
            logical_id: cursor.logical_id.clone(),
            path: cursor.path.clone(),
            content_hash: hash,
            executor_id: cursor_executor_id.clone(),
        });

        let is_primitive_cursor = cursor_executor_id.as_deref().is_some_and(is_primitive);
        if is_primitive_cursor {
            return Ok(chain);
        }

        let Some(executor_id) = cursor_executor_id.clone() else {
            return Err(ChainError::MissingExecutor {
                logical_id: cursor.logical_id.to_string(),
            });
        };

        let logical_id = LogicalId::parse(&executor_id).map_err(ChainError::Other)?;
        let next_path = resolver
            .resolve(ItemType::Tool, &logical_id, extractors)
            .map_err(ChainError::Other)?
            .ok_or_else(|| ChainError::ExecutorNotFound {
                executor_id: executor_id.clone(),
            })?;

        let content = std::fs::read_to_string(&next_path).map_err(|e| RyeError::io(&next_path, e))?;
        let extractor = extractors.get(ItemType::Tool).map_err(ChainError::Other)?;
        let parsed = crate::extractors::parsers::parse(extractor.parser_for(&next_path), &content)
            .map_err(ChainError::Other)?;
        let fields = extractor.extract_fields(&parsed, logical_id.stem());
        let child_executor_id = fields
            .get("executor_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        cursor = Cursor {
            logical_id,
            path: next_path,
        };
        cursor_executor_id = child_executor_id;
        cursor_item_type = ItemType::Tool;
    }

    Err(ChainError::ChainTooDeep {
        start: start.logical_id.to_string(),
        max_depth: MAX_CHAIN_DEPTH,
    })
}
