//! The trust-and-resolution engine: canonical hashing, Ed25519 signing, a
//! disk-backed trust store, data-driven metadata extraction, three-tier path
//! resolution, integrity verification, executor-chain validation, capability
//! tokens, and lockfile management.
//!
//! Everything here is synchronous and side-effect-free beyond explicit
//! filesystem reads/writes — no async runtime, no global state, no logging.
//! Callers that want an async or logging boundary put it in their own crate;
//! see `rye-cli` for the thin wrapper that does.

pub mod canonical;
pub mod capability;
pub mod chain;
pub mod config;
pub mod error;
pub mod extractors;
pub mod item;
pub mod lockfile;
pub mod metadata_manager;
pub mod resolver;
pub mod signature;
pub mod signer;
pub mod trust_store;
pub mod verifier;

pub use canonical::{canonicalize_value, hash_bytes, hash_value};
pub use capability::{mint, attenuate, check, verify, Capability, CapabilityHierarchy, CapabilityToken};
pub use chain::{is_primitive, resolve_chain, ChainError, ResolvedLink, MAX_CHAIN_DEPTH};
pub use config::RyeConfig;
pub use error::{Result, RyeError};
pub use extractors::{Extractor, ExtractorRegistry, ExtractionRule, FieldSchema, FieldType, ValidationError, ValidationSchema};
pub use item::{Item, ItemType, LogicalId, Space};
pub use lockfile::{Lockfile, LockfileManager, LockfileResolver, LockfileRoot, ListScope, LockfileSummary, WriteScope as LockfileWriteScope};
pub use metadata_manager::MetadataManager;
pub use resolver::{NamespaceQuery, PathResolver, SystemBundle, WriteScope};
pub use signature::{Signature, SignatureFormat, SignatureKind};
pub use signer::Signer;
pub use trust_store::{TrustStore, TrustedKey};
pub use verifier::Verifier;
