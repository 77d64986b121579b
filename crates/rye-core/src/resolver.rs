use crate::error::{Result, RyeError};
use crate::extractors::ExtractorRegistry;
use crate::item::{Item, ItemType, LogicalId, Space};
use std::path::{Path, PathBuf};

/// One bundled system-tier root: its own `.ai/` subtree, plus the
/// categories it is allowed to serve (system bundles are read-only and
/// scoped to a declared subset of content).
#[derive(Debug, Clone)]
pub struct SystemBundle {
    pub bundle_id: String,
    pub root: PathBuf,
    pub accepted_categories: Vec<String>,
}

/// Which tier a write targets. System is intentionally not representable
/// here as a legal write target — callers that need it get a
/// [`RyeError::ValidationFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    Project,
    User,
}

/// A `type.a.b.*` style namespace query, accepting both the dotted
/// canonical form and the shorthand slash form callers commonly type.
#[derive(Debug, Clone)]
pub struct NamespaceQuery {
    pub item_type: ItemType,
    pub prefix: String,
}

impl NamespaceQuery {
    pub fn parse(item_type: ItemType, raw: &str) -> Self {
        let trimmed = raw.trim_end_matches(".*").trim_end_matches('*');
        let normalized = trimmed.trim_end_matches('.').replace('.', "/");
        NamespaceQuery {
            item_type,
            prefix: normalized,
        }
    }

    fn matches(&self, logical_id: &LogicalId) -> bool {
        self.prefix.is_empty() || logical_id.as_str().starts_with(self.prefix.as_str())
    }
}

/// Resolves logical ids to files across the three tiers: project, user,
/// and one or more read-only system bundles, in that precedence order.
pub struct PathResolver {
    project_root: Option<PathBuf>,
    user_space: PathBuf,
    system_bundles: Vec<SystemBundle>,
}

impl PathResolver {
    pub fn new(project_root: Option<PathBuf>, user_space: PathBuf, system_bundles: Vec<SystemBundle>) -> Self {
        PathResolver {
            project_root,
            user_space,
            system_bundles,
        }
    }

    /// Tier roots in precedence order, each paired with the category
    /// filter that applies to it: `None` means "every category accepted"
    /// (project, user); `Some(categories)` restricts a system bundle to the
    /// categories it declared.
    fn tier_roots(&self) -> Vec<(PathBuf, Option<&[String]>)> {
        let mut roots = Vec::new();
        if let Some(project) = &self.project_root {
            roots.push((project.clone(), None));
        }
        roots.push((self.user_space.clone(), None));
        for bundle in &self.system_bundles {
            roots.push((bundle.root.clone(), Some(bundle.accepted_categories.as_slice())));
        }
        roots
    }

    fn type_root(&self, tier_root: &Path, item_type: ItemType) -> PathBuf {
        tier_root.join(".ai").join(item_type.type_dir())
    }

    /// True if `logical_id`'s category prefix (everything but the final
    /// segment) is covered by one of `accepted_categories`. Bundles with no
    /// matching accepted category do not expose the item at all.
    fn category_accepted(logical_id: &LogicalId, accepted_categories: &[String]) -> bool {
        let category = logical_id
            .as_str()
            .rsplit_once('/')
            .map(|(prefix, _)| prefix)
            .unwrap_or("");
        accepted_categories
            .iter()
            .any(|accepted| category.starts_with(accepted.as_str()))
    }

    /// Find the first existing file for `logical_id`, walking tiers in
    /// precedence order and trying every extension the extractor declares.
    /// System bundles only expose items under a category they declared.
    pub fn resolve(
        &self,
        item_type: ItemType,
        logical_id: &LogicalId,
        extractors: &ExtractorRegistry,
    ) -> Result<Option<PathBuf>> {
        let extractor = extractors.get(item_type)?;
        for (tier_root, accepted_categories) in self.tier_roots() {
            if let Some(accepted) = accepted_categories {
                if !Self::category_accepted(logical_id, accepted) {
                    continue;
                }
            }
            let type_root = self.type_root(&tier_root, item_type);
            for extension in &extractor.extensions {
                let candidate = type_root.join(format!("{}{extension}", logical_id.as_str()));
                if candidate.is_file() {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    /// Compute the write path for `logical_id` in exactly one tier. System
    /// is never a legal write target.
    pub fn resolve_write(
        &self,
        item_type: ItemType,
        logical_id: &LogicalId,
        extension: &str,
        scope: WriteScope,
    ) -> Result<PathBuf> {
        let tier_root = match scope {
            WriteScope::Project => self
                .project_root
                .clone()
                .ok_or_else(|| RyeError::ValidationFailed("no project root configured".into()))?,
            WriteScope::User => self.user_space.clone(),
        };
        let type_root = self.type_root(&tier_root, item_type);
        Ok(type_root.join(format!("{}{extension}", logical_id.as_str())))
    }

    /// List every item matching a namespace query, across all tiers. System
    /// bundles only contribute items under a category they declared.
    pub fn list_namespace(&self, query: &NamespaceQuery, extractors: &ExtractorRegistry) -> Result<Vec<Item>> {
        let extractor = extractors.get(query.item_type)?;
        let mut items = Vec::new();

        for (tier_root, space, accepted_categories) in self.tiers_with_space() {
            let type_root = self.type_root(&tier_root, query.item_type);
            if !type_root.is_dir() {
                continue;
            }
            walk_items(
                &type_root,
                &type_root,
                query.item_type,
                &extractor.extensions,
                &space,
                accepted_categories.as_deref(),
                query,
                &mut items,
            )?;
        }
        Ok(items)
    }

    /// Tier roots with the `Space` an item found there is tagged with, plus
    /// the accepted-categories filter for system bundles (`None` elsewhere).
    fn tiers_with_space(&self) -> Vec<(PathBuf, Space, Option<Vec<String>>)> {
        let mut out = Vec::new();
        if let Some(project) = &self.project_root {
            out.push((project.clone(), Space::Project, None));
        }
        out.push((self.user_space.clone(), Space::User, None));
        for bundle in &self.system_bundles {
            out.push((
                bundle.root.clone(),
                Space::System {
                    bundle_id: bundle.bundle_id.clone(),
                },
                Some(bundle.accepted_categories.clone()),
            ));
        }
        out
    }

    /// Validate the two filesystem-shape invariants items must hold:
    /// filename stem equals the logical id's last segment, and category is
    /// a path-prefix of the item's directory relative to its type root.
    pub fn validate_placement(&self, item: &Item) -> Result<()> {
        for (tier_root, space, _accepted_categories) in self.tiers_with_space() {
            if space == item.space {
                let type_root = self.type_root(&tier_root, item.item_type);
                return item.validate_placement(&type_root);
            }
        }
        Err(RyeError::ValidationFailed(
            "item's space does not match any configured tier".into(),
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_items(
    dir: &Path,
    type_root: &Path,
    item_type: ItemType,
    extensions: &[String],
    space: &Space,
    accepted_categories: Option<&[String]>,
    query: &NamespaceQuery,
    out: &mut Vec<Item>,
) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| RyeError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RyeError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            walk_items(&path, type_root, item_type, extensions, space, accepted_categories, query, out)?;
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.iter().any(|e| e.trim_start_matches('.') == ext) {
            continue;
        }
        let relative = path.strip_prefix(type_root).unwrap_or(&path);
        let without_ext = relative.with_extension("");
        let logical_raw = without_ext.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        let Ok(logical_id) = LogicalId::parse(&logical_raw) else {
            continue;
        };
        if !query.matches(&logical_id) {
            continue;
        }
        if let Some(accepted) = accepted_categories {
            if !PathResolver::category_accepted(&logical_id, accepted) {
                continue;
            }
        }
        let content = std::fs::read(&path).map_err(|e| RyeError::io(&path, e))?;
        let category = relative
            .parent()
            .map(|p| p.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
            .unwrap_or_default();
        out.push(Item {
            item_type,
            logical_id,
            version: String::new(),
            content_hash: crate::canonical::hash_bytes(&content),
            content,
            category,
            space: space.clone(),
            path,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::ExtractorRegistry;
    use tempfile::tempdir;

    fn write_item(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn resolve_prefers_project_over_user() {
        let project = tempdir().unwrap();
        let user = tempdir().unwrap();
        write_item(project.path(), ".ai/tools/rye/core/registry.py", "a");
        write_item(user.path(), ".ai/tools/rye/core/registry.py", "b");

        let resolver = PathResolver::new(Some(project.path().to_path_buf()), user.path().to_path_buf(), vec![]);
        let extractors = ExtractorRegistry::with_builtins();
        let logical_id = LogicalId::parse("rye/core/registry").unwrap();
        let found = resolver.resolve(ItemType::Tool, &logical_id, &extractors).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(found).unwrap(), "a");
    }

    #[test]
    fn resolve_returns_none_when_missing() {
        let user = tempdir().unwrap();
        let resolver = PathResolver::new(None, user.path().to_path_buf(), vec![]);
        let extractors = ExtractorRegistry::with_builtins();
        let logical_id = LogicalId::parse("rye/core/missing").unwrap();
        assert!(resolver.resolve(ItemType::Tool, &logical_id, &extractors).unwrap().is_none());
    }

    #[test]
    fn resolve_write_rejects_system_scope_by_construction() {
        let user = tempdir().unwrap();
        let resolver = PathResolver::new(None, user.path().to_path_buf(), vec![]);
        let logical_id = LogicalId::parse("agent/review").unwrap();
        let path = resolver
            .resolve_write(ItemType::Directive, &logical_id, ".md", WriteScope::User)
            .unwrap();
        assert!(path.starts_with(user.path()));
    }

    #[test]
    fn resolve_write_without_project_root_errors() {
        let user = tempdir().unwrap();
        let resolver = PathResolver::new(None, user.path().to_path_buf(), vec![]);
        let logical_id = LogicalId::parse("agent/review").unwrap();
        let result = resolver.resolve_write(ItemType::Directive, &logical_id, ".md", WriteScope::Project);
        assert!(result.is_err());
    }

    #[test]
    fn system_bundle_only_exposes_accepted_categories() {
        let system = tempdir().unwrap();
        write_item(system.path(), ".ai/tools/rye/core/registry.py", "accepted");
        write_item(system.path(), ".ai/tools/other/thing.py", "excluded");

        let bundle = SystemBundle {
            bundle_id: "bundled".to_string(),
            root: system.path().to_path_buf(),
            accepted_categories: vec!["rye/core".to_string()],
        };
        let resolver = PathResolver::new(None, tempdir().unwrap().path().to_path_buf(), vec![bundle]);
        let extractors = ExtractorRegistry::with_builtins();

        let accepted_id = LogicalId::parse("rye/core/registry").unwrap();
        assert!(resolver.resolve(ItemType::Tool, &accepted_id, &extractors).unwrap().is_some());

        let excluded_id = LogicalId::parse("other/thing").unwrap();
        assert!(resolver.resolve(ItemType::Tool, &excluded_id, &extractors).unwrap().is_none());

        let query = NamespaceQuery::parse(ItemType::Tool, "*");
        let items = resolver.list_namespace(&query, &extractors).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].logical_id.as_str(), "rye/core/registry");
    }

    #[test]
    fn list_namespace_filters_by_prefix() {
        let user = tempdir().unwrap();
        write_item(user.path(), ".ai/tools/rye/core/registry.py", "a");
        write_item(user.path(), ".ai/tools/other/thing.py", "b");

        let resolver = PathResolver::new(None, user.path().to_path_buf(), vec![]);
        let extractors = ExtractorRegistry::with_builtins();
        let query = NamespaceQuery::parse(ItemType::Tool, "rye.core.*");
        let items = resolver.list_namespace(&query, &extractors).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].logical_id.as_str(), "rye/core/registry");
    }
}
