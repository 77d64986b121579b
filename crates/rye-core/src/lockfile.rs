use crate::error::{Result, RyeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockfileRoot {
    pub tool_id: String,
    pub version: String,
    pub integrity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    pub lockfile_version: u32,
    pub generated_at: DateTime<Utc>,
    pub root: LockfileRoot,
    pub resolved_chain: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_deps: Option<serde_json::Value>,
}

/// Pure lockfile I/O with explicit paths only. No path resolution,
/// precedence, or creation logic — see [`LockfileResolver`] for that.
pub struct LockfileManager;

impl LockfileManager {
    pub fn load(path: &Path) -> Result<Lockfile> {
        let content = std::fs::read_to_string(path).map_err(|e| RyeError::io(path, e))?;
        let data: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| RyeError::InvalidJson(format!("{path:?}: {e}")))?;

        for field in ["lockfile_version", "generated_at", "root", "resolved_chain"] {
            if data.get(field).is_none() {
                return Err(RyeError::InvalidLockfile {
                    path: path.to_path_buf(),
                    reason: format!("missing required field '{field}'"),
                });
            }
        }

        serde_json::from_value(data).map_err(|e| RyeError::InvalidLockfile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write `lockfile` to `path` atomically (write-to-tmp, then rename).
    /// Does not create parent directories — that is the caller's
    /// responsibility.
    pub fn save(lockfile: &Lockfile, path: &Path) -> Result<PathBuf> {
        let dir = path
            .parent()
            .ok_or_else(|| RyeError::ValidationFailed("lockfile path has no parent directory".into()))?;
        let json = serde_json::to_string_pretty(lockfile)
            .map_err(|e| RyeError::InvalidJson(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RyeError::io(dir, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| RyeError::io(path, e))?;
        tmp.persist(path).map_err(|e| RyeError::io(path, e.error))?;
        Ok(path.to_path_buf())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

/// Three-tier lockfile resolution: project, user, and a bundled read-only
/// system tier, composed on top of the pure I/O in [`LockfileManager`].
pub struct LockfileResolver {
    project_dir: Option<PathBuf>,
    user_dir: PathBuf,
    system_dir: PathBuf,
}

/// Which tier a lockfile save targets. System lockfiles are bundled and
/// read-only; they are never a legal write target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    Project,
    User,
}

/// Which tier(s) [`LockfileResolver::list`] should enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    Project,
    User,
    System,
}

#[derive(Debug, Clone)]
pub struct LockfileSummary {
    pub tool_id: String,
    pub version: String,
    pub space: &'static str,
    pub path: PathBuf,
}

impl LockfileResolver {
    pub fn new(project_root: Option<PathBuf>, user_space: PathBuf, system_space: PathBuf) -> Self {
        LockfileResolver {
            project_dir: project_root.map(|p| p.join(".ai").join("lockfiles")),
            user_dir: user_space.join(".ai").join("lockfiles"),
            system_dir: system_space.join(".ai").join("lockfiles"),
        }
    }

    fn lockfile_name(tool_id: &str, version: &str) -> String {
        format!("{tool_id}@{version}.lock.json")
    }

    fn resolve_read_path(&self, tool_id: &str, version: &str) -> Option<PathBuf> {
        let name = Self::lockfile_name(tool_id, version);
        for dir in [self.project_dir.as_ref(), Some(&self.user_dir), Some(&self.system_dir)] {
            if let Some(dir) = dir {
                let candidate = dir.join(&name);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn resolve_write_path(&self, tool_id: &str, version: &str, scope: WriteScope) -> Result<PathBuf> {
        let name = Self::lockfile_name(tool_id, version);
        match scope {
            WriteScope::Project => self
                .project_dir
                .as_ref()
                .map(|dir| dir.join(&name))
                .ok_or_else(|| RyeError::ValidationFailed("no project root configured".into())),
            WriteScope::User => Ok(self.user_dir.join(&name)),
        }
    }

    pub fn get(&self, tool_id: &str, version: &str) -> Option<Lockfile> {
        let path = self.resolve_read_path(tool_id, version)?;
        LockfileManager::load(&path).ok()
    }

    pub fn save(&self, lockfile: &Lockfile, scope: WriteScope) -> Result<PathBuf> {
        let path = self.resolve_write_path(&lockfile.root.tool_id, &lockfile.root.version, scope)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| RyeError::io(dir, e))?;
        }
        LockfileManager::save(lockfile, &path)
    }

    pub fn exists(&self, tool_id: &str, version: &str) -> bool {
        self.resolve_read_path(tool_id, version).is_some()
    }

    /// Delete a lockfile from project or user space. System lockfiles are
    /// never deleted.
    pub fn delete(&self, tool_id: &str, version: &str) -> Result<bool> {
        let name = Self::lockfile_name(tool_id, version);
        for dir in [self.project_dir.as_ref(), Some(&self.user_dir)] {
            if let Some(dir) = dir {
                let path = dir.join(&name);
                if path.exists() {
                    std::fs::remove_file(&path).map_err(|e| RyeError::io(&path, e))?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn list(&self, scope: ListScope) -> Result<Vec<LockfileSummary>> {
        let mut results = Vec::new();
        let mut dirs: Vec<(&Path, &'static str)> = Vec::new();
        if matches!(scope, ListScope::All | ListScope::Project) {
            if let Some(dir) = &self.project_dir {
                dirs.push((dir, "project"));
            }
        }
        if matches!(scope, ListScope::All | ListScope::User) {
            dirs.push((&self.user_dir, "user"));
        }
        if matches!(scope, ListScope::All | ListScope::System) {
            dirs.push((&self.system_dir, "system"));
        }

        for (dir, space) in dirs {
            if !dir.is_dir() {
                continue;
            }
            Self::walk_lockfiles(dir, dir, space, &mut results)?;
        }
        Ok(results)
    }

    /// Recurse into `dir` collecting lockfiles, since `lockfile_name` embeds
    /// the tool id's slashes as directory separators (`save` relies on this
    /// via `create_dir_all(path.parent())`), so a single flat `read_dir` of
    /// `root` would miss every lockfile nested under a tool id's own
    /// subdirectory.
    fn walk_lockfiles(dir: &Path, root: &Path, space: &'static str, results: &mut Vec<LockfileSummary>) -> Result<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| RyeError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RyeError::io(dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                Self::walk_lockfiles(&path, root, space, results)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
            let Some(stem) = relative.strip_suffix(".lock.json") else {
                continue;
            };
            let (tool_id, version) = stem
                .rsplit_once('@')
                .map(|(t, v)| (t.to_string(), v.to_string()))
                .unwrap_or_else(|| (stem.to_string(), "unknown".to_string()));
            results.push(LockfileSummary {
                tool_id,
                version,
                space,
                path,
            });
        }
        Ok(())
    }
}
