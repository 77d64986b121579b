use std::path::PathBuf;

/// Explicit configuration for wiring up a [`crate::resolver::PathResolver`],
/// [`crate::trust_store::TrustStore`], and [`crate::signer::Signer`].
///
/// This struct only holds values; it never reads an environment variable or
/// a CLI flag itself. `rye-cli::config::from_env` is where `USER_SPACE`,
/// `RYE_REGISTRY_URL`, `RYE_REGISTRY_API_KEY`, and `RYE_DEBUG` get turned
/// into one of these — keeping this crate's public surface free of any
/// notion of "the environment."
#[derive(Debug, Clone)]
pub struct RyeConfig {
    pub project_root: Option<PathBuf>,
    pub user_space: PathBuf,
    pub registry_url: Option<String>,
    pub registry_api_key: Option<String>,
    pub debug: bool,
}

impl RyeConfig {
    pub fn new(user_space: PathBuf) -> Self {
        RyeConfig {
            project_root: None,
            user_space,
            registry_url: None,
            registry_api_key: None,
            debug: false,
        }
    }

    pub fn with_project_root(mut self, project_root: PathBuf) -> Self {
        self.project_root = Some(project_root);
        self
    }

    pub fn key_dir(&self) -> PathBuf {
        self.user_space.join(".ai").join("config").join("keys").join("signing")
    }

    pub fn trust_dir(&self) -> PathBuf {
        self.user_space.join(".ai").join("trusted_keys")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_and_trust_dirs_match_the_on_disk_layout() {
        let config = RyeConfig::new(PathBuf::from("/home/test/.rye"));
        assert_eq!(
            config.key_dir(),
            PathBuf::from("/home/test/.rye/.ai/config/keys/signing")
        );
        assert_eq!(
            config.trust_dir(),
            PathBuf::from("/home/test/.rye/.ai/trusted_keys")
        );
    }
}
