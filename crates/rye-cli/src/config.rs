use rye_core::RyeConfig;
use std::path::PathBuf;

/// Read `USER_SPACE`, `RYE_REGISTRY_URL`, `RYE_REGISTRY_API_KEY`, and
/// `RYE_DEBUG` into a [`RyeConfig`]. `rye-core` never reads the environment
/// itself; this is the one place that translates it into explicit values.
pub fn from_env() -> RyeConfig {
    let user_space = std::env::var_os("USER_SPACE")
        .map(PathBuf::from)
        .unwrap_or_else(default_user_space);

    let mut config = RyeConfig::new(user_space);
    config.registry_url = std::env::var("RYE_REGISTRY_URL").ok();
    config.registry_api_key = std::env::var("RYE_REGISTRY_API_KEY").ok();
    config.debug = std::env::var("RYE_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    config
}

fn default_user_space() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rye")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_user_space_is_under_home() {
        let path = default_user_space();
        assert!(path.ends_with(".rye"));
    }
}
