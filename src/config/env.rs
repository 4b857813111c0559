//! Environment-variable and YAML overlays applied on top of the builder
//! defaults, in that order: builder defaults -> YAML file -> environment.

use std::path::Path;

use super::types::AppConfig;
use crate::error::AppError;

/// Loads a complete [`AppConfig`] from a YAML file, bypassing the builder.
/// Used for file-driven deployments; programmatic callers should prefer
/// [`AppConfig::builder`](super::types::AppConfig::builder).
pub fn load_yaml_config(path: &Path) -> Result<AppConfig, AppError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("failed to read config file {}: {e}", path.display())))?;
    serde_yaml::from_str(&contents)
        .map_err(|e| AppError::Config(format!("invalid config file {}: {e}", path.display())))
}

/// Applies well-known `IWSA_*` environment variable overrides onto `config`.
/// Only a handful of operationally-relevant knobs are exposed this way;
/// structural config (backend lists) belongs in the YAML file or builder.
pub fn apply_env_overlay(mut config: AppConfig) -> AppConfig {
    if let Ok(dir) = std::env::var("IWSA_OUTPUT_DIR") {
        config.storage.output_dir = dir.into();
    }
    if let Ok(val) = std::env::var("IWSA_HEADLESS") {
        if let Ok(parsed) = val.parse::<bool>() {
            config.scraping.headless = parsed;
        }
    }
    if let Ok(val) = std::env::var("IWSA_MAX_CONCURRENT_BROWSERS") {
        if let Ok(parsed) = val.parse::<usize>() {
            config.scraping.max_concurrent_browsers = parsed;
        }
    }
    if let Ok(val) = std::env::var("IWSA_LOCAL_MOCK_MODE") {
        if let Ok(parsed) = val.parse::<bool>() {
            config.llm.local_mock_mode = parsed;
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{BackendConfig, BackendKind};

    fn sample() -> AppConfig {
        AppConfig::builder()
            .output_dir("/tmp/iwsa-test")
            .llm_backend(BackendConfig {
                name: "local".into(),
                kind: BackendKind::Local,
                endpoint: None,
                api_key_env: None,
                priority: 0,
                rate_limit_rps: 1.0,
                circuit_breaker_failure_threshold: 5,
                circuit_breaker_retry_delay_secs: 300,
                request_timeout_secs: 30,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn env_overlay_applies_known_vars() {
        unsafe {
            std::env::set_var("IWSA_MAX_CONCURRENT_BROWSERS", "9");
        }
        let config = apply_env_overlay(sample());
        assert_eq!(config.scraping.max_concurrent_browsers, 9);
        unsafe {
            std::env::remove_var("IWSA_MAX_CONCURRENT_BROWSERS");
        }
    }
}
