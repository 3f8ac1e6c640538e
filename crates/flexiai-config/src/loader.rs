use std::path::{Path, PathBuf};
use tracing::{info, warn};

use flexiai_core::{FlexiError, Result};

use crate::schema::FlexiConfig;

/// Loads the FlexiAI configuration from disk with env-var overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the config path: explicit path > FLEXIAI_CONFIG env >
    /// ~/.flexiai/flexiai.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("FLEXIAI_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".flexiai")
            .join("flexiai.toml")
    }

    /// Load the config from disk, falling back to defaults when the file is
    /// absent. Validation failures are hard errors; warnings are logged.
    pub fn load(path: Option<&Path>) -> Result<FlexiConfig> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<FlexiConfig>(&raw).map_err(|e| {
                FlexiError::Configuration(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            FlexiConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(FlexiError::Configuration(e)),
        }

        Ok(config)
    }

    /// Apply env var overrides (FLEXIAI_LOG_LEVEL, FLEXIAI_REDIS_HOST, etc.)
    fn apply_env_overrides(mut config: FlexiConfig) -> FlexiConfig {
        if let Ok(v) = std::env::var("FLEXIAI_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("FLEXIAI_REDIS_HOST") {
            config.sync.host = v;
        }
        if let Ok(v) = std::env::var("FLEXIAI_REDIS_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                config.sync.port = port;
            }
        }
        if let Ok(v) = std::env::var("FLEXIAI_REDIS_PASSWORD") {
            config.sync.password = Some(v);
        }
        if let Ok(v) = std::env::var("FLEXIAI_NAMESPACE") {
            config.sync.namespace = v;
        }
        // API keys: env var fills in when the config file leaves the key
        // empty. The config file takes priority, env is the fallback.
        for provider in &mut config.providers {
            if !provider.api_key.is_empty() {
                continue;
            }
            let env_name = match provider.name.as_str() {
                "openai" => "OPENAI_API_KEY",
                "anthropic" => "ANTHROPIC_API_KEY",
                "gemini" => "GEMINI_API_KEY",
                _ => continue,
            };
            if let Ok(v) = std::env::var(env_name) {
                provider.api_key = v;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let p = ConfigLoader::resolve_path(Some(Path::new("/tmp/custom.toml")));
        assert_eq!(p, PathBuf::from("/tmp/custom.toml"));
    }
}
