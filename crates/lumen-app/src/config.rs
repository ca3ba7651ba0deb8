//! Application configuration: `~/.lumen/config.toml` plus env overrides.
//!
//! The settings subsystem owns persistence; the core only ever receives
//! per-provider credential bags by value.

use anyhow::{Context, Result};
use lumen_types::{CompletionOptions, ProviderConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub options: CompletionOptionsConfig,
}

/// Serde mirror of [`CompletionOptions`] so partial config files work.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CompletionOptionsConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
    pub max_tool_turns: Option<u32>,
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

impl AppConfig {
    /// Load from the given path (or `~/.lumen/config.toml`), then apply
    /// environment overrides. A missing file is an empty config, not an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => lumen_logging::lumen_dir()?.join("config.toml"),
        };

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config at {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            Self {
                default_provider: default_provider(),
                default_model: default_model(),
                ..Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        for (provider, var) in [
            ("anthropic", "LUMEN_ANTHROPIC_API_KEY"),
            ("openai", "LUMEN_OPENAI_API_KEY"),
        ] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    self.providers
                        .entry(provider.to_string())
                        .or_default()
                        .api_key = Some(key);
                }
            }
        }
        if let Ok(url) = std::env::var("LUMEN_LOCAL_BASE_URL") {
            if !url.is_empty() {
                self.providers
                    .entry("local".to_string())
                    .or_default()
                    .base_url = Some(url);
            }
        }
    }

    /// Credential bag for one provider; absent entries are empty bags.
    pub fn provider_config(&self, provider_id: &str) -> ProviderConfig {
        self.providers.get(provider_id).cloned().unwrap_or_default()
    }

    pub fn completion_options(&self) -> CompletionOptions {
        let defaults = CompletionOptions::default();
        CompletionOptions {
            temperature: self.options.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.options.max_tokens.unwrap_or(defaults.max_tokens),
            stream: self.options.stream.unwrap_or(defaults.stream),
            max_tool_turns: self
                .options
                .max_tool_turns
                .unwrap_or(defaults.max_tool_turns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config_file() {
        let config: AppConfig = toml::from_str(
            r#"
            default_provider = "anthropic"

            [providers.anthropic]
            api_key = "sk-ant-test"

            [options]
            max_tool_turns = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(
            config.provider_config("anthropic").api_key.as_deref(),
            Some("sk-ant-test")
        );
        assert_eq!(config.completion_options().max_tool_turns, 5);
        // Unspecified options fall back to defaults.
        assert!(config.completion_options().stream);
    }

    #[test]
    fn unknown_provider_yields_an_empty_bag() {
        let config = AppConfig::default();
        assert_eq!(config.provider_config("nonesuch"), ProviderConfig::default());
    }
}
