//! Configuration from environment variables and an optional YAML file.
//!
//! **Environment variables:**
//! - `HOST`: bind address (default: 0.0.0.0)
//! - `PORT`: server port (default: 8000)
//! - `CLAUDE_BASE_URL`: base URL of the Anthropic API (default: https://api.anthropic.com)
//! - `CLAUDE_API_KEY`: fallback credential when a request has no `Authorization` header
//! - `REQUEST_TIMEOUT_SECS`: upstream request timeout (default: 120)
//! - `ANTHROPIC_VERSION`: value of the `anthropic-version` header (default: 2023-06-01)
//! - `DEFAULT_MAX_TOKENS`: `max_tokens` sent when the client gives none (default: 4096)
//! - `RESPONSE_MODEL`: model name reported back to clients (default: gpt-3.5-turbo-0613)
//! - `LOG_LEVEL`: tracing filter used when `RUST_LOG` is unset (default: info)
//!
//! The YAML file can override any of the non-secret settings and extend the
//! model map:
//!
//! ```yaml
//! port: 9000
//! default_model: "claude-3-5-sonnet-20240620"
//! models:
//!   gpt-4o: "claude-3-5-sonnet-20240620"
//! ```

use crate::models::ModelMap;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_RESPONSE_MODEL: &str = "gpt-3.5-turbo-0613";

#[derive(Debug)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
    pub claude_base_url: String,
    pub api_key: Option<SecretString>,
    pub request_timeout_secs: u64,
    pub anthropic_version: String,
    pub default_max_tokens: u32,
    pub response_model: String,
    pub log_level: String,
    pub models: ModelMap,
}

#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    anthropic_version: Option<String>,
    default_max_tokens: Option<u32>,
    response_model: Option<String>,
    log_level: Option<String>,
    default_model: Option<String>,
    #[serde(default)]
    models: HashMap<String, String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }
}

impl AdapterConfig {
    /// Build a config from a key lookup (the environment, in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&lookup, "PORT").unwrap_or(8000),
            claude_base_url: lookup("CLAUDE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: lookup("CLAUDE_API_KEY")
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS").unwrap_or(120),
            anthropic_version: lookup("ANTHROPIC_VERSION")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
            default_max_tokens: parse_var(&lookup, "DEFAULT_MAX_TOKENS")
                .unwrap_or(DEFAULT_MAX_TOKENS),
            response_model: lookup("RESPONSE_MODEL")
                .unwrap_or_else(|| DEFAULT_RESPONSE_MODEL.to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            models: ModelMap::default(),
        }
    }

    /// Environment defaults, overridden by the YAML file at `path`.
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::default().merge_yaml(&content)
    }

    /// Load from an explicit path, or the default location if a file exists there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_yaml_file(p),
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(p) => Self::from_yaml_file(p),
                None => Ok(Self::default()),
            },
        }
    }

    fn merge_yaml(mut self, content: &str) -> Result<Self> {
        let yaml: YamlConfig =
            serde_yaml_ng::from_str(content).context("Failed to parse config YAML")?;

        if let Some(host) = yaml.host {
            self.host = host;
        }
        if let Some(port) = yaml.port {
            self.port = port;
        }
        if let Some(base_url) = yaml.base_url {
            self.claude_base_url = base_url;
        }
        if let Some(secs) = yaml.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(version) = yaml.anthropic_version {
            self.anthropic_version = version;
        }
        if let Some(max_tokens) = yaml.default_max_tokens {
            self.default_max_tokens = max_tokens;
        }
        if let Some(model) = yaml.response_model {
            self.response_model = model;
        }
        if let Some(level) = yaml.log_level {
            self.log_level = level;
        }
        self.models = ModelMap::with_overrides(yaml.models, yaml.default_model);

        Ok(self)
    }

    pub fn claude_base_url_trimmed(&self) -> &str {
        self.claude_base_url.trim_end_matches('/')
    }

    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.claude_base_url_trimmed())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// `<config_dir>/chat-adapter/config.yml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chat-adapter").join("config.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AdapterConfig::from_lookup(|_| None);
        assert_eq!(config.port, 8000);
        assert_eq!(config.claude_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.default_max_tokens, DEFAULT_MAX_TOKENS);
        assert!(config.api_key.is_none());
        assert_eq!(config.messages_url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = AdapterConfig::from_lookup(lookup_from(&[
            ("PORT", "9100"),
            ("CLAUDE_BASE_URL", "http://localhost:4000/"),
            ("CLAUDE_API_KEY", "sk-ant-test"),
            ("REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]));

        assert_eq!(config.port, 9100);
        assert_eq!(config.messages_url(), "http://localhost:4000/v1/messages");
        assert_eq!(
            config.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("sk-ant-test".to_string())
        );
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn empty_api_key_is_treated_as_missing() {
        let config = AdapterConfig::from_lookup(lookup_from(&[("CLAUDE_API_KEY", "")]));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn yaml_overrides_settings_and_models() {
        let config = AdapterConfig::from_lookup(|_| None)
            .merge_yaml(
                r#"
port: 9000
response_model: "gpt-4"
default_model: "claude-3-haiku-20240307"
models:
  gpt-4o: "claude-3-opus-20240229"
"#,
            )
            .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.response_model, "gpt-4");
        assert_eq!(config.models.resolve("gpt-4o"), "claude-3-opus-20240229");
        assert_eq!(config.models.resolve("unknown"), "claude-3-haiku-20240307");
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = AdapterConfig::from_lookup(|_| None).merge_yaml("port: [1, 2");
        assert!(result.is_err());
    }
}
