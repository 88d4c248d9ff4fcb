//! Model name mapping.
//!
//! Clients ask for OpenAI model names; the backend only knows Anthropic model
//! ids. The map is built once at startup (built-in entries plus any overrides
//! from the config file) and shared read-only between requests. A lookup miss
//! resolves to the default model, so translation never fails on an unknown
//! name.

use std::collections::BTreeMap;

/// Most capable backend model; used when a name is not in the map.
pub const DEFAULT_TARGET_MODEL: &str = "claude-3-opus-20240229";

const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "claude-3-haiku-20240307"),
    ("gpt-3.5-turbo-0613", "claude-3-haiku-20240307"),
    ("gpt-3.5-turbo-16k", "claude-3-haiku-20240307"),
    ("gpt-4o-mini", "claude-3-haiku-20240307"),
    ("gpt-4o", "claude-3-5-sonnet-20240620"),
    ("gpt-4-turbo", "claude-3-5-sonnet-20240620"),
    ("gpt-4", "claude-3-opus-20240229"),
    ("gpt-4-32k", "claude-3-opus-20240229"),
];

#[derive(Debug, Clone)]
pub struct ModelMap {
    entries: BTreeMap<String, String>,
    default_model: String,
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            entries: BUILTIN_MODELS
                .iter()
                .map(|(source, target)| (source.to_string(), target.to_string()))
                .collect(),
            default_model: DEFAULT_TARGET_MODEL.to_string(),
        }
    }
}

impl ModelMap {
    /// Built-in map extended (or overridden) by `overrides`.
    pub fn with_overrides(
        overrides: impl IntoIterator<Item = (String, String)>,
        default_model: Option<String>,
    ) -> Self {
        let mut map = Self::default();
        map.entries.extend(overrides);
        if let Some(default_model) = default_model {
            map.default_model = default_model;
        }
        map
    }

    pub fn get(&self, source_model: &str) -> Option<&str> {
        self.entries.get(source_model).map(|s| s.as_str())
    }

    /// Resolve a client model name to the backend model id.
    pub fn resolve(&self, source_model: &str) -> &str {
        self.get(source_model).unwrap_or(&self.default_model)
    }

    /// Client-facing model names, sorted.
    pub fn source_models(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_entry_resolves_to_its_target() {
        let map = ModelMap::default();
        for (source, target) in BUILTIN_MODELS {
            assert_eq!(map.resolve(source), *target, "model {}", source);
        }
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let map = ModelMap::default();
        assert_eq!(map.resolve("text-davinci-003"), DEFAULT_TARGET_MODEL);
        assert_eq!(map.resolve(""), DEFAULT_TARGET_MODEL);
        assert_eq!(map.get("text-davinci-003"), None);
    }

    #[test]
    fn overrides_replace_builtins_and_default() {
        let map = ModelMap::with_overrides(
            [
                ("gpt-4".to_string(), "claude-3-5-sonnet-20240620".to_string()),
                ("my-model".to_string(), "claude-3-haiku-20240307".to_string()),
            ],
            Some("claude-3-haiku-20240307".to_string()),
        );

        assert_eq!(map.resolve("gpt-4"), "claude-3-5-sonnet-20240620");
        assert_eq!(map.resolve("my-model"), "claude-3-haiku-20240307");
        assert_eq!(map.resolve("gpt-3.5-turbo"), "claude-3-haiku-20240307");
        assert_eq!(map.resolve("unknown"), "claude-3-haiku-20240307");
        assert!(map.source_models().any(|m| m == "my-model"));
    }
}
