//! Provider router — selects the correct LLM provider based on config.
//!
//! Handles provider creation and lookup by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use unillm_config::AppConfig;
use unillm_core::error::ProviderError;
use unillm_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::voyageai::VoyageAiProvider;

/// Named providers plus the one used when no name is given.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Look up `name`, or the default provider when `None`.
    pub fn get_or_default(&self, name: Option<&str>) -> Result<Arc<dyn Provider>, ProviderError> {
        let name = name.unwrap_or(&self.default_provider);
        self.get(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("provider '{name}' is not configured")))
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ProviderError> {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        let provider = build_provider(name, provider_config.api_url.as_deref(), &api_key)?;
        router.register(name.clone(), provider);
    }

    // Ensure the default and embedding providers exist (even if not explicitly configured)
    for name in [&config.default_provider, &config.embeddings.provider] {
        if router.get(name).is_none() {
            let api_key = config.api_key.clone().unwrap_or_default();
            let provider = build_provider(name, None, &api_key)?;
            router.register(name.clone(), provider);
        }
    }

    debug!(providers = ?router.list(), default = %router.default_provider, "Built provider router");
    Ok(router)
}

fn build_provider(
    name: &str,
    api_url: Option<&str>,
    api_key: &str,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match name {
        "anthropic" => {
            let p = AnthropicProvider::new(api_key)?;
            Arc::new(match api_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        "voyageai" => {
            let p = VoyageAiProvider::new(api_key)?;
            Arc::new(match api_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        _ => {
            let base_url = match api_url {
                Some(url) => url.to_string(),
                None => default_base_url(name).ok_or_else(|| {
                    ProviderError::NotConfigured(format!(
                        "provider '{name}' needs an api_url in its config section"
                    ))
                })?,
            };
            Arc::new(OpenAiCompatProvider::new(name, &base_url, api_key)?)
        }
    };
    Ok(provider)
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> Option<String> {
    let url = match provider_name {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "mistral" => "https://api.mistral.ai/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "together" => "https://api.together.xyz/v1",
        "fireworks" => "https://api.fireworks.ai/inference/v1",
        _ => return None,
    };
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unillm_config::ProviderConfig;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openrouter");
        let provider = Arc::new(OpenAiCompatProvider::openrouter("sk-test").unwrap());
        router.register("openrouter", provider);

        assert!(router.get("openrouter").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
        assert!(router.get_or_default(None).is_ok());
        assert!(matches!(
            router.get_or_default(Some("nonexistent")),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").unwrap().contains("openrouter.ai"));
        assert!(default_base_url("openai").unwrap().contains("api.openai.com"));
        assert!(default_base_url("ollama").unwrap().contains("localhost:11434"));
        assert!(default_base_url("mystery").is_none());
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.default().unwrap().name(), "openai");
        assert_eq!(router.list(), ["openai"]);
    }

    #[test]
    fn build_named_providers() {
        let mut config = AppConfig {
            default_provider: "anthropic".into(),
            api_key: Some("shared".into()),
            ..AppConfig::default()
        };
        config.embeddings.provider = "voyageai".into();
        config.providers.insert("voyageai".into(), ProviderConfig::default());
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                api_url: Some("http://localhost:8000/v1".into()),
                ..ProviderConfig::default()
            },
        );

        let router = build_from_config(&config).unwrap();
        assert_eq!(router.list(), ["anthropic", "local", "voyageai"]);
        assert_eq!(router.default().unwrap().name(), "anthropic");
        assert_eq!(router.get("local").unwrap().name(), "local");
    }

    #[test]
    fn unknown_provider_without_url_is_rejected() {
        let mut config = AppConfig::default();
        config.providers.insert("mystery".into(), ProviderConfig::default());
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
