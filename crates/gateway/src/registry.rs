//! Named model registry for the chat endpoint.
//!
//! Each entry is a factory that produces a fresh [`TextGenerator`] per
//! request, so no state leaks between concurrent calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use unillm_agent::TextGenerator;
use unillm_config::AppConfig;
use unillm_core::error::{Error, Result};
use unillm_providers::ProviderRouter;

type GeneratorFactory = Arc<dyn Fn() -> TextGenerator + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<String, GeneratorFactory>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> TextGenerator + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a preconfigured generator; each request gets a clone.
    pub fn register_generator(&mut self, name: impl Into<String>, generator: TextGenerator) {
        self.register(name, move || generator.clone());
    }

    pub fn resolve(&self, name: &str) -> Result<TextGenerator> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnresolvableModel {
                model: name.to_string(),
            })
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the registry from `[[server.models]]`. With no entries, the
    /// default model is exposed under its own name.
    pub fn from_config(config: &AppConfig, providers: &ProviderRouter) -> Result<Self> {
        let mut registry = Self::new();

        if config.server.models.is_empty() {
            let provider = providers
                .get_or_default(None)
                .map_err(|e| Error::Config {
                    message: e.to_string(),
                })?;
            let generator = TextGenerator::new(provider, config.default_model.clone())
                .with_temperature(config.default_temperature)
                .with_max_tokens(config.default_max_tokens);
            registry.register_generator(config.default_model.clone(), generator);
            return Ok(registry);
        }

        for entry in &config.server.models {
            let provider = providers
                .get_or_default(entry.provider.as_deref())
                .map_err(|e| Error::Config {
                    message: format!("server model '{}': {e}", entry.name),
                })?;
            let model = entry
                .model
                .clone()
                .unwrap_or_else(|| config.default_model.clone());

            let mut generator = TextGenerator::new(provider, model)
                .with_max_steps(entry.max_steps)
                .with_max_tokens(entry.max_tokens.unwrap_or(config.default_max_tokens));
            if let Some(prompt) = &entry.system_prompt {
                generator = generator.with_system_prompt(prompt.clone());
            }
            if let Some(temperature) = entry.temperature {
                generator = generator.with_temperature(temperature);
            }
            registry.register_generator(entry.name.clone(), generator);
        }

        Ok(registry)
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unillm_config::ServerModelConfig;
    use unillm_providers::build_from_config;

    fn server_model(name: &str, provider: Option<&str>) -> ServerModelConfig {
        ServerModelConfig {
            name: name.into(),
            provider: provider.map(Into::into),
            model: Some("gpt-4o".into()),
            system_prompt: Some("You are Nyx.".into()),
            max_steps: 3,
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn unregistered_model_is_unresolvable() {
        let registry = ModelRegistry::new();
        let err = registry.resolve("unregistered").err().unwrap();
        assert!(matches!(err, Error::UnresolvableModel { .. }));
        assert!(err.to_string().contains("unregistered"));
    }

    #[test]
    fn default_model_exposed_without_entries() {
        let config = AppConfig::default();
        let providers = build_from_config(&config).unwrap();
        let registry = ModelRegistry::from_config(&config, &providers).unwrap();

        assert_eq!(registry.names(), ["gpt-4o-mini"]);
        let generator = registry.resolve("gpt-4o-mini").unwrap();
        assert_eq!(generator.model(), "gpt-4o-mini");
        assert_eq!(generator.provider_name(), "openai");
    }

    #[test]
    fn entries_from_config() {
        let mut config = AppConfig::default();
        config.server.models = vec![server_model("nyx", None), server_model("helper", None)];
        let providers = build_from_config(&config).unwrap();
        let registry = ModelRegistry::from_config(&config, &providers).unwrap();

        assert_eq!(registry.names(), ["helper", "nyx"]);
        assert_eq!(registry.resolve("nyx").unwrap().model(), "gpt-4o");
    }

    #[test]
    fn entry_with_missing_provider_is_a_config_error() {
        let mut config = AppConfig::default();
        config.server.models = vec![server_model("nyx", Some("nowhere"))];
        let providers = build_from_config(&config).unwrap();
        let err = ModelRegistry::from_config(&config, &providers).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("nyx"));
    }
}
