use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig};
use crate::errors::{AndroidUseError, AndroidUseResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    /// Kept for model/temperature lookups (does not need to be mutable after init).
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> AndroidUseResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            AndroidUseError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    pub fn set_active(&mut self, name: String) -> AndroidUseResult<()> {
        if self.providers.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(AndroidUseError::Config(format!(
                "Provider '{name}' not registered"
            )))
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Provider plus call settings for the active config.toml entry.
    pub fn active_call(&self) -> AndroidUseResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let provider = self.get_active()?;
        let cfg = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|entry| CallConfig {
                model: entry.model.clone(),
                temperature: entry.temperature,
                ..CallConfig::default()
            })
            .unwrap_or_default();
        tracing::debug!(provider = %self.active, model = %cfg.model, "resolved call config");
        Ok((provider, cfg))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `ANDROID_USE_<ID>_API_KEY`,
    /// falling back to the key stored in config.toml.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.llm.active_provider.clone(),
            llm_config: config.llm.clone(),
        };
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("ANDROID_USE_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider =
                OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEntry;

    fn config_with_provider(id: &str, model: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.active_provider = id.to_string();
        config.llm.providers.insert(
            id.to_string(),
            ProviderEntry {
                display_name: id.to_string(),
                api_base: "https://api.example.com/v1".into(),
                model: model.into(),
                temperature: 0.3,
                api_key: Some("k".into()),
            },
        );
        config
    }

    #[test]
    fn from_config_registers_active_provider() {
        let registry = ProviderRegistry::from_config(&config_with_provider("openai", "gpt-4o"));
        assert!(registry.get_active().is_ok());
        assert_eq!(registry.list_names(), vec!["openai".to_string()]);
    }

    #[test]
    fn active_call_uses_entry_model_and_temperature() {
        let registry = ProviderRegistry::from_config(&config_with_provider("openai", "gpt-4o"));
        let (_, cfg) = registry.active_call().unwrap();
        assert_eq!(cfg.model, "gpt-4o");
        assert!((cfg.temperature - 0.3).abs() < f64::EPSILON);
        assert!(cfg.json_response);
    }

    #[test]
    fn missing_active_provider_is_a_config_error() {
        let registry = ProviderRegistry::from_config(&AppConfig::default());
        assert!(registry.get_active().is_err());
    }
}
