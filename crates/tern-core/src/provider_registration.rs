//! Provider registration logic for the Agent.
//!
//! Builds the [`ProviderRegistry`] for the configured endpoint family.

use anyhow::{Context, Result};
use tern_config::{Config, ProviderKind};
use tern_providers::{AnthropicProvider, OpenAIProvider, ProviderRegistry};
use tracing::debug;

/// Register the provider named by `config.provider.kind` as the default.
pub fn register_providers(config: &Config) -> Result<ProviderRegistry> {
    let provider = &config.provider;
    let api_key = provider.resolved_api_key().with_context(|| {
        format!(
            "No API key for the {} provider; set provider.api_key in the config file or export {}",
            provider.kind.as_str(),
            match provider.kind {
                ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
                ProviderKind::OpenAI => "OPENAI_API_KEY",
            }
        )
    })?;

    let mut registry = ProviderRegistry::new();
    match provider.kind {
        ProviderKind::Anthropic => {
            registry.register(AnthropicProvider::new(
                api_key,
                Some(provider.model.clone()),
                provider.base_url.clone(),
                Some(provider.max_tokens),
                provider.temperature,
            )?);
        }
        ProviderKind::OpenAI => {
            registry.register(OpenAIProvider::new(
                api_key,
                Some(provider.model.clone()),
                provider.base_url.clone(),
                Some(provider.max_tokens),
                provider.temperature,
            )?);
        }
    }
    debug!(
        "Registered {} provider with model {}",
        provider.kind.as_str(),
        provider.model
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_configured_kind() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::OpenAI;
        config.provider.api_key = Some("sk-test".to_string());
        config.provider.model = "gpt-test".to_string();

        let registry = register_providers(&config).unwrap();
        let provider = registry.get(None).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-test");
    }

    #[test]
    fn test_explicit_key_wins() {
        let mut config = Config::default();
        config.provider.api_key = Some("key".to_string());
        let registry = register_providers(&config).unwrap();
        assert_eq!(registry.get(None).unwrap().name(), "anthropic");
    }
}
