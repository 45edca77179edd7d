//! Provider selection from configuration.
//!
//! `anthropic` gets the native Messages API adapter; every other name is
//! treated as an OpenAI-compatible Chat Completions endpoint.

use std::sync::Arc;

use hintloop_config::AppConfig;
use hintloop_core::error::ProviderError;
use hintloop_core::provider::Provider;
use tracing::info;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Fails with [`ProviderError::NotConfigured`] when a hosted provider has
/// no API key; local servers (ollama, vllm, llama.cpp) run keyless.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.as_str();
    let entry = config.providers.get(name);
    let api_key = match config.provider_api_key() {
        Some(key) if !key.trim().is_empty() => key,
        _ if is_local(name) => String::new(),
        _ => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}'; set HINTLOOP_API_KEY or api_key in {}",
                AppConfig::config_path().display()
            )));
        }
    };
    let api_url = entry.and_then(|p| p.api_url.clone());

    let provider: Arc<dyn Provider> = if name == "anthropic" {
        let mut p = AnthropicProvider::new(api_key)?;
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let base_url = api_url.unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)?)
    };

    info!(provider = name, model = %config.provider_model(), "Provider ready");
    Ok(provider)
}

fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "anthropic" => "https://api.anthropic.com".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://openrouter.ai/api/v1".into(),
    }
}
