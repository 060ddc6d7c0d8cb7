//! LLM integration for FitCoach.
//!
//! The completion service is any OpenAI-compatible chat-completions endpoint
//! (Groq by default). Callers depend only on the `LlmProvider` trait so tests
//! can swap in scripted providers.

mod openai_compat;
pub mod provider;

pub use openai_compat::ChatCompletionsProvider;
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::LlmError;

/// Groq's OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Model used when `FITCOACH_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` makes every completion fail with `AuthFailed`.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(LlmError::RequestFailed {
            provider: "openai-compatible".to_string(),
            reason: format!("Invalid base URL: {}", config.base_url),
        });
    }

    let provider = ChatCompletionsProvider::new(
        config.base_url.clone(),
        config.model.clone(),
        config.api_key.clone(),
    )
    .with_default_max_tokens(config.max_tokens);

    tracing::info!("Using {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // Auth failures only surface when a request is made.
        let config = LlmConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_create_provider_rejects_bad_url() {
        let config = LlmConfig {
            api_key: Some(SecretString::from("k")),
            base_url: "api.groq.com".to_string(),
            model: "m".to_string(),
            max_tokens: None,
        };
        assert!(create_provider(&config).is_err());
    }
}
