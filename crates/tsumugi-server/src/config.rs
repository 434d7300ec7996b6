//! Server configuration read once from Shuttle secrets

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use shuttle_runtime::SecretStore;

use tsumugi::domain::{DEFAULT_CURRENCY, DEFAULT_MAX_HISTORY_TOKENS, DEFAULT_PRICE_MULTIPLIER};

use crate::adapters::openai::DEFAULT_EMBEDDING_MODEL;
use crate::application::{OrchestratorConfig, DEFAULT_TOP_K, DEFAULT_USAGE_MODEL};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_base_url: Option<String>,
    pub embedding_model: String,
    pub orchestrator: OrchestratorConfig,
    pub price_multiplier: f64,
    pub price_currency: String,
    pub file_search_default_top_k: usize,
}

impl ServerConfig {
    pub fn from_secrets(secrets: &SecretStore) -> anyhow::Result<Self> {
        Self::from_lookup(|key| secrets.get(key))
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let openai_api_key = get("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .context("OPENAI_API_KEY is required for chat and embeddings")?;

        let defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            max_iterations: parse_or(&get, "CHAT_MAX_ITERATIONS", defaults.max_iterations),
            max_history_tokens: parse_or(
                &get,
                "CHAT_MAX_HISTORY_TOKENS",
                DEFAULT_MAX_HISTORY_TOKENS,
            ),
            model_call_timeout: Duration::from_secs(parse_or(
                &get,
                "MODEL_CALL_TIMEOUT_SECS",
                defaults.model_call_timeout.as_secs(),
            )),
        };

        Ok(Self {
            openai_api_key,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_USAGE_MODEL.to_string()),
            openai_temperature: parse_or(&get, "OPENAI_TEMPERATURE", 0.7),
            openai_base_url: get("OPENAI_BASE_URL"),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            orchestrator,
            price_multiplier: parse_or(&get, "PRICE_MULTIPLIER", DEFAULT_PRICE_MULTIPLIER),
            price_currency: get("PRICE_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            file_search_default_top_k: parse_or(&get, "FILE_SEARCH_DEFAULT_TOP_K", DEFAULT_TOP_K),
        })
    }
}

/// Parse a numeric secret, keeping the default when it is absent or invalid
fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️  Invalid {} value {:?}, using {}", key, raw, default);
            default
        }),
    }
}
