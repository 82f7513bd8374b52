//! Configuration
//!
//! Process configuration is read once (environment + `.env`) and handed to the
//! components as plain values. The correction agent only ever sees an
//! [`AgentConfig`].

use crate::error::{AstroError, Result};
use crate::verifier::{EmptyResultPolicy, DEFAULT_EMPTY_RESULT_CONFIDENCE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_TOP_N_RESULTS: u32 = 10;
pub const DEFAULT_MIN_SCORE: f32 = 0.35;
pub const DEFAULT_SKYSERVER_URL: &str = "https://skyserver.sdss.org/dr16/en/tools/search/x_sql.aspx";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Which embedder backs the retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    OpenAi,
    Hash,
}

impl FromStr for EmbeddingProvider {
    type Err = AstroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "hash" => Ok(EmbeddingProvider::Hash),
            other => Err(AstroError::Config(format!(
                "unknown embedding provider '{}' (expected openai or hash)",
                other
            ))),
        }
    }
}

/// Per-call timeouts for every suspending boundary of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub generation_ms: u64,
    pub execution_ms: u64,
    pub embedding_ms: u64,
}

impl Timeouts {
    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }

    pub fn execution(&self) -> Duration {
        Duration::from_millis(self.execution_ms)
    }

    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            generation_ms: 60_000,
            execution_ms: 60_000,
            embedding_ms: 30_000,
        }
    }
}

/// Settings that govern a single run of the correction agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub top_k: usize,
    /// Upper bound on attempts per run (attempts are numbered `1..=max_retries`).
    pub max_retries: u32,
    pub top_n_results: u32,
    pub min_score: Option<f32>,
    pub timeouts: Timeouts,
    pub empty_result_policy: EmptyResultPolicy,
    /// Judge confidence needed before an empty result is sent back for repair.
    pub empty_result_confidence: f32,
}

impl AgentConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(AstroError::Config(
                "max_retries must allow at least one attempt".to_string(),
            ));
        }
        if self.top_n_results == 0 {
            return Err(AstroError::Config("top_n_results must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.empty_result_confidence) {
            return Err(AstroError::Config(format!(
                "empty_result_confidence {} is outside [0, 1]",
                self.empty_result_confidence
            )));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_retries: DEFAULT_MAX_RETRIES,
            top_n_results: DEFAULT_TOP_N_RESULTS,
            min_score: Some(DEFAULT_MIN_SCORE),
            timeouts: Timeouts::default(),
            empty_result_policy: EmptyResultPolicy::default(),
            empty_result_confidence: DEFAULT_EMPTY_RESULT_CONFIDENCE,
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub catalog_path: PathBuf,
    pub index_path: PathBuf,
    pub skyserver_url: String,
    pub agent: AgentConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_provider: EmbeddingProvider::OpenAi,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            catalog_path: PathBuf::from("sdss_schema_dr16.json"),
            index_path: PathBuf::from("sdss_schema_index.json"),
            skyserver_url: DEFAULT_SKYSERVER_URL.to_string(),
            agent: AgentConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        config.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            config.chat_model = strip_provider_prefix(&model);
        }
        if let Some(provider) = lookup("ASTRO_EMBEDDING_PROVIDER") {
            config.embedding_provider = provider.parse()?;
        }
        if let Some(model) = lookup("ASTRO_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = parse_var(&lookup, "ASTRO_EMBEDDING_DIM")? {
            config.embedding_dim = dim;
        }
        if let Some(path) = lookup("ASTRO_CATALOG_PATH") {
            config.catalog_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("ASTRO_INDEX_PATH") {
            config.index_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("ASTRO_SKYSERVER_URL") {
            config.skyserver_url = url;
        }
        if let Some(top_k) = parse_var(&lookup, "ASTRO_TOP_K")? {
            config.agent.top_k = top_k;
        }
        if let Some(max_retries) = parse_var(&lookup, "ASTRO_MAX_RETRIES")? {
            config.agent.max_retries = max_retries;
        }
        if let Some(top_n) = parse_var(&lookup, "ASTRO_TOP_N")? {
            config.agent.top_n_results = top_n;
        }
        if let Some(min_score) = parse_var::<f32, _>(&lookup, "ASTRO_MIN_SCORE")? {
            config.agent.min_score = if min_score <= 0.0 { None } else { Some(min_score) };
        }
        if let Some(policy) = lookup("ASTRO_EMPTY_RESULT_POLICY") {
            config.agent.empty_result_policy = policy.parse()?;
        }

        config.agent.validate()?;
        Ok(config)
    }
}

/// `openai/gpt-3.5-turbo` -> `gpt-3.5-turbo`
fn strip_provider_prefix(model: &str) -> String {
    model.rsplit('/').next().unwrap_or(model).to_string()
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AstroError::Config(format!("{}='{}': {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_original_constants() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.agent.top_n_results, 10);
        assert_eq!(config.agent.max_retries, 2);
        assert_eq!(config.agent.min_score, Some(0.35));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_model_prefix_is_stripped() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("OPENAI_MODEL", "openai/gpt-4o-mini")])).unwrap();
        assert_eq!(config.chat_model, "gpt-4o-mini");
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = AppConfig::from_lookup(lookup_from(&[("ASTRO_TOP_K", "three")])).unwrap_err();
        assert!(matches!(err, AstroError::Config(_)));
        assert!(err.to_string().contains("ASTRO_TOP_K"));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("ASTRO_MAX_RETRIES", "0")])).unwrap_err();
        assert!(matches!(err, AstroError::Config(_)));
    }

    #[test]
    fn test_embedding_provider_and_policy() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("ASTRO_EMBEDDING_PROVIDER", "hash"),
            ("ASTRO_EMBEDDING_DIM", "256"),
            ("ASTRO_EMPTY_RESULT_POLICY", "accept"),
        ]))
        .unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hash);
        assert_eq!(config.embedding_dim, 256);
        assert_eq!(config.agent.empty_result_policy, EmptyResultPolicy::Accept);
    }
}
