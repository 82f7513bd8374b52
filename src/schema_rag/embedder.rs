//! Schema Embedder
//!
//! Embeds schema text and questions. The same embedder (same model identity,
//! same dimensionality) must be used to build the index and to query it.

use crate::error::{AstroError, Result};
use async_trait::async_trait;
use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity of the embedding model, recorded in the index.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Embedding client using the OpenAI embeddings API
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AstroError::Config(format!("cannot build embedding HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AstroError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AstroError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AstroError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        let values = response_json["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| AstroError::Embedding("No embedding vector in response".to_string()))?;
        let embedding = parse_vector(values)?;

        if embedding.len() != self.dimension {
            return Err(AstroError::EmbeddingModelMismatch(format!(
                "model '{}' returned {} dimensions, configured for {}",
                self.model,
                embedding.len(),
                self.dimension
            )));
        }

        Ok(embedding)
    }
}

/// Every component must be numeric; a malformed payload is not a model mismatch.
fn parse_vector(values: &[serde_json::Value]) -> Result<Embedding> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                AstroError::Embedding(format!(
                    "Malformed embedding response: component {} is not a number: {}",
                    i, v
                ))
            })
        })
        .collect()
}

// Changing the seeds or the tokenisation changes every vector: bump HASH_EMBEDDER_VERSION.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;
const HASH_EMBEDDER_VERSION: &str = "v1";

/// Deterministic feature-hashing embedder that needs no network access.
///
/// Tokens are lowercased alphanumeric runs plus character trigrams of each
/// token, so `magnitude` and `mag` still share some mass.
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hash-sip13-{}-{}", HASH_EMBEDDER_VERSION, dimension),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        let h = hasher.finish();
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        ((h % self.dimension as u64) as usize, sign)
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let (idx, sign) = self.bucket(&token);
            vector[idx] += sign * 1.0;

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    let (idx, sign) = self.bucket(&format!("#{}", gram));
                    vector[idx] += sign * 0.5;
                }
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_sync(text))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
