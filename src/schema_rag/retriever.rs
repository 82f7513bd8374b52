//! Schema RAG Retriever
//!
//! Retrieves relevant schema elements for a question using vector search.

use crate::error::{AstroError, Result};
use crate::schema_rag::embedder::{cosine_similarity, Embedder, Embedding};
use crate::schema_rag::index::{SchemaElement, SchemaIndex};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// One retrieved element with its similarity to the question.
#[derive(Debug, Clone)]
pub struct ScoredElement {
    pub element: Arc<SchemaElement>,
    pub score: f32,
}

/// Display form of a retrieved element, without the vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub name: String,
    pub description: String,
    pub score: f32,
}

/// Top-K schema context for one question, scores non-increasing.
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    entries: Vec<ScoredElement>,
}

impl RetrievedContext {
    pub fn entries(&self) -> &[ScoredElement] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> Vec<ContextEntry> {
        self.entries
            .iter()
            .map(|e| ContextEntry {
                name: e.element.qualified_name(),
                description: e.element.description.clone(),
                score: e.score,
            })
            .collect()
    }

    /// Distinct tables in rank order of their first appearance.
    pub fn tables(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.element.table.as_str()) {
                seen.push(entry.element.table.as_str());
            }
        }
        seen
    }
}

pub struct SchemaRetriever {
    index: Arc<SchemaIndex>,
    embedder: Arc<dyn Embedder>,
}

impl SchemaRetriever {
    /// Fails with `EmbeddingModelMismatch` when the embedder cannot produce
    /// vectors comparable with the index.
    pub fn new(index: Arc<SchemaIndex>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(AstroError::EmbeddingModelMismatch(format!(
                "question embedder '{}' has {} dimensions, schema index '{}' has {}",
                embedder.model_id(),
                embedder.dimension(),
                index.model(),
                index.dimension()
            )));
        }
        if embedder.model_id() != index.model() {
            return Err(AstroError::EmbeddingModelMismatch(format!(
                "question embedder is '{}', schema index was built with '{}'",
                embedder.model_id(),
                index.model()
            )));
        }
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &SchemaIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Top `k` elements by cosine similarity; ties keep catalog order.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievedContext> {
        if self.index.is_empty() || k == 0 {
            return Ok(RetrievedContext::default());
        }
        let query = self.embed_question(question).await?;
        Ok(self.rank(&query, k))
    }

    /// Like [`retrieve`](Self::retrieve) but drops elements below `min_score`.
    /// When nothing clears the threshold the single best element is kept.
    pub async fn retrieve_with_threshold(
        &self,
        question: &str,
        k: usize,
        min_score: f32,
    ) -> Result<RetrievedContext> {
        let ranked = self.retrieve(question, k).await?;
        if ranked.is_empty() {
            return Ok(ranked);
        }

        let best = ranked.entries[0].clone();
        let entries: Vec<ScoredElement> = ranked
            .entries
            .into_iter()
            .filter(|e| e.score >= min_score)
            .collect();

        if entries.is_empty() {
            info!(
                threshold = min_score,
                best = %best.element.qualified_name(),
                score = best.score,
                "No schema element met the threshold, falling back to best match"
            );
            return Ok(RetrievedContext { entries: vec![best] });
        }
        Ok(RetrievedContext { entries })
    }

    /// Rank a precomputed question embedding against the index.
    pub fn rank(&self, query: &[f32], k: usize) -> RetrievedContext {
        let mut scored: Vec<ScoredElement> = self
            .index
            .lookup_all()
            .iter()
            .map(|element| ScoredElement {
                element: Arc::clone(element),
                score: cosine_similarity(query, &element.embedding),
            })
            .collect();

        // sort_by is stable, so equal scores stay in catalog order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        for entry in &scored {
            debug!(element = %entry.element.qualified_name(), score = entry.score, "Retrieved");
        }
        RetrievedContext { entries: scored }
    }

    async fn embed_question(&self, question: &str) -> Result<Embedding> {
        let embedding = self.embedder.embed(question).await?;
        if embedding.len() != self.index.dimension() {
            return Err(AstroError::EmbeddingModelMismatch(format!(
                "question embedding has {} dimensions, schema index has {}",
                embedding.len(),
                self.index.dimension()
            )));
        }
        Ok(embedding)
    }
}
