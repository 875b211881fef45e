//! Passage selection for long documents.
//!
//! When retrieval is enabled, the extracted document text is chunked, every
//! chunk and the job query are embedded, and only the top-ranked passages
//! are sent to the model in place of the full text.

use tracing::debug;

use cv_analyzer_core::chunk::{chunk_text, normalize_whitespace};
use cv_analyzer_core::models::TextPassage;
use cv_analyzer_core::prompt::render_passages;
use cv_analyzer_core::scoring::{rank_with, RankParams};

use crate::config::Config;
use crate::error::AnalysisError;
use crate::inference::{InferenceClient, InferenceError};

/// Chunking and ranking parameters for one retrieval pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub semantic_weight: f64,
    pub limit: usize,
}

impl RetrievalSettings {
    /// Settings from `[chunking]` and `[retrieval]`, or `None` when
    /// retrieval is disabled.
    pub fn from_config(config: &Config) -> Option<Self> {
        config.retrieval.enabled.then(|| Self {
            chunk_size: config.chunking.size,
            chunk_overlap: config.chunking.overlap,
            semantic_weight: config.retrieval.semantic_weight,
            limit: config.retrieval.limit,
        })
    }
}

/// Reduce `text` to the passages most relevant to `query`, joined in
/// document order.
///
/// Documents that already fit in `limit` chunks are returned whole
/// (normalized) without calling the embedding backend.
pub async fn select_passages(
    client: &dyn InferenceClient,
    text: &str,
    query: &str,
    settings: &RetrievalSettings,
) -> Result<String, AnalysisError> {
    let chunks = chunk_text(text, settings.chunk_size, settings.chunk_overlap);
    if chunks.len() <= settings.limit {
        debug!(chunks = chunks.len(), "document fits retrieval limit; using full text");
        return Ok(normalize_whitespace(text));
    }

    let vectors = client.embed_batch(&chunks).await?;
    if vectors.len() != chunks.len() {
        return Err(InferenceError::MalformedResponse(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        ))
        .into());
    }
    let query_vector = client.embed(query).await?;

    let passages: Vec<TextPassage> = chunks
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(position, (content, embedding))| TextPassage {
            position,
            content,
            embedding,
        })
        .collect();

    let ranked = rank_with(
        &query_vector,
        query,
        &passages,
        RankParams {
            semantic_weight: settings.semantic_weight,
            limit: settings.limit,
        },
    )?;

    debug!(
        passages = passages.len(),
        selected = ranked.len(),
        top_score = ranked.first().map(|s| s.score).unwrap_or(0.0),
        "selected passages"
    );

    Ok(render_passages(&ranked))
}
