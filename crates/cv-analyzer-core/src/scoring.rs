//! Hybrid retrieval scoring over embedded passages.
//!
//! Ranks [`TextPassage`]s against a query using two signals:
//!
//! - **semantic**: cosine similarity between the query embedding and the
//!   passage embedding;
//! - **lexical**: the fraction of distinct query tokens that occur in the
//!   passage (case-insensitive substring match).
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Validate that every passage embedding has the query's dimensionality.
//! 2. Tokenize the query once: lowercase, strip punctuation, dedupe.
//! 3. Per passage: `score = w × semantic + (1 − w) × lexical`.
//! 4. Stable sort by score (desc); equal scores keep passage order.
//! 5. Truncate to `limit`.
//!
//! The default weight `w = 0.7` favours semantic match while letting exact
//! keyword hits (rare proper nouns, certifications) break ties.

use thiserror::Error;

use crate::models::{ScoredPassage, TextPassage};

/// Default weight of the semantic component.
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.7;

/// Default number of passages returned by [`rank`].
pub const DEFAULT_RANK_LIMIT: usize = 6;

/// Contract violations detected before scoring.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("query embedding is empty")]
    EmptyQuery,

    #[error("passage {position} has embedding dimension {found}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },

    #[error("semantic weight must be within [0, 1], got {0}")]
    InvalidWeight(f64),
}

/// Retrieval tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    /// Weight `w` of the semantic score; the lexical score gets `1 − w`.
    pub semantic_weight: f64,
    /// Maximum passages to return.
    pub limit: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            limit: DEFAULT_RANK_LIMIT,
        }
    }
}

/// Rank passages with the default 0.7 / 0.3 weighting.
pub fn rank<'a>(
    query_embedding: &[f32],
    query_text: &str,
    passages: &'a [TextPassage],
    limit: usize,
) -> Result<Vec<ScoredPassage<'a>>, ScoreError> {
    rank_with(
        query_embedding,
        query_text,
        passages,
        RankParams {
            limit,
            ..RankParams::default()
        },
    )
}

/// Rank passages with explicit [`RankParams`].
pub fn rank_with<'a>(
    query_embedding: &[f32],
    query_text: &str,
    passages: &'a [TextPassage],
    params: RankParams,
) -> Result<Vec<ScoredPassage<'a>>, ScoreError> {
    if !(0.0..=1.0).contains(&params.semantic_weight) {
        return Err(ScoreError::InvalidWeight(params.semantic_weight));
    }
    if query_embedding.is_empty() {
        return Err(ScoreError::EmptyQuery);
    }
    for p in passages {
        if p.embedding.len() != query_embedding.len() {
            return Err(ScoreError::DimensionMismatch {
                position: p.position,
                expected: query_embedding.len(),
                found: p.embedding.len(),
            });
        }
    }

    let tokens = query_tokens(query_text);

    let mut scored: Vec<ScoredPassage<'a>> = passages
        .iter()
        .map(|p| {
            let semantic = cosine_similarity(query_embedding, &p.embedding);
            let lexical = lexical_score(&tokens, &p.content);
            ScoredPassage {
                passage: p,
                score: weighted_score(semantic, lexical, params.semantic_weight),
                semantic,
                lexical,
            }
        })
        .collect();

    // `sort_by` is stable, so ties keep their input order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(params.limit);

    Ok(scored)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal, or either vector has zero norm
/// - `-1.0` = opposite direction
///
/// Vectors of different lengths also yield `0.0`; [`rank`] rejects them
/// before this is reached.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // Accumulate in f64: f32 squares underflow or overflow at moderate magnitudes.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !sim.is_finite() {
        return 0.0;
    }
    sim.clamp(-1.0, 1.0)
}

/// Distinct lowercase query tokens with punctuation removed, in first-seen
/// order.
///
/// ```rust
/// use cv_analyzer_core::scoring::query_tokens;
///
/// assert_eq!(query_tokens("AWS, aws & C++!"), vec!["aws", "c"]);
/// ```
pub fn query_tokens(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    for word in cleaned.split_whitespace() {
        if !tokens.iter().any(|t| t == word) {
            tokens.push(word.to_string());
        }
    }
    tokens
}

/// Fraction of `tokens` that occur in `content` (case-insensitive).
///
/// Returns `0.0` when there are no tokens.
pub fn lexical_score(tokens: &[String], content: &str) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let matched = tokens.iter().filter(|t| content.contains(t.as_str())).count();
    matched as f64 / tokens.len() as f64
}

/// Hybrid score with the default 0.7 / 0.3 weighting.
pub fn hybrid_score(semantic: f64, lexical: f64) -> f64 {
    weighted_score(semantic, lexical, DEFAULT_SEMANTIC_WEIGHT)
}

fn weighted_score(semantic: f64, lexical: f64, semantic_weight: f64) -> f64 {
    semantic_weight * semantic + (1.0 - semantic_weight) * lexical
}
