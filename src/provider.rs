//! Similarity Provider
//!
//! Narrow contract to the embedding/similarity collaborator, plus an offline
//! lexical implementation used when no embedding service is configured.

use crate::error::Result;
use crate::extractor::ExtractedParameter;
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait SimilarityProvider: Send + Sync {
    /// One score in `[0, 1]` per example, in the same order.
    async fn similarity(&self, text: &str, examples: &[String]) -> Result<Vec<f64>>;

    /// Model-side parameter extraction. An empty result lets the heuristic
    /// extractor do all the work.
    async fn extract_parameters(&self, text: &str) -> Result<Vec<ExtractedParameter>>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "me", "my", "of", "for", "from", "in", "on", "to", "with", "all", "please",
    "is", "are", "what", "which",
];

/// Token-overlap and edit-distance similarity over lowercased text.
#[derive(Debug, Default, Clone)]
pub struct LexicalSimilarityProvider;

impl LexicalSimilarityProvider {
    pub fn new() -> Self {
        Self
    }

    fn tokens(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
            .map(|t| t.to_string())
            .collect()
    }

    /// Fraction of the example's content words found in the query, blended
    /// with Jaccard overlap and whole-string edit similarity.
    pub fn score(text: &str, example: &str) -> f64 {
        let query = Self::tokens(text);
        let sample = Self::tokens(example);
        if query.is_empty() || sample.is_empty() {
            return 0.0;
        }

        let shared = query.intersection(&sample).count() as f64;
        let containment = shared / sample.len() as f64;
        let jaccard = shared / query.union(&sample).count() as f64;
        let overlap = 0.8 * containment + 0.2 * jaccard;

        let edit = strsim::normalized_levenshtein(
            &text.trim().to_lowercase(),
            &example.trim().to_lowercase(),
        );

        overlap.max(edit).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl SimilarityProvider for LexicalSimilarityProvider {
    async fn similarity(&self, text: &str, examples: &[String]) -> Result<Vec<f64>> {
        Ok(examples.iter().map(|e| Self::score(text, e)).collect())
    }

    async fn extract_parameters(&self, _text: &str) -> Result<Vec<ExtractedParameter>> {
        Ok(Vec::new())
    }
}
