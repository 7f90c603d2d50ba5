//! Template Selector
//!
//! Resolves a natural-language question to the template whose intent
//! examples it most resembles.

use crate::error::{Result, SqlGenError};
use crate::provider::SimilarityProvider;
use crate::template::model::SqlTemplate;
use crate::template::store::TemplateStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A template chosen for a question, with the example that matched.
#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template: Arc<SqlTemplate>,
    pub score: f64,
    pub matched_example: String,
}

pub struct TemplateSelector {
    provider: Arc<dyn SimilarityProvider>,
    threshold: f64,
}

impl TemplateSelector {
    pub fn new(provider: Arc<dyn SimilarityProvider>, threshold: f64) -> Self {
        Self { provider, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Highest-scoring template above the threshold. Equal scores prefer the
    /// longer (more specific) example, then the lower template id.
    pub async fn select(
        &self,
        text: &str,
        store: &TemplateStore,
        cancel: &CancellationToken,
    ) -> Result<TemplateMatch> {
        self.select_with_threshold(text, store, self.threshold, cancel).await
    }

    pub async fn select_with_threshold(
        &self,
        text: &str,
        store: &TemplateStore,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<TemplateMatch> {
        if text.trim().is_empty() {
            return Err(SqlGenError::TemplateNotFound("query text is empty".to_string()));
        }

        let mut best: Option<TemplateMatch> = None;
        let mut discarded = 0usize;

        for template in store.list() {
            if cancel.is_cancelled() {
                return Err(SqlGenError::Cancelled("template selection".to_string()));
            }
            if template.intent_mapping.is_empty() {
                continue;
            }

            let scores = self
                .provider
                .similarity(text, &template.intent_mapping)
                .await
                .map_err(|e| SqlGenError::TemplateNotFound(format!("similarity provider failed: {}", e)))?;

            if scores.len() != template.intent_mapping.len() {
                return Err(SqlGenError::TemplateNotFound(format!(
                    "similarity provider returned {} scores for {} examples",
                    scores.len(),
                    template.intent_mapping.len()
                )));
            }

            for (example, score) in template.intent_mapping.iter().zip(scores) {
                debug!(template_id = %template.id, example = %example, score, "Scored intent example");
                if !score.is_finite() {
                    warn!(template_id = %template.id, example = %example, "Discarding non-finite similarity score");
                    discarded += 1;
                    continue;
                }
                let candidate = TemplateMatch {
                    template: Arc::clone(&template),
                    score,
                    matched_example: example.clone(),
                };
                if best.as_ref().map(|b| is_better(&candidate, b)).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(found) if found.score >= threshold => Ok(found),
            Some(found) => Err(SqlGenError::TemplateNotFound(format!(
                "best match '{}' scored {:.2}, below threshold {:.2}",
                found.template.id, found.score, threshold
            ))),
            None if discarded > 0 => Err(SqlGenError::TemplateNotFound(format!(
                "similarity provider returned no usable score ({} discarded)",
                discarded
            ))),
            None => Err(SqlGenError::TemplateNotFound(
                "no templates with intent examples are registered".to_string(),
            )),
        }
    }
}

const SCORE_EPSILON: f64 = 1e-9;

fn is_better(candidate: &TemplateMatch, current: &TemplateMatch) -> bool {
    if (candidate.score - current.score).abs() > SCORE_EPSILON {
        return candidate.score > current.score;
    }
    let (a, b) = (candidate.matched_example.len(), current.matched_example.len());
    if a != b {
        return a > b;
    }
    candidate.template.id < current.template.id
}
