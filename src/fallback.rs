//! Fallback Policy
//!
//! Caller-side handling of template selection misses, layered over
//! [`SqlGenerationEngine`]. The engine itself never retries.

use crate::pipeline::SqlGenerationEngine;
use crate::generator::SqlGenerationResult;
use crate::tenant::TenantContext;
use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct FallbackPolicy {
    /// Retry selection once with this threshold
    pub lowered_threshold: Option<f64>,
    /// Then generate from this template with no parameters
    pub fallback_template_id: Option<String>,
}

impl FallbackPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lowered_threshold(mut self, threshold: f64) -> Self {
        self.lowered_threshold = Some(threshold);
        self
    }

    pub fn with_fallback_template(mut self, template_id: impl Into<String>) -> Self {
        self.fallback_template_id = Some(template_id.into());
        self
    }

    pub async fn generate(
        &self,
        engine: &SqlGenerationEngine,
        text: &str,
        tenant: &TenantContext,
        cancel: &CancellationToken,
    ) -> SqlGenerationResult {
        let first = engine.generate_from_query(text, tenant, cancel).await;
        if !is_selection_miss(&first) || text.trim().is_empty() {
            return first;
        }

        if let Some(threshold) = self.lowered_threshold {
            info!(threshold, "Retrying template selection with lowered threshold");
            let retry = engine
                .generate_from_query_with_threshold(text, tenant, threshold, cancel)
                .await;
            if !is_selection_miss(&retry) {
                return retry;
            }
        }

        match &self.fallback_template_id {
            Some(template_id) => {
                info!(template_id = %template_id, "Falling back to default template");
                engine
                    .generate_from_template(template_id, &Map::new(), tenant, cancel)
                    .await
            }
            None => first,
        }
    }
}

fn is_selection_miss(result: &SqlGenerationResult) -> bool {
    !result.is_successful && result.error_code.as_deref() == Some("TemplateNotFound")
}
