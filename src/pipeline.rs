//! Generation Pipeline
//!
//! Public entry points of the engine. A request moves through
//! `Selecting -> Extracting -> Generating -> Validating -> (Optimizing) -> Completed`
//! and stops at the first stage that fails. Expected failures come back as
//! unsuccessful results tagged with that stage; only contract violations
//! (blank tenant id, empty template id) panic.

use crate::audit::{AuditEvent, AuditEventKind, AuditSink, TracingAuditSink};
use crate::config::EngineConfig;
use crate::error::SqlGenError;
use crate::extractor::{merge_candidates, ParameterExtractor, Parameters, SynonymTable};
use crate::generator::{SqlGenerationResult, SqlGenerator};
use crate::optimizer::{QueryOptimizationResult, QueryOptimizer};
use crate::provider::{LexicalSimilarityProvider, SimilarityProvider};
use crate::template::{ParameterType, SqlTemplate, TemplateOptions, TemplateSelector, TemplateStore};
use crate::tenant::{CrossTenantAuthorizer, DenyCrossTenant, TenantContext};
use crate::validation::{
    IssueCategory, RuleRegistry, Severity, ValidationEngine, ValidationIssue, ValidationRequest, ValidationResult,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Tenant id used when rendering a template sample for validation.
const SAMPLE_TENANT: &str = "template-validation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Selecting,
    Extracting,
    Generating,
    Validating,
    Optimizing,
    Completed,
}

pub struct SqlGenerationEngine {
    config: Arc<EngineConfig>,
    store: Arc<TemplateStore>,
    provider: Arc<dyn SimilarityProvider>,
    authorizer: Arc<dyn CrossTenantAuthorizer>,
    audit: Arc<dyn AuditSink>,
    selector: TemplateSelector,
    extractor: ParameterExtractor,
    generator: SqlGenerator,
    validator: ValidationEngine,
    optimizer: QueryOptimizer,
    optimize_generated: bool,
    /// Fixed reference date; the current UTC date when unset
    today: Option<NaiveDate>,
}

impl SqlGenerationEngine {
    /// Engine with an empty template store, the built-in rules, the lexical
    /// similarity provider, cross-tenant access denied and tracing audit.
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let provider: Arc<dyn SimilarityProvider> = Arc::new(LexicalSimilarityProvider::new());
        let registry = Arc::new(RuleRegistry::with_default_rules());
        Self {
            selector: TemplateSelector::new(Arc::clone(&provider), config.similarity_threshold),
            extractor: ParameterExtractor::new(SynonymTable::default(), config.min_extraction_confidence),
            generator: SqlGenerator::new(Arc::clone(&config)),
            validator: ValidationEngine::new(registry, Arc::clone(&config)),
            optimizer: QueryOptimizer::new(config.complexity_threshold, config.max_result_limit),
            store: Arc::new(TemplateStore::new()),
            provider,
            authorizer: Arc::new(DenyCrossTenant),
            audit: Arc::new(TracingAuditSink),
            optimize_generated: false,
            today: None,
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<TemplateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.validator = ValidationEngine::new(registry, Arc::clone(&self.config));
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn SimilarityProvider>) -> Self {
        self.selector = TemplateSelector::new(Arc::clone(&provider), self.config.similarity_threshold);
        self.provider = provider;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn CrossTenantAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.extractor = ParameterExtractor::new(synonyms, self.config.min_extraction_confidence);
        self
    }

    pub fn with_optimizer(mut self, optimizer: QueryOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Run the optimizer on every statement that passes validation.
    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.optimize_generated = enabled;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        self.validator.registry()
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Select a template for `text`, extract its parameters and generate.
    pub async fn generate_from_query(
        &self,
        text: &str,
        tenant: &TenantContext,
        cancel: &CancellationToken,
    ) -> SqlGenerationResult {
        self.generate_from_query_with_threshold(text, tenant, self.config.similarity_threshold, cancel)
            .await
    }

    pub async fn generate_from_query_with_threshold(
        &self,
        text: &str,
        tenant: &TenantContext,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> SqlGenerationResult {
        assert!(!tenant.tenant_id.trim().is_empty(), "tenant id must not be blank");
        let request_id = Uuid::new_v4();
        info!(request_id = %request_id, tenant_id = %tenant.tenant_id, "Generating from query");

        if cancel.is_cancelled() {
            let e = SqlGenError::Cancelled("selection".to_string());
            return self.fail(request_id, tenant, PipelineStage::Selecting, e, None);
        }
        let selected = match self.selector.select_with_threshold(text, &self.store, threshold, cancel).await {
            Ok(selected) => selected,
            Err(e) => return self.fail(request_id, tenant, PipelineStage::Selecting, e, None),
        };
        let template = selected.template;
        let template_id = Some(template.id.clone());
        info!(request_id = %request_id, template_id = %template.id, score = selected.score, "Selected template");

        if cancel.is_cancelled() {
            let e = SqlGenError::Cancelled("extraction".to_string());
            return self.fail(request_id, tenant, PipelineStage::Extracting, e, template_id);
        }
        let from_provider = match self.provider.extract_parameters(text).await {
            Ok(candidates) => candidates,
            Err(e) => {
                let e = SqlGenError::ParameterExtractionFailed(e.to_string());
                return self.fail(request_id, tenant, PipelineStage::Extracting, e, template_id);
            }
        };
        let heuristics = self.extractor.extract(text, &template, self.today());
        let candidates = merge_candidates(from_provider, heuristics);
        let parameters = match self.extractor.bind(&template, candidates) {
            Ok(parameters) => parameters,
            Err(e) => return self.fail(request_id, tenant, PipelineStage::Extracting, e, template_id),
        };

        self.finish(request_id, &template, parameters, tenant, cancel).await
    }

    /// Generate from a named template and an explicit parameter dictionary.
    /// Selection and extraction are skipped.
    pub async fn generate_from_template(
        &self,
        template_id: &str,
        parameters: &Map<String, Value>,
        tenant: &TenantContext,
        cancel: &CancellationToken,
    ) -> SqlGenerationResult {
        assert!(!template_id.trim().is_empty(), "template id must not be empty");
        assert!(!tenant.tenant_id.trim().is_empty(), "tenant id must not be blank");
        let request_id = Uuid::new_v4();
        info!(request_id = %request_id, tenant_id = %tenant.tenant_id, template_id, "Generating from template");

        let Some(template) = self.store.get(template_id) else {
            let e = SqlGenError::TemplateNotFound(template_id.to_string());
            return self.fail(request_id, tenant, PipelineStage::Selecting, e, Some(template_id.to_string()));
        };
        if cancel.is_cancelled() {
            let e = SqlGenError::Cancelled("extraction".to_string());
            return self.fail(request_id, tenant, PipelineStage::Extracting, e, Some(template.id.clone()));
        }

        let mut bound = match self.extractor.bind_explicit(&template, parameters) {
            Ok(bound) => bound,
            Err(e) => return self.fail(request_id, tenant, PipelineStage::Extracting, e, Some(template.id.clone())),
        };
        // system values go to the generator, which decides whether they survive
        for (name, value) in parameters {
            let is_system = name.eq_ignore_ascii_case(&self.config.tenant_parameter)
                || template.parameter(name).map(|p| p.is_system_parameter).unwrap_or(false);
            if is_system {
                bound.insert(name.clone(), value.clone());
            }
        }

        self.finish(request_id, &template, bound, tenant, cancel).await
    }

    async fn finish(
        &self,
        request_id: Uuid,
        template: &SqlTemplate,
        parameters: Parameters,
        tenant: &TenantContext,
        cancel: &CancellationToken,
    ) -> SqlGenerationResult {
        let template_id = Some(template.id.clone());
        let cross_tenant_authorized = self.authorize_cross_tenant(tenant);

        if cancel.is_cancelled() {
            let e = SqlGenError::Cancelled("generation".to_string());
            return self.fail(request_id, tenant, PipelineStage::Generating, e, template_id);
        }
        let mut result = match self.generator.generate(template, parameters, tenant, cross_tenant_authorized) {
            Ok(result) => result,
            Err(e) => return self.fail(request_id, tenant, PipelineStage::Generating, e, template_id),
        };
        let sql = result.sql.clone().unwrap_or_default();

        let request = ValidationRequest::new(&sql, &result.parameters, self.today())
            .with_template(template)
            .with_tenant(tenant, cross_tenant_authorized);
        let validation = match self.validator.validate_cancellable(&request, cancel).await {
            Ok(validation) => validation,
            Err(e) => return self.fail(request_id, tenant, PipelineStage::Validating, e, template_id),
        };
        self.record_issues(request_id, Some(tenant), &validation);

        if let Some(error) = blocking_error(&validation) {
            warn!(request_id = %request_id, template_id = %template.id, code = error.code(), "Generated SQL failed validation");
            result.is_successful = false;
            result.error_message = Some(error.to_string());
            result.error_code = Some(error.code().to_string());
            result.validation_result = Some(validation);
            result.stage = PipelineStage::Validating;
            self.record_attempt(request_id, tenant, &result);
            return result;
        }
        result.validation_result = Some(validation);

        if self.optimize_generated {
            if cancel.is_cancelled() {
                let e = SqlGenError::Cancelled("optimization".to_string());
                return self.fail(request_id, tenant, PipelineStage::Optimizing, e, template_id);
            }
            result.stage = PipelineStage::Optimizing;
            let optimization = self.optimizer.optimize(&sql);
            self.record_optimization(request_id, Some(tenant.tenant_id.as_str()), &optimization);
            result.optimization = Some(optimization);
        }

        result.stage = PipelineStage::Completed;
        self.record_attempt(request_id, tenant, &result);
        result
    }

    /// Validate a statement with no template or tenant context.
    pub fn validate(&self, sql: &str, parameters: Option<&Parameters>) -> ValidationResult {
        self.validate_with_options(sql, parameters, None)
    }

    pub fn validate_with_options(
        &self,
        sql: &str,
        parameters: Option<&Parameters>,
        options: Option<&TemplateOptions>,
    ) -> ValidationResult {
        let empty = Parameters::new();
        let parameters = parameters.unwrap_or(&empty);
        let mut request = ValidationRequest::new(sql, parameters, self.today());
        if let Some(options) = options {
            request = request.with_options(options);
        }
        let result = self.validator.validate(&request);
        self.record_issues(Uuid::new_v4(), None, &result);
        result
    }

    /// Validate a statement on behalf of a tenant. Cross-tenant access is
    /// checked against the configured authorizer.
    pub fn validate_for_tenant(&self, sql: &str, parameters: &Parameters, tenant: &TenantContext) -> ValidationResult {
        assert!(!tenant.tenant_id.trim().is_empty(), "tenant id must not be blank");
        let authorized = self.authorize_cross_tenant(tenant);
        let request = ValidationRequest::new(sql, parameters, self.today()).with_tenant(tenant, authorized);
        let result = self.validator.validate(&request);
        self.record_issues(Uuid::new_v4(), Some(tenant), &result);
        result
    }

    pub fn optimize(&self, sql: &str) -> QueryOptimizationResult {
        let result = self.optimizer.optimize(sql);
        self.record_optimization(Uuid::new_v4(), None, &result);
        result
    }

    /// Validate a template and publish it. An existing id is published as a
    /// new version.
    pub fn add_template(&self, template: SqlTemplate) -> std::result::Result<Arc<SqlTemplate>, ValidationResult> {
        assert!(!template.id.trim().is_empty(), "template id must not be empty");
        let result = self.validate_template(&template);
        let request_id = Uuid::new_v4();
        self.record_issues(request_id, None, &result);

        if result.has_critical_issues() {
            warn!(template_id = %template.id, "Rejected template: {}", result.critical_summary());
            self.audit.record(AuditEvent::new(
                request_id,
                None,
                AuditEventKind::TemplateAdded {
                    template_id: template.id.clone(),
                    version: template.version,
                    accepted: false,
                },
            ));
            return Err(result);
        }

        let published = self.store.publish(template);
        self.audit.record(AuditEvent::new(
            request_id,
            None,
            AuditEventKind::TemplateAdded {
                template_id: published.id.clone(),
                version: published.version,
                accepted: true,
            },
        ));
        Ok(published)
    }

    /// Declaration checks plus the rule engine run over a sample rendering.
    pub fn validate_template(&self, template: &SqlTemplate) -> ValidationResult {
        let mut issues = Vec::new();
        for name in template.used_but_undeclared() {
            if name.eq_ignore_ascii_case(&self.config.tenant_parameter) {
                continue;
            }
            issues.push(
                ValidationIssue::new(
                    "UndeclaredPlaceholder",
                    IssueCategory::Syntax,
                    Severity::Critical,
                    format!("@{} has no parameter declaration", name),
                )
                .for_parameter(&name),
            );
        }
        for name in template.declared_but_unused() {
            issues.push(
                ValidationIssue::new(
                    "UnusedParameter",
                    IssueCategory::Business,
                    Severity::Warning,
                    format!("Parameter '{}' is declared but never used", name),
                )
                .for_parameter(&name),
            );
        }

        let tenant = TenantContext::new(SAMPLE_TENANT);
        let sample = self.sample_parameters(template);
        match self.generator.generate(template, sample, &tenant, false) {
            Ok(generated) => {
                let sql = generated.sql.unwrap_or_default();
                let request = ValidationRequest::new(&sql, &generated.parameters, self.today())
                    .with_template(template)
                    .with_tenant(&tenant, false);
                issues.extend(self.validator.validate(&request).issues);
            }
            Err(e) => issues.push(ValidationIssue::new(
                "TemplateRendering",
                IssueCategory::Syntax,
                Severity::Critical,
                e.to_string(),
            )),
        }
        ValidationResult::from_issues(issues)
    }

    fn sample_parameters(&self, template: &SqlTemplate) -> Parameters {
        let today = self.today();
        template
            .parameters
            .iter()
            .filter(|p| !p.is_system_parameter)
            .map(|p| {
                let value = p
                    .default_value
                    .clone()
                    .or_else(|| p.allowed_values.as_ref().and_then(|v| v.first().cloned()))
                    .unwrap_or_else(|| match p.param_type {
                        ParameterType::Integer => json!(1),
                        ParameterType::Decimal | ParameterType::Currency => json!(1.0),
                        ParameterType::Boolean => json!(true),
                        ParameterType::DateTime => json!(today.format("%Y-%m-%d").to_string()),
                        ParameterType::Guid => json!(Uuid::nil().to_string()),
                        ParameterType::Identifier => json!("SampleColumn"),
                        ParameterType::Email => json!("user@example.com"),
                        ParameterType::Phone => json!("5550100100"),
                        ParameterType::Url => json!("https://example.com"),
                        ParameterType::String | ParameterType::Enum => json!("sample"),
                    });
                (p.name.clone(), value)
            })
            .collect()
    }

    fn authorize_cross_tenant(&self, tenant: &TenantContext) -> bool {
        if !tenant.allow_cross_tenant {
            return false;
        }
        let authorized = self.authorizer.authorize(tenant);
        if !authorized {
            warn!(tenant_id = %tenant.tenant_id, "Cross-tenant access requested without authorization");
        }
        authorized
    }

    fn fail(
        &self,
        request_id: Uuid,
        tenant: &TenantContext,
        stage: PipelineStage,
        error: SqlGenError,
        template_id: Option<String>,
    ) -> SqlGenerationResult {
        warn!(request_id = %request_id, stage = ?stage, code = error.code(), "Generation failed: {}", error);
        let result = SqlGenerationResult::failure(stage, &error, template_id);
        self.record_attempt(request_id, tenant, &result);
        result
    }

    fn record_attempt(&self, request_id: Uuid, tenant: &TenantContext, result: &SqlGenerationResult) {
        self.audit.record(AuditEvent::new(
            request_id,
            Some(tenant.tenant_id.as_str()),
            AuditEventKind::GenerationAttempt {
                template_id: result.template_id.clone(),
                successful: result.is_successful,
                stage: format!("{:?}", result.stage),
                error_code: result.error_code.clone(),
            },
        ));
    }

    fn record_issues(&self, request_id: Uuid, tenant: Option<&TenantContext>, result: &ValidationResult) {
        let tenant_id = tenant.map(|t| t.tenant_id.as_str());
        for issue in &result.issues {
            self.audit.record(AuditEvent::for_issue(request_id, tenant_id, issue));
        }
    }

    fn record_optimization(&self, request_id: Uuid, tenant_id: Option<&str>, result: &QueryOptimizationResult) {
        self.audit.record(AuditEvent::new(
            request_id,
            tenant_id,
            AuditEventKind::OptimizationOutcome {
                optimized: result.is_optimized,
                complexity_score: result.complexity_score,
                estimated_improvement_percentage: result.estimated_improvement_percentage,
            },
        ));
    }
}

/// The error a critical issue maps to, by the category of the first one.
fn blocking_error(result: &ValidationResult) -> Option<SqlGenError> {
    let first = result.critical_issues().next()?;
    let summary = result.critical_summary();
    Some(match first.category {
        IssueCategory::Security => SqlGenError::SecurityViolation(summary),
        IssueCategory::TenantIsolation => SqlGenError::TenantIsolationViolation(summary),
        _ => SqlGenError::OperationPolicyViolation(summary),
    })
}
