//! Runs the resolved rules for one statement and aggregates their issues.

use crate::config::EngineConfig;
use crate::error::{Result, SqlGenError};
use crate::extractor::Parameters;
use crate::template::{SqlTemplate, TemplateOptions};
use crate::tenant::TenantContext;
use crate::validation::registry::RuleRegistry;
use crate::validation::{SqlOperationType, ValidationContext, ValidationIssue, ValidationResult, ValidationRule};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Inputs of a single validation run.
#[derive(Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub sql: &'a str,
    pub parameters: &'a Parameters,
    pub template: Option<&'a SqlTemplate>,
    pub tenant: Option<&'a TenantContext>,
    pub cross_tenant_authorized: bool,
    /// Per-request overrides merged over the template's options
    pub options: Option<&'a TemplateOptions>,
    pub today: NaiveDate,
}

impl<'a> ValidationRequest<'a> {
    pub fn new(sql: &'a str, parameters: &'a Parameters, today: NaiveDate) -> Self {
        Self {
            sql,
            parameters,
            template: None,
            tenant: None,
            cross_tenant_authorized: false,
            options: None,
            today,
        }
    }

    pub fn with_template(mut self, template: &'a SqlTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_tenant(mut self, tenant: &'a TenantContext, cross_tenant_authorized: bool) -> Self {
        self.tenant = Some(tenant);
        self.cross_tenant_authorized = cross_tenant_authorized;
        self
    }

    pub fn with_options(mut self, options: &'a TemplateOptions) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Clone)]
pub struct ValidationEngine {
    registry: Arc<RuleRegistry>,
    config: Arc<EngineConfig>,
}

impl ValidationEngine {
    pub fn new(registry: Arc<RuleRegistry>, config: Arc<EngineConfig>) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn validate(&self, request: &ValidationRequest<'_>) -> ValidationResult {
        let (rules, merged) = self.plan(request);
        let ctx = self.context(request, &merged);
        let mut issues = Vec::new();
        for rule in rules.iter().filter(|r| r.applies_to(ctx.operation)) {
            issues.extend(run_rule(rule.as_ref(), &ctx));
        }
        ValidationResult::from_issues(issues)
    }

    /// Same as [`validate`](Self::validate), observing `cancel` before each rule.
    pub async fn validate_cancellable(
        &self,
        request: &ValidationRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        let (rules, merged) = self.plan(request);
        let ctx = self.context(request, &merged);
        let mut issues = Vec::new();
        for rule in rules.iter().filter(|r| r.applies_to(ctx.operation)) {
            if cancel.is_cancelled() {
                return Err(SqlGenError::Cancelled(format!("validation before rule {}", rule.name())));
            }
            issues.extend(run_rule(rule.as_ref(), &ctx));
            tokio::task::yield_now().await;
        }
        Ok(ValidationResult::from_issues(issues))
    }

    /// Rules to run and the effective template options.
    fn plan(&self, request: &ValidationRequest<'_>) -> (Vec<Arc<dyn ValidationRule>>, TemplateOptions) {
        let base = request.template.map(|t| t.options.clone()).unwrap_or_default();
        let merged = match request.options {
            Some(overrides) => TemplateOptions::builder().base(&base).merge(overrides).build(),
            None => base,
        };

        let mut set_names = self.config.default_rule_sets.clone();
        set_names.extend(merged.rule_sets().iter().cloned());
        if let Some(tenant) = request.tenant {
            set_names.extend(self.registry.tenant_rule_sets(&tenant.tenant_id));
        }
        (self.registry.resolve(&set_names), merged)
    }

    fn context<'a>(&'a self, request: &ValidationRequest<'a>, merged: &TemplateOptions) -> ValidationContext<'a> {
        let template_allows_scan = request.template.map(|t| t.allow_full_table_scan).unwrap_or(false);
        ValidationContext {
            sql: request.sql,
            parameters: request.parameters,
            template: request.template,
            tenant: request.tenant,
            cross_tenant_authorized: request.cross_tenant_authorized,
            operation: SqlOperationType::detect(request.sql),
            config: &self.config,
            max_limit: merged.max_limit.unwrap_or(self.config.max_result_limit),
            allow_full_table_scan: merged.allow_full_table_scan.unwrap_or(template_allows_scan),
            global_lookup: merged.global_lookup.unwrap_or(false),
            today: request.today,
        }
    }
}

fn run_rule(rule: &dyn ValidationRule, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
    let issues = rule.run(ctx);
    for issue in &issues {
        debug!(
            rule = %issue.rule_name,
            category = %issue.category,
            severity = ?issue.severity,
            parameter = issue.parameter_name.as_deref().unwrap_or(""),
            "Validation issue"
        );
    }
    issues
}
