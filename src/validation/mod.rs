//! Validation Rule Engine
//!
//! A registry of named rules grouped into composable rule sets. Every
//! applicable rule runs independently and its issues are concatenated; the
//! statement is valid iff no issue is `Critical`.
//!
//! Validation is a pure function of its request: the registry is read-only
//! during a run and nothing is cached between calls.

pub mod analysis;
pub mod engine;
pub mod registry;
pub mod rules;
pub mod types;

use crate::config::EngineConfig;
use crate::extractor::Parameters;
use crate::template::{ParameterType, SqlTemplate};
use crate::tenant::TenantContext;
use chrono::NaiveDate;

pub use engine::{ValidationEngine, ValidationRequest};
pub use registry::{RuleRegistry, RuleSet, DEFAULT_RULE_SET};
pub use types::{IssueCategory, Severity, SqlOperationType, ValidationIssue, ValidationResult};

/// Everything a rule may look at. Built once per validation run.
pub struct ValidationContext<'a> {
    pub sql: &'a str,
    pub parameters: &'a Parameters,
    pub template: Option<&'a SqlTemplate>,
    pub tenant: Option<&'a TenantContext>,
    /// Outcome of the cross-tenant authorization check, evaluated before validation
    pub cross_tenant_authorized: bool,
    pub operation: SqlOperationType,
    pub config: &'a EngineConfig,
    /// Effective LIMIT ceiling after template options are merged
    pub max_limit: u64,
    pub allow_full_table_scan: bool,
    /// SELECT over shared reference data, exempt from tenant scoping when
    /// nothing in it refers to the tenant
    pub global_lookup: bool,
    /// Reference date for date sanity checks
    pub today: NaiveDate,
}

impl<'a> ValidationContext<'a> {
    /// Declared type of a parameter, when a template is present.
    pub fn declared_type(&self, name: &str) -> Option<ParameterType> {
        self.template
            .and_then(|t| t.parameter(name))
            .map(|p| p.param_type)
    }

    /// System parameters: declared as such by the template, plus the
    /// configured tenant parameter.
    pub fn is_system_parameter(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case(&self.config.tenant_parameter) {
            return true;
        }
        self.template
            .and_then(|t| t.parameter(name))
            .map(|p| p.is_system_parameter)
            .unwrap_or(false)
    }
}

/// A named validation rule.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> IssueCategory;

    fn default_severity(&self) -> Severity;

    /// Operation-specific rules narrow this.
    fn applies_to(&self, _operation: SqlOperationType) -> bool {
        true
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue>;

    /// Issue pre-filled with this rule's name, category and default severity.
    fn issue(&self, description: String) -> ValidationIssue {
        ValidationIssue::new(self.name(), self.category(), self.default_severity(), description)
    }
}

/// Builds a `ValidationContext` for exercising a single rule.
#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use serde_json::Value;

    pub struct RuleHarness {
        pub config: EngineConfig,
        pub parameters: Parameters,
        pub template: Option<SqlTemplate>,
        pub tenant: Option<TenantContext>,
        pub cross_tenant_authorized: bool,
        pub global_lookup: bool,
    }

    impl RuleHarness {
        pub fn new() -> Self {
            Self {
                config: EngineConfig::default(),
                parameters: Parameters::new(),
                template: None,
                tenant: None,
                cross_tenant_authorized: false,
                global_lookup: false,
            }
        }

        pub fn param(mut self, name: &str, value: Value) -> Self {
            self.parameters.insert(name.to_string(), value);
            self
        }

        pub fn template(mut self, template: SqlTemplate) -> Self {
            self.template = Some(template);
            self
        }

        pub fn tenant(mut self, tenant: TenantContext) -> Self {
            self.tenant = Some(tenant);
            self
        }

        pub fn global_lookup(mut self) -> Self {
            self.global_lookup = true;
            self
        }

        pub fn run(&self, rule: &dyn ValidationRule, sql: &str) -> Vec<ValidationIssue> {
            let ctx = ValidationContext {
                sql,
                parameters: &self.parameters,
                template: self.template.as_ref(),
                tenant: self.tenant.as_ref(),
                cross_tenant_authorized: self.cross_tenant_authorized,
                operation: SqlOperationType::detect(sql),
                config: &self.config,
                max_limit: self.config.max_result_limit,
                allow_full_table_scan: false,
                global_lookup: self.global_lookup,
                today: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            };
            rule.run(&ctx)
        }
    }
}
