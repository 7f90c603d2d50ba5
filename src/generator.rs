//! SQL Generator
//!
//! Binds a template to parameter values and produces a parameterized
//! statement. System parameters are always taken from the tenant context,
//! never from the supplied values. Identifier-typed parameters are the only
//! values spliced into the statement text, and only once they pass the
//! identifier safety checks.

use crate::config::EngineConfig;
use crate::error::{Result, SqlGenError};
use crate::extractor::{coercion, Parameters};
use crate::optimizer::QueryOptimizationResult;
use crate::pipeline::PipelineStage;
use crate::template::{placeholders_in, ParameterType, SqlTemplate};
use crate::tenant::TenantContext;
use crate::validation::rules::security::identifier_violations;
use crate::validation::{SqlOperationType, ValidationResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one generation request.
///
/// Callers must check `validation_result` for critical issues before the
/// statement reaches an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlGenerationResult {
    pub is_successful: bool,
    pub sql: Option<String>,
    pub parameters: Parameters,
    pub validation_result: Option<ValidationResult>,
    pub error_message: Option<String>,
    /// Stable error code, see [`SqlGenError::code`]
    pub error_code: Option<String>,
    pub template_id: Option<String>,
    pub operation: Option<SqlOperationType>,
    /// Advisory rewrite, when optimization ran
    pub optimization: Option<QueryOptimizationResult>,
    /// Stage reached; the failing stage when `is_successful` is false
    pub stage: PipelineStage,
}

impl SqlGenerationResult {
    pub fn failure(stage: PipelineStage, error: &SqlGenError, template_id: Option<String>) -> Self {
        Self {
            is_successful: false,
            sql: None,
            parameters: Parameters::new(),
            validation_result: None,
            error_message: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            template_id,
            operation: None,
            optimization: None,
            stage,
        }
    }

    /// Safe to hand to an executor.
    pub fn is_executable(&self) -> bool {
        self.is_successful
            && self.sql.is_some()
            && self
                .validation_result
                .as_ref()
                .map(|v| !v.has_critical_issues())
                .unwrap_or(false)
    }
}

pub struct SqlGenerator {
    config: Arc<EngineConfig>,
}

impl SqlGenerator {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Produce the statement for `template`.
    ///
    /// `parameters` are the bound caller values. A value supplied for the
    /// tenant parameter survives only when cross-tenant access was requested
    /// and authorized; every other system parameter is reset regardless.
    pub fn generate(
        &self,
        template: &SqlTemplate,
        mut parameters: Parameters,
        tenant: &TenantContext,
        cross_tenant_authorized: bool,
    ) -> Result<SqlGenerationResult> {
        self.bind_system_parameters(template, &mut parameters, tenant, cross_tenant_authorized)?;
        let sql = self.splice_identifiers(template, &mut parameters)?;

        // bind only what the statement references
        let referenced = placeholders_in(&sql);
        parameters.retain(|name, _| referenced.iter().any(|r| r == name));

        let operation = SqlOperationType::detect(&sql);
        info!(
            template_id = %template.id,
            tenant_id = %tenant.tenant_id,
            operation = %operation,
            parameter_count = parameters.len(),
            "Generated SQL"
        );

        Ok(SqlGenerationResult {
            is_successful: true,
            sql: Some(sql),
            parameters,
            validation_result: None,
            error_message: None,
            error_code: None,
            template_id: Some(template.id.clone()),
            operation: Some(operation),
            optimization: None,
            stage: PipelineStage::Generating,
        })
    }

    fn bind_system_parameters(
        &self,
        template: &SqlTemplate,
        parameters: &mut Parameters,
        tenant: &TenantContext,
        cross_tenant_authorized: bool,
    ) -> Result<()> {
        let tenant_param = self.config.tenant_parameter.as_str();
        let mut system: Vec<String> = template.system_parameters().map(|p| p.name.clone()).collect();
        for placeholder in template.placeholders() {
            if placeholder.eq_ignore_ascii_case(tenant_param) && !system.contains(&placeholder) {
                system.push(placeholder);
            }
        }

        for name in system {
            let supplied = parameters.remove(&name);
            if name.eq_ignore_ascii_case(tenant_param) {
                let keep_supplied = tenant.allow_cross_tenant && cross_tenant_authorized;
                let value = match supplied {
                    Some(value) if keep_supplied => {
                        info!(tenant_id = %tenant.tenant_id, parameter = %name, "Authorized cross-tenant binding");
                        value
                    }
                    Some(value) => {
                        if value.as_str() != Some(tenant.tenant_id.as_str()) {
                            warn!(
                                tenant_id = %tenant.tenant_id,
                                parameter = %name,
                                "Discarding supplied tenant value"
                            );
                        }
                        Value::String(tenant.tenant_id.clone())
                    }
                    None => Value::String(tenant.tenant_id.clone()),
                };
                parameters.insert(name, value);
                continue;
            }

            if supplied.is_some() {
                debug!(parameter = %name, "Discarding supplied value for system parameter");
            }
            let Some(declared) = template.parameter(&name) else { continue };
            match declared
                .default_value
                .as_ref()
                .and_then(|d| coercion::coerce(d, declared.param_type))
            {
                Some(value) => {
                    parameters.insert(name, value);
                }
                None if declared.required => {
                    return Err(SqlGenError::RequiredParameterMissing {
                        template_id: template.id.clone(),
                        missing: vec![name],
                    });
                }
                None => {}
            }
        }
        Ok(())
    }

    fn splice_identifiers(&self, template: &SqlTemplate, parameters: &mut Parameters) -> Result<String> {
        let mut sql = template.sql_template_text.clone();
        let identifiers = template
            .parameters
            .iter()
            .filter(|p| p.param_type == ParameterType::Identifier && !p.is_system_parameter);

        for param in identifiers {
            let Some(value) = parameters.remove(&param.name) else { continue };
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let violations = identifier_violations(&text);
            if !violations.is_empty() {
                warn!(template_id = %template.id, parameter = %param.name, "Rejected unsafe identifier");
                return Err(SqlGenError::SecurityViolation(format!(
                    "identifier parameter '{}' {}",
                    param.name,
                    violations.join(", ")
                )));
            }
            let token = Regex::new(&format!(r"@{}\b", regex::escape(&param.name)))
                .map_err(|e| SqlGenError::SecurityViolation(format!("invalid parameter name '{}': {}", param.name, e)))?;
            sql = token.replace_all(&sql, text.as_str()).into_owned();
        }
        Ok(sql)
    }
}
