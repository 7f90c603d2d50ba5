//! Tenant isolation rules.
//!
//! A tenant-scoped statement must filter on the system tenant parameter and
//! that parameter must be bound to the authenticated tenant. Removing the
//! scope is accepted only when the tenant context allows it and the
//! cross-tenant authorization check has already passed.

use crate::template::placeholders_in;
use crate::validation::analysis::{
    compound_branches, filter_placeholders, where_has_top_level_or, where_predicates,
};
use crate::validation::{
    IssueCategory, Severity, SqlOperationType, ValidationContext, ValidationIssue, ValidationRule,
};
use regex::Regex;
use serde_json::Value;

fn tenant_parameter<'a>(ctx: &'a ValidationContext<'_>) -> &'a str {
    &ctx.config.tenant_parameter
}

fn mentions_tenant_column(ctx: &ValidationContext<'_>) -> bool {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(&ctx.config.tenant_column));
    Regex::new(&pattern).map(|re| re.is_match(ctx.sql)).unwrap_or(false)
}

fn references_tenant_parameter(ctx: &ValidationContext<'_>) -> bool {
    placeholders_in(ctx.sql)
        .iter()
        .any(|p| p.eq_ignore_ascii_case(tenant_parameter(ctx)))
}

/// Every branch of the statement has a top-level `column = @param`
/// conjunct and no top-level OR in its WHERE clause.
fn has_tenant_equality(ctx: &ValidationContext<'_>) -> bool {
    let column = format!(
        r#"(?:[A-Za-z_][A-Za-z0-9_]*\.)?[\["`]?{}[\]"`]?"#,
        regex::escape(&ctx.config.tenant_column)
    );
    let param = format!(r"@{}\b", regex::escape(tenant_parameter(ctx)));
    let pattern = format!(
        r"(?i)^\(*\s*(?:{c}\s*=\s*{p}|{p}\s*=\s*{c})\s*\)*$",
        c = column,
        p = param
    );
    let Ok(equality) = Regex::new(&pattern) else {
        return false;
    };

    let branches = compound_branches(ctx.sql);
    !branches.is_empty()
        && branches.iter().all(|branch| {
            !where_has_top_level_or(branch)
                && where_predicates(branch)
                    .iter()
                    .any(|predicate| is_equality_conjunct(predicate, &equality))
        })
}

/// Matches the equality directly, or inside a parenthesized group of
/// AND-ed predicates.
fn is_equality_conjunct(predicate: &str, equality: &Regex) -> bool {
    let predicate = predicate.trim();
    if equality.is_match(predicate) {
        return true;
    }
    match predicate.strip_prefix('(').and_then(|p| p.strip_suffix(')')) {
        Some(inner) => {
            let group = format!("SELECT 1 WHERE {}", inner);
            !where_has_top_level_or(&group)
                && where_predicates(&group)
                    .iter()
                    .any(|p| is_equality_conjunct(p, equality))
        }
        None => false,
    }
}

/// Whether tenant scoping is required for this statement: always when a
/// tenant is present, otherwise when the statement or template refers to
/// the tenant parameter or column. A SELECT marked as a global lookup is
/// exempt as long as it makes no reference to the tenant at all.
pub fn is_tenant_scoped(ctx: &ValidationContext<'_>) -> bool {
    let template_declares = ctx
        .template
        .map(|t| {
            t.system_parameters()
                .any(|p| p.name.eq_ignore_ascii_case(tenant_parameter(ctx)))
        })
        .unwrap_or(false);
    let refers_to_tenant = template_declares || references_tenant_parameter(ctx) || mentions_tenant_column(ctx);
    if ctx.global_lookup && ctx.operation == SqlOperationType::Select && !refers_to_tenant {
        return false;
    }
    refers_to_tenant || ctx.tenant.is_some()
}

/// Cross-tenant access is legitimate only with both the context flag and a
/// passed authorization check.
pub fn cross_tenant_granted(ctx: &ValidationContext<'_>) -> bool {
    ctx.tenant.map(|t| t.allow_cross_tenant).unwrap_or(false) && ctx.cross_tenant_authorized
}

pub struct TenantFilterRule;

impl ValidationRule for TenantFilterRule {
    fn name(&self) -> &str {
        "MissingTenantFilter"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::TenantIsolation
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation != SqlOperationType::Unknown
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        if !is_tenant_scoped(ctx) {
            return Vec::new();
        }
        let mut issues = Vec::new();
        let param = tenant_parameter(ctx);

        let literal = format!(
            r"(?i)\b{}\s*=\s*(?:'|N'|\d)",
            regex::escape(&ctx.config.tenant_column)
        );
        if Regex::new(&literal).map(|re| re.is_match(ctx.sql)).unwrap_or(false) {
            issues.push(
                self.issue(format!("{} is compared against a literal", ctx.config.tenant_column))
                    .with_recommendation(format!("Compare against @{}", param)),
            );
        }

        let scoped = match ctx.operation {
            SqlOperationType::Insert => references_tenant_parameter(ctx),
            _ => has_tenant_equality(ctx),
        };
        if scoped {
            return issues;
        }

        let requested_cross_tenant = ctx.tenant.map(|t| t.allow_cross_tenant).unwrap_or(false);
        if cross_tenant_granted(ctx) {
            let mut issue = self.issue("Tenant scoping removed under authorized cross-tenant access".to_string());
            issue.severity = Severity::Info;
            issues.push(issue);
        } else if requested_cross_tenant {
            issues.push(
                self.issue("Tenant scoping removed but cross-tenant access was not authorized".to_string())
                    .with_recommendation("Run the cross-tenant authorization check or keep the tenant filter"),
            );
        } else if ctx.operation != SqlOperationType::Insert && references_tenant_parameter(ctx) {
            issues.push(
                self.issue(format!(
                    "@{} does not restrict every row to one tenant; it must appear as {} = @{} joined by AND in each branch",
                    param, ctx.config.tenant_column, param
                ))
                .with_recommendation(format!(
                    "Remove OR and negated comparisons around {} = @{}",
                    ctx.config.tenant_column, param
                )),
            );
        } else {
            issues.push(
                self.issue(format!("Statement does not filter on @{}", param))
                    .with_recommendation(format!(
                        "Add {} = @{} to the statement",
                        ctx.config.tenant_column, param
                    )),
            );
        }
        issues
    }
}

/// The tenant parameter must carry the authenticated tenant id.
pub struct TenantBindingRule;

impl ValidationRule for TenantBindingRule {
    fn name(&self) -> &str {
        "TenantMismatch"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::TenantIsolation
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let param = tenant_parameter(ctx);
        let bound = ctx
            .parameters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(param))
            .map(|(_, value)| value);

        match (bound, ctx.tenant) {
            (None, _) if references_tenant_parameter(ctx) => {
                issues.push(
                    self.issue(format!("@{} is referenced but not bound", param))
                        .for_parameter(param),
                );
            }
            (Some(value), Some(tenant)) if !cross_tenant_granted(ctx) => {
                if value.as_str() != Some(tenant.tenant_id.as_str()) {
                    issues.push(
                        self.issue(format!("@{} is not bound to the authenticated tenant", param))
                            .for_parameter(param)
                            .with_value(display(value)),
                    );
                }
            }
            _ => {}
        }

        // tenant-like names that are not the system parameter
        for (name, value) in ctx.parameters {
            let lower = name.to_lowercase();
            if lower.contains("tenant") && !name.eq_ignore_ascii_case(param) {
                let mut issue = self
                    .issue(format!("Parameter '{}' looks like a tenant identifier but is not the system tenant parameter", name))
                    .for_parameter(name)
                    .with_value(display(value));
                issue.severity = Severity::Warning;
                issues.push(issue);
            }
        }
        issues
    }
}

/// UPDATE or DELETE with no filtering parameter at all.
pub struct FullTableMutationRule;

impl ValidationRule for FullTableMutationRule {
    fn name(&self) -> &str {
        "FullTableMutation"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::TenantIsolation
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        matches!(operation, SqlOperationType::Update | SqlOperationType::Delete)
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        if filter_placeholders(ctx.sql).is_empty() {
            vec![self
                .issue(format!("{} has no filtering parameter and would affect every row", ctx.operation))
                .with_recommendation("Filter on a bound key parameter")]
        } else {
            Vec::new()
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantContext;
    use crate::validation::harness::RuleHarness;
    use serde_json::json;

    fn for_tenant() -> RuleHarness {
        RuleHarness::new()
            .tenant(TenantContext::new("T1"))
            .param("tenantId", json!("T1"))
            .param("id", json!(1))
    }

    #[test]
    fn test_tenant_equality_accepted() {
        let harness = for_tenant();
        for sql in [
            "SELECT Id FROM Orders WHERE TenantId = @tenantId AND Id = @id",
            "SELECT o.Id FROM Orders o WHERE o.Id = @id AND @tenantId = o.TenantId",
            "SELECT Id FROM Orders WHERE ([TenantId] = @tenantId AND Id = @id)",
            "UPDATE Orders SET Status = @status WHERE Id = @id AND TenantId = @tenantId",
        ] {
            assert!(harness.run(&TenantFilterRule, sql).is_empty(), "{}", sql);
        }
    }

    #[test]
    fn test_negated_tenant_comparison_rejected() {
        let issues = for_tenant().run(&TenantFilterRule, "SELECT Id FROM Orders WHERE TenantId <> @tenantId");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(issues[0].description.contains("does not restrict every row"));
    }

    #[test]
    fn test_tenant_filter_or_bypass_rejected() {
        let harness = for_tenant();
        for sql in [
            "SELECT Id FROM Orders WHERE TenantId = @tenantId OR Id = @id",
            "SELECT Id FROM Orders WHERE (TenantId = @tenantId OR Id = @id)",
            "DELETE FROM Orders WHERE Id = @id OR TenantId = @tenantId",
        ] {
            let issues = harness.run(&TenantFilterRule, sql);
            assert!(issues.iter().any(|i| i.severity == Severity::Critical), "{}", sql);
        }
    }

    #[test]
    fn test_every_union_branch_needs_tenant_filter() {
        let harness = for_tenant();
        let leaky = "SELECT Id FROM Orders WHERE TenantId = @tenantId UNION ALL SELECT Id FROM Orders WHERE Id = @id";
        assert_eq!(harness.run(&TenantFilterRule, leaky).len(), 1);

        let scoped = "SELECT Id FROM Orders WHERE TenantId = @tenantId \
                      UNION SELECT Id FROM Archive WHERE TenantId = @tenantId AND Id = @id";
        assert!(harness.run(&TenantFilterRule, scoped).is_empty());
    }

    #[test]
    fn test_global_lookup_exempt_only_without_tenant_reference() {
        let harness = RuleHarness::new().tenant(TenantContext::new("T1")).global_lookup();
        assert!(harness.run(&TenantFilterRule, "SELECT Code FROM Currencies").is_empty());
        assert_eq!(
            harness.run(&TenantFilterRule, "SELECT Code FROM Currencies WHERE TenantId IS NOT NULL").len(),
            1
        );
        assert_eq!(harness.run(&TenantFilterRule, "DELETE FROM Currencies").len(), 1);

        let without_flag = RuleHarness::new().tenant(TenantContext::new("T1"));
        assert_eq!(without_flag.run(&TenantFilterRule, "SELECT Code FROM Currencies").len(), 1);
    }

    #[test]
    fn test_tenant_like_parameter_warns() {
        let issues = for_tenant()
            .param("otherTenant", json!("T2"))
            .run(&TenantBindingRule, "SELECT Id FROM Orders WHERE TenantId = @tenantId AND Owner = @otherTenant");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].parameter_name.as_deref(), Some("otherTenant"));
    }

    #[test]
    fn test_unbound_tenant_parameter() {
        let issues = RuleHarness::new().run(&TenantBindingRule, "SELECT Id FROM Orders WHERE TenantId = @tenantId");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
    }
}
