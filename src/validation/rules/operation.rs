//! Operation-specific rules, keyed by the statement's leading keyword.
//!
//! "Filter parameters" here exclude system parameters: a statement filtered
//! only by tenant still touches every row the tenant owns.

use crate::template::placeholders_in;
use crate::validation::analysis::{filter_placeholders, row_limit, set_placeholders};
use crate::validation::{
    IssueCategory, Severity, SqlOperationType, ValidationContext, ValidationIssue, ValidationRule,
};

fn user_filters(ctx: &ValidationContext<'_>) -> Vec<String> {
    filter_placeholders(ctx.sql)
        .into_iter()
        .filter(|p| !ctx.is_system_parameter(p))
        .collect()
}

pub struct FullTableScanRule;

impl ValidationRule for FullTableScanRule {
    fn name(&self) -> &str {
        "FullTableScan"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Performance
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Select
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        if ctx.allow_full_table_scan || !user_filters(ctx).is_empty() {
            return Vec::new();
        }
        vec![self
            .issue("SELECT has no filter parameters".to_string())
            .with_recommendation("Add a filter or mark the template allowFullTableScan")]
    }
}

pub struct ExcessiveLimitRule;

impl ValidationRule for ExcessiveLimitRule {
    fn name(&self) -> &str {
        "ExcessiveLimit"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Performance
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Select
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        match row_limit(ctx.sql, ctx.parameters) {
            Some(limit) if limit > ctx.max_limit => vec![self
                .issue(format!("Row limit {} exceeds the maximum of {}", limit, ctx.max_limit))
                .with_value(limit.to_string())
                .with_recommendation(format!("Use LIMIT {} or paginate", ctx.max_limit))],
            _ => Vec::new(),
        }
    }
}

pub struct InsertDataRule;

impl ValidationRule for InsertDataRule {
    fn name(&self) -> &str {
        "InsertWithoutData"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Insert
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let carries_data = placeholders_in(ctx.sql)
            .iter()
            .any(|p| !ctx.is_system_parameter(p));
        if carries_data {
            Vec::new()
        } else {
            vec![self.issue("INSERT has no data-carrying parameters".to_string())]
        }
    }
}

pub struct UpdateFilterRule;

impl ValidationRule for UpdateFilterRule {
    fn name(&self) -> &str {
        "UnfilteredUpdate"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Update
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        if user_filters(ctx).is_empty() {
            vec![self
                .issue("UPDATE has no filter parameters".to_string())
                .with_recommendation("Filter on a bound key parameter")]
        } else {
            Vec::new()
        }
    }
}

pub struct UpdateValuesRule;

impl ValidationRule for UpdateValuesRule {
    fn name(&self) -> &str {
        "UpdateWithoutValues"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Update
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let values: Vec<String> = set_placeholders(ctx.sql)
            .into_iter()
            .filter(|p| !ctx.is_system_parameter(p))
            .collect();
        if values.is_empty() {
            vec![self.issue("UPDATE sets no parameterized values".to_string())]
        } else {
            Vec::new()
        }
    }
}

pub struct DeleteFilterRule;

impl ValidationRule for DeleteFilterRule {
    fn name(&self) -> &str {
        "UnfilteredDelete"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Delete
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        if user_filters(ctx).is_empty() {
            vec![self
                .issue("DELETE has no filter parameters".to_string())
                .with_recommendation("Delete by primary key")]
        } else {
            Vec::new()
        }
    }
}

pub struct DeleteKeyRule;

impl ValidationRule for DeleteKeyRule {
    fn name(&self) -> &str {
        "NonKeyDelete"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation == SqlOperationType::Delete
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let filters = user_filters(ctx);
        if filters.is_empty() || filters.iter().any(|f| ctx.config.is_primary_key_name(f)) {
            return Vec::new();
        }
        vec![self
            .issue(format!("DELETE filters on {} rather than a primary key", filters.join(", ")))
            .with_recommendation("Delete by primary key")]
    }
}
