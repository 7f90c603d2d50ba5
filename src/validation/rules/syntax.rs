//! Syntax rules: the statement must be a single supported statement that a
//! SQL parser accepts.

use crate::validation::{IssueCategory, Severity, SqlOperationType, ValidationContext, ValidationIssue, ValidationRule};
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::dialect::{Dialect, GenericDialect, MsSqlDialect};
use sqlparser::parser::Parser;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"@[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

/// Empty statements and anything not led by SELECT, INSERT, UPDATE, DELETE or WITH.
pub struct StatementKeywordRule;

impl ValidationRule for StatementKeywordRule {
    fn name(&self) -> &str {
        "UnsupportedStatement"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Syntax
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        if ctx.sql.trim().is_empty() {
            return vec![self.issue("Statement is empty".to_string())];
        }
        if ctx.operation == SqlOperationType::Unknown {
            let keyword: String = ctx
                .sql
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .chars()
                .take(32)
                .collect();
            return vec![self
                .issue("Statement does not start with SELECT, INSERT, UPDATE, DELETE or WITH".to_string())
                .with_value(keyword)];
        }
        Vec::new()
    }
}

/// Parses the statement with placeholders replaced by literals, trying the
/// generic dialect and then T-SQL. Failing both, or yielding more than one
/// statement, is critical.
pub struct ParseabilityRule;

impl ParseabilityRule {
    fn parse(sql: &str) -> std::result::Result<usize, String> {
        let dialects: [&dyn Dialect; 2] = [&GenericDialect {}, &MsSqlDialect {}];
        let mut first_error = None;
        for dialect in dialects {
            match Parser::parse_sql(dialect, sql) {
                Ok(statements) => return Ok(statements.len()),
                Err(e) => {
                    first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }
        Err(first_error.unwrap_or_default())
    }
}

impl ValidationRule for ParseabilityRule {
    fn name(&self) -> &str {
        "ParseFailure"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Syntax
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn applies_to(&self, operation: SqlOperationType) -> bool {
        operation != SqlOperationType::Unknown
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let literal_sql = PLACEHOLDER.replace_all(ctx.sql, "0");
        match Self::parse(&literal_sql) {
            Ok(count) if count > 1 => vec![self.issue(format!("Text contains {} statements", count))],
            Ok(_) => Vec::new(),
            Err(error) => vec![self
                .issue(format!("Statement could not be parsed: {}", error))
                .with_recommendation("Check the template text for syntax errors")],
        }
    }
}
