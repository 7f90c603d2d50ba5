//! Security rules: injection patterns in statement text, values spliced in
//! as literals, and identifier-typed parameters.

use crate::template::ParameterType;
use crate::validation::{IssueCategory, Severity, ValidationContext, ValidationIssue, ValidationRule};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

lazy_static! {
    /// (pattern, description, severity) checked against statement text
    static ref STATEMENT_PATTERNS: Vec<(Regex, &'static str, Severity)> = vec![
        (Regex::new(r";\s*\S").unwrap(), "stacked statement after ';'", Severity::Critical),
        (Regex::new(r"--").unwrap(), "line comment marker '--'", Severity::Critical),
        (Regex::new(r"/\*|\*/").unwrap(), "block comment marker", Severity::Critical),
        (Regex::new(r"(?i)\bOR\s+'?1'?\s*=\s*'?1'?").unwrap(), "tautology 'OR 1=1'", Severity::Critical),
        (Regex::new(r"(?i)\bOR\s+'[^']*'\s*=\s*'[^']*'").unwrap(), "string tautology", Severity::Critical),
        (Regex::new(r"(?i)\bOR\s+TRUE\b").unwrap(), "tautology 'OR TRUE'", Severity::Critical),
        (Regex::new(r"(?i)\b(?:DROP|TRUNCATE|ALTER|CREATE)\s+(?:TABLE|DATABASE|SCHEMA|USER|LOGIN|INDEX|VIEW|PROCEDURE|FUNCTION|ROLE|TRIGGER)\b").unwrap(), "DDL statement", Severity::Critical),
        (Regex::new(r"(?i)\b(?:GRANT|REVOKE)\b").unwrap(), "privilege statement", Severity::Critical),
        (Regex::new(r"(?i)\bEXEC(?:UTE)?\s*(?:\(|\s+(?:sp_|xp_)|\s+@)").unwrap(), "dynamic execution", Severity::Critical),
        (Regex::new(r"(?i)\bxp_cmdshell\b").unwrap(), "shell execution", Severity::Critical),
        (Regex::new(r"(?i)\bWAITFOR\s+DELAY\b|\bSLEEP\s*\(|\bPG_SLEEP\s*\(|\bBENCHMARK\s*\(").unwrap(), "time-based probe", Severity::Critical),
        (Regex::new(r"(?i)\bINTO\s+(?:OUT|DUMP)FILE\b|\bLOAD_FILE\s*\(").unwrap(), "file access", Severity::Critical),
        (Regex::new(r"(?i)\bUNION\s+(?:ALL\s+)?SELECT\b").unwrap(), "UNION SELECT", Severity::Warning),
        (Regex::new(r"(?i)\bINFORMATION_SCHEMA\b|\bSYS\.(?:OBJECTS|TABLES|COLUMNS)\b|\bPG_CATALOG\b").unwrap(), "catalog access", Severity::Warning),
    ];

    /// Shapes that make a bound value suspicious even though it cannot alter the statement
    static ref VALUE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)'\s*(?:OR|AND)\s+").unwrap(),
        Regex::new(r"(?i)'\s*;").unwrap(),
        Regex::new(r"(?i);\s*(?:DROP|DELETE|INSERT|UPDATE|ALTER|CREATE|TRUNCATE|EXEC)\b").unwrap(),
        Regex::new(r"(?i)\bUNION\s+(?:ALL\s+)?SELECT\b").unwrap(),
        Regex::new(r"--|/\*").unwrap(),
        Regex::new(r"(?i)\bOR\s+'?1'?\s*=\s*'?1").unwrap(),
    ];

    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();

    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CHECK",
        "COLUMN", "CONSTRAINT", "CONVERT", "CREATE", "CROSS", "CURRENT", "DATABASE", "DECLARE",
        "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXCEPT", "EXEC", "EXECUTE",
        "EXISTS", "FETCH", "FOREIGN", "FROM", "FULL", "FUNCTION", "GRANT", "GROUP", "HAVING", "IN",
        "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT",
        "MERGE", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "PROCEDURE",
        "REFERENCES", "REVOKE", "RIGHT", "ROLE", "SCHEMA", "SELECT", "SET", "SHUTDOWN", "TABLE",
        "THEN", "TOP", "TRIGGER", "TRUNCATE", "UNION", "UNIQUE", "UPDATE", "USER", "VALUES", "VIEW",
        "WHEN", "WHERE", "WITH",
    ]
    .into_iter()
    .collect();
}

const IDENTIFIER_NAME_HINTS: &[&str] = &[
    "table", "column", "schema", "orderby", "sortby", "sortcolumn", "sortfield", "groupby", "fieldname",
];

/// Parameters used as identifiers: declared `Identifier`, or named like one.
pub fn is_identifier_parameter(ctx: &ValidationContext<'_>, name: &str) -> bool {
    if let Some(declared) = ctx.declared_type(name) {
        return declared == ParameterType::Identifier;
    }
    let lower = name.to_lowercase().replace('_', "");
    IDENTIFIER_NAME_HINTS.iter().any(|hint| lower.ends_with(hint))
}

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(word.to_uppercase().as_str())
}

/// Every reason `value` is unsafe as a database identifier; empty when safe.
pub fn identifier_violations(value: &str) -> Vec<String> {
    let mut violations = Vec::new();
    if value.contains("--") || value.contains("/*") || value.contains("*/") {
        violations.push("contains a comment marker".to_string());
    }
    if value.contains(';') {
        violations.push("contains a statement separator".to_string());
    }
    if value.chars().any(|c| matches!(c, '\'' | '"' | '`')) {
        violations.push("contains a quote character".to_string());
    }
    if value
        .chars()
        .any(|c| matches!(c, '[' | ']' | '(' | ')' | '=' | '<' | '>' | '+' | '*' | '/' | '%' | '|' | '&' | ','))
    {
        violations.push("contains bracket or operator characters".to_string());
    }
    if !IDENTIFIER.is_match(value) {
        violations.push("does not match ^[A-Za-z][A-Za-z0-9_]*$".to_string());
    }
    if is_reserved_word(value) {
        violations.push("is a reserved SQL keyword".to_string());
    }
    violations
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct SqlInjectionPatternRule;

impl ValidationRule for SqlInjectionPatternRule {
    fn name(&self) -> &str {
        "SqlInjectionPattern"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Security
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        STATEMENT_PATTERNS
            .iter()
            .filter_map(|(pattern, description, severity)| {
                let found = pattern.find(ctx.sql)?;
                let mut issue = self
                    .issue(format!("Statement contains {}", description))
                    .with_value(found.as_str().to_string())
                    .with_recommendation("Bind user input as parameters; never splice it into SQL text");
                issue.severity = *severity;
                Some(issue)
            })
            .collect()
    }
}

/// A bound value that also appears as a quoted literal in the statement was
/// concatenated rather than parameterized.
pub struct UnparameterizedValueRule;

impl ValidationRule for UnparameterizedValueRule {
    fn name(&self) -> &str {
        "UnparameterizedValue"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Security
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (name, value) in ctx.parameters {
            if is_identifier_parameter(ctx, name) {
                continue;
            }
            let Some(text) = as_text(value) else { continue };
            if text.is_empty() {
                continue;
            }
            let quoted = format!("'{}'", text.replace('\'', "''"));
            if ctx.sql.contains(&quoted) {
                issues.push(
                    self.issue(format!("Value of '{}' appears as a literal in the statement text", name))
                        .for_parameter(name)
                        .with_value(text)
                        .with_recommendation(format!("Reference it as @{} instead", name)),
                );
            }
        }
        issues
    }
}

pub struct IdentifierSafetyRule;

impl ValidationRule for IdentifierSafetyRule {
    fn name(&self) -> &str {
        "UnsafeIdentifier"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Security
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (name, value) in ctx.parameters {
            if !is_identifier_parameter(ctx, name) {
                continue;
            }
            let text = as_text(value).unwrap_or_else(|| value.to_string());
            for violation in identifier_violations(&text) {
                issues.push(
                    self.issue(format!("Identifier parameter '{}' {}", name, violation))
                        .for_parameter(name)
                        .with_value(text.clone())
                        .with_recommendation("Restrict identifiers to an allow-list of known names"),
                );
            }
        }
        issues
    }
}

/// Bound values cannot change the statement, but injection-shaped input is
/// worth surfacing.
pub struct SuspiciousValueRule;

impl ValidationRule for SuspiciousValueRule {
    fn name(&self) -> &str {
        "SuspiciousParameterValue"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Security
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        ctx.parameters
            .iter()
            .filter(|(name, _)| !is_identifier_parameter(ctx, name))
            .filter_map(|(name, value)| {
                let text = value.as_str()?;
                VALUE_PATTERNS.iter().any(|p| p.is_match(text)).then(|| {
                    self.issue(format!("Value of '{}' resembles an injection attempt", name))
                        .for_parameter(name)
                        .with_value(text.to_string())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_violations() {
        assert!(identifier_violations("CustomerName").is_empty());
        assert!(identifier_violations("order_date2").is_empty());
        assert!(!identifier_violations("2fast").is_empty());
        assert!(!identifier_violations("select").is_empty());

        let violations = identifier_violations("name; DROP TABLE Users--");
        assert!(violations.iter().any(|v| v.contains("comment")));
        assert!(violations.iter().any(|v| v.contains("separator")));
    }

    #[test]
    fn test_reserved_word_case_insensitive() {
        assert!(is_reserved_word("Union"));
        assert!(!is_reserved_word("Customers"));
    }
}
