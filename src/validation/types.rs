//! Validation result types and statement classification.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LINE_COMMENT: Regex = Regex::new(r"--[^\n]*").unwrap();
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
}

/// Ordered `Info < Warning < Error < Critical`. Only `Critical` blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    Syntax,
    Security,
    Performance,
    TenantIsolation,
    Business,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// `None` for statement-level issues
    pub parameter_name: Option<String>,
    pub rule_name: String,
    pub category: IssueCategory,
    pub severity: Severity,
    /// May quote SQL or schema fragments: log-only, not for end users
    pub description: String,
    pub original_value: Option<String>,
    pub recommendation: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        rule_name: impl Into<String>,
        category: IssueCategory,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            parameter_name: None,
            rule_name: rule_name.into(),
            category,
            severity,
            description: description.into(),
            original_value: None,
            recommendation: None,
        }
    }

    pub fn for_parameter(mut self, name: impl Into<String>) -> Self {
        self.parameter_name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.original_value = Some(value.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// `is_valid` is derived: false iff any issue is `Critical`.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let is_valid = !issues.iter().any(|i| i.is_critical());
        Self { is_valid, issues }
    }

    pub fn valid() -> Self {
        Self::from_issues(Vec::new())
    }

    pub fn has_critical_issues(&self) -> bool {
        !self.is_valid
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_critical())
    }

    pub fn issues_by_rule<'a>(&'a self, rule_name: &'a str) -> impl Iterator<Item = &'a ValidationIssue> + 'a {
        self.issues.iter().filter(move |i| i.rule_name == rule_name)
    }

    pub fn has_issue(&self, rule_name: &str) -> bool {
        self.issues.iter().any(|i| i.rule_name == rule_name)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// One-line summary of the critical issues, for error messages.
    pub fn critical_summary(&self) -> String {
        self.critical_issues()
            .map(|i| format!("{}: {}", i.rule_name, i.description))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlOperationType {
    Select,
    Insert,
    Update,
    Delete,
    Unknown,
}

impl SqlOperationType {
    /// Classify by leading keyword. `WITH` statements take the first
    /// data-modifying keyword outside the CTE bodies, else `Select`.
    pub fn detect(sql: &str) -> Self {
        let cleaned = strip_comments(sql);
        let words = top_level_words(&cleaned);
        let Some(first) = words.first() else {
            return SqlOperationType::Unknown;
        };
        match first.as_str() {
            "SELECT" => SqlOperationType::Select,
            "INSERT" => SqlOperationType::Insert,
            "UPDATE" => SqlOperationType::Update,
            "DELETE" => SqlOperationType::Delete,
            "WITH" => words
                .iter()
                .skip(1)
                .find_map(|w| match w.as_str() {
                    "INSERT" => Some(SqlOperationType::Insert),
                    "UPDATE" => Some(SqlOperationType::Update),
                    "DELETE" => Some(SqlOperationType::Delete),
                    "SELECT" => Some(SqlOperationType::Select),
                    _ => None,
                })
                .unwrap_or(SqlOperationType::Select),
            _ => SqlOperationType::Unknown,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            SqlOperationType::Insert | SqlOperationType::Update | SqlOperationType::Delete
        )
    }
}

impl fmt::Display for SqlOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SqlOperationType::Select => "SELECT",
            SqlOperationType::Insert => "INSERT",
            SqlOperationType::Update => "UPDATE",
            SqlOperationType::Delete => "DELETE",
            SqlOperationType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

pub fn strip_comments(sql: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(sql, " ");
    LINE_COMMENT.replace_all(&without_blocks, " ").into_owned()
}

/// Uppercased words at parenthesis depth zero, skipping quoted text.
fn top_level_words(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut in_quote = false;
    let mut leading_parens = true;

    for c in sql.chars() {
        if in_quote {
            if c == '\'' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '\'' => in_quote = true,
            // a statement wrapped in parentheses still counts as top level
            '(' if leading_parens => {}
            '(' => depth += 1,
            ')' => depth = (depth - 1).max(0),
            c if c.is_alphanumeric() || c == '_' => {
                if depth == 0 {
                    current.push(c.to_ascii_uppercase());
                }
                continue;
            }
            _ => {}
        }
        if !current.is_empty() {
            words.push(std::mem::take(&mut current));
            leading_parens = false;
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_is_valid_tracks_critical_only() {
        let warning = ValidationIssue::new("A", IssueCategory::Performance, Severity::Warning, "w");
        let error = ValidationIssue::new("B", IssueCategory::Syntax, Severity::Error, "e");
        assert!(ValidationResult::from_issues(vec![warning.clone(), error]).is_valid);

        let critical = ValidationIssue::new("C", IssueCategory::Security, Severity::Critical, "c");
        let result = ValidationResult::from_issues(vec![warning, critical]);
        assert!(!result.is_valid);
        assert!(result.has_critical_issues());
        assert_eq!(result.max_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_detect_operation() {
        assert_eq!(SqlOperationType::detect("  select * from t"), SqlOperationType::Select);
        assert_eq!(SqlOperationType::detect("-- note\nDELETE FROM t"), SqlOperationType::Delete);
        assert_eq!(SqlOperationType::detect("/* x */ UPDATE t SET a = 1"), SqlOperationType::Update);
        assert_eq!(SqlOperationType::detect("(SELECT 1)"), SqlOperationType::Select);
        assert_eq!(SqlOperationType::detect("DROP TABLE t"), SqlOperationType::Unknown);
        assert_eq!(SqlOperationType::detect(""), SqlOperationType::Unknown);
    }

    #[test]
    fn test_detect_cte_statement() {
        let sql = "WITH old AS (SELECT Id FROM Orders WHERE Year < 2000) DELETE FROM Orders WHERE Id IN (SELECT Id FROM old)";
        assert_eq!(SqlOperationType::detect(sql), SqlOperationType::Delete);
        let sql = "WITH recent AS (SELECT Id FROM Orders) SELECT * FROM recent";
        assert_eq!(SqlOperationType::detect(sql), SqlOperationType::Select);
    }
}
