//! Pluggable business rules. None are in the default rule set: register them
//! under a unique name and group them into named rule sets per template or
//! tenant. The rule author picks the severity.

use crate::validation::rules::security::is_reserved_word;
use crate::validation::rules::value_type::{infer_value_kind, ValueKind};
use crate::validation::{IssueCategory, Severity, ValidationContext, ValidationIssue, ValidationRule};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]*$").unwrap();
}

/// Parameter must be one of a fixed set of roles.
pub struct AllowedRolesRule {
    name: String,
    parameter: String,
    roles: Vec<String>,
    severity: Severity,
}

impl AllowedRolesRule {
    pub fn new(name: impl Into<String>, parameter: impl Into<String>, roles: &[&str], severity: Severity) -> Self {
        Self {
            name: name.into(),
            parameter: parameter.into(),
            roles: roles.iter().map(|r| r.to_lowercase()).collect(),
            severity,
        }
    }
}

impl ValidationRule for AllowedRolesRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let Some(value) = ctx.parameters.get(&self.parameter) else {
            return Vec::new();
        };
        let role = value.as_str().map(|s| s.to_lowercase()).unwrap_or_default();
        if self.roles.contains(&role) {
            return Vec::new();
        }
        vec![self
            .issue(format!("'{}' is not an allowed role", role))
            .for_parameter(&self.parameter)
            .with_value(role)
            .with_recommendation(format!("Use one of: {}", self.roles.join(", ")))]
    }
}

/// Length, character set and reserved-name checks for a username parameter.
pub struct UsernameRule {
    name: String,
    parameter: String,
    min_len: usize,
    max_len: usize,
    reserved: Vec<String>,
    severity: Severity,
}

impl UsernameRule {
    pub fn new(name: impl Into<String>, parameter: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            parameter: parameter.into(),
            min_len: 3,
            max_len: 32,
            reserved: ["admin", "root", "system", "administrator", "sa", "guest"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            severity,
        }
    }

    pub fn with_length(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    pub fn with_reserved(mut self, reserved: &[&str]) -> Self {
        self.reserved = reserved.iter().map(|s| s.to_lowercase()).collect();
        self
    }
}

impl ValidationRule for UsernameRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let Some(username) = ctx.parameters.get(&self.parameter).and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let mut problems = Vec::new();
        let len = username.chars().count();
        if len < self.min_len || len > self.max_len {
            problems.push(format!("must be {}-{} characters", self.min_len, self.max_len));
        }
        if !USERNAME.is_match(username) {
            problems.push("must start with a letter and contain only letters, digits, '.', '_' or '-'".to_string());
        }
        if self.reserved.contains(&username.to_lowercase()) || is_reserved_word(username) {
            problems.push("is a reserved name".to_string());
        }
        problems
            .into_iter()
            .map(|p| {
                self.issue(format!("Username {}", p))
                    .for_parameter(&self.parameter)
                    .with_value(username)
            })
            .collect()
    }
}

/// Rejects email parameters on blocked domains (disposable mail and the like).
pub struct DisallowedEmailDomainRule {
    name: String,
    domains: Vec<String>,
    severity: Severity,
}

impl DisallowedEmailDomainRule {
    pub fn new(name: impl Into<String>, domains: &[&str], severity: Severity) -> Self {
        Self {
            name: name.into(),
            domains: domains.iter().map(|d| d.to_lowercase()).collect(),
            severity,
        }
    }
}

impl ValidationRule for DisallowedEmailDomainRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (name, value) in ctx.parameters {
            if infer_value_kind(name, value, ctx.declared_type(name)) != Some(ValueKind::Email) {
                continue;
            }
            let Some(email) = value.as_str() else { continue };
            let Some((_, domain)) = email.rsplit_once('@') else { continue };
            let domain = domain.to_lowercase();
            let blocked = self
                .domains
                .iter()
                .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)));
            if blocked {
                issues.push(
                    self.issue(format!("Email domain '{}' is not allowed", domain))
                        .for_parameter(name)
                        .with_value(email),
                );
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::harness::RuleHarness;
    use serde_json::json;

    const SQL: &str = "SELECT Id FROM Users WHERE Role = @role";

    #[test]
    fn test_allowed_roles() {
        let rule = AllowedRolesRule::new("KnownRole", "role", &["Viewer", "Editor"], Severity::Error);

        let issues = RuleHarness::new().param("role", json!("Admin")).run(&rule, SQL);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_name, "KnownRole");
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].original_value.as_deref(), Some("admin"));

        assert!(RuleHarness::new().param("role", json!("EDITOR")).run(&rule, SQL).is_empty());
        assert!(RuleHarness::new().run(&rule, SQL).is_empty());
    }

    #[test]
    fn test_disallowed_email_domain_and_subdomains() {
        let rule = DisallowedEmailDomainRule::new("NoDisposableMail", &["mailinator.com"], Severity::Critical);
        let blocked = |name: &str, email: &str| !RuleHarness::new().param(name, json!(email)).run(&rule, SQL).is_empty();

        assert!(blocked("email", "jane@mailinator.com"));
        assert!(blocked("email", "jane@EU.Mailinator.com"));
        assert!(blocked("contact", "jane@mailinator.com"));
        assert!(!blocked("email", "jane@notmailinator.com"));
        assert!(!blocked("email", "jane@example.com"));
    }

    #[test]
    fn test_username_checks() {
        let rule = UsernameRule::new("Username", "username", Severity::Warning);
        let run = |name: &str| RuleHarness::new().param("username", json!(name)).run(&rule, SQL);

        assert!(run("jane.doe").is_empty());
        assert_eq!(run("root").len(), 1);
        // too short and starts with a digit
        assert_eq!(run("1a").len(), 2);
    }
}
