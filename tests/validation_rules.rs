use chrono::NaiveDate;
use serde_json::json;
use sqlgen_engine::validation::rules::UsernameRule;
use sqlgen_engine::{
    EngineConfig, IssueCategory, Parameters, RuleSet, Severity, SqlGenerationEngine, SqlTemplate,
    TemplateOptions, TenantContext,
};
use std::sync::Arc;

fn engine() -> SqlGenerationEngine {
    SqlGenerationEngine::new(EngineConfig::default()).with_today(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
}

fn params(pairs: &[(&str, serde_json::Value)]) -> Parameters {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_validation_is_deterministic() {
    let engine = engine();
    let sql = "SELECT Id FROM Orders WHERE Status = @status LIMIT 5000";
    let p = params(&[("status", json!("Pending"))]);
    let first = engine.validate(sql, Some(&p));
    let second = engine.validate(sql, Some(&p));
    assert_eq!(first, second);
}

#[test]
fn test_card_numbers_are_sensitive_even_when_invalid() {
    let engine = engine();
    let sql = "SELECT Id FROM Payments WHERE Reference = @reference";

    for card in ["4111111111111111", "4111111111111112"] {
        let result = engine.validate(sql, Some(&params(&[("reference", json!(card))])));
        assert!(!result.is_valid);
        let sensitive: Vec<_> = result.issues_by_rule("SensitiveData").collect();
        assert_eq!(sensitive.len(), 1, "{}", card);
        assert_eq!(sensitive[0].severity, Severity::Critical);
    }
}

#[test]
fn test_card_number_detected_under_any_name() {
    let engine = engine();
    let sql = "SELECT Id FROM Orders WHERE Phone = @phone AND Total = @total";
    let checks = [
        params(&[("phone", json!("4111 1111 1111 1111")), ("total", json!(10))]),
        params(&[("phone", json!("555-0100")), ("total", json!(4111111111111111u64))]),
    ];
    for p in checks {
        let result = engine.validate(sql, Some(&p));
        assert!(!result.is_valid);
        assert!(result.critical_issues().any(|i| i.rule_name == "SensitiveData"));
    }
}

#[test]
fn test_unparseable_statement_is_invalid() {
    let engine = engine();
    let result = engine.validate("SELECT FROM WHERE", None);
    assert!(!result.is_valid);
    assert!(result
        .critical_issues()
        .any(|i| i.rule_name == "ParseFailure" && i.category == IssueCategory::Syntax));
}

#[test]
fn test_ssn_by_parameter_name() {
    let engine = engine();
    let result = engine.validate(
        "SELECT Id FROM People WHERE Ssn = @ssn",
        Some(&params(&[("ssn", json!("123-45-6789"))])),
    );
    assert!(result.has_issue("SensitiveData"));
    assert!(!result.is_valid);
}

#[test]
fn test_unfiltered_delete_is_critical() {
    let engine = engine();
    let result = engine.validate("DELETE FROM Orders", None);
    assert!(!result.is_valid);
    let issue = result.issues_by_rule("FullTableMutation").next().unwrap();
    assert_eq!(issue.category, IssueCategory::TenantIsolation);
    assert_eq!(issue.severity, Severity::Critical);
}

#[test]
fn test_excessive_limit_is_a_warning() {
    let engine = engine();
    let p = params(&[("status", json!("Pending"))]);

    let large = engine.validate("SELECT Id FROM Orders WHERE Status = @status LIMIT 5000", Some(&p));
    assert!(large.is_valid);
    assert_eq!(large.issues_by_rule("ExcessiveLimit").count(), 1);
    assert_eq!(large.max_severity(), Some(Severity::Warning));

    let small = engine.validate("SELECT Id FROM Orders WHERE Status = @status LIMIT 100", Some(&p));
    assert!(!small.has_issue("ExcessiveLimit"));
}

#[test]
fn test_per_request_limit_override() {
    let engine = engine();
    let p = params(&[("status", json!("Pending"))]);
    let options = TemplateOptions::builder().max_limit(50).build();
    let result = engine.validate_with_options(
        "SELECT Id FROM Orders WHERE Status = @status LIMIT 100",
        Some(&p),
        Some(&options),
    );
    assert!(result.has_issue("ExcessiveLimit"));
}

#[test]
fn test_stacked_statement_rejected() {
    let engine = engine();
    let result = engine.validate("SELECT Id FROM Orders; DROP TABLE Orders", None);
    assert!(!result.is_valid);
    assert!(result
        .critical_issues()
        .any(|i| i.rule_name == "SqlInjectionPattern" && i.category == IssueCategory::Security));
}

#[test]
fn test_tenant_filter_required_for_tenant() {
    let engine = engine();
    let p = params(&[("status", json!("Pending"))]);
    let sql = "SELECT Id FROM Orders WHERE Status = @status LIMIT 10";

    assert!(engine.validate(sql, Some(&p)).is_valid);

    let scoped = engine.validate_for_tenant(sql, &p, &TenantContext::new("T1"));
    assert!(!scoped.is_valid);
    assert!(scoped.has_issue("MissingTenantFilter"));
}

#[test]
fn test_foreign_tenant_binding_rejected() {
    let engine = engine();
    let sql = "SELECT Id FROM Orders WHERE TenantId = @tenantId AND Status = @status LIMIT 10";
    let p = params(&[("tenantId", json!("T2")), ("status", json!("Pending"))]);

    let result = engine.validate_for_tenant(sql, &p, &TenantContext::new("T1"));
    assert!(!result.is_valid);
    assert!(result.has_issue("TenantMismatch"));

    // requesting cross-tenant access is not enough without authorization
    let requested = TenantContext::new("T1").with_cross_tenant(true);
    assert!(!engine.validate_for_tenant(sql, &p, &requested).is_valid);
}

#[test]
fn test_tenant_attached_rule_set() {
    let engine = engine();
    let registry = Arc::clone(engine.registry());
    registry.register_rule(Arc::new(UsernameRule::new("StrictUsername", "username", Severity::Critical)));
    registry.register_rule_set(RuleSet::new("accounts").with_rule("StrictUsername"));
    registry.attach_tenant_rule_set("T9", "accounts").unwrap();

    let sql = "SELECT Id FROM Users WHERE TenantId = @tenantId AND Username = @username LIMIT 1";
    let for_tenant = |tenant: &str| {
        let p = params(&[("tenantId", json!(tenant)), ("username", json!("admin"))]);
        engine.validate_for_tenant(sql, &p, &TenantContext::new(tenant))
    };

    let t9 = for_tenant("T9");
    assert!(!t9.is_valid);
    assert!(t9.issues_by_rule("StrictUsername").all(|i| i.category == IssueCategory::Business));

    let t1 = for_tenant("T1");
    assert!(t1.is_valid, "{}", t1.critical_summary());
    assert!(!t1.has_issue("StrictUsername"));
}

#[test]
fn test_unknown_rule_set_cannot_be_attached() {
    let engine = engine();
    assert!(engine.registry().attach_tenant_rule_set("T1", "missing").is_err());
}

#[test]
fn test_optimizer_rewrites_complex_select() {
    let engine = engine();
    let sql = "SELECT * FROM Orders o JOIN Customers c ON c.Id = o.CustomerId \
               JOIN Regions r ON r.Id = c.RegionId \
               WHERE o.Total > @minTotal AND o.Status = @status \
               AND o.CustomerId IN (SELECT Id FROM VipCustomers)";
    let result = engine.optimize(sql);
    assert!(result.complexity_score > 5.0);
    assert!(result.is_optimized);
    let rewritten = result.optimized_query.unwrap();
    assert!(rewritten.ends_with("LIMIT 1000"));
    assert!(rewritten.find("o.Status = @status").unwrap() < rewritten.find("o.Total > @minTotal").unwrap());
    assert!(result.estimated_improvement_percentage <= 60.0);
}

#[test]
fn test_optimizer_leaves_simple_select() {
    let engine = engine();
    let result = engine.optimize("SELECT Id FROM Orders WHERE Id = @id LIMIT 1");
    assert!(!result.is_optimized);
    assert!(result.optimized_query.is_none());
    assert!(!result.explanation.is_empty());
}

#[test]
fn test_tenant_filter_must_pin_one_tenant() {
    let engine = engine();
    let p = params(&[("tenantId", json!("T1")), ("id", json!(1))]);
    let tenant = TenantContext::new("T1");

    for sql in [
        "SELECT Id FROM Orders WHERE TenantId <> @tenantId LIMIT 10",
        "SELECT Id FROM Orders WHERE TenantId = @tenantId OR Id = @id LIMIT 10",
        "SELECT Id FROM Orders WHERE TenantId = @tenantId UNION SELECT Id FROM Orders WHERE Id = @id",
    ] {
        let result = engine.validate_for_tenant(sql, &p, &tenant);
        assert!(!result.is_valid, "{}", sql);
        assert!(result.has_issue("MissingTenantFilter"), "{}", sql);
    }

    let pinned = engine.validate_for_tenant(
        "SELECT o.Id FROM Orders o WHERE o.Id = @id AND o.TenantId = @tenantId LIMIT 10",
        &p,
        &tenant,
    );
    assert!(pinned.is_valid, "{}", pinned.critical_summary());
}

#[test]
fn test_global_lookup_template_can_be_published() {
    let engine = engine();
    let lookup = SqlTemplate::new("currencies", "Currencies", "SELECT Code FROM Currencies");
    assert!(engine.add_template(lookup.clone()).is_err());

    let global = lookup.with_options(TemplateOptions::builder().global_lookup(true).build());
    assert!(engine.add_template(global).is_ok());
}
