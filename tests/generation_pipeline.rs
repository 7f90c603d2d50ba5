use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlgen_engine::{
    AuditEventKind, EngineConfig, FallbackPolicy, InMemoryAuditLog, ParameterType, PermissionAuthorizer,
    PipelineStage, Severity, SqlGenerationEngine, SqlOperationType, SqlTemplate, SqlTemplateParameter,
    TemplateStore, TenantContext,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn orders_by_status() -> SqlTemplate {
    SqlTemplate::new(
        "orders_by_status",
        "Orders by status",
        "SELECT Id, Total, Status FROM Orders WHERE TenantId = @tenantId AND Status = @status \
         ORDER BY CreatedAt DESC LIMIT 100",
    )
    .with_parameter(SqlTemplateParameter::new("tenantId", ParameterType::String).system())
    .with_parameter(
        SqlTemplateParameter::new("status", ParameterType::String)
            .required()
            .with_allowed_values(vec![
                json!("Pending"),
                json!("Completed"),
                json!("InProgress"),
                json!("Cancelled"),
                json!("Shipped"),
            ]),
    )
    .with_intent("show orders")
    .with_intent("list orders with status")
}

fn customers_by_name() -> SqlTemplate {
    SqlTemplate::new(
        "customers_by_name",
        "Customers by name",
        "SELECT Id, Name FROM Customers WHERE TenantId = @tenantId AND Name = @customerName LIMIT 50",
    )
    .with_parameter(SqlTemplateParameter::new("tenantId", ParameterType::String).system())
    .with_parameter(SqlTemplateParameter::new("customerName", ParameterType::String).required())
    .with_intent("find customer by name")
}

fn recent_orders() -> SqlTemplate {
    SqlTemplate::new(
        "recent_orders",
        "Recent orders",
        "SELECT Id, Total FROM Orders WHERE TenantId = @tenantId AND CreatedAt >= @since LIMIT 20",
    )
    .with_parameter(SqlTemplateParameter::new("tenantId", ParameterType::String).system())
    .with_parameter(SqlTemplateParameter::new("since", ParameterType::DateTime).with_default(json!("2024-05-01")))
}

fn engine() -> (SqlGenerationEngine, Arc<InMemoryAuditLog>) {
    let log = Arc::new(InMemoryAuditLog::default());
    let engine = SqlGenerationEngine::new(EngineConfig::default())
        .with_audit_sink(log.clone())
        .with_today(today());
    for template in [orders_by_status(), customers_by_name(), recent_orders()] {
        engine.add_template(template).unwrap();
    }
    (engine, log)
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[tokio::test]
async fn test_generate_from_query_end_to_end() {
    let (engine, log) = engine();
    let result = engine
        .generate_from_query("show completed orders", &TenantContext::new("T1"), &CancellationToken::new())
        .await;

    assert!(result.is_successful, "{:?}", result.error_message);
    assert_eq!(result.stage, PipelineStage::Completed);
    assert_eq!(result.template_id.as_deref(), Some("orders_by_status"));
    assert_eq!(result.operation, Some(SqlOperationType::Select));
    assert_eq!(result.parameters["status"], json!("Completed"));
    assert_eq!(result.parameters["tenantId"], json!("T1"));
    assert!(result.is_executable());

    assert!(log.events().iter().any(|e| matches!(
        e.kind,
        AuditEventKind::GenerationAttempt { successful: true, .. }
    )));
}

#[tokio::test]
async fn test_user_values_are_bound_not_spliced() {
    let (engine, _) = engine();
    let hostile = "Robert'); DROP TABLE Customers;--";
    let result = engine
        .generate_from_template(
            "customers_by_name",
            &params(json!({ "customerName": hostile })),
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_successful);
    let sql = result.sql.as_deref().unwrap();
    assert!(!sql.contains(hostile));
    assert!(sql.contains("@customerName"));
    assert_eq!(result.parameters["customerName"], json!(hostile));

    // still surfaced, but not blocking
    let validation = result.validation_result.unwrap();
    let suspicious: Vec<_> = validation.issues_by_rule("SuspiciousParameterValue").collect();
    assert_eq!(suspicious.len(), 1);
    assert_eq!(suspicious[0].severity, Severity::Warning);
}

#[tokio::test]
async fn test_supplied_tenant_id_is_overwritten() {
    let (engine, _) = engine();
    let template = SqlTemplate::new("all_orders", "All orders", "SELECT * FROM Orders WHERE TenantId=@tenantId");
    engine.add_template(template).unwrap();

    let result = engine
        .generate_from_template(
            "all_orders",
            &params(json!({ "tenantId": "evil-tenant" })),
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_successful);
    assert_eq!(result.parameters["tenantId"], json!("T1"));
    assert!(!serde_json::to_string(&result).unwrap().contains("evil-tenant"));
}

#[tokio::test]
async fn test_extracted_tenant_id_is_ignored() {
    let (engine, _) = engine();
    let result = engine
        .generate_from_query(
            "show orders with tenantId: T2 that are shipped",
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_successful, "{:?}", result.error_message);
    assert_eq!(result.parameters["tenantId"], json!("T1"));
}

#[tokio::test]
async fn test_cross_tenant_requires_authorization() {
    let (engine, _) = engine();
    let engine = engine.with_authorizer(Arc::new(PermissionAuthorizer::new("tenants:read-all")));
    let request = params(json!({ "tenantId": "T2", "status": "Pending" }));

    let requested_only = TenantContext::new("T1").with_cross_tenant(true);
    let result = engine
        .generate_from_template("orders_by_status", &request, &requested_only, &CancellationToken::new())
        .await;
    assert!(result.is_successful);
    assert_eq!(result.parameters["tenantId"], json!("T1"));

    let authorized = TenantContext::new("T1")
        .with_cross_tenant(true)
        .with_permission("tenants:read-all");
    let result = engine
        .generate_from_template("orders_by_status", &request, &authorized, &CancellationToken::new())
        .await;
    assert!(result.is_successful);
    assert_eq!(result.parameters["tenantId"], json!("T2"));
}

#[tokio::test]
async fn test_round_trip_validates() {
    let (engine, _) = engine();
    let result = engine
        .generate_from_template(
            "orders_by_status",
            &params(json!({ "status": "done" })),
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_successful);
    assert_eq!(result.parameters["status"], json!("Completed"));

    let revalidated = engine.validate(result.sql.as_deref().unwrap(), Some(&result.parameters));
    assert!(revalidated.is_valid, "{}", revalidated.critical_summary());
}

#[tokio::test]
async fn test_empty_query_fails_gracefully() {
    let (engine, _) = engine();
    let result = engine
        .generate_from_query("   ", &TenantContext::new("T1"), &CancellationToken::new())
        .await;

    assert!(!result.is_successful);
    assert_eq!(result.stage, PipelineStage::Selecting);
    assert_eq!(result.error_code.as_deref(), Some("TemplateNotFound"));
    assert!(result.error_message.unwrap().contains("empty"));
    assert!(result.sql.is_none());
}

#[tokio::test]
async fn test_unknown_template_id() {
    let (engine, _) = engine();
    let result = engine
        .generate_from_template("nope", &Map::new(), &TenantContext::new("T1"), &CancellationToken::new())
        .await;
    assert!(!result.is_successful);
    assert_eq!(result.error_code.as_deref(), Some("TemplateNotFound"));
}

#[tokio::test]
async fn test_missing_required_parameter() {
    let (engine, _) = engine();
    let result = engine
        .generate_from_template("customers_by_name", &Map::new(), &TenantContext::new("T1"), &CancellationToken::new())
        .await;
    assert!(!result.is_successful);
    assert_eq!(result.stage, PipelineStage::Extracting);
    assert_eq!(result.error_code.as_deref(), Some("RequiredParameterMissing"));
    assert!(result.error_message.unwrap().contains("customerName"));
}

#[tokio::test]
async fn test_disallowed_value_rejected() {
    let (engine, _) = engine();
    let result = engine
        .generate_from_template(
            "orders_by_status",
            &params(json!({ "status": "Teleported" })),
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;
    assert!(!result.is_successful);
    assert_eq!(result.error_code.as_deref(), Some("ParameterTypeMismatch"));
}

#[tokio::test]
async fn test_unfiltered_delete_blocked() {
    let (engine, _) = engine();
    let purge = SqlTemplate::new("purge_orders", "Purge orders", "DELETE FROM Orders");
    let rejected = engine.add_template(purge.clone()).unwrap_err();
    assert!(rejected.has_issue("FullTableMutation"));

    // force it into the store to exercise the request path
    engine.store().publish(purge);
    let result = engine
        .generate_from_template("purge_orders", &Map::new(), &TenantContext::new("T1"), &CancellationToken::new())
        .await;

    assert!(!result.is_successful);
    assert_eq!(result.stage, PipelineStage::Validating);
    assert_eq!(result.error_code.as_deref(), Some("TenantIsolationViolation"));
    assert!(!result.is_executable());
}

#[tokio::test]
async fn test_cancellation_is_stage_tagged() {
    let (engine, _) = engine();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = engine
        .generate_from_template("orders_by_status", &params(json!({ "status": "Pending" })), &TenantContext::new("T1"), &cancel)
        .await;
    assert!(!result.is_successful);
    assert_eq!(result.stage, PipelineStage::Extracting);
    assert_eq!(result.error_code.as_deref(), Some("Cancelled"));
}

#[tokio::test]
async fn test_fallback_policy() {
    let (engine, _) = engine();
    let tenant = TenantContext::new("T1");
    let cancel = CancellationToken::new();

    let miss = engine.generate_from_query("which orders shipped", &tenant, &cancel).await;
    assert_eq!(miss.error_code.as_deref(), Some("TemplateNotFound"));

    let lowered = FallbackPolicy::new().with_lowered_threshold(0.3);
    let result = lowered.generate(&engine, "which orders shipped", &tenant, &cancel).await;
    assert!(result.is_successful, "{:?}", result.error_message);
    assert_eq!(result.parameters["status"], json!("Shipped"));

    let fallback = FallbackPolicy::new().with_fallback_template("recent_orders");
    let result = fallback.generate(&engine, "weather in paris", &tenant, &cancel).await;
    assert!(result.is_successful);
    assert_eq!(result.template_id.as_deref(), Some("recent_orders"));
    assert_eq!(result.parameters["since"], json!("2024-05-01"));

    let empty = fallback.generate(&engine, "", &tenant, &cancel).await;
    assert!(!empty.is_successful);
}

#[tokio::test]
async fn test_optimization_attached_when_enabled() {
    let (engine, _) = engine();
    let engine = engine.with_optimization(true);
    let result = engine
        .generate_from_template(
            "orders_by_status",
            &params(json!({ "status": "Pending" })),
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_successful);
    let optimization = result.optimization.unwrap();
    assert!(!optimization.is_optimized);
    assert_eq!(optimization.complexity_score, 0.0);
}

#[tokio::test]
async fn test_templates_loaded_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let record = json!({
        "id": "open_invoices",
        "name": "Open invoices",
        "sqlTemplateText": "SELECT Id, Amount FROM Invoices WHERE TenantId = @tenantId AND DueDate < @dueBefore LIMIT 200",
        "parameters": [
            { "name": "tenantId", "type": "string", "required": true, "isSystemParameter": true },
            { "name": "dueBefore", "type": "dateTime", "required": true }
        ],
        "intentMapping": ["show open invoices due before"],
        "allowFullTableScan": false,
        "version": 1
    });
    std::fs::write(dir.path().join("invoices.json"), record.to_string()).unwrap();

    let (engine, _) = engine();
    for template in TemplateStore::read_dir(dir.path()).unwrap() {
        engine.add_template(template).unwrap();
    }

    let result = engine
        .generate_from_query(
            "show open invoices due before 2024-07-01",
            &TenantContext::new("T1"),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_successful, "{:?}", result.error_message);
    assert_eq!(result.parameters["dueBefore"], json!("2024-07-01"));

    let out = tempfile::tempdir().unwrap();
    assert_eq!(engine.store().save_dir(out.path()).unwrap(), 4);
}
