//! Audit Events
//!
//! Structured records of generation attempts, validation issues,
//! optimization outcomes and template changes. Sinks are fire-and-forget:
//! recording never fails the request that produced the event.

use crate::validation::{IssueCategory, Severity, ValidationIssue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuditEventKind {
    #[serde(rename_all = "camelCase")]
    GenerationAttempt {
        template_id: Option<String>,
        successful: bool,
        stage: String,
        error_code: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ValidationIssue {
        rule_name: String,
        category: IssueCategory,
        severity: Severity,
        parameter_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    OptimizationOutcome {
        optimized: bool,
        complexity_score: f64,
        estimated_improvement_percentage: f64,
    },
    #[serde(rename_all = "camelCase")]
    TemplateAdded {
        template_id: String,
        version: u32,
        accepted: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<String>,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

impl AuditEvent {
    pub fn new(request_id: Uuid, tenant_id: Option<&str>, kind: AuditEventKind) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            tenant_id: tenant_id.map(|t| t.to_string()),
            kind,
        }
    }

    /// Issue events carry no descriptions or values, only identifiers.
    pub fn for_issue(request_id: Uuid, tenant_id: Option<&str>, issue: &ValidationIssue) -> Self {
        Self::new(
            request_id,
            tenant_id,
            AuditEventKind::ValidationIssue {
                rule_name: issue.rule_name.clone(),
                category: issue.category,
                severity: issue.severity,
                parameter_name: issue.parameter_name.clone(),
            },
        )
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits events as tracing records on the `sqlgen::audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "sqlgen::audit", request_id = %event.request_id, "{}", json),
            Err(e) => warn!(target: "sqlgen::audit", request_id = %event.request_id, "Failed to serialize audit event: {}", e),
        }
    }
}

/// Keeps the most recent events in memory.
pub struct InMemoryAuditLog {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn events_for(&self, request_id: Uuid) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.request_id == request_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}
