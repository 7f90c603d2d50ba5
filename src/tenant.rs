//! Tenant Context
//!
//! Caller-authenticated tenant identity and the cross-tenant authorization seam.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Tenant identity supplied once per request by the caller's authenticated
/// session. Never derived from extracted parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: String,
    #[serde(default)]
    pub allow_cross_tenant: bool,
    #[serde(default)]
    pub permissions: HashSet<String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            allow_cross_tenant: false,
            permissions: HashSet::new(),
        }
    }

    pub fn with_cross_tenant(mut self, allow: bool) -> Self {
        self.allow_cross_tenant = allow;
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Authorization check for removing tenant scoping.
pub trait CrossTenantAuthorizer: Send + Sync {
    fn authorize(&self, tenant: &TenantContext) -> bool;
}

/// Refuses every cross-tenant request.
#[derive(Debug, Default, Clone)]
pub struct DenyCrossTenant;

impl CrossTenantAuthorizer for DenyCrossTenant {
    fn authorize(&self, tenant: &TenantContext) -> bool {
        if tenant.allow_cross_tenant {
            warn!(tenant_id = %tenant.tenant_id, "Cross-tenant access requested but denied by policy");
        }
        false
    }
}

/// Grants cross-tenant access to contexts holding a named permission.
#[derive(Debug, Clone)]
pub struct PermissionAuthorizer {
    permission: String,
}

impl PermissionAuthorizer {
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
        }
    }
}

impl CrossTenantAuthorizer for PermissionAuthorizer {
    fn authorize(&self, tenant: &TenantContext) -> bool {
        tenant.allow_cross_tenant && tenant.has_permission(&self.permission)
    }
}
