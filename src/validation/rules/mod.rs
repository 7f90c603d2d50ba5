//! Built-in validation rules.

pub mod business;
pub mod operation;
pub mod security;
pub mod syntax;
pub mod tenant;
pub mod value_type;

use crate::validation::ValidationRule;
use std::sync::Arc;

pub use business::{AllowedRolesRule, DisallowedEmailDomainRule, UsernameRule};

/// Rules registered into the `default` rule set. Business rules are opt-in.
pub fn default_rules() -> Vec<Arc<dyn ValidationRule>> {
    vec![
        Arc::new(syntax::StatementKeywordRule),
        Arc::new(syntax::ParseabilityRule),
        Arc::new(security::SqlInjectionPatternRule),
        Arc::new(security::UnparameterizedValueRule),
        Arc::new(security::IdentifierSafetyRule),
        Arc::new(security::SuspiciousValueRule),
        Arc::new(tenant::TenantFilterRule),
        Arc::new(tenant::TenantBindingRule),
        Arc::new(tenant::FullTableMutationRule),
        Arc::new(operation::FullTableScanRule),
        Arc::new(operation::ExcessiveLimitRule),
        Arc::new(operation::InsertDataRule),
        Arc::new(operation::UpdateFilterRule),
        Arc::new(operation::UpdateValuesRule),
        Arc::new(operation::DeleteFilterRule),
        Arc::new(operation::DeleteKeyRule),
        Arc::new(value_type::ValueFormatRule),
        Arc::new(value_type::SensitiveDataRule),
    ]
}
