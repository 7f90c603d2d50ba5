use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlGenError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Parameter extraction failed: {0}")]
    ParameterExtractionFailed(String),

    #[error("Required parameters missing for template '{template_id}': {}", .missing.join(", "))]
    RequiredParameterMissing {
        template_id: String,
        missing: Vec<String>,
    },

    #[error("Parameter '{name}' expected {expected}, got '{value}'")]
    ParameterTypeMismatch {
        name: String,
        expected: String,
        value: String,
    },

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Tenant isolation violation: {0}")]
    TenantIsolationViolation(String),

    #[error("Operation policy violation: {0}")]
    OperationPolicyViolation(String),

    #[error("Optimization unavailable: {0}")]
    OptimizationUnavailable(String),

    #[error("Operation cancelled during {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SqlGenError {
    /// Stable machine-readable code used in audit events.
    pub fn code(&self) -> &'static str {
        match self {
            SqlGenError::TemplateNotFound(_) => "TemplateNotFound",
            SqlGenError::ParameterExtractionFailed(_) => "ParameterExtractionFailed",
            SqlGenError::RequiredParameterMissing { .. } => "RequiredParameterMissing",
            SqlGenError::ParameterTypeMismatch { .. } => "ParameterTypeMismatch",
            SqlGenError::SecurityViolation(_) => "SecurityViolation",
            SqlGenError::TenantIsolationViolation(_) => "TenantIsolationViolation",
            SqlGenError::OperationPolicyViolation(_) => "OperationPolicyViolation",
            SqlGenError::OptimizationUnavailable(_) => "OptimizationUnavailable",
            SqlGenError::Cancelled(_) => "Cancelled",
            SqlGenError::Config(_) => "Config",
            SqlGenError::Io(_) => "Io",
            SqlGenError::Json(_) => "Json",
        }
    }
}

pub type Result<T> = std::result::Result<T, SqlGenError>;
