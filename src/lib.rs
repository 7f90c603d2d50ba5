pub mod audit;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fallback;
pub mod generator;
pub mod optimizer;
pub mod pipeline;
pub mod provider;
pub mod template;
pub mod tenant;
pub mod validation;

pub use audit::{AuditEvent, AuditEventKind, AuditSink, InMemoryAuditLog, NoopAuditSink, TracingAuditSink};
pub use config::EngineConfig;
pub use error::{Result, SqlGenError};
pub use extractor::{ExtractedParameter, ParameterExtractor, Parameters, SynonymTable};
pub use fallback::FallbackPolicy;
pub use generator::{SqlGenerationResult, SqlGenerator};
pub use optimizer::{QueryOptimizationResult, QueryOptimizer};
pub use pipeline::{PipelineStage, SqlGenerationEngine};
pub use provider::{LexicalSimilarityProvider, SimilarityProvider};
pub use template::{ParameterType, SqlTemplate, SqlTemplateParameter, TemplateOptions, TemplateStore};
pub use tenant::{CrossTenantAuthorizer, DenyCrossTenant, PermissionAuthorizer, TenantContext};
pub use validation::{
    IssueCategory, RuleRegistry, RuleSet, Severity, SqlOperationType, ValidationIssue, ValidationResult,
    ValidationRule,
};
