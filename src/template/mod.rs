//! SQL Templates
//!
//! Template records, the versioned store, typed per-template options and
//! intent-based selection.

pub mod model;
pub mod options;
pub mod selector;
pub mod store;

pub use model::{placeholders_in, ParameterType, SqlTemplate, SqlTemplateParameter};
pub use options::{TemplateOptions, TemplateOptionsBuilder};
pub use selector::{TemplateMatch, TemplateSelector};
pub use store::TemplateStore;
