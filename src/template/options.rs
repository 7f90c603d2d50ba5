//! Template Options
//!
//! Per-template knobs merged with per-request overrides by key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateOptions {
    /// LIMIT ceiling for this template; falls back to the engine-wide limit
    pub max_limit: Option<u64>,
    /// Named rule sets applied in addition to the engine defaults
    pub rule_sets: Option<Vec<String>>,
    /// Overrides `SqlTemplate::allow_full_table_scan` for a single request
    pub allow_full_table_scan: Option<bool>,
    /// Marks a SELECT over shared reference data that carries no tenant
    /// column. Tenant scoping is then not required for that statement.
    pub global_lookup: Option<bool>,
}

impl TemplateOptions {
    pub fn builder() -> TemplateOptionsBuilder {
        TemplateOptionsBuilder::default()
    }

    pub fn rule_sets(&self) -> &[String] {
        self.rule_sets.as_deref().unwrap_or(&[])
    }
}

/// Merges a base option set with overrides. Later merges win per key.
#[derive(Debug, Default)]
pub struct TemplateOptionsBuilder {
    options: TemplateOptions,
}

impl TemplateOptionsBuilder {
    pub fn base(mut self, base: &TemplateOptions) -> Self {
        self.options = base.clone();
        self
    }

    pub fn merge(mut self, overrides: &TemplateOptions) -> Self {
        if overrides.max_limit.is_some() {
            self.options.max_limit = overrides.max_limit;
        }
        if overrides.rule_sets.is_some() {
            self.options.rule_sets = overrides.rule_sets.clone();
        }
        if overrides.allow_full_table_scan.is_some() {
            self.options.allow_full_table_scan = overrides.allow_full_table_scan;
        }
        if overrides.global_lookup.is_some() {
            self.options.global_lookup = overrides.global_lookup;
        }
        self
    }

    pub fn max_limit(mut self, limit: u64) -> Self {
        self.options.max_limit = Some(limit);
        self
    }

    pub fn rule_set(mut self, name: impl Into<String>) -> Self {
        self.options
            .rule_sets
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self
    }

    pub fn allow_full_table_scan(mut self, allow: bool) -> Self {
        self.options.allow_full_table_scan = Some(allow);
        self
    }

    pub fn global_lookup(mut self, global: bool) -> Self {
        self.options.global_lookup = Some(global);
        self
    }

    pub fn build(self) -> TemplateOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_per_key() {
        let base = TemplateOptions::builder()
            .max_limit(500)
            .rule_set("pii")
            .build();
        let overrides = TemplateOptions {
            max_limit: Some(50),
            ..Default::default()
        };

        let merged = TemplateOptions::builder().base(&base).merge(&overrides).build();
        assert_eq!(merged.max_limit, Some(50));
        assert_eq!(merged.rule_sets(), &["pii".to_string()]);
        assert_eq!(merged.allow_full_table_scan, None);
        assert_eq!(merged.global_lookup, None);
    }
}
