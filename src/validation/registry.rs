//! Rule Registry
//!
//! Rules by name, rule sets by name, and rule sets attached to tenants.
//! Readers share a lock; registration takes the exclusive side.

use crate::error::{Result, SqlGenError};
use crate::validation::rules;
use crate::validation::ValidationRule;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub const DEFAULT_RULE_SET: &str = "default";

/// Named group of rules. A set may include other sets by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<String>,
    pub includes: Vec<String>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn including(mut self, set: impl Into<String>) -> Self {
        self.includes.push(set.into());
        self
    }
}

#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, Arc<dyn ValidationRule>>>,
    rule_sets: RwLock<HashMap<String, RuleSet>>,
    tenant_sets: RwLock<HashMap<String, Vec<String>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rules, all members of the `default` set.
    pub fn with_default_rules() -> Self {
        let registry = Self::new();
        let mut default_set = RuleSet::new(DEFAULT_RULE_SET);
        for rule in rules::default_rules() {
            default_set.rules.push(rule.name().to_string());
            registry.register_rule(rule);
        }
        registry.register_rule_set(default_set);
        registry
    }

    /// Add or replace a rule.
    pub fn register_rule(&self, rule: Arc<dyn ValidationRule>) {
        let name = rule.name().to_string();
        let mut rules = self.rules.write().unwrap_or_else(|p| p.into_inner());
        if rules.insert(name.clone(), rule).is_some() {
            info!(rule = %name, "Replaced validation rule");
        }
    }

    pub fn remove_rule(&self, name: &str) -> Option<Arc<dyn ValidationRule>> {
        self.rules.write().unwrap_or_else(|p| p.into_inner()).remove(name)
    }

    pub fn rule(&self, name: &str) -> Option<Arc<dyn ValidationRule>> {
        self.rules.read().unwrap_or_else(|p| p.into_inner()).get(name).cloned()
    }

    pub fn rule_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rules
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn register_rule_set(&self, set: RuleSet) {
        self.rule_sets
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(set.name.clone(), set);
    }

    pub fn rule_set(&self, name: &str) -> Option<RuleSet> {
        self.rule_sets.read().unwrap_or_else(|p| p.into_inner()).get(name).cloned()
    }

    /// Apply an existing rule set to every validation for `tenant_id`.
    pub fn attach_tenant_rule_set(&self, tenant_id: &str, set: &str) -> Result<()> {
        if self.rule_set(set).is_none() {
            return Err(SqlGenError::Config(format!("Unknown rule set '{}'", set)));
        }
        let mut tenant_sets = self.tenant_sets.write().unwrap_or_else(|p| p.into_inner());
        let sets = tenant_sets.entry(tenant_id.to_string()).or_default();
        if !sets.iter().any(|s| s == set) {
            sets.push(set.to_string());
        }
        Ok(())
    }

    pub fn tenant_rule_sets(&self, tenant_id: &str) -> Vec<String> {
        self.tenant_sets
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(tenant_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Flatten rule sets (following includes) into a de-duplicated rule list,
    /// in first-seen order. Unknown set or rule names are logged and skipped.
    pub fn resolve(&self, set_names: &[String]) -> Vec<Arc<dyn ValidationRule>> {
        let sets = self.rule_sets.read().unwrap_or_else(|p| p.into_inner());
        let rules = self.rules.read().unwrap_or_else(|p| p.into_inner());

        let mut visited_sets = HashSet::new();
        let mut rule_names: Vec<String> = Vec::new();
        let mut stack: Vec<String> = set_names.iter().rev().cloned().collect();

        while let Some(set_name) = stack.pop() {
            if !visited_sets.insert(set_name.clone()) {
                continue;
            }
            let Some(set) = sets.get(&set_name) else {
                warn!(rule_set = %set_name, "Unknown rule set");
                continue;
            };
            for rule in &set.rules {
                if !rule_names.contains(rule) {
                    rule_names.push(rule.clone());
                }
            }
            for included in set.includes.iter().rev() {
                stack.push(included.clone());
            }
        }

        rule_names
            .iter()
            .filter_map(|name| match rules.get(name) {
                Some(rule) => Some(Arc::clone(rule)),
                None => {
                    warn!(rule = %name, "Rule set references unknown rule");
                    None
                }
            })
            .collect()
    }
}
