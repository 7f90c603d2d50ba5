//! Template Store
//!
//! Read-mostly registry of published templates. Every edit publishes a new
//! version; earlier versions stay readable by number.

use crate::error::{Result, SqlGenError};
use crate::template::model::SqlTemplate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Default)]
pub struct TemplateStore {
    /// Template id -> published versions, oldest first
    templates: RwLock<HashMap<String, Vec<Arc<SqlTemplate>>>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Arc<SqlTemplate>>>> {
        self.templates.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Arc<SqlTemplate>>>> {
        self.templates.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Latest published version of a template.
    pub fn get(&self, id: &str) -> Option<Arc<SqlTemplate>> {
        self.read().get(id).and_then(|versions| versions.last().cloned())
    }

    pub fn get_version(&self, id: &str, version: u32) -> Option<Arc<SqlTemplate>> {
        self.read()
            .get(id)
            .and_then(|versions| versions.iter().find(|t| t.version == version).cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Latest version of every template, ordered by id.
    pub fn list(&self) -> Vec<Arc<SqlTemplate>> {
        let mut all: Vec<Arc<SqlTemplate>> = self
            .read()
            .values()
            .filter_map(|versions| versions.last().cloned())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Publish a template. A new id starts at the template's own version; an
    /// existing id gets `latest + 1`.
    pub fn publish(&self, mut template: SqlTemplate) -> Arc<SqlTemplate> {
        let mut templates = self.write();
        let versions = templates.entry(template.id.clone()).or_default();
        if let Some(latest) = versions.last() {
            template.version = latest.version + 1;
        } else if template.version == 0 {
            template.version = 1;
        }
        info!(template_id = %template.id, version = template.version, "Published template");
        let template = Arc::new(template);
        versions.push(Arc::clone(&template));
        template
    }

    /// Remove every version of a template.
    pub fn remove(&self, id: &str) -> Option<Arc<SqlTemplate>> {
        let removed = self.write().remove(id);
        removed.and_then(|versions| versions.last().cloned())
    }

    /// Read every `*.json` file in `dir`. A file holds one template record or
    /// an array of them. Records are returned unpublished so the caller can
    /// validate them first.
    pub fn read_dir(dir: impl AsRef<Path>) -> Result<Vec<SqlTemplate>> {
        let dir = dir.as_ref();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        entries.sort();

        let mut templates = Vec::new();
        for path in entries {
            let content = std::fs::read_to_string(&path)?;
            let value: serde_json::Value = serde_json::from_str(&content)?;
            if value.is_array() {
                let batch: Vec<SqlTemplate> = serde_json::from_value(value)?;
                templates.extend(batch);
            } else {
                templates.push(serde_json::from_value(value)?);
            }
            debug!("Read templates from {}", path.display());
        }
        Ok(templates)
    }

    /// Write the latest version of every template to `<dir>/<id>.json`.
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let templates = self.list();
        for template in &templates {
            if !is_safe_file_stem(&template.id) {
                return Err(SqlGenError::Config(format!(
                    "Template id '{}' cannot be used as a file name",
                    template.id
                )));
            }
            let path = dir.join(format!("{}.json", template.id));
            std::fs::write(&path, serde_json::to_string_pretty(template.as_ref())?)?;
        }
        Ok(templates.len())
    }
}

fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !id.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_bumps_version_on_edit() {
        let store = TemplateStore::new();
        let first = store.publish(SqlTemplate::new("t1", "v1", "SELECT 1"));
        assert_eq!(first.version, 1);

        let second = store.publish(SqlTemplate::new("t1", "v2", "SELECT 2"));
        assert_eq!(second.version, 2);

        assert_eq!(store.get("t1").unwrap().name, "v2");
        assert_eq!(store.get_version("t1", 1).unwrap().name, "v1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = TemplateStore::new();
        store.publish(SqlTemplate::new("t1", "one", "SELECT 1"));
        assert!(store.remove("t1").is_some());
        assert!(store.get("t1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_read_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new();
        store.publish(
            SqlTemplate::new("orders", "Orders", "SELECT Id FROM Orders").with_intent("list orders"),
        );
        assert_eq!(store.save_dir(dir.path()).unwrap(), 1);

        let loaded = TemplateStore::read_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].intent_mapping, vec!["list orders"]);
    }

    #[test]
    fn test_save_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new();
        store.publish(SqlTemplate::new("../escape", "bad", "SELECT 1"));
        assert!(store.save_dir(dir.path()).is_err());
    }
}
