//! Template Model
//!
//! `SqlTemplate` records as persisted: named-placeholder SQL (`@name`),
//! declared parameters and the example phrases used for intent matching.

use crate::template::options::TemplateOptions;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Declared type of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Guid,
    /// Table, column or schema name spliced into the statement text
    Identifier,
    Email,
    Phone,
    Url,
    Currency,
    Enum,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Decimal => "decimal",
            ParameterType::Boolean => "boolean",
            ParameterType::DateTime => "dateTime",
            ParameterType::Guid => "guid",
            ParameterType::Identifier => "identifier",
            ParameterType::Email => "email",
            ParameterType::Phone => "phone",
            ParameterType::Url => "url",
            ParameterType::Currency => "currency",
            ParameterType::Enum => "enum",
        }
    }
}

impl Default for ParameterType {
    fn default() -> Self {
        ParameterType::String
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlTemplateParameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub allowed_values: Option<Vec<Value>>,
    /// Tenant id and other values the caller cannot control
    #[serde(default)]
    pub is_system_parameter: bool,
}

impl SqlTemplateParameter {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default_value: None,
            allowed_values: None,
            is_system_parameter: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system_parameter = true;
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    /// Whether `value` is acceptable under `allowed_values`. Strings compare
    /// case-insensitively.
    pub fn allows(&self, value: &Value) -> bool {
        match &self.allowed_values {
            None => true,
            Some(allowed) => allowed.iter().any(|candidate| match (candidate, value) {
                (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
                (a, b) => a == b,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlTemplate {
    pub id: String,
    pub name: String,
    pub sql_template_text: String,
    #[serde(default)]
    pub parameters: Vec<SqlTemplateParameter>,
    #[serde(default)]
    pub intent_mapping: Vec<String>,
    #[serde(default)]
    pub allow_full_table_scan: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub options: TemplateOptions,
}

fn default_version() -> u32 {
    1
}

impl SqlTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sql_template_text: sql.into(),
            parameters: Vec::new(),
            intent_mapping: Vec::new(),
            allow_full_table_scan: false,
            version: 1,
            options: TemplateOptions::default(),
        }
    }

    pub fn with_parameter(mut self, parameter: SqlTemplateParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_intent(mut self, example: impl Into<String>) -> Self {
        self.intent_mapping.push(example.into());
        self
    }

    pub fn with_full_table_scan(mut self, allow: bool) -> Self {
        self.allow_full_table_scan = allow;
        self
    }

    pub fn with_options(mut self, options: TemplateOptions) -> Self {
        self.options = options;
        self
    }

    /// Exact name match first, then case-insensitive.
    pub fn parameter(&self, name: &str) -> Option<&SqlTemplateParameter> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .or_else(|| self.parameters.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
    }

    pub fn system_parameters(&self) -> impl Iterator<Item = &SqlTemplateParameter> {
        self.parameters.iter().filter(|p| p.is_system_parameter)
    }

    /// Distinct `@name` placeholders in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        placeholders_in(&self.sql_template_text)
    }

    /// Declared parameters that never appear in the statement text.
    pub fn declared_but_unused(&self) -> Vec<String> {
        let used = self.placeholders();
        self.parameters
            .iter()
            .filter(|p| !used.iter().any(|u| u.eq_ignore_ascii_case(&p.name)))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Placeholders with no parameter declaration.
    pub fn used_but_undeclared(&self) -> Vec<String> {
        self.placeholders()
            .into_iter()
            .filter(|name| self.parameter(name).is_none())
            .collect()
    }
}

/// Distinct `@name` tokens in `sql`, in order of first appearance.
pub fn placeholders_in(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in PLACEHOLDER.captures_iter(sql) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders_template() -> SqlTemplate {
        SqlTemplate::new(
            "orders_by_status",
            "Orders by status",
            "SELECT Id, Total FROM Orders WHERE TenantId = @tenantId AND Status = @status",
        )
        .with_parameter(SqlTemplateParameter::new("tenantId", ParameterType::String).system())
        .with_parameter(SqlTemplateParameter::new("status", ParameterType::Enum).required())
        .with_parameter(SqlTemplateParameter::new("region", ParameterType::String))
    }

    #[test]
    fn test_placeholders_are_distinct_and_ordered() {
        let names = placeholders_in("SELECT * FROM T WHERE a = @a AND b = @b OR a = @a");
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_unused_and_undeclared() {
        let mut template = orders_template();
        assert_eq!(template.declared_but_unused(), vec!["region"]);
        assert!(template.used_but_undeclared().is_empty());

        template.sql_template_text.push_str(" AND Owner = @owner");
        assert_eq!(template.used_but_undeclared(), vec!["owner"]);
    }

    #[test]
    fn test_deserialize_persisted_record() {
        let raw = json!({
            "id": "t1",
            "name": "All orders",
            "sqlTemplateText": "SELECT * FROM Orders WHERE TenantId = @tenantId",
            "parameters": [
                {"name": "tenantId", "type": "string", "required": true, "isSystemParameter": true}
            ],
            "intentMapping": ["show all orders"],
            "allowFullTableScan": true,
            "version": 3
        });
        let template: SqlTemplate = serde_json::from_value(raw).unwrap();
        assert_eq!(template.version, 3);
        assert!(template.parameters[0].is_system_parameter);
        assert_eq!(template.system_parameters().count(), 1);
    }

    #[test]
    fn test_allowed_values_case_insensitive() {
        let param = SqlTemplateParameter::new("status", ParameterType::Enum)
            .with_allowed_values(vec![json!("Completed"), json!("Pending")]);
        assert!(param.allows(&json!("completed")));
        assert!(!param.allows(&json!("Shipped")));
    }
}
