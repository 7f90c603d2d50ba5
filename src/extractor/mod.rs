//! Parameter Extraction
//!
//! Turns free text into typed, confidence-scored parameter bindings for a
//! selected template, and binds explicit parameter dictionaries the same way.
//!
//! Steps:
//! 1. Collect candidates (collaborator output merged with name/pattern heuristics)
//! 2. Drop candidates below the confidence floor
//! 3. Coerce each to its declared type, normalizing status synonyms
//! 4. Fill defaults, then report required parameters that are still missing

pub mod coercion;
pub mod relative_date;
pub mod synonyms;

use crate::error::{Result, SqlGenError};
use crate::template::{ParameterType, SqlTemplate, SqlTemplateParameter};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub use relative_date::DateRange;
pub use synonyms::SynonymTable;

/// Parameter values keyed by name, ordered for deterministic output.
pub type Parameters = BTreeMap<String, Value>;

lazy_static! {
    static ref GUID: Regex =
        Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b").unwrap();
    static ref EMAIL: Regex = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    static ref ISO_DATE: Regex = Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap();
    static ref QUOTED: Regex = Regex::new(r#""([^"]*)"|'([^']*)'"#).unwrap();
    static ref ROW_BOUND: Regex = Regex::new(r"(?i)\b(?:top|limit|first)\s+(\d{1,7})\b").unwrap();
    static ref AMOUNT: Regex =
        Regex::new(r"(?i)\b(?:over|above|under|below|than|exceeding|least|most)\s+\$?(\d[\d,]*(?:\.\d+)?)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedParameter {
    pub name: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// 0.0 - 1.0
    pub confidence: f64,
    #[serde(default)]
    pub source_span: Option<SourceSpan>,
}

impl ExtractedParameter {
    pub fn new(name: impl Into<String>, value: Value, param_type: ParameterType, confidence: f64) -> Self {
        Self {
            name: name.into(),
            value,
            param_type,
            confidence: confidence.clamp(0.0, 1.0),
            source_span: None,
        }
    }

    fn spanned(mut self, start: usize, end: usize) -> Self {
        self.source_span = Some(SourceSpan { start, end });
        self
    }
}

pub struct ParameterExtractor {
    synonyms: SynonymTable,
    min_confidence: f64,
}

impl ParameterExtractor {
    pub fn new(synonyms: SynonymTable, min_confidence: f64) -> Self {
        Self {
            synonyms,
            min_confidence,
        }
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    /// Heuristic candidates for every non-system parameter of `template`.
    pub fn extract(&self, text: &str, template: &SqlTemplate, today: NaiveDate) -> Vec<ExtractedParameter> {
        let mut found: Vec<ExtractedParameter> = Vec::new();
        let mut quoted = QUOTED
            .captures_iter(text)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| (m.as_str().to_string(), m.start(), m.end()))
            .collect::<Vec<_>>()
            .into_iter();

        for param in template.parameters.iter().filter(|p| !p.is_system_parameter) {
            if let Some(candidate) = self.by_name(text, param) {
                found.push(candidate);
                continue;
            }
            if let Some(candidate) = self.by_type(text, param, today) {
                found.push(candidate);
                continue;
            }
            if matches!(param.param_type, ParameterType::String) {
                if let Some((value, start, end)) = quoted.next() {
                    found.push(
                        ExtractedParameter::new(&param.name, Value::String(value), param.param_type, 0.6)
                            .spanned(start, end),
                    );
                }
            }
        }

        debug!(template_id = %template.id, count = found.len(), "Heuristic extraction finished");
        found
    }

    /// `name: value`, `name = value` or `name is value`, also matching
    /// camelCase names written as separate words.
    fn by_name(&self, text: &str, param: &SqlTemplateParameter) -> Option<ExtractedParameter> {
        let words = split_camel(&param.name);
        let name_pattern = if words.len() > 1 {
            format!("(?:{}|{})", regex::escape(&param.name), words.join(r"[\s_]+"))
        } else {
            regex::escape(&param.name)
        };
        let pattern = format!(
            r#"(?i)\b{}\s*(?::|=|\bis\b)\s*(?:"([^"]*)"|'([^']*)'|([^\s,;]+))"#,
            name_pattern
        );
        let re = Regex::new(&pattern).ok()?;
        let cap = re.captures(text)?;
        let m = cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3))?;
        Some(
            ExtractedParameter::new(&param.name, Value::String(m.as_str().to_string()), param.param_type, 0.95)
                .spanned(m.start(), m.end()),
        )
    }

    fn by_type(&self, text: &str, param: &SqlTemplateParameter, today: NaiveDate) -> Option<ExtractedParameter> {
        let name = param.name.to_lowercase();
        match param.param_type {
            ParameterType::Guid => GUID.find(text).map(|m| {
                ExtractedParameter::new(&param.name, Value::String(m.as_str().to_string()), param.param_type, 0.9)
                    .spanned(m.start(), m.end())
            }),
            ParameterType::Email => EMAIL.find(text).map(|m| {
                ExtractedParameter::new(&param.name, Value::String(m.as_str().to_string()), param.param_type, 0.9)
                    .spanned(m.start(), m.end())
            }),
            ParameterType::DateTime => {
                if let Some(m) = ISO_DATE.find(text) {
                    return Some(
                        ExtractedParameter::new(&param.name, Value::String(m.as_str().to_string()), param.param_type, 0.9)
                            .spanned(m.start(), m.end()),
                    );
                }
                let (range, (start, end)) = relative_date::find_in(text, today)?;
                let date = if is_range_end(&name) { range.end } else { range.start };
                Some(
                    ExtractedParameter::new(
                        &param.name,
                        Value::String(date.format("%Y-%m-%d").to_string()),
                        param.param_type,
                        0.8,
                    )
                    .spanned(start, end),
                )
            }
            ParameterType::Integer if is_row_bound(&name) => ROW_BOUND.captures(text).and_then(|cap| {
                let m = cap.get(1)?;
                Some(
                    ExtractedParameter::new(&param.name, Value::String(m.as_str().to_string()), param.param_type, 0.85)
                        .spanned(m.start(), m.end()),
                )
            }),
            ParameterType::Decimal | ParameterType::Currency => AMOUNT.captures(text).and_then(|cap| {
                let m = cap.get(1)?;
                Some(
                    ExtractedParameter::new(&param.name, Value::String(m.as_str().to_string()), param.param_type, 0.7)
                        .spanned(m.start(), m.end()),
                )
            }),
            ParameterType::Enum => self.enum_value(text, param),
            ParameterType::String if name.contains("status") => self.enum_value(text, param),
            _ => None,
        }
    }

    /// A status-like value: an allowed value written verbatim, or a synonym.
    fn enum_value(&self, text: &str, param: &SqlTemplateParameter) -> Option<ExtractedParameter> {
        if let Some(allowed) = &param.allowed_values {
            let lower = text.to_lowercase();
            for candidate in allowed.iter().filter_map(|v| v.as_str()) {
                if let Some(start) = find_word(&lower, &candidate.to_lowercase()) {
                    return Some(
                        ExtractedParameter::new(&param.name, Value::String(candidate.to_string()), param.param_type, 0.9)
                            .spanned(start, start + candidate.len()),
                    );
                }
            }
        }
        let (_, canonical) = self.synonyms.find_in(text)?;
        Some(ExtractedParameter::new(
            &param.name,
            Value::String(canonical.to_string()),
            param.param_type,
            0.85,
        ))
    }

    /// Bind candidates onto the template's declarations.
    ///
    /// System parameters are skipped: the generator fills them from the
    /// tenant context. Undeclared names are dropped.
    pub fn bind(&self, template: &SqlTemplate, candidates: Vec<ExtractedParameter>) -> Result<Parameters> {
        let mut bound = Parameters::new();
        let mut missing = Vec::new();

        for candidate in candidates {
            if candidate.confidence < self.min_confidence {
                debug!(name = %candidate.name, confidence = candidate.confidence, "Dropping low-confidence parameter");
                continue;
            }
            let Some(param) = template.parameter(&candidate.name) else {
                debug!(name = %candidate.name, "Dropping undeclared parameter");
                continue;
            };
            if param.is_system_parameter || bound.contains_key(&param.name) {
                continue;
            }

            let value = self.normalize_synonym(param, &candidate.value);
            match coercion::coerce(&value, param.param_type) {
                Some(coerced) => {
                    if !param.allows(&coerced) {
                        return Err(SqlGenError::ParameterTypeMismatch {
                            name: param.name.clone(),
                            expected: format!("one of {}", allowed_list(param)),
                            value: display_value(&candidate.value),
                        });
                    }
                    bound.insert(param.name.clone(), coerced);
                }
                None => {
                    debug!(name = %param.name, expected = param.param_type.as_str(), "Coercion failed, dropping parameter");
                }
            }
        }

        for param in template.parameters.iter().filter(|p| !p.is_system_parameter) {
            if bound.contains_key(&param.name) {
                continue;
            }
            if let Some(default) = &param.default_value {
                if let Some(coerced) = coercion::coerce(default, param.param_type) {
                    bound.insert(param.name.clone(), coerced);
                    continue;
                }
            }
            if param.required {
                missing.push(param.name.clone());
            }
        }

        if !missing.is_empty() {
            return Err(SqlGenError::RequiredParameterMissing {
                template_id: template.id.clone(),
                missing,
            });
        }
        Ok(bound)
    }

    /// Explicit dictionaries skip extraction and bind at full confidence.
    pub fn bind_explicit(&self, template: &SqlTemplate, parameters: &Map<String, Value>) -> Result<Parameters> {
        let candidates = parameters
            .iter()
            .filter_map(|(name, value)| {
                let declared = template.parameter(name)?;
                Some(ExtractedParameter::new(name, value.clone(), declared.param_type, 1.0))
            })
            .collect();
        self.bind(template, candidates)
    }

    fn normalize_synonym(&self, param: &SqlTemplateParameter, value: &Value) -> Value {
        let Value::String(raw) = value else {
            return value.clone();
        };
        let status_like = matches!(param.param_type, ParameterType::Enum)
            || param.name.to_lowercase().contains("status");
        // values already in the allowed list are kept verbatim
        if !status_like || (param.allowed_values.is_some() && param.allows(value)) {
            return value.clone();
        }
        self.synonyms
            .canonical(raw)
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_else(|| value.clone())
    }
}

impl Default for ParameterExtractor {
    fn default() -> Self {
        Self::new(SynonymTable::default(), 0.5)
    }
}

/// Merge collaborator output with heuristics. Collaborator values win.
pub fn merge_candidates(primary: Vec<ExtractedParameter>, fallback: Vec<ExtractedParameter>) -> Vec<ExtractedParameter> {
    let mut merged = primary;
    for candidate in fallback {
        if !merged.iter().any(|p| p.name.eq_ignore_ascii_case(&candidate.name)) {
            merged.push(candidate);
        }
    }
    merged
}

fn split_camel(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if (c.is_uppercase() && !current.is_empty()) || c == '_' {
            words.push(std::mem::take(&mut current));
        }
        if c != '_' {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.into_iter().filter(|w| !w.is_empty()).map(|w| regex::escape(&w)).collect()
}

fn is_range_end(name: &str) -> bool {
    ["end", "to", "until", "through"].iter().any(|k| name.contains(k))
}

fn is_row_bound(name: &str) -> bool {
    ["limit", "top", "count", "max"].iter().any(|k| name.contains(k))
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = haystack[..i].chars().next_back().map(|c| !c.is_alphanumeric()).unwrap_or(true);
        let after = haystack[i + word.len()..].chars().next().map(|c| !c.is_alphanumeric()).unwrap_or(true);
        before && after
    })
}

fn allowed_list(param: &SqlTemplateParameter) -> String {
    param
        .allowed_values
        .as_ref()
        .map(|values| values.iter().map(display_value).collect::<Vec<_>>().join(", "))
        .unwrap_or_default()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
