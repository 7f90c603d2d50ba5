//! Type coercion of loosely-typed values onto declared parameter types.
//!
//! Coercion never fails loudly: a value that cannot be represented as the
//! target type yields `None` and the caller decides whether that matters.

use crate::template::ParameterType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};
use uuid::Uuid;

pub fn coerce(value: &Value, target: ParameterType) -> Option<Value> {
    match target {
        ParameterType::String | ParameterType::Enum => as_text(value).map(Value::String),
        ParameterType::Identifier
        | ParameterType::Email
        | ParameterType::Phone
        | ParameterType::Url => as_text(value).map(|s| Value::String(s.trim().to_string())),
        ParameterType::Integer => coerce_integer(value),
        ParameterType::Decimal | ParameterType::Currency => coerce_decimal(value),
        ParameterType::Boolean => coerce_boolean(value),
        ParameterType::DateTime => as_text(value).and_then(|s| normalize_date(&s)).map(Value::String),
        ParameterType::Guid => as_text(value)
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|u| Value::String(u.hyphenated().to_string())),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::from(f as i64)),
        Value::String(s) => s.trim().replace(',', "").parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_decimal(value: &Value) -> Option<Value> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => strip_currency(s).parse::<f64>().ok(),
        _ => None,
    }?;
    Number::from_f64(parsed).map(Value::Number)
}

/// Drops currency symbols, thousands separators and whitespace.
pub fn strip_currency(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' '))
        .collect()
}

fn coerce_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "n" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

/// RFC 3339 timestamps keep their time component; calendar dates are
/// normalized to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.to_rfc3339());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Calendar date of a value produced by [`normalize_date`].
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_from_string_with_separators() {
        assert_eq!(coerce(&json!("1,200"), ParameterType::Integer), Some(json!(1200)));
        assert_eq!(coerce(&json!("twelve"), ParameterType::Integer), None);
        assert_eq!(coerce(&json!(3.5), ParameterType::Integer), None);
    }

    #[test]
    fn test_currency_strips_symbols() {
        assert_eq!(coerce(&json!("$1,250.50"), ParameterType::Currency), Some(json!(1250.5)));
    }

    #[test]
    fn test_guid_normalized_lowercase() {
        let coerced = coerce(&json!("6F9619FF-8B86-D011-B42D-00C04FC964FF"), ParameterType::Guid);
        assert_eq!(coerced, Some(json!("6f9619ff-8b86-d011-b42d-00c04fc964ff")));
        assert_eq!(coerce(&json!("not-a-guid"), ParameterType::Guid), None);
    }

    #[test]
    fn test_dates() {
        assert_eq!(coerce(&json!("03/15/2024"), ParameterType::DateTime), Some(json!("2024-03-15")));
        assert_eq!(coerce(&json!("2024-02-30"), ParameterType::DateTime), None);
        assert_eq!(parse_date("2024-03-15"), NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn test_booleans() {
        assert_eq!(coerce(&json!("Yes"), ParameterType::Boolean), Some(json!(true)));
        assert_eq!(coerce(&json!(0), ParameterType::Boolean), Some(json!(false)));
        assert_eq!(coerce(&json!("maybe"), ParameterType::Boolean), None);
    }
}
