//! Value-type rules: infer what a parameter value is (from its declared type,
//! then its name, then its content) and check it against that type.
//!
//! Card numbers and SSNs are always reported as sensitive data, whether or
//! not they are well formed.

use crate::extractor::coercion::{parse_date, strip_currency};
use crate::template::ParameterType;
use crate::validation::{IssueCategory, Severity, ValidationContext, ValidationIssue, ValidationRule};
use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref EMAIL_SHAPE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap();
    static ref EMAIL_STRICT: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").unwrap();
    static ref URL_SHAPE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap();
    static ref IP_SHAPE: Regex = Regex::new(r"^\d{1,3}(?:\.\d{1,3}){3}$").unwrap();
    static ref SSN_SHAPE: Regex = Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap();
    static ref DIGITS_AND_SEPARATORS: Regex = Regex::new(r"^[\d\s-]+$").unwrap();
    static ref PHONE_SHAPE: Regex = Regex::new(r"^\+?[\d\s().-]+$").unwrap();
    static ref ZIP_SHAPE: Regex = Regex::new(r"^\d{5}(?:-\d{4})?$").unwrap();
    static ref DATE_SHAPE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
}

const SENTINEL_DATES: &[(i32, u32, u32)] = &[(1, 1, 1), (1753, 1, 1), (1900, 1, 1), (9999, 12, 31)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Email,
    Url,
    Phone,
    CreditCard,
    Ssn,
    IpAddress,
    Zip,
    Currency,
    Date,
}

pub fn infer_value_kind(name: &str, value: &Value, declared: Option<ParameterType>) -> Option<ValueKind> {
    match declared {
        Some(ParameterType::Email) => return Some(ValueKind::Email),
        Some(ParameterType::Url) => return Some(ValueKind::Url),
        Some(ParameterType::Phone) => return Some(ValueKind::Phone),
        Some(ParameterType::Currency) => return Some(ValueKind::Currency),
        Some(ParameterType::DateTime) => return Some(ValueKind::Date),
        _ => {}
    }
    kind_from_name(name).or_else(|| kind_from_content(value))
}

fn kind_from_name(name: &str) -> Option<ValueKind> {
    let n = name.to_lowercase().replace(['_', '-'], "");
    let kind = if n.contains("email") {
        ValueKind::Email
    } else if n.contains("ssn") || n.contains("socialsecurity") {
        ValueKind::Ssn
    } else if n.contains("creditcard") || n.contains("cardnumber") || n.contains("ccnumber") {
        ValueKind::CreditCard
    } else if n.contains("phone") || n.contains("mobile") || n.contains("fax") {
        ValueKind::Phone
    } else if n.contains("url") || n.contains("website") || n.contains("homepage") {
        ValueKind::Url
    } else if n == "ip" || n.contains("ipaddress") || n.contains("ipaddr") {
        ValueKind::IpAddress
    } else if n.contains("zip") || n.contains("postal") {
        ValueKind::Zip
    } else if ["amount", "price", "cost", "salary", "balance", "total"]
        .iter()
        .any(|k| n.contains(k))
    {
        ValueKind::Currency
    } else if n.contains("date") || n.contains("timestamp") || n.ends_with("edat") {
        ValueKind::Date
    } else {
        return None;
    };
    Some(kind)
}

fn kind_from_content(value: &Value) -> Option<ValueKind> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_u64() => {
            let digits = n.to_string();
            return (13..=16).contains(&digits.len()).then_some(ValueKind::CreditCard);
        }
        _ => return None,
    };
    let digit_count = count_digits(&text);

    if EMAIL_SHAPE.is_match(&text) {
        Some(ValueKind::Email)
    } else if URL_SHAPE.is_match(&text) {
        Some(ValueKind::Url)
    } else if IP_SHAPE.is_match(&text) {
        Some(ValueKind::IpAddress)
    } else if SSN_SHAPE.is_match(&text) {
        Some(ValueKind::Ssn)
    } else if DIGITS_AND_SEPARATORS.is_match(&text) && (13..=16).contains(&digit_count) {
        Some(ValueKind::CreditCard)
    } else if ZIP_SHAPE.is_match(&text) {
        Some(ValueKind::Zip)
    } else if PHONE_SHAPE.is_match(&text) && (10..=15).contains(&digit_count) {
        Some(ValueKind::Phone)
    } else if DATE_SHAPE.is_match(&text) {
        Some(ValueKind::Date)
    } else {
        None
    }
}

fn count_digits(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_digit()).count()
}

fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Luhn checksum: from the right, double every second digit, subtract 9 when
/// the double exceeds 9, and require the total to be divisible by 10.
pub fn luhn_valid(number: &str) -> bool {
    let digits = digits_only(number);
    if digits.is_empty() {
        return false;
    }
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn valid_email(text: &str) -> bool {
    let Some((local, _)) = text.rsplit_once('@') else {
        return false;
    };
    EMAIL_STRICT.is_match(text) && !text.contains("..") && local.len() <= 64 && text.len() <= 254
}

fn valid_url(text: &str) -> bool {
    let Some((scheme, rest)) = text.split_once("://") else {
        return false;
    };
    if !["http", "https", "ftp", "ftps"].contains(&scheme.to_lowercase().as_str()) {
        return false;
    }
    let host = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or("")
        .rsplit('@')
        .next()
        .unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    !host.is_empty() && !host.contains(char::is_whitespace)
}

fn valid_ip(text: &str) -> bool {
    let octets: Vec<&str> = text.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.len() <= 3 && o.chars().all(|c| c.is_ascii_digit()) && o.parse::<u8>().is_ok())
}

fn valid_zip(text: &str) -> bool {
    let digits = count_digits(text);
    text.chars().all(|c| c.is_ascii_digit() || c == '-') && text.matches('-').count() <= 1 && (digits == 5 || digits == 9)
}

/// Format checks. Problems are warnings: the value is bound, so it cannot
/// alter the statement, but it is probably not what the caller meant.
pub struct ValueFormatRule;

impl ValueFormatRule {
    fn check(&self, ctx: &ValidationContext<'_>, kind: ValueKind, text: &str) -> Option<String> {
        match kind {
            ValueKind::Email => (!valid_email(text)).then(|| "is not a valid email address".to_string()),
            ValueKind::Url => (!valid_url(text)).then(|| "is not a valid URL (scheme and host required)".to_string()),
            ValueKind::Phone => {
                let digits = count_digits(text);
                (!(10..=15).contains(&digits)).then(|| format!("has {} digits; phone numbers need 10-15", digits))
            }
            ValueKind::CreditCard => {
                let digits = count_digits(text);
                if !(13..=16).contains(&digits) {
                    Some(format!("has {} digits; card numbers need 13-16", digits))
                } else if !luhn_valid(text) {
                    Some("fails the Luhn checksum".to_string())
                } else {
                    None
                }
            }
            ValueKind::Ssn => {
                let digits = count_digits(text);
                (digits != 9).then(|| format!("has {} digits; SSNs need 9", digits))
            }
            ValueKind::IpAddress => (!valid_ip(text)).then(|| "is not a valid IPv4 address".to_string()),
            ValueKind::Zip => (!valid_zip(text)).then(|| "is not a 5 or 9 digit ZIP code".to_string()),
            ValueKind::Currency => match strip_currency(text).parse::<f64>() {
                Err(_) => Some("is not a parseable amount".to_string()),
                Ok(v) if v < 0.0 => Some("is a negative amount".to_string()),
                Ok(v) if v > ctx.config.large_currency_threshold => {
                    Some(format!("exceeds {} and is unusually large", ctx.config.large_currency_threshold))
                }
                Ok(_) => None,
            },
            ValueKind::Date => self.check_date(ctx, text),
        }
    }

    fn check_date(&self, ctx: &ValidationContext<'_>, text: &str) -> Option<String> {
        let Some(date) = parse_date(text) else {
            return Some("is not a valid date".to_string());
        };
        if SENTINEL_DATES
            .iter()
            .any(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d) == Some(date))
            || date == NaiveDate::MIN
            || date == NaiveDate::MAX
        {
            return Some(format!("{} is a sentinel date", date));
        }
        let years = ctx.config.date_sanity_years;
        let offset = (date.year() as i64 - ctx.today.year() as i64).abs();
        (offset > years).then(|| format!("{} is more than {} years from today", date, years))
    }
}

impl ValidationRule for ValueFormatRule {
    fn name(&self) -> &str {
        "ValueFormat"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Business
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (name, value) in ctx.parameters {
            let Some(kind) = infer_value_kind(name, value, ctx.declared_type(name)) else {
                continue;
            };
            let Some(text) = value_text(value) else { continue };
            if let Some(problem) = self.check(ctx, kind, &text) {
                issues.push(
                    self.issue(format!("Parameter '{}' ({:?}) {}", name, kind, problem))
                        .for_parameter(name)
                        .with_value(text),
                );
            }
        }
        issues
    }
}

/// Classifies by content first, ignoring declared types: a card-shaped or
/// SSN-shaped value is sensitive whatever the parameter is called.
fn sensitive_label(name: &str, value: &Value) -> Option<&'static str> {
    let text = value_text(value)?;
    let digits = count_digits(&text);
    let card_shaped = match value {
        Value::Number(n) => n.is_u64() && (13..=16).contains(&text.len()),
        _ => DIGITS_AND_SEPARATORS.is_match(&text) && (13..=16).contains(&digits),
    };
    let name_kind = kind_from_name(name);
    if card_shaped || (name_kind == Some(ValueKind::CreditCard) && (13..=16).contains(&digits)) {
        Some("credit card number")
    } else if SSN_SHAPE.is_match(&text) || (name_kind == Some(ValueKind::Ssn) && digits == 9) {
        Some("social security number")
    } else {
        None
    }
}

pub struct SensitiveDataRule;

impl ValidationRule for SensitiveDataRule {
    fn name(&self) -> &str {
        "SensitiveData"
    }

    fn category(&self) -> IssueCategory {
        IssueCategory::Security
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (name, value) in ctx.parameters {
            let Some(label) = sensitive_label(name, value) else { continue };
            issues.push(
                self.issue(format!("Parameter '{}' carries sensitive data: {}", name, label))
                    .for_parameter(name)
                    .with_recommendation("Do not query by raw card numbers or SSNs; use a token or surrogate key"),
            );
        }
        issues
    }
}
