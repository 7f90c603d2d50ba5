//! Lightweight statement analysis shared by the rules and the optimizer:
//! clause boundaries, placeholders per clause and result-size bounds.
//!
//! This is a token scan, not a full parse. It tolerates `@name` placeholders
//! and dialect quirks that would trip a strict parser.

use crate::extractor::Parameters;
use crate::template::placeholders_in;
use crate::validation::types::strip_comments;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref LIMIT: Regex = Regex::new(r"(?i)\bLIMIT\s+(\d+|@[A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref TOP: Regex = Regex::new(r"(?i)\bTOP\s*\(?\s*(\d+|@[A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref FETCH: Regex = Regex::new(r"(?i)\bFETCH\s+(?:FIRST|NEXT)\s+(\d+|@[A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref JOIN: Regex = Regex::new(r"(?i)\bJOIN\b").unwrap();
    static ref SUBQUERY: Regex = Regex::new(r"(?i)\(\s*SELECT\b").unwrap();
    static ref SELECT_STAR: Regex = Regex::new(r"(?i)\bSELECT\s+(?:DISTINCT\s+)?(?:TOP\s*\(?\s*\S+?\s*\)?\s+)?(?:[A-Za-z_][A-Za-z0-9_]*\.)?\*").unwrap();
}

const SET_OPERATORS: &[&str] = &["UNION", "EXCEPT", "INTERSECT"];

const CLAUSE_END: &[&str] = &[
    "GROUP", "ORDER", "LIMIT", "HAVING", "RETURNING", "OFFSET", "UNION", "FETCH", "WINDOW", "EXCEPT",
    "INTERSECT",
];

/// Uppercased word at parenthesis depth zero, with its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    text: String,
    start: usize,
}

fn top_level_words(sql: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut current: Option<Word> = None;

    for (i, c) in sql.char_indices() {
        if in_quote {
            if c == '\'' {
                in_quote = false;
            }
            continue;
        }
        let is_word_char = c.is_alphanumeric() || c == '_' || c == '@';
        if is_word_char && depth == 0 {
            current
                .get_or_insert_with(|| Word {
                    text: String::new(),
                    start: i,
                })
                .text
                .push(c.to_ascii_uppercase());
            continue;
        }
        if let Some(word) = current.take() {
            words.push(word);
        }
        match c {
            '\'' => in_quote = true,
            '(' => depth += 1,
            ')' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    if let Some(word) = current {
        words.push(word);
    }
    words
}

/// Text of the top-level clause opened by `keyword`, up to the next
/// clause-ending keyword (or `until`, if given).
fn clause(sql: &str, keyword: &str, until: &[&str]) -> Option<String> {
    let cleaned = strip_comments(sql);
    let (start, end) = clause_span(&cleaned, keyword, until)?;
    Some(cleaned[start..end].to_string())
}

fn clause_span(cleaned: &str, keyword: &str, until: &[&str]) -> Option<(usize, usize)> {
    let words = top_level_words(cleaned);
    let open = words.iter().position(|w| w.text == keyword)?;
    let body_start = words[open].start + keyword.len();
    let end = words[open + 1..]
        .iter()
        .find(|w| CLAUSE_END.contains(&w.text.as_str()) || until.contains(&w.text.as_str()))
        .map(|w| w.start)
        .unwrap_or(cleaned.len());
    Some((body_start, end))
}

pub fn where_clause(sql: &str) -> Option<String> {
    clause(sql, "WHERE", &[])
}

/// Byte range of the WHERE body within `sql`, which must already be free of comments.
pub fn where_clause_span(sql: &str) -> Option<(usize, usize)> {
    clause_span(sql, "WHERE", &[])
}

/// Whether the WHERE clause joins predicates with OR at its top level.
pub fn where_has_top_level_or(sql: &str) -> bool {
    where_clause(sql)
        .map(|body| top_level_words(&body).iter().any(|w| w.text == "OR"))
        .unwrap_or(false)
}

/// Branches of a compound statement, split on top-level UNION, EXCEPT and
/// INTERSECT. A plain statement is a single branch.
pub fn compound_branches(sql: &str) -> Vec<String> {
    let cleaned = strip_comments(sql);
    let mut branches = Vec::new();
    let mut last = 0;
    for word in top_level_words(&cleaned) {
        if SET_OPERATORS.contains(&word.text.as_str()) {
            branches.push(cleaned[last..word.start].trim().to_string());
            last = word.start + word.text.len();
        }
    }
    branches.push(cleaned[last..].trim().to_string());
    branches.retain(|b| !b.is_empty());
    branches
}

/// Placeholders referenced in the top-level WHERE clause.
pub fn filter_placeholders(sql: &str) -> Vec<String> {
    where_clause(sql).map(|w| placeholders_in(&w)).unwrap_or_default()
}

/// Placeholders in an UPDATE's SET list.
pub fn set_placeholders(sql: &str) -> Vec<String> {
    clause(sql, "SET", &["WHERE", "FROM"])
        .map(|s| placeholders_in(&s))
        .unwrap_or_default()
}

/// Predicates of the WHERE clause split on top-level AND.
pub fn where_predicates(sql: &str) -> Vec<String> {
    let Some(body) = where_clause(sql) else {
        return Vec::new();
    };
    let mut predicates = Vec::new();
    let mut last = 0;
    let words = top_level_words(&body);
    for (idx, word) in words.iter().enumerate() {
        // BETWEEN x AND y keeps its AND
        let between = idx >= 2 && words[idx - 2].text == "BETWEEN";
        if word.text == "AND" && !between {
            predicates.push(body[last..word.start].trim().to_string());
            last = word.start + 3;
        }
    }
    predicates.push(body[last..].trim().to_string());
    predicates.retain(|p| !p.is_empty());
    predicates
}

/// Declared row bound (LIMIT, TOP or FETCH FIRST), resolving placeholders
/// against `parameters`. `None` when unbounded or unresolvable. A digit
/// string too large for `u64` saturates to `u64::MAX`.
pub fn row_limit(sql: &str, parameters: &Parameters) -> Option<u64> {
    let raw = [&*LIMIT, &*TOP, &*FETCH]
        .iter()
        .find_map(|re| re.captures(sql).map(|c| c[1].to_string()))?;
    match raw.strip_prefix('@') {
        Some(name) => match parameters.get(name)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= u64::MAX as f64).map(|_| u64::MAX)),
            Value::String(s) => parse_bound(s.trim()),
            _ => None,
        },
        None => parse_bound(&raw),
    }
}

fn parse_bound(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(u64::MAX))
}

pub fn has_row_bound(sql: &str) -> bool {
    LIMIT.is_match(sql) || TOP.is_match(sql) || FETCH.is_match(sql)
}

pub fn join_count(sql: &str) -> usize {
    JOIN.find_iter(&strip_comments(sql)).count()
}

pub fn subquery_count(sql: &str) -> usize {
    SUBQUERY.find_iter(&strip_comments(sql)).count()
}

pub fn selects_star(sql: &str) -> bool {
    SELECT_STAR.is_match(&strip_comments(sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_where_clause_stops_at_order_by() {
        let sql = "SELECT * FROM Orders WHERE TenantId = @tenantId AND Status = @status ORDER BY Id LIMIT 10";
        assert_eq!(filter_placeholders(sql), vec!["tenantId", "status"]);
        assert_eq!(where_predicates(sql).len(), 2);
    }

    #[test]
    fn test_subquery_where_is_not_top_level() {
        let sql = "SELECT * FROM Orders o JOIN (SELECT Id FROM Customers WHERE Region = @region) c ON c.Id = o.CustomerId";
        assert!(where_clause(sql).is_none());
        assert!(filter_placeholders(sql).is_empty());
        assert_eq!(subquery_count(sql), 1);
        assert_eq!(join_count(sql), 1);
    }

    #[test]
    fn test_set_placeholders() {
        let sql = "UPDATE Orders SET Status = @status, Note = @note WHERE Id = @id AND TenantId = @tenantId";
        assert_eq!(set_placeholders(sql), vec!["status", "note"]);
        assert_eq!(filter_placeholders(sql), vec!["id", "tenantId"]);
    }

    #[test]
    fn test_between_keeps_single_predicate() {
        let sql = "SELECT Id FROM Orders WHERE CreatedAt BETWEEN @from AND @to AND TenantId = @tenantId";
        assert_eq!(where_predicates(sql).len(), 2);
    }

    #[test]
    fn test_row_limit_resolves_placeholder() {
        let mut params = Parameters::new();
        params.insert("limit".to_string(), json!(5000));
        assert_eq!(row_limit("SELECT Id FROM t LIMIT @limit", &params), Some(5000));
        assert_eq!(row_limit("SELECT TOP (25) Id FROM t", &params), Some(25));
        assert_eq!(row_limit("SELECT Id FROM t", &params), None);
        assert!(!has_row_bound("SELECT Id FROM t"));
    }

    #[test]
    fn test_oversized_limit_saturates() {
        let mut params = Parameters::new();
        params.insert("limit".to_string(), json!("123456789012345678901234"));
        assert_eq!(row_limit("SELECT Id FROM t LIMIT 99999999999999999999", &params), Some(u64::MAX));
        assert_eq!(row_limit("SELECT Id FROM t LIMIT @limit", &params), Some(u64::MAX));
        params.insert("limit".to_string(), json!("lots"));
        assert_eq!(row_limit("SELECT Id FROM t LIMIT @limit", &params), None);
    }

    #[test]
    fn test_compound_branches() {
        let sql = "SELECT Id FROM a WHERE x = @x UNION ALL SELECT Id FROM b WHERE Id IN (SELECT Id FROM c UNION SELECT 1)";
        let branches = compound_branches(sql);
        assert_eq!(branches.len(), 2);
        assert!(branches[1].starts_with("ALL SELECT Id FROM b"));
        assert_eq!(compound_branches("SELECT 1").len(), 1);
    }

    #[test]
    fn test_selects_star() {
        assert!(selects_star("SELECT * FROM t"));
        assert!(selects_star("select o.* from t o"));
        assert!(!selects_star("SELECT COUNT(*) FROM t"));
    }
}
