//! Query Optimizer
//!
//! Scores statement complexity and, above the configured threshold, proposes
//! a rewritten statement. The proposal is advisory: the caller's statement is
//! never modified and nothing here is enforced.

use crate::error::SqlGenError;
use crate::validation::analysis::{
    has_row_bound, join_count, selects_star, subquery_count, where_clause, where_clause_span, where_has_top_level_or,
    where_predicates,
};
use crate::validation::types::strip_comments;
use crate::validation::SqlOperationType;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

lazy_static! {
    static ref FROM_TABLE: Regex = Regex::new(r"(?i)\bFROM\s+([A-Za-z_][A-Za-z0-9_.]*)").unwrap();
    static ref STAR_PROJECTION: Regex = Regex::new(r"(?i)^(\s*SELECT\s+(?:DISTINCT\s+)?)\*").unwrap();
    static ref EQUALITY: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*\s*=\s*(?:@[A-Za-z_][A-Za-z0-9_]*|\d+|'[^']*')$").unwrap();
    static ref RANGE: Regex = Regex::new(r"(?i)(?:<=|>=|<|>|\bBETWEEN\b)").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref TRAILING_SEMICOLON: Regex = Regex::new(r";\s*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptimizationResult {
    pub is_optimized: bool,
    pub optimized_query: Option<String>,
    /// Heuristic estimate, 0 - 100
    pub estimated_improvement_percentage: f64,
    pub explanation: String,
    /// 0 - 10
    pub complexity_score: f64,
}

/// Contribution of each factor to the complexity score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityBreakdown {
    pub joins: usize,
    pub subqueries: usize,
    pub unfiltered: bool,
    pub select_star: bool,
    pub unbounded: bool,
}

impl ComplexityBreakdown {
    pub fn of(sql: &str) -> Self {
        let is_select = SqlOperationType::detect(sql) == SqlOperationType::Select;
        Self {
            joins: join_count(sql),
            subqueries: subquery_count(sql),
            unfiltered: where_clause(sql).is_none(),
            select_star: selects_star(sql),
            unbounded: is_select && !has_row_bound(sql),
        }
    }

    /// Joins up to 3 points, subqueries up to 3, no filter 2, `SELECT *` 1,
    /// no row bound 1.
    pub fn score(&self) -> f64 {
        let mut score = (self.joins as f64).min(3.0) + (self.subqueries as f64 * 1.5).min(3.0);
        if self.unfiltered {
            score += 2.0;
        }
        if self.select_star {
            score += 1.0;
        }
        if self.unbounded {
            score += 1.0;
        }
        score.min(10.0)
    }
}

pub struct QueryOptimizer {
    threshold: f64,
    default_limit: u64,
    /// Lowercased table name to column list, used to expand `SELECT *`
    known_columns: HashMap<String, Vec<String>>,
}

impl QueryOptimizer {
    pub fn new(threshold: f64, default_limit: u64) -> Self {
        Self {
            threshold,
            default_limit,
            known_columns: HashMap::new(),
        }
    }

    pub fn with_table_columns(mut self, table: &str, columns: &[&str]) -> Self {
        self.known_columns.insert(
            table.to_lowercase(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn complexity_score(&self, sql: &str) -> f64 {
        ComplexityBreakdown::of(sql).score()
    }

    pub fn optimize(&self, sql: &str) -> QueryOptimizationResult {
        let breakdown = ComplexityBreakdown::of(sql);
        let score = breakdown.score();
        debug!(score, joins = breakdown.joins, subqueries = breakdown.subqueries, "Scored statement");

        if score <= self.threshold {
            return unavailable(
                score,
                SqlGenError::OptimizationUnavailable(format!(
                    "complexity {:.1} is within the threshold of {:.1}",
                    score, self.threshold
                )),
            );
        }

        let mut rewritten = strip_comments(sql).trim().to_string();
        let mut notes: Vec<String> = Vec::new();
        let mut improvement = 0.0;

        if breakdown.select_star {
            match self.expand_star(&rewritten) {
                Some(expanded) => {
                    rewritten = expanded;
                    notes.push("replaced SELECT * with an explicit column list".to_string());
                    improvement += 10.0;
                }
                None => notes.push("list the required columns instead of SELECT *".to_string()),
            }
        }

        if let Some((reordered, removed)) = reorder_filters(&rewritten) {
            if removed > 0 {
                notes.push(format!("removed {} duplicate condition(s)", removed));
                improvement += 5.0 * removed as f64;
            }
            if reordered != rewritten {
                if removed == 0 {
                    notes.push("moved equality filters ahead of range and pattern filters".to_string());
                    improvement += 5.0;
                }
                rewritten = reordered;
            }
        }

        if breakdown.unbounded {
            rewritten = format!("{} LIMIT {}", TRAILING_SEMICOLON.replace(&rewritten, ""), self.default_limit);
            notes.push(format!("bounded the result to {} rows", self.default_limit));
            improvement += 20.0;
        }

        if breakdown.unfiltered {
            notes.push("add a selective filter".to_string());
        }
        if breakdown.subqueries > 0 {
            notes.push("consider rewriting subqueries as joins".to_string());
        }

        let changed = normalize(&rewritten) != normalize(sql);
        let improvement = if changed { improvement.min(60.0) } else { 0.0 };
        info!(score, changed, improvement, "Optimization outcome");

        QueryOptimizationResult {
            is_optimized: changed,
            optimized_query: changed.then_some(rewritten),
            estimated_improvement_percentage: improvement,
            explanation: format!("Complexity {:.1}: {}", score, notes.join("; ")),
            complexity_score: score,
        }
    }

    fn expand_star(&self, sql: &str) -> Option<String> {
        if join_count(sql) > 0 {
            return None;
        }
        let table = FROM_TABLE.captures(sql)?[1].to_lowercase();
        let columns = self.known_columns.get(&table)?;
        let list = columns.join(", ");
        Some(STAR_PROJECTION.replace(sql, |caps: &regex::Captures| format!("{}{}", &caps[1], list)).into_owned())
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new(5.0, 1000)
    }
}

fn unavailable(score: f64, reason: SqlGenError) -> QueryOptimizationResult {
    QueryOptimizationResult {
        is_optimized: false,
        optimized_query: None,
        estimated_improvement_percentage: 0.0,
        explanation: reason.to_string(),
        complexity_score: score,
    }
}

/// Equality filters first, then ranges, then everything else; exact
/// duplicates dropped. Returns the statement and the number removed.
fn reorder_filters(sql: &str) -> Option<(String, usize)> {
    if where_has_top_level_or(sql) {
        return None;
    }
    let (start, end) = where_clause_span(sql)?;
    let predicates = where_predicates(sql);
    if predicates.len() < 2 {
        return None;
    }

    let mut seen: Vec<String> = Vec::new();
    let mut kept: Vec<&String> = Vec::new();
    for predicate in &predicates {
        let key = normalize(predicate);
        if !seen.contains(&key) {
            seen.push(key);
            kept.push(predicate);
        }
    }
    let removed = predicates.len() - kept.len();
    kept.sort_by_key(|p| filter_rank(p));

    let body = kept.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(" AND ");
    let tail = sql[end..].trim_start();
    let rebuilt = if tail.is_empty() {
        format!("{} {}", sql[..start].trim_end(), body)
    } else {
        format!("{} {} {}", sql[..start].trim_end(), body, tail)
    };
    Some((rebuilt, removed))
}

fn filter_rank(predicate: &str) -> u8 {
    if EQUALITY.is_match(predicate.trim()) {
        0
    } else if RANGE.is_match(predicate) {
        1
    } else {
        2
    }
}

fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}
