//! Status synonyms: maps loose wording ("done", "in progress") onto the
//! canonical enum values templates expect.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SynonymTable {
    entries: HashMap<String, String>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (canonical, synonyms) in [
            ("Completed", &["done", "finished", "complete", "completed", "closed", "resolved"][..]),
            ("Pending", &["pending", "open", "waiting", "outstanding", "queued"][..]),
            ("InProgress", &["in progress", "active", "ongoing", "started", "processing"][..]),
            ("Cancelled", &["cancelled", "canceled", "aborted", "void"][..]),
            ("Shipped", &["shipped", "sent", "dispatched"][..]),
        ] {
            for synonym in synonyms {
                table.insert(synonym, canonical);
            }
        }
        table
    }
}

impl SynonymTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, synonym: &str, canonical: &str) {
        self.entries
            .insert(normalize(synonym), canonical.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical value for a whole phrase, if known.
    pub fn canonical(&self, phrase: &str) -> Option<&str> {
        self.entries.get(&normalize(phrase)).map(|s| s.as_str())
    }

    /// Longest synonym occurring as whole words in `text`, with its canonical value.
    pub fn find_in(&self, text: &str) -> Option<(&str, &str)> {
        let tokens = tokenize(text);
        let mut best: Option<(&str, &str)> = None;
        for (synonym, canonical) in &self.entries {
            let phrase: Vec<&str> = synonym.split(' ').collect();
            let found = tokens
                .windows(phrase.len())
                .any(|w| w.iter().zip(&phrase).all(|(a, b)| a == b));
            let longer = best.map(|(s, _)| synonym.len() > s.len()).unwrap_or(true);
            if found && longer {
                best = Some((synonym.as_str(), canonical.as_str()));
            }
        }
        best
    }
}

fn normalize(phrase: &str) -> String {
    tokenize(phrase).join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
