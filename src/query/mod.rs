pub mod classify;
pub mod engine;

use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::symbol::Symbol;

pub use classify::{RegexClass, SqlPredicate, classify, regex_predicate, search_predicate};

/// Result count used when a request asks for 0
pub const DEFAULT_LIMIT: usize = 100;

/// What to do when the requested commit isn't indexed yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Wait for the commit to be indexed
    #[default]
    Exact,
    /// Search the closest indexed first-parent ancestor right away, and index in the background
    NearestIndexedAncestor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParameters {
    pub repo: String,
    pub commit_id: String,
    /// Symbol name; a regex when `is_regexp`, a literal otherwise
    pub query: String,
    pub is_regexp: bool,
    pub is_case_sensitive: bool,
    /// Path regexes that must all match
    pub include_patterns: Vec<String>,
    /// Path regex that must not match
    pub exclude_pattern: String,
    /// Maximum number of results, `DEFAULT_LIMIT` when 0
    pub first: usize,
    #[serde(with = "millis", rename = "timeout_ms")]
    pub timeout: Option<Duration>,
    /// Defaults to the service's configured mode
    pub mode: Option<SearchMode>,
}

impl SearchParameters {
    pub fn limit(&self) -> usize {
        if self.first == 0 { DEFAULT_LIMIT } else { self.first }
    }

    /// The name query as a regex
    pub fn name_pattern(&self) -> String {
        if self.is_regexp {
            self.query.clone()
        } else {
            regex::escape(&self.query)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub symbols: Vec<Symbol>,
    /// The commit whose symbols were returned
    pub searched_commit: String,
    /// `true` when `searched_commit` is an ancestor of the requested commit
    pub approximate: bool,
}

/// Name and path predicates, re-checked against parsed symbols
#[derive(Debug, Clone)]
pub struct SymbolMatcher {
    name: Option<Regex>,
    include: Vec<Regex>,
    exclude: Option<Regex>,
}

fn compile(pattern: &str, case_sensitive: bool) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let regex = RegexBuilder::new(pattern).case_insensitive(!case_sensitive).build()?;
    Ok(Some(regex))
}

impl SymbolMatcher {
    pub fn new(params: &SearchParameters) -> Result<Self> {
        let case_sensitive = params.is_case_sensitive;
        let mut include = Vec::new();
        for pattern in &params.include_patterns {
            include.extend(compile(pattern, case_sensitive)?);
        }
        Ok(Self {
            name: compile(&params.name_pattern(), case_sensitive)?,
            include,
            exclude: compile(&params.exclude_pattern, case_sensitive)?,
        })
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.include.iter().all(|re| re.is_match(path)) && !self.exclude.as_ref().is_some_and(|re| re.is_match(path))
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.as_ref().is_none_or(|re| re.is_match(name))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
