//! Regex classification for SQL predicate selection
//!
//! A search regex is parsed into its syntax tree and mapped to the cheapest SQL form that
//! selects the same rows:
//! - `^foo$`         -> `column = 'foo'`
//! - `^foo`          -> prefix comparison
//! - `\.(go|rs)$`    -> `column GLOB '*.go' OR column GLOB '*.rs'`
//! - anything else   -> `regexp(pattern, column)`

use regex_syntax::ast::{Ast, AssertionKind, GroupKind};
use rusqlite::types::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegexClass {
    /// Matches everything
    Empty,
    LiteralEquality(String),
    LiteralPrefix(String),
    /// File extensions without the dot
    FileExtensionSet(Vec<String>),
    GeneralRegex(String),
}

/// A SQL boolean expression with `?` placeholders and their values, in order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlPredicate {
    fn negate(self) -> Self {
        Self {
            sql: format!("NOT ({})", self.sql),
            params: self.params,
        }
    }

    /// AND together the given predicates; `None` when there are none
    pub fn and_all(predicates: impl IntoIterator<Item = SqlPredicate>) -> Option<SqlPredicate> {
        let mut sql = Vec::new();
        let mut params = Vec::new();
        for predicate in predicates {
            sql.push(format!("({})", predicate.sql));
            params.extend(predicate.params);
        }
        if sql.is_empty() {
            None
        } else {
            Some(SqlPredicate { sql: sql.join(" AND "), params })
        }
    }
}

fn literal_char(ast: &Ast) -> Option<char> {
    match ast {
        Ast::Literal(lit) => Some(lit.c),
        _ => None,
    }
}

fn literal_string(asts: &[Ast]) -> Option<String> {
    asts.iter().map(literal_char).collect()
}

fn is_start(ast: &Ast) -> bool {
    matches!(ast, Ast::Assertion(a) if matches!(a.kind, AssertionKind::StartLine | AssertionKind::StartText))
}

fn is_end(ast: &Ast) -> bool {
    matches!(ast, Ast::Assertion(a) if matches!(a.kind, AssertionKind::EndLine | AssertionKind::EndText))
}

fn concat_items(ast: &Ast) -> &[Ast] {
    match ast {
        Ast::Concat(concat) => &concat.asts,
        other => std::slice::from_ref(other),
    }
}

fn is_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Extensions matched by the part of `\.ext$` between the dot and the anchor
fn extensions(middle: &[Ast]) -> Option<Vec<String>> {
    let alternatives: Vec<Option<String>> = match middle {
        [Ast::Group(group)] => {
            let plain = match &group.kind {
                GroupKind::CaptureIndex(_) | GroupKind::CaptureName { .. } => true,
                GroupKind::NonCapturing(flags) => flags.items.is_empty(),
            };
            if !plain {
                return None;
            }
            match group.ast.as_ref() {
                Ast::Alternation(alt) => alt.asts.iter().map(|a| literal_string(concat_items(a))).collect(),
                inner => vec![literal_string(concat_items(inner))],
            }
        }
        _ => vec![literal_string(middle)],
    };

    let exts: Option<Vec<String>> = alternatives.into_iter().collect();
    exts.filter(|exts| !exts.is_empty() && exts.iter().all(|e| is_extension(e)))
}

/// Classify a regex by its syntax tree
pub fn classify(pattern: &str) -> Result<RegexClass> {
    if pattern.is_empty() || pattern == "^" {
        return Ok(RegexClass::Empty);
    }

    let ast = regex_syntax::ast::parse::Parser::new()
        .parse(pattern)
        .map_err(|e| Error::InvalidQuery(format!("{pattern}: {e}")))?;
    if matches!(ast, Ast::Empty(_)) {
        return Ok(RegexClass::Empty);
    }

    let items = concat_items(&ast);
    let general = RegexClass::GeneralRegex(pattern.to_string());

    let class = match items {
        [start, middle @ .., end] if is_start(start) && is_end(end) => {
            literal_string(middle).map(RegexClass::LiteralEquality)
        }
        [start, rest @ ..] if is_start(start) && !rest.is_empty() => {
            literal_string(rest).map(RegexClass::LiteralPrefix)
        }
        [dot, middle @ .., end] if literal_char(dot) == Some('.') && is_end(end) && !middle.is_empty() => {
            extensions(middle).map(RegexClass::FileExtensionSet)
        }
        _ => None,
    };
    Ok(class.unwrap_or(general))
}

/// Cheapest SQL predicate for `column` matching `pattern`; `None` when it matches everything.
///
/// Case-insensitive patterns always use `regexp()` with an inline `(?i)` flag.
pub fn regex_predicate(column: &str, pattern: &str, case_sensitive: bool) -> Result<Option<SqlPredicate>> {
    let class = classify(pattern)?;
    let predicate = match class {
        RegexClass::Empty => return Ok(None),
        _ if !case_sensitive => SqlPredicate {
            sql: format!("regexp(?, {column})"),
            params: vec![Value::Text(format!("(?i){pattern}"))],
        },
        RegexClass::LiteralEquality(literal) => SqlPredicate {
            sql: format!("{column} = ?"),
            params: vec![Value::Text(literal)],
        },
        RegexClass::LiteralPrefix(prefix) => SqlPredicate {
            sql: format!("substr({column}, 1, ?) = ?"),
            params: vec![Value::Integer(prefix.chars().count() as i64), Value::Text(prefix)],
        },
        RegexClass::FileExtensionSet(exts) => SqlPredicate {
            sql: exts.iter().map(|_| format!("{column} GLOB ?")).collect::<Vec<_>>().join(" OR "),
            params: exts.into_iter().map(|ext| Value::Text(format!("*.{ext}"))).collect(),
        },
        RegexClass::GeneralRegex(regex) => SqlPredicate {
            sql: format!("regexp(?, {column})"),
            params: vec![Value::Text(regex)],
        },
    };
    Ok(Some(predicate))
}

/// Predicate over the symbols table for a name query plus path filters
pub fn search_predicate(
    query: &str,
    include_patterns: &[String],
    exclude_pattern: &str,
    case_sensitive: bool,
) -> Result<Option<SqlPredicate>> {
    let mut conjuncts = Vec::new();
    conjuncts.extend(regex_predicate("name", query, case_sensitive)?);
    for pattern in include_patterns {
        conjuncts.extend(regex_predicate("path", pattern, case_sensitive)?);
    }
    conjuncts.extend(regex_predicate("path", exclude_pattern, case_sensitive)?.map(SqlPredicate::negate));
    Ok(SqlPredicate::and_all(conjuncts))
}
