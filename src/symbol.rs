//! Symbol types
//!
//! Two shapes of symbol flow through Rockskip:
//! - `ParsedSymbol`: what a parser reports for one file (name, line, kind, parent)
//! - `Symbol`: a search result, located in a repository path

use serde::{Deserialize, Serialize};

/// A symbol as reported by a parser for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSymbol {
    /// Symbol name (just the identifier)
    pub name: String,
    /// Line number where the symbol is defined (1-indexed)
    pub line: u32,
    /// Parser-specific kind (function, class, variable, ...)
    pub kind: String,
    /// Enclosing symbol name, if any
    pub parent: Option<String>,
}

impl ParsedSymbol {
    pub fn new(name: impl Into<String>, line: u32, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line,
            kind: kind.into(),
            parent: None,
        }
    }

    /// Set the enclosing symbol
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// File path relative to repository root
    pub path: String,
    /// Line number (1-indexed)
    pub line: u32,
    /// Byte column of the name within its line (0 when the name isn't found verbatim)
    pub character: u32,
    pub kind: String,
    pub parent: Option<String>,
}

impl Symbol {
    /// Locate a parsed symbol in the file it came from.
    pub fn from_parsed(path: &str, parsed: ParsedSymbol, contents: &str) -> Self {
        let character = contents
            .lines()
            .nth(parsed.line.saturating_sub(1) as usize)
            .and_then(|line| line.find(&parsed.name))
            .unwrap_or(0) as u32;

        Self {
            name: parsed.name,
            path: path.to_string(),
            line: parsed.line,
            character,
            kind: parsed.kind,
            parent: parsed.parent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_is_column_of_name() {
        let contents = "package main\n\nfunc   handleRequest() {}\n";
        let parsed = ParsedSymbol::new("handleRequest", 3, "function");
        let symbol = Symbol::from_parsed("main.go", parsed, contents);

        assert_eq!(symbol.line, 3);
        assert_eq!(symbol.character, 7);
        assert_eq!(symbol.path, "main.go");
    }

    #[test]
    fn test_character_defaults_to_zero() {
        let parsed = ParsedSymbol::new("missing", 40, "variable").with_parent("Outer");
        let symbol = Symbol::from_parsed("a.py", parsed, "x = 1\n");

        assert_eq!(symbol.character, 0);
        assert_eq!(symbol.parent.as_deref(), Some("Outer"));
    }
}
