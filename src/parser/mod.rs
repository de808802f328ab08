//! Symbol parsers
//!
//! Parsers are stateful (usually a subprocess), so they are created through a factory once
//! per index run or search and then fed one file at a time.

pub mod ctags;

use async_trait::async_trait;

use crate::Result;
use crate::symbol::ParsedSymbol;

pub use ctags::CtagsParserFactory;

#[async_trait]
pub trait Parser: Send {
    /// Symbols defined in one file
    async fn parse(&mut self, path: &str, content: &[u8]) -> Result<Vec<ParsedSymbol>>;
}

#[async_trait]
pub trait ParserFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn Parser>>;
}
