//! universal-ctags in interactive mode
//!
//! One long-lived `ctags --_interactive` process per parser. Each request is a JSON line
//! followed by the raw file bytes; the reply is a stream of JSON tag lines terminated by a
//! `completed` record.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{Parser, ParserFactory};
use crate::symbol::ParsedSymbol;
use crate::{Error, Result};

/// Files larger than this are not parsed
pub const MAX_FILE_SIZE: usize = 1 << 20;

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "_type")]
    kind: String,
    name: Option<String>,
    line: Option<u32>,
    #[serde(rename = "kind")]
    tag_kind: Option<String>,
    scope: Option<String>,
    message: Option<String>,
}

enum Reply {
    Tag(ParsedSymbol),
    Completed,
    Error(String),
    Other,
}

fn parse_reply(line: &str) -> Result<Reply> {
    let record: Record = serde_json::from_str(line)?;
    Ok(match record.kind.as_str() {
        "tag" => match (record.name, record.line) {
            (Some(name), Some(line)) => Reply::Tag(ParsedSymbol {
                name,
                line,
                kind: record.tag_kind.unwrap_or_default(),
                parent: record.scope,
            }),
            _ => Reply::Other,
        },
        "completed" => Reply::Completed,
        "error" => Reply::Error(record.message.unwrap_or_default()),
        _ => Reply::Other,
    })
}

pub struct CtagsParserFactory {
    command: String,
}

impl CtagsParserFactory {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl ParserFactory for CtagsParserFactory {
    async fn create(&self) -> Result<Box<dyn Parser>> {
        let mut child = Command::new(&self.command)
            .args(["--_interactive=default", "--fields=*", "--output-format=json"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Parse(format!("failed to start {}: {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Parse("ctags has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Parse("ctags has no stdout".to_string()))?;
        let mut stdout = BufReader::new(stdout);

        // The first line announces the program
        let mut banner = String::new();
        if stdout.read_line(&mut banner).await? == 0 {
            return Err(Error::Parse(format!("{} exited before its banner", self.command)));
        }
        tracing::debug!(banner = banner.trim(), "started ctags");

        Ok(Box::new(CtagsParser {
            _child: child,
            stdin,
            stdout,
        }))
    }
}

pub struct CtagsParser {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

#[async_trait]
impl Parser for CtagsParser {
    async fn parse(&mut self, path: &str, content: &[u8]) -> Result<Vec<ParsedSymbol>> {
        if content.len() > MAX_FILE_SIZE {
            tracing::debug!(%path, size = content.len(), "skipping large file");
            return Ok(Vec::new());
        }

        let request = serde_json::json!({
            "command": "generate-tags",
            "filename": path,
            "size": content.len(),
        });
        self.stdin.write_all(format!("{request}\n").as_bytes()).await?;
        self.stdin.write_all(content).await?;
        self.stdin.flush().await?;

        let mut symbols = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(Error::Parse(format!("ctags exited while parsing {path}")));
            }
            match parse_reply(line.trim_end())? {
                Reply::Tag(symbol) => symbols.push(symbol),
                Reply::Completed => return Ok(symbols),
                Reply::Error(message) => return Err(Error::Parse(format!("ctags failed on {path}: {message}"))),
                Reply::Other => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_reply() {
        let line = r#"{"_type": "tag", "name": "Serve", "path": "main.go", "pattern": "/^func Serve() {$/", "line": 12, "kind": "func", "scope": "main", "scopeKind": "package"}"#;
        match parse_reply(line).unwrap() {
            Reply::Tag(symbol) => {
                assert_eq!(symbol, ParsedSymbol::new("Serve", 12, "func").with_parent("main"));
            }
            _ => panic!("expected a tag"),
        }
    }

    #[test]
    fn test_parse_control_replies() {
        assert!(matches!(
            parse_reply(r#"{"_type": "completed", "command": "generate-tags"}"#).unwrap(),
            Reply::Completed
        ));
        assert!(matches!(
            parse_reply(r#"{"_type": "program", "name": "Universal Ctags"}"#).unwrap(),
            Reply::Other
        ));
        match parse_reply(r#"{"_type": "error", "message": "bad request"}"#).unwrap() {
            Reply::Error(message) => assert_eq!(message, "bad request"),
            _ => panic!("expected an error"),
        }
        assert!(parse_reply("not json").is_err());
    }
}
