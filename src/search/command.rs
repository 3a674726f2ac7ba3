// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Query-line parsing (§4.8): `@cmd[modifiers] body`.
//!
//! The wire protocol itself (sockets, connection multiplexing, `@login`,
//! `@quit`) is out of this core's scope (§1); what *is* in scope is the one
//! piece of it the query engine owns — recognizing a command token and its
//! bracketed modifier map, and classifying it into the closed command set
//! so the evaluator knows whether it's looking at a GCL query, a ranking
//! request, or an update/misc operation that mutates index state in-thread
//! rather than forking a child worker (§5).

use std::collections::HashMap;

use crate::error::{Result, WumpusError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    AddFile,
    RemoveFile,
    Rename,
    Sync,
    UpdateAttr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetKind {
    File,
}

/// The closed set of registered command types (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Gcl,
    Bm25,
    Qap,
    Rank,
    Update(UpdateKind),
    Misc,
    Get(GetKind),
    Synonyms,
    Help,
}

impl CommandKind {
    /// Update and misc operations mutate index state and must run in-thread
    /// rather than under a cancellable child worker (§5).
    pub fn mutates_index(&self) -> bool {
        matches!(self, CommandKind::Update(_) | CommandKind::Misc)
    }

    fn from_token(token: &str) -> Result<Self> {
        match token {
            "gcl" => Ok(CommandKind::Gcl),
            "bm25" | "okapi" => Ok(CommandKind::Bm25),
            "qap" => Ok(CommandKind::Qap),
            "rank" => Ok(CommandKind::Rank),
            "addfile" => Ok(CommandKind::Update(UpdateKind::AddFile)),
            "removefile" => Ok(CommandKind::Update(UpdateKind::RemoveFile)),
            "rename" => Ok(CommandKind::Update(UpdateKind::Rename)),
            "sync" => Ok(CommandKind::Update(UpdateKind::Sync)),
            "updateattr" => Ok(CommandKind::Update(UpdateKind::UpdateAttr)),
            "misc" => Ok(CommandKind::Misc),
            "getfile" | "get" => Ok(CommandKind::Get(GetKind::File)),
            "synonyms" => Ok(CommandKind::Synonyms),
            "help" => Ok(CommandKind::Help),
            other => Err(WumpusError::SyntaxError(format!("unknown command {other:?}"))),
        }
    }
}

/// `{name -> value}` parsed out of a command's `[...]` modifier bracket.
/// Flag-only modifiers (`verbose`, `count` with no `=value`... no, `count`
/// always takes a value; flags like `verbose`/`getannotation` map to `"1"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers(HashMap<String, String>);

impl Modifiers {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn count(&self) -> Option<usize> {
        self.get("count").and_then(|v| v.parse().ok())
    }

    pub fn verbose(&self) -> bool {
        self.has("verbose")
    }

    pub fn stemming(&self) -> bool {
        self.has("stemming")
    }
}

/// One parsed query line: which registered command it is, its modifier
/// map, and the remaining body text (the GCL expression, filename, etc).
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub modifiers: Modifiers,
    pub body: String,
}

/// Parse `@cmd[mod1=val1,mod2,mod3=val3] body text` into its three parts.
/// Leading/trailing whitespace around the body is trimmed; the bracket
/// section is optional.
pub fn parse(line: &str) -> Result<ParsedCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    let rest = line
        .strip_prefix('@')
        .ok_or_else(|| WumpusError::SyntaxError("command must start with '@'".into()))?;

    let (token, after_token) = split_at_first(rest, |c| c == '[' || c.is_whitespace());

    let (bracket, after_bracket) = if after_token.starts_with('[') {
        let close = after_token
            .find(']')
            .ok_or_else(|| WumpusError::SyntaxError("unterminated modifier bracket".into()))?;
        (&after_token[1..close], &after_token[close + 1..])
    } else {
        ("", after_token)
    };

    let kind = CommandKind::from_token(&token.to_ascii_lowercase())?;
    let modifiers = parse_modifiers(bracket)?;
    let body = after_bracket.trim().to_string();

    Ok(ParsedCommand {
        kind,
        modifiers,
        body,
    })
}

fn split_at_first(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    match s.find(pred) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn parse_modifiers(bracket: &str) -> Result<Modifiers> {
    let mut map = HashMap::new();
    for part in bracket.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((k, v)) => {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
            None => {
                map.insert(part.to_string(), "1".to_string());
            }
        }
    }
    Ok(Modifiers(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_gcl_query() {
        let cmd = parse("@gcl \"a\"").unwrap();
        assert_eq!(cmd.kind, CommandKind::Gcl);
        assert_eq!(cmd.body, "\"a\"");
        assert!(cmd.modifiers.0.is_empty());
    }

    #[test]
    fn parses_bracketed_modifiers() {
        let cmd = parse("@bm25[count=2,verbose] \"a\" \"b\"").unwrap();
        assert_eq!(cmd.kind, CommandKind::Bm25);
        assert_eq!(cmd.modifiers.count(), Some(2));
        assert!(cmd.modifiers.verbose());
        assert_eq!(cmd.body, "\"a\" \"b\"");
    }

    #[test]
    fn okapi_is_an_alias_for_bm25() {
        let cmd = parse("@okapi \"a\"").unwrap();
        assert_eq!(cmd.kind, CommandKind::Bm25);
    }

    #[test]
    fn update_commands_are_flagged_as_mutating() {
        let cmd = parse("@addfile /tmp/foo").unwrap();
        assert!(cmd.kind.mutates_index());
        let cmd = parse("@gcl \"a\"").unwrap();
        assert!(!cmd.kind.mutates_index());
    }

    #[test]
    fn unknown_command_is_a_syntax_error() {
        assert!(parse("@frobnicate").is_err());
    }

    #[test]
    fn unterminated_bracket_is_a_syntax_error() {
        assert!(parse("@bm25[count=2 \"a\"").is_err());
    }

    #[test]
    fn requires_leading_at_sign() {
        assert!(parse("gcl \"a\"").is_err());
    }
}
