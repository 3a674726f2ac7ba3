// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! GCL (Generalised Concordance List) expression parsing and evaluation
//! (C8, §4.8).
//!
//! Every leaf is a quoted term literal; binary operators are fully
//! parenthesized infix, so the grammar never needs precedence climbing:
//!
//! ```text
//! expr := '"' text '"'
//!       | '(' expr '&'  expr ')'   -- and
//!       | '(' expr '|'  expr ')'   -- or
//!       | '(' expr '..' expr ')'   -- sequence ("followed by")
//!       | '(' expr '>'  expr ')'   -- contains
//!       | '(' expr '<'  expr ')'   -- contained in
//! ```
//!
//! A container expression for BM25 (§4.8) is just an `expr` whose evaluated
//! extents are one per document, e.g. `("<doc>" .. "</doc>")`.

use crate::error::{Result, WumpusError};
use crate::extent::ExtentList;

/// Resolves a bare term literal to its extent list. `HybridManager`
/// implements this directly for ordinary queries.
pub trait TermSource {
    fn extents_for(&self, term: &str) -> Result<ExtentList>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GclOp {
    And,
    Or,
    Sequence,
    Contains,
    ContainedIn,
}

#[derive(Debug, Clone)]
pub enum GclNode {
    Term(String),
    Binary(GclOp, Box<GclNode>, Box<GclNode>),
}

impl GclNode {
    pub fn evaluate(&self, source: &impl TermSource) -> Result<ExtentList> {
        match self {
            GclNode::Term(t) => source.extents_for(t),
            GclNode::Binary(op, lhs, rhs) => {
                let a = lhs.evaluate(source)?;
                let b = rhs.evaluate(source)?;
                Ok(match op {
                    GclOp::And => ExtentList::and(a, b),
                    GclOp::Or => ExtentList::or(vec![a, b]),
                    GclOp::Sequence => ExtentList::sequence(a, b),
                    GclOp::Contains => ExtentList::contains(a, b),
                    GclOp::ContainedIn => ExtentList::contained_in(a, b),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Quoted(String),
    LParen,
    RParen,
    And,
    Or,
    Seq,
    Gt,
    Lt,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::Seq);
                i += 2;
            }
            '"' => {
                let mut j = i + 1;
                let mut s = String::new();
                while j < chars.len() && chars[j] != '"' {
                    s.push(chars[j]);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(WumpusError::SyntaxError("unterminated quoted term in GCL expression".into()));
                }
                tokens.push(Token::Quoted(s));
                i = j + 1;
            }
            c => return Err(WumpusError::SyntaxError(format!("unexpected character {c:?} in GCL expression"))),
        }
    }
    Ok(tokens)
}

/// Parse a full GCL expression. Returns a `SyntaxError` on anything the
/// grammar above doesn't cover, including trailing garbage.
pub fn parse(input: &str) -> Result<GclNode> {
    let tokens = tokenize(input)?;
    let mut pos = 0;
    let node = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(WumpusError::SyntaxError("trailing tokens after GCL expression".into()));
    }
    Ok(node)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> Result<GclNode> {
    match tokens.get(*pos) {
        Some(Token::Quoted(s)) => {
            let node = GclNode::Term(s.clone());
            *pos += 1;
            Ok(node)
        }
        Some(Token::LParen) => {
            *pos += 1;
            let lhs = parse_expr(tokens, pos)?;
            let op = match tokens.get(*pos) {
                Some(Token::And) => GclOp::And,
                Some(Token::Or) => GclOp::Or,
                Some(Token::Seq) => GclOp::Sequence,
                Some(Token::Gt) => GclOp::Contains,
                Some(Token::Lt) => GclOp::ContainedIn,
                _ => return Err(WumpusError::SyntaxError("expected a GCL binary operator".into())),
            };
            *pos += 1;
            let rhs = parse_expr(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => *pos += 1,
                _ => return Err(WumpusError::SyntaxError("unbalanced parentheses in GCL expression".into())),
            }
            Ok(GclNode::Binary(op, Box::new(lhs), Box::new(rhs)))
        }
        _ => Err(WumpusError::SyntaxError("expected a quoted term or '(' in GCL expression".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedSource(HashMap<String, Vec<u64>>);

    impl TermSource for FixedSource {
        fn extents_for(&self, term: &str) -> Result<ExtentList> {
            Ok(ExtentList::from_postings(self.0.get(term).map(|v| v.as_slice()).unwrap_or(&[])))
        }
    }

    #[test]
    fn parses_and_evaluates_a_bare_term() {
        let node = parse("\"cat\"").unwrap();
        let source = FixedSource(HashMap::from([("cat".to_string(), vec![1, 5, 9])]));
        assert_eq!(node.evaluate(&source).unwrap().to_vec().len(), 3);
    }

    #[test]
    fn parses_and_evaluates_and() {
        let node = parse("(\"a\" & \"b\")").unwrap();
        let source = FixedSource(HashMap::from([
            ("a".to_string(), vec![1, 2, 3]),
            ("b".to_string(), vec![2, 3, 4]),
        ]));
        let extents = node.evaluate(&source).unwrap().to_vec();
        let values: Vec<u64> = extents.iter().map(|e| e.start).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn parses_nested_sequence() {
        // Sequence requires immediate token adjacency (b.start == a.end + 1);
        // it models phrase adjacency, not document-width containers — those
        // come from a `("<doc>" .. "</doc>")` container expression instead,
        // consumed by `bm25::rank`.
        let node = parse("(\"quick\" .. \"brown\")").unwrap();
        let source = FixedSource(HashMap::from([
            ("quick".to_string(), vec![10, 40]),
            ("brown".to_string(), vec![11, 42]),
        ]));
        let extents = node.evaluate(&source).unwrap().to_vec();
        assert_eq!(extents, vec![crate::types::Extent::new(10, 11)]);
    }

    #[test]
    fn rejects_unterminated_quote() {
        assert!(parse("\"cat").is_err());
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse("(\"a\" & \"b\"").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("\"a\" \"b\"").is_err());
    }
}
