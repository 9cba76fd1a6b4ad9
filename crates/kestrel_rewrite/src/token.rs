//! SQL tokens: byte-span substitutions applied to the original SQL text.

use kestrel_common::error::{KestrelResult, RewriteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Table,
    Offset,
    RowCount,
    Projections,
    Aggregation,
    GroupBy,
    OrderBy,
    GeneratedKeyColumn,
    InsertValues,
}

/// Replace `[start, stop)` with `text`; an insertion has `start == stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlToken {
    pub kind: TokenKind,
    pub start: usize,
    pub stop: usize,
    pub text: String,
}

impl SqlToken {
    pub fn replace(kind: TokenKind, start: usize, stop: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            start,
            stop,
            text: text.into(),
        }
    }

    pub fn insert(kind: TokenKind, at: usize, text: impl Into<String>) -> Self {
        Self::replace(kind, at, at, text)
    }
}

/// Apply tokens to `sql`. Spans must lie on character boundaries and must
/// not overlap; an insertion may sit at the start of a replacement.
pub fn apply(sql: &str, mut tokens: Vec<SqlToken>) -> KestrelResult<String> {
    tokens.sort_by_key(|t| (t.start, t.stop));
    let mut out = String::with_capacity(sql.len() + tokens.iter().map(|t| t.text.len()).sum::<usize>());
    let mut cursor = 0usize;
    for token in &tokens {
        if token.start > token.stop || token.stop > sql.len() {
            return Err(RewriteError::TokenOutOfBounds {
                start: token.start,
                stop: token.stop,
                len: sql.len(),
            }
            .into());
        }
        if token.start < cursor {
            return Err(RewriteError::OverlappingTokens {
                start: token.start,
                stop: token.stop,
                previous_stop: cursor,
            }
            .into());
        }
        if !sql.is_char_boundary(token.start) || !sql.is_char_boundary(token.stop) {
            return Err(RewriteError::NotCharBoundary {
                start: token.start,
                stop: token.stop,
            }
            .into());
        }
        out.push_str(&sql[cursor..token.start]);
        out.push_str(&token.text);
        cursor = token.stop;
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}

/// Keep the identifier's quoting around a new name.
pub fn requote(original: &str, name: &str) -> String {
    let mut chars = original.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open @ ('`' | '"')), Some(close)) if close == open => format!("{open}{name}{close}"),
        (Some('['), Some(']')) => format!("[{name}]"),
        _ => name.to_string(),
    }
}

/// Identifier text without quotes.
pub fn unquote(identifier: &str) -> &str {
    let trimmed = identifier.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if matches!((first, last), (b'`', b'`') | (b'"', b'"') | (b'[', b']')) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_replacements_and_insertions() {
        let sql = "SELECT a FROM t_order WHERE id = 1";
        let out = apply(
            sql,
            vec![
                SqlToken::replace(TokenKind::Table, 14, 21, "t_order_1"),
                SqlToken::insert(TokenKind::Projections, 8, ", b AS X"),
            ],
        )
        .unwrap();
        assert_eq!(out, "SELECT a, b AS X FROM t_order_1 WHERE id = 1");
    }

    #[test]
    fn test_overlap_and_bounds_rejected() {
        let sql = "SELECT 1";
        let overlapping = vec![
            SqlToken::replace(TokenKind::Table, 0, 4, "x"),
            SqlToken::replace(TokenKind::Table, 2, 6, "y"),
        ];
        assert!(apply(sql, overlapping).unwrap_err().is_internal_bug());
        let outside = vec![SqlToken::replace(TokenKind::Table, 4, 20, "x")];
        assert!(apply(sql, outside).is_err());
        let split = vec![SqlToken::replace(TokenKind::Table, 1, 2, "x")];
        assert!(apply("é", split).is_err());
    }

    #[test]
    fn test_quoting_preserved() {
        assert_eq!(requote("`t_order`", "t_order_1"), "`t_order_1`");
        assert_eq!(requote("\"T_ORDER\"", "t_order_1"), "\"t_order_1\"");
        assert_eq!(requote("[t_order]", "t_order_1"), "[t_order_1]");
        assert_eq!(requote("t_order", "t_order_1"), "t_order_1");
        assert_eq!(unquote("`t_order`"), "t_order");
    }
}
