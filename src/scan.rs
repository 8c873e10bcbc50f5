//! Balanced-block scanner over schematic S-expression text.
//!
//! [`find_block`] returns the span of one balanced `(...)` block without
//! building a tree. Depth counting runs over lexer tokens rather than raw
//! bytes, so parentheses inside quoted strings are never counted as
//! structure.

use logos::{Logos, SpannedIter};

use crate::error::StructureError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenKind {
    LParen,
    RParen,
    Atom,
    String,
    Error,
}

pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: logos::Span,
}

pub(crate) struct TokenIter<'a> {
    iter: SpannedIter<'a, LogosTokenKind>,
}

impl<'a> TokenIter<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            iter: LogosTokenKind::lexer(input).spanned(),
        }
    }
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iter.next() {
            Some((Ok(LogosTokenKind::QuotedString), span)) => {
                // Span excludes the surrounding quotes.
                let span = (span.start + 1)..(span.end - 1);
                Some(Token {
                    kind: TokenKind::String,
                    span,
                })
            }
            Some((Ok(kind), span)) => {
                let kind = match kind {
                    LogosTokenKind::LParen => TokenKind::LParen,
                    LogosTokenKind::RParen => TokenKind::RParen,
                    LogosTokenKind::Atom => TokenKind::Atom,
                    LogosTokenKind::QuotedString | LogosTokenKind::WS => unreachable!(),
                };
                Some(Token { kind, span })
            }
            Some((Err(()), span)) => Some(Token {
                kind: TokenKind::Error,
                span,
            }),
            None => None,
        }
    }
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
enum LogosTokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r#""([^"\\]|\\["\\bnfrt]|\\u[a-fA-F0-9]{4})*""#)]
    QuotedString,
    #[regex(r#"[^"() \t\r\f\n]+"#)]
    Atom,
    #[regex(r"[ \t\r\f\n]+", logos::skip)]
    WS,
}

/// Find the balanced block starting at `start`, which must index an
/// opening parenthesis. Returns the block text (delimiters included) and
/// the index one past its closing parenthesis.
pub fn find_block(text: &str, start: usize) -> Result<(&str, usize), StructureError> {
    if !text.get(start..).is_some_and(|t| t.starts_with('(')) {
        return Err(StructureError::NotABlockStart(start));
    }

    let mut depth: usize = 0;
    for token in TokenIter::new(&text[start..]) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(StructureError::UnbalancedBlock(0))?;
                if depth == 0 {
                    let end = start + token.span.end;
                    return Ok((&text[start..end], end));
                }
            }
            TokenKind::Atom | TokenKind::String | TokenKind::Error => {}
        }
    }
    Err(StructureError::UnbalancedBlock(depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        TokenIter::new(input)
            .map(|t| (t.kind, &input[t.span]))
            .collect()
    }

    #[test]
    fn lexer_splits_atoms_and_strings() {
        let input = "(a \"b\" \"\" \n)";
        let expected = vec![
            (TokenKind::LParen, "("),
            (TokenKind::Atom, "a"),
            (TokenKind::String, "b"),
            (TokenKind::String, ""),
            (TokenKind::RParen, ")"),
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn lexer_keeps_escaped_quotes_inside_strings() {
        let input = r#"(name "a\"b")"#;
        let toks = kinds(input);
        assert_eq!(toks[2], (TokenKind::String, r#"a\"b"#));
    }

    #[rstest]
    #[case("(a)", "(a)")]
    #[case("(a (b) (c (d)))", "(a (b) (c (d)))")]
    #[case("(a (b)) (c)", "(a (b))")]
    fn find_block_returns_balanced_span(#[case] input: &str, #[case] expected: &str) {
        let (block, end) = find_block(input, 0).unwrap();
        assert_eq!(block, expected);
        assert_eq!(end, expected.len());
    }

    #[test]
    fn find_block_from_inner_offset() {
        let input = "(a (b (c)) tail)";
        let (block, end) = find_block(input, 3).unwrap();
        assert_eq!(block, "(b (c))");
        assert_eq!(end, 10);
    }

    #[test]
    fn parens_inside_strings_are_not_structural() {
        let input = r#"(symbol "a)b" (pin))"#;
        let (block, end) = find_block(input, 0).unwrap();
        assert_eq!(block, input);
        assert_eq!(end, input.len());
    }

    #[test]
    fn rejects_non_block_start() {
        assert_eq!(
            find_block("x (a)", 0),
            Err(StructureError::NotABlockStart(0))
        );
    }

    #[test]
    fn reports_unbalanced_input() {
        assert_eq!(
            find_block("(a (b)", 0),
            Err(StructureError::UnbalancedBlock(1))
        );
    }
}
