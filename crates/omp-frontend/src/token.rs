//! Token model shared by the host lexer and the directive-string tokenizer.

use crate::span::Span;

/// Token classification.
///
/// Bracket and separator punctuation get their own kinds because the
/// directive argument parser balances and splits on them; every other
/// operator is a generic [`TokenKind::Op`] distinguished by its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Name,
    Number,
    Str,
    LPar,
    RPar,
    LSqb,
    RSqb,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semi,
    Op,
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub fn is_open_bracket(self) -> bool {
        matches!(self, TokenKind::LPar | TokenKind::LSqb | TokenKind::LBrace)
    }

    pub fn is_close_bracket(self) -> bool {
        matches!(self, TokenKind::RPar | TokenKind::RSqb | TokenKind::RBrace)
    }
}

/// A lexed token: kind, verbatim text, and source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Newline => write!(f, "<newline>"),
            TokenKind::Indent => write!(f, "<indent>"),
            TokenKind::Dedent => write!(f, "<dedent>"),
            TokenKind::Eof => write!(f, "<eof>"),
            _ => write!(f, "{}", self.text),
        }
    }
}

/// Smallest span covering a non-empty token slice.
pub fn merge_spans(tokens: &[Token]) -> Span {
    let mut span = match tokens.first() {
        Some(t) => t.span,
        None => return Span::default(),
    };
    for t in &tokens[1..] {
        span = span.merge(t.span);
    }
    span
}

/// Reconstruct source text from a token slice with canonical spacing.
///
/// Not a byte-for-byte inverse of lexing: one space separates tokens except
/// after an open bracket, before a close bracket, and before `,`/`:`/`;`/`(`.
/// It is the canonical form used for diagnostics and re-parsing of embedded
/// expression arguments.
pub fn untokenize(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for tok in tokens {
        if matches!(
            tok.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
        ) {
            continue;
        }
        if let Some(p) = prev {
            let no_space_after = p.kind.is_open_bracket() || (p.kind == TokenKind::Op && p.text == ".");
            let postfix_head = matches!(
                p.kind,
                TokenKind::Name | TokenKind::RPar | TokenKind::RSqb
            );
            let no_space_before = tok.kind.is_close_bracket()
                || matches!(tok.kind, TokenKind::Comma | TokenKind::Colon | TokenKind::Semi)
                || (tok.kind == TokenKind::Op && tok.text == ".")
                || (matches!(tok.kind, TokenKind::LPar | TokenKind::LSqb) && postfix_head);
            if !(no_space_after || no_space_before) {
                out.push(' ');
            }
        }
        out.push_str(&tok.text);
        prev = Some(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, text, Span::default())
    }

    #[test]
    fn untokenize_canonical_spacing() {
        let toks = vec![
            tok(TokenKind::Name, "reduction"),
            tok(TokenKind::LPar, "("),
            tok(TokenKind::Op, "+"),
            tok(TokenKind::Colon, ":"),
            tok(TokenKind::Name, "x"),
            tok(TokenKind::Comma, ","),
            tok(TokenKind::Name, "y"),
            tok(TokenKind::RPar, ")"),
        ];
        assert_eq!(untokenize(&toks), "reduction(+: x, y)");
    }

    #[test]
    fn untokenize_attribute_chain() {
        let toks = vec![
            tok(TokenKind::Name, "a"),
            tok(TokenKind::Op, "."),
            tok(TokenKind::Name, "b"),
            tok(TokenKind::LSqb, "["),
            tok(TokenKind::Number, "0"),
            tok(TokenKind::RSqb, "]"),
        ];
        assert_eq!(untokenize(&toks), "a.b[0]");
    }
}
