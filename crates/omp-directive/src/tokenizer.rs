//! Directive-string tokenizer.
//!
//! A directive string lives inside a host string literal; its tokens carry
//! absolute spans into the enclosing file so every diagnostic lands on the
//! user's source. The token shapes are the host lexer's own (see
//! `omp_frontend::lexer`), which keeps the two grammars from drifting.

use omp_frontend::diag::{SourceFile, SyntaxError};
use omp_frontend::lexer::tokenize_fragment;
use omp_frontend::span::Span;
use omp_frontend::token::Token;

pub use omp_frontend::token::{merge_spans, untokenize};

/// Tokenize the directive text occupying `span` inside `src`.
pub fn generate_tokens(src: &SourceFile, span: Span) -> Result<Vec<Token>, SyntaxError> {
    tokenize_fragment(src, span)
}

/// `expected X` anchored at a token.
pub fn expected_at(src: &SourceFile, what: impl std::fmt::Display, span: Span) -> SyntaxError {
    src.expected(what, span)
}

/// Span to blame when the input ran out: the closing token if the slice is
/// empty, otherwise just past the last real token.
pub fn end_span(tokens: &[Token], fallback: &Token) -> Span {
    match tokens.last() {
        Some(t) => t.span,
        None => fallback.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omp_frontend::token::TokenKind;

    #[test]
    fn spans_are_absolute() {
        let src = SourceFile::new("t.py", "xxxx parallel num_threads(2)");
        let span = Span::new(5, src.text.len());
        let toks = generate_tokens(&src, span).unwrap();
        assert_eq!(toks[0].text, "parallel");
        assert_eq!(toks[0].span.start, 5);
        assert_eq!(toks[2].kind, TokenKind::LPar);
    }

    #[test]
    fn untokenize_is_canonical() {
        let src = SourceFile::new("t.py", "schedule( static , 2 )");
        let toks = generate_tokens(&src, Span::new(0, src.text.len())).unwrap();
        assert_eq!(untokenize(&toks), "schedule(static, 2)");
    }
}
