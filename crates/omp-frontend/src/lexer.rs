//! Indentation-aware lexer for the host language.
//!
//! Two layers:
//! * [`Cursor`] scans raw tokens (names, numbers, strings, operators) from a
//!   byte position onward. The directive-string tokenizer reuses it so both
//!   grammars agree on token shapes.
//! * [`tokenize`] drives a cursor line by line, producing the
//!   NEWLINE/INDENT/DEDENT structure, joining lines implicitly inside
//!   brackets and explicitly after a trailing backslash.

use tracing::trace;

use crate::diag::{SourceFile, SyntaxError};
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Multi-character operators, longest first so maximal munch works.
const OPERATORS: &[&str] = &[
    "**=", "//=", "<<=", ">>=", "...", "==", "!=", "<=", ">=", "->", ":=", "+=", "-=", "*=", "/=",
    "%=", "&=", "|=", "^=", "**", "//", "<<", ">>", "&&", "||", "+", "-", "*", "/", "%", "@", "&",
    "|", "^", "~", "<", ">", "=", ".",
];

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

pub fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Raw token scanner over a source buffer.
pub struct Cursor<'a> {
    src: &'a SourceFile,
    text: &'a str,
    pos: usize,
    limit: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a SourceFile, span: Span) -> Self {
        Self {
            src,
            text: &src.text,
            pos: span.start,
            limit: span.end.min(src.text.len()),
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..self.limit].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.text[self.pos..self.limit].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip spaces, tabs, and `#` comments (up to but not past a newline).
    pub fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Scan the next raw token. Returns `None` at the limit; never produces
    /// NEWLINE/INDENT/DEDENT (the line driver owns those). A bare `\n` is
    /// returned as a NEWLINE-kind token so the driver can see it.
    pub fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        self.skip_trivia();
        let start = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };

        if c == '\n' {
            self.bump();
            return Ok(Some(Token::new(
                TokenKind::Newline,
                "\n",
                Span::new(start, self.pos),
            )));
        }

        if is_ident_start(c) {
            while self.peek().map_or(false, is_ident_continue) {
                self.bump();
            }
            let text = &self.text[start..self.pos];
            return Ok(Some(Token::new(
                TokenKind::Name,
                text,
                Span::new(start, self.pos),
            )));
        }

        if c.is_ascii_digit() || (c == '.' && self.peek2().map_or(false, |d| d.is_ascii_digit())) {
            return Ok(Some(self.scan_number(start)));
        }

        if c == '"' || c == '\'' {
            return self.scan_string(start, c).map(Some);
        }

        let single = |kind: TokenKind| -> TokenKind { kind };
        let kind = match c {
            '(' => Some(single(TokenKind::LPar)),
            ')' => Some(single(TokenKind::RPar)),
            '[' => Some(single(TokenKind::LSqb)),
            ']' => Some(single(TokenKind::RSqb)),
            '{' => Some(single(TokenKind::LBrace)),
            '}' => Some(single(TokenKind::RBrace)),
            ',' => Some(single(TokenKind::Comma)),
            ';' => Some(single(TokenKind::Semi)),
            _ => None,
        };
        if let Some(kind) = kind {
            self.bump();
            return Ok(Some(Token::new(
                kind,
                &self.text[start..self.pos],
                Span::new(start, self.pos),
            )));
        }

        // `:` is a separator unless it begins `:=`.
        if c == ':' && !matches!(self.peek2(), Some('=')) {
            self.bump();
            return Ok(Some(Token::new(
                TokenKind::Colon,
                ":",
                Span::new(start, self.pos),
            )));
        }

        let rest = &self.text[self.pos..self.limit];
        for op in OPERATORS {
            if rest.starts_with(op) {
                self.pos += op.len();
                return Ok(Some(Token::new(TokenKind::Op, *op, Span::new(start, self.pos))));
            }
        }

        Err(self
            .src
            .error(format!("unexpected character `{c}`"), Span::new(start, start + c.len_utf8())))
    }

    fn scan_number(&mut self, start: usize) -> Token {
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
            } else if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                self.bump();
            } else if (c == 'e' || c == 'E') && !seen_exp {
                seen_exp = true;
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
            } else {
                break;
            }
        }
        Token::new(
            TokenKind::Number,
            &self.text[start..self.pos],
            Span::new(start, self.pos),
        )
    }

    fn scan_string(&mut self, start: usize, quote: char) -> Result<Token, SyntaxError> {
        self.bump();
        while let Some(c) = self.bump() {
            if c == '\\' {
                self.bump();
            } else if c == quote {
                return Ok(Token::new(
                    TokenKind::Str,
                    &self.text[start..self.pos],
                    Span::new(start, self.pos),
                ));
            } else if c == '\n' {
                break;
            }
        }
        Err(self
            .src
            .error(format!("`{quote}` was never closed"), Span::new(start, start + 1)))
    }
}

/// Tokenize a whole source file into the line-structured stream the parser
/// consumes. Indentation must be consistent (spaces and tabs each count one
/// column, matching the left-prefix rule).
pub fn tokenize(src: &SourceFile) -> Result<Vec<Token>, SyntaxError> {
    let text: &str = &src.text;
    let mut out = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth = 0usize; // open bracket depth
    let mut cursor = Cursor::new(src, Span::new(0, text.len()));
    let mut at_line_start = true;
    let mut line_had_token = false;

    loop {
        if at_line_start && depth == 0 {
            // Measure indentation; skip blank and comment-only lines.
            let line_start = cursor.pos();
            let mut width = 0usize;
            let mut probe = cursor.pos();
            let bytes = text.as_bytes();
            while probe < text.len() {
                match bytes[probe] {
                    b' ' | b'\t' => {
                        width += 1;
                        probe += 1;
                    }
                    _ => break,
                }
            }
            if probe >= text.len() {
                cursor = Cursor::new(src, Span::new(text.len(), text.len()));
                break;
            }
            if bytes[probe] == b'\n' || bytes[probe] == b'#' || bytes[probe] == b'\r' {
                // Blank or comment-only line: consume through the newline.
                let mut skip = probe;
                while skip < text.len() && bytes[skip] != b'\n' {
                    skip += 1;
                }
                cursor = Cursor::new(src, Span::new((skip + 1).min(text.len()), text.len()));
                if skip >= text.len() {
                    break;
                }
                continue;
            }
            let current = *indents.last().expect("indent stack never empty");
            if width > current {
                indents.push(width);
                out.push(Token::new(
                    TokenKind::Indent,
                    "",
                    Span::point(line_start + width),
                ));
            } else if width < current {
                while *indents.last().expect("indent stack never empty") > width {
                    indents.pop();
                    out.push(Token::new(
                        TokenKind::Dedent,
                        "",
                        Span::point(line_start + width),
                    ));
                }
                if *indents.last().expect("indent stack never empty") != width {
                    return Err(src.error(
                        "unindent does not match any outer indentation level",
                        Span::point(line_start + width),
                    ));
                }
            }
            cursor = Cursor::new(src, Span::new(probe, text.len()));
            at_line_start = false;
            line_had_token = false;
        }

        // Explicit line joining.
        cursor.skip_trivia();
        if text[cursor.pos()..].starts_with("\\\n") {
            cursor = Cursor::new(src, Span::new(cursor.pos() + 2, text.len()));
            continue;
        }

        let tok = match cursor.next_token()? {
            Some(t) => t,
            None => break,
        };
        match tok.kind {
            TokenKind::Newline => {
                if depth > 0 {
                    continue; // implicit joining inside brackets
                }
                if line_had_token {
                    out.push(tok);
                }
                at_line_start = true;
            }
            k => {
                if k.is_open_bracket() {
                    depth += 1;
                } else if k.is_close_bracket() {
                    depth = depth.saturating_sub(1);
                }
                line_had_token = true;
                out.push(tok);
            }
        }
    }

    if line_had_token && !at_line_start {
        out.push(Token::new(TokenKind::Newline, "\n", Span::point(text.len())));
    }
    while indents.len() > 1 {
        indents.pop();
        out.push(Token::new(TokenKind::Dedent, "", Span::point(text.len())));
    }
    out.push(Token::new(TokenKind::Eof, "", Span::point(text.len())));
    trace!(target: "frontend.lexer", tokens = out.len(), "tokenized");
    Ok(out)
}

/// Tokenize an embedded single-logical-line fragment (directive strings,
/// re-parsed clause arguments). No NEWLINE/INDENT structure is produced;
/// spans remain absolute into the enclosing file.
pub fn tokenize_fragment(src: &SourceFile, span: Span) -> Result<Vec<Token>, SyntaxError> {
    let mut cursor = Cursor::new(src, span);
    let mut out = Vec::new();
    while let Some(tok) = cursor.next_token()? {
        if tok.kind == TokenKind::Newline {
            continue;
        }
        out.push(tok);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let file = SourceFile::new("t.py", src);
        tokenize(&file).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn flat_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("x = 1\n"),
            vec![Name, Op, Number, Newline, Eof]
        );
    }

    #[test]
    fn indent_dedent_pairing() {
        use TokenKind::*;
        let got = kinds("def f():\n    x = 1\ny = 2\n");
        assert_eq!(
            got,
            vec![
                Name, Name, LPar, RPar, Colon, Newline, Indent, Name, Op, Number, Newline, Dedent,
                Name, Op, Number, Newline, Eof
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_ignored() {
        use TokenKind::*;
        let got = kinds("x = 1\n\n# note\n   \ny = 2\n");
        assert_eq!(
            got,
            vec![Name, Op, Number, Newline, Name, Op, Number, Newline, Eof]
        );
    }

    #[test]
    fn implicit_joining_inside_parens() {
        use TokenKind::*;
        let got = kinds("f(1,\n  2)\n");
        assert_eq!(
            got,
            vec![Name, LPar, Number, Comma, Number, RPar, Newline, Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_quote() {
        let file = SourceFile::new("t.py", "x = \"abc\n");
        let err = tokenize(&file).unwrap_err();
        assert!(err.message.contains("was never closed"));
    }

    #[test]
    fn inconsistent_dedent_rejected() {
        let file = SourceFile::new("t.py", "if x:\n    y = 1\n  z = 2\n");
        let err = tokenize(&file).unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn fragment_has_no_structure() {
        let file = SourceFile::new("t.py", "parallel num_threads(2)");
        let toks = tokenize_fragment(&file, Span::new(0, file.text.len())).unwrap();
        assert_eq!(toks.len(), 5);
        assert_eq!(toks[0].text, "parallel");
        assert_eq!(toks[2].kind, TokenKind::LPar);
    }

    #[test]
    fn walrus_not_split_as_separator() {
        let file = SourceFile::new("t.py", "a := 2");
        let toks = tokenize_fragment(&file, Span::new(0, file.text.len())).unwrap();
        assert_eq!(toks[1].kind, TokenKind::Op);
        assert_eq!(toks[1].text, ":=");
    }
}
