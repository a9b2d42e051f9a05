//! Syntax diagnostics with precise source locations.
//!
//! [`SyntaxError`] carries everything needed to render a compiler-style
//! message: filename, 1-based line, column, the offending source line, and an
//! end position. Rendering underlines the span with `^`/`~` using display
//! widths so the caret lines up under wide characters.

use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

use crate::span::{LineMap, Span};

/// A source buffer plus the metadata needed to produce diagnostics from it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: Arc<str>,
    map: LineMap,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let map = LineMap::new(&text);
        Self {
            name: name.into(),
            text,
            map,
        }
    }

    pub fn line_map(&self) -> &LineMap {
        &self.map
    }

    /// Build a [`SyntaxError`] anchored at `span`.
    pub fn error(&self, message: impl Into<String>, span: Span) -> SyntaxError {
        let start = self.map.locate(&self.text, span.start);
        let end = self.map.locate(&self.text, span.end);
        SyntaxError {
            message: message.into(),
            filename: self.name.clone(),
            line: start.line,
            col: start.col,
            end_line: end.line,
            end_col: end.col,
            source_line: self.map.line_text(&self.text, start.line).to_string(),
        }
    }

    /// `expected X` at `span`, the standard shape for parse failures.
    pub fn expected(&self, what: impl std::fmt::Display, span: Span) -> SyntaxError {
        self.error(format!("expected {what}"), span)
    }
}

/// A fatal transform-time error with an exact source location.
#[derive(Debug, Clone, thiserror::Error)]
pub struct SyntaxError {
    pub message: String,
    pub filename: String,
    /// 1-based line of the start of the offending span.
    pub line: u32,
    /// 0-based column of the start of the offending span.
    pub col: u32,
    pub end_line: u32,
    pub end_col: u32,
    /// The full text of the line the error starts on.
    pub source_line: String,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}:{}:{}: {}",
            self.filename,
            self.line,
            self.col + 1,
            self.message
        )?;
        writeln!(f, "    {}", self.source_line)?;
        let chars: Vec<char> = self.source_line.chars().collect();
        let upto = |col: usize| -> String { chars.iter().take(col).collect() };
        let pad = upto(self.col as usize).width();
        let underline_end = if self.end_line == self.line && self.end_col > self.col {
            self.end_col as usize
        } else {
            self.col as usize + 1
        };
        let width = upto(underline_end).width().saturating_sub(pad).max(1);
        write!(f, "    {}^", " ".repeat(pad))?;
        if width > 1 {
            write!(f, "{}", "~".repeat(width - 1))?;
        }
        Ok(())
    }
}
