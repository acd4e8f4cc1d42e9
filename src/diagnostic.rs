use std::fmt::Display;

use crate::tokenizer::{Token, TokenType};

/// Where in the source a static error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Lexical errors only know their line.
    Line,
    /// The error token was the end of input.
    End,
    /// The error token's lexeme.
    At(String),
}

impl Location {
    pub fn of(token: &Token) -> Self {
        match token.token_type {
            TokenType::Eof => Location::End,
            _ => Location::At(token.lexeme.clone()),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Line => Ok(()),
            Location::End => write!(f, " at end"),
            Location::At(lexeme) => write!(f, " at '{lexeme}'"),
        }
    }
}

/// A lexical, syntactic or resolution error, rendered in the classic
/// `[line N] Error at 'x': message` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct Diagnostic {
    pub line: usize,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, location: Location, message: impl Display) -> Self {
        Self {
            line,
            location,
            message: message.to_string(),
        }
    }

    pub fn at(token: &Token, message: impl Display) -> Self {
        Self::new(token.line, Location::of(token), message)
    }
}

/// Collects static diagnostics across the tokenizer, parser and resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl std::error::Error for Diagnostics {}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(%diagnostic, "static error");
        self.0.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_formats_line_only() {
        let diagnostic = Diagnostic::new(3, Location::Line, "Unexpected character.");
        assert_eq!(
            diagnostic.to_string(),
            "[line 3] Error: Unexpected character."
        );
    }

    #[test]
    fn test_formats_at_end() {
        let token = Token::new(TokenType::Eof, "", 7);
        let diagnostic = Diagnostic::at(&token, "Expect expression.");
        assert_eq!(
            diagnostic.to_string(),
            "[line 7] Error at end: Expect expression."
        );
    }

    #[test]
    fn test_formats_at_lexeme() {
        let token = Token::new(TokenType::Semicolon, ";", 1);
        let diagnostic = Diagnostic::at(&token, "Expect expression.");
        assert_eq!(
            diagnostic.to_string(),
            "[line 1] Error at ';': Expect expression."
        );
    }

    #[test]
    fn test_collects_in_order() {
        let mut diagnostics = Diagnostics::default();
        assert!(!diagnostics.has_errors());
        diagnostics.push(Diagnostic::new(1, Location::Line, "first"));
        diagnostics.push(Diagnostic::new(2, Location::Line, "second"));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics.to_string(),
            "[line 1] Error: first\n[line 2] Error: second"
        );
    }
}
