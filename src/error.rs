//! Compiler diagnostics.
//!
//! Every phase reports failures through [`CompileError`]: a kind, a message,
//! and where available the source position the error was detected at.
//! Errors are fatal; no phase silently recovers.

use std::fmt;

/// Position of a token in the preprocessed source (0-indexed internally,
/// displayed 1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Error raised while compiling a SIL source file.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Scanner failure: unrecognized character, malformed numeric literal,
    /// unterminated block comment.
    Lex { message: String, span: Option<Span> },
    /// Parser failure: unexpected token, unterminated block, invalid
    /// identifier or parameter list. Also used by the preprocessor, which
    /// runs before the scanner and has no kind of its own.
    Parse { message: String, span: Option<Span> },
    /// Lowering failure: unknown identifier, type mismatch, unsupported
    /// operator or cast, `break` outside a loop.
    Semantic { message: String, span: Option<Span> },
    /// Generator invariant violation. Always a compiler bug.
    Internal { message: String },
}

impl CompileError {
    pub fn lex(message: impl Into<String>, span: Option<Span>) -> Self {
        CompileError::Lex {
            message: message.into(),
            span,
        }
    }

    pub fn parse(message: impl Into<String>, span: Option<Span>) -> Self {
        CompileError::Parse {
            message: message.into(),
            span,
        }
    }

    pub fn semantic(message: impl Into<String>, span: Option<Span>) -> Self {
        CompileError::Semantic {
            message: message.into(),
            span,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex { span, .. }
            | CompileError::Parse { span, .. }
            | CompileError::Semantic { span, .. } => *span,
            CompileError::Internal { .. } => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CompileError::Lex { .. } => "lex error",
            CompileError::Parse { .. } => "parse error",
            CompileError::Semantic { .. } => "semantic error",
            CompileError::Internal { .. } => "internal error",
        }
    }

    fn message(&self) -> &str {
        match self {
            CompileError::Lex { message, .. }
            | CompileError::Parse { message, .. }
            | CompileError::Semantic { message, .. }
            | CompileError::Internal { message } => message,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span() {
            Some(span) => write!(f, "{} at {}: {}", self.kind(), span, self.message()),
            None => write!(f, "{}: {}", self.kind(), self.message()),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_span() {
        let err = CompileError::parse("expected ';'", Some(Span::new(2, 4)));
        assert_eq!(err.to_string(), "parse error at 3:5: expected ';'");
    }

    #[test]
    fn test_display_without_span() {
        let err = CompileError::internal("id counter exhausted");
        assert_eq!(err.to_string(), "internal error: id counter exhausted");
    }
}
