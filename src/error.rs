//! Error types for compilation and evaluation.
//!
//! Compilation fails with a [`CompileError`], which is either a [`LexError`]
//! (malformed token) or a [`ParseError`] (structurally invalid token sequence).
//! No partially compiled expression is ever produced.
//!
//! Evaluation fails with an [`EvalError`]. An evaluation error aborts only the
//! call that raised it; the compiled expression stays usable.

use std::{error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

/// Location of a character in the expression source.
///
/// `offset` counts characters (not bytes) from the start of the input;
/// `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Position {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Malformed input found while tokenizing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {position}")]
    UnexpectedCharacter { ch: char, position: Position },

    #[error("unterminated string starting at {position}")]
    UnterminatedString { position: Position },

    #[error("unterminated pattern starting at {position}")]
    UnterminatedPattern { position: Position },

    #[error("unterminated escaped name starting at {position}")]
    UnterminatedName { position: Position },

    #[error("invalid escape sequence '\\{ch}' at {position}")]
    InvalidEscape { ch: char, position: Position },

    #[error("malformed number '{text}' at {position}")]
    MalformedNumber { text: String, position: Position },

    #[error("invalid pattern '{pattern}' at {position}: {message}")]
    InvalidPattern {
        pattern: String,
        message: String,
        position: Position,
    },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedCharacter { position, .. }
            | LexError::UnterminatedString { position }
            | LexError::UnterminatedPattern { position }
            | LexError::UnterminatedName { position }
            | LexError::InvalidEscape { position, .. }
            | LexError::MalformedNumber { position, .. }
            | LexError::InvalidPattern { position, .. } => *position,
        }
    }
}

/// Structurally invalid token sequence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected {found} at {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        position: Position,
    },

    #[error("unexpected end of expression at {position}, expected {expected}")]
    UnexpectedEnd { expected: String, position: Position },

    #[error("'{delimiter}' opened at {position} is never closed")]
    UnclosedDelimiter { delimiter: char, position: Position },

    #[error("unknown function '{name}' at {position}")]
    UnknownFunction { name: String, position: Position },

    #[error("function '{name}' at {position} expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
        position: Position,
    },

    #[error("invalid pattern '{pattern}' at {position}: {message}")]
    InvalidPattern {
        pattern: String,
        message: String,
        position: Position,
    },

    #[error("expression is nested too deeply at {position}")]
    NestingTooDeep { position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEnd { position, .. }
            | ParseError::UnclosedDelimiter { position, .. }
            | ParseError::UnknownFunction { position, .. }
            | ParseError::ArityMismatch { position, .. }
            | ParseError::InvalidPattern { position, .. }
            | ParseError::NestingTooDeep { position, .. } => *position,
        }
    }
}

/// Any failure that prevents an expression from compiling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

impl CompileError {
    pub fn position(&self) -> Position {
        match self {
            CompileError::Lex(e) => e.position(),
            CompileError::Parse(e) => e.position(),
        }
    }
}

/// Error type returned by registered functions.
pub type FunctionError = Box<dyn StdError + Send + Sync>;

/// Errors raised while evaluating a compiled expression.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The parameter source has no binding for the name.
    #[error("no parameter '{0}' found")]
    ParameterNotFound(String),

    /// Operand kinds are incompatible with the operator.
    #[error("type error: {0}")]
    TypeError(String),

    /// A registered function failed.
    #[error("function '{name}' failed: {source}")]
    Function {
        name: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },
}

impl EvalError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        EvalError::TypeError(message.into())
    }

    pub(crate) fn function(name: &str, source: FunctionError) -> Self {
        EvalError::Function {
            name: name.to_string(),
            source: Arc::from(source),
        }
    }
}

// Function failures compare by name and message; the boxed cause has no equality of its own.
impl PartialEq for EvalError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EvalError::ParameterNotFound(a), EvalError::ParameterNotFound(b)) => a == b,
            (EvalError::TypeError(a), EvalError::TypeError(b)) => a == b,
            (
                EvalError::Function { name: a, source: sa },
                EvalError::Function { name: b, source: sb },
            ) => a == b && sa.to_string() == sb.to_string(),
            _ => false,
        }
    }
}
