//! Error types.
//!
//! Degenerate pattern arguments never show up here; they resolve to silence
//! or identity. What remains is malformed notation, structurally impossible
//! construction arguments, control-surface validation and sink failures.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    UnexpectedToken,
    UnterminatedGroup,
    InvalidNumber,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnterminatedGroup => "unterminated group",
            ParseErrorKind::InvalidNumber => "invalid number",
        };
        f.write_str(name)
    }
}

/// A syntax error in mini-notation, located in the source text.
///
/// `offset` is a byte offset. `line` and `column` are 1-based, and columns
/// count characters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    /// Build an error at `offset` in `src`, computing line and column.
    pub fn at(src: &str, offset: usize, kind: ParseErrorKind, message: impl Into<String>) -> Self {
        let offset = offset.min(src.len());
        let mut line = 1;
        let mut column = 1;
        for (i, c) in src.char_indices() {
            if i >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        ParseError {
            offset,
            line,
            column,
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid pattern at offset {offset}: {message}")]
    Construction { offset: usize, message: String },

    #[error("invalid tempo {0} cps: must be positive and finite")]
    InvalidTempo(f64),

    #[error("invalid lookahead {0}s: must be positive and finite")]
    InvalidLookahead(f64),

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Source offset for errors tied to notation text.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Parse(e) => Some(e.offset),
            Error::Construction { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// Returned by a sink that could not take an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("event rejected: {0}")]
    Rejected(String),

    #[error("sink is full")]
    Full,

    #[error("sink disconnected")]
    Disconnected,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
