//! Owned error types for parsing, target-shape checks, and the one-shot
//! [`crate::unmarshal`] entry point.

use thiserror::Error;

use crate::diagnostics::{DecodeErrors, Diagnostic};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// YAML syntax failure reported by the parser.
#[error("yaml: line {line}: {message}")]
pub struct ParseError {
    /// 1-based line where the problem was detected.
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Defect in a target type's declared shape, found before any document
/// value is looked at.
pub enum ShapeDefect {
    /// Two fields (directly, through an alias, or through an inlined struct)
    /// claim the same document key.
    #[error("duplicated key '{key}' in struct {type_name}")]
    DuplicatedKey { key: String, type_name: String },
    /// An inline field whose type is not a struct.
    #[error("option inline needs a struct value field: {field} in struct {type_name}")]
    InlineNotStruct { field: String, type_name: String },
}

#[derive(Debug, Error)]
/// Top-level error returned by [`crate::unmarshal`].
///
/// Unlike [`DecodeErrors`] it does not borrow the node tree, so it can be
/// returned after the parsed document is dropped.
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Decoding failed; `report` is the multi-line text form.
    #[error("{report}")]
    Decode {
        report: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl From<DecodeErrors<'_>> for Error {
    fn from(errors: DecodeErrors<'_>) -> Self {
        Error::Decode {
            report: errors.to_string(),
            diagnostics: errors.diagnostics(),
        }
    }
}
