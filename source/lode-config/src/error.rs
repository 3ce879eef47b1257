use miette::Diagnostic;
use thiserror::Error;

/// Syntactic validation failure for user-supplied identity strings.
///
/// Surfaced verbatim as an invalid-argument to the user, so the message
/// carries the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("invalid {kind} {input:?}: {cause}")]
pub struct ParseError {
    pub kind: &'static str,
    pub input: String,
    pub cause: String,
}

impl ParseError {
    pub fn new(kind: &'static str, input: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
            cause: cause.into(),
        }
    }
}
