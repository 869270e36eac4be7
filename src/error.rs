//! # Error Taxonomy
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! are deliberately coarse: callers match on the *kind* of failure, not on
//! message text. Engine implementations map their internal failures into
//! [`Error::Engine`]; everything above the engine boundary uses the
//! domain variants.
//!
//! Script execution wraps the failing statement's error in
//! [`Error::Statement`] so callers can tell which statement of a
//! multi-statement script aborted the run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The SQL text could not be parsed. Carries the position of the
    /// offending token and the set of tokens that would have been valid.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: u32,
        column: u32,
        expected: Vec<&'static str>,
    },

    /// A value or statement violates a schema or structural rule.
    #[error("validation error: {0}")]
    Validation(String),

    /// A named table, index, document, or field does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Creation of an object whose name is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A primary key or unique index rejected a duplicate, or a protected
    /// object was targeted by a mutation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Failure reported by the underlying storage engine.
    #[error("engine error: {0}")]
    Engine(String),

    /// Execution was stopped through a cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Statement `index` (zero-based) of a script failed.
    #[error("statement {index} failed: {source}")]
    Statement {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps an engine-level failure message.
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine(message.into())
    }

    /// Unwraps [`Error::Statement`] layers down to the underlying cause.
    pub fn root(&self) -> &Error {
        match self {
            Error::Statement { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::AlreadyExists(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root(), Error::ConstraintViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_wrapper_preserves_root_kind() {
        let err = Error::Statement {
            index: 2,
            source: Box::new(Error::ConstraintViolation("duplicate key".into())),
        };
        assert!(err.is_constraint_violation());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("statement 2"));
    }

    #[test]
    fn source_chain_exposes_cause() {
        use std::error::Error as _;
        let err = Error::Statement {
            index: 0,
            source: Box::new(Error::NotFound("table users".into())),
        };
        let cause = err.source().unwrap();
        assert!(cause.to_string().contains("users"));
    }
}
