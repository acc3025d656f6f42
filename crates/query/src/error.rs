//! Shape errors raised while parsing untrusted query descriptors.

use thiserror::Error;

/// A malformed query descriptor fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    #[error("invalid where clause: {0}")]
    InvalidWhere(String),

    #[error("invalid orderBy: {0}")]
    InvalidOrderBy(String),
}
