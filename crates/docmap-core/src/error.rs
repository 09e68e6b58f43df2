//! Error types for mapping construction and traversal.

use docmap_model::ModelError;
use thiserror::Error;

/// Configuration errors raised while building or walking a mapping tree.
///
/// None of these are transient. A branch that simply does not apply is
/// reported as absence, never as an error.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid lens: {0}")]
    InvalidLens(String),

    #[error("class `{class}` is not part of the `{family}` schema family")]
    InvalidMappingClass { class: String, family: String },

    #[error("no document class declared or inferable for `{field}`")]
    UnresolvedClass { field: String },

    #[error("expected a {expected} entity, got {actual}")]
    InvalidEntityObject { expected: String, actual: String },

    #[error("invalid guard: {0}")]
    InvalidGuard(String),

    #[error("cannot inflect term `{term}`: {reason}")]
    InvalidInflectionTerm { term: String, reason: String },

    #[error("namespace `{0}` is not defined by any enclosing scope")]
    UnscopedNamespace(String),

    #[error("no entity factory registered for {0}")]
    MissingEntityFactory(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MapError {
    pub fn invalid_lens(message: impl Into<String>) -> Self {
        Self::InvalidLens(message.into())
    }

    pub fn invalid_guard(message: impl Into<String>) -> Self {
        Self::InvalidGuard(message.into())
    }

    pub fn invalid_term(term: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInflectionTerm {
            term: term.into(),
            reason: reason.into(),
        }
    }

    pub fn unresolved_class(field: impl Into<String>) -> Self {
        Self::UnresolvedClass {
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
