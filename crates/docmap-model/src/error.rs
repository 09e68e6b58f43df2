use thiserror::Error;

/// Errors raised by the entity and document type systems.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("{entity_type} has no attribute `{attribute}`")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },

    #[error("{entity_type} has no association `{association}`")]
    UnknownAssociation {
        entity_type: String,
        association: String,
    },

    /// The association exists but cannot be written directly.
    #[error("association `{association}` on {entity_type} is read-only")]
    ReadOnlyAssociation {
        entity_type: String,
        association: String,
    },

    #[error("expected {expected} for `{association}`, got {actual}")]
    TargetTypeMismatch {
        association: String,
        expected: String,
        actual: String,
    },

    #[error("unknown document class: {0}")]
    UnknownClass(String),

    #[error("class {class} is declared twice")]
    DuplicateClass { class: String },

    #[error("schema parse error: {0}")]
    Schema(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
