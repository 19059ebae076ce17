//! Error taxonomy for the service core.
//!
//! Store errors are translated into this closed taxonomy at the point of
//! occurrence; hook-authored errors pass through with their message intact,
//! for verbatim end-user display. Callers branch on the variant, never on
//! message text.

use registra_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the entity service core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A unique constraint was violated, with the offending field names.
    #[error("duplicate value for {}", fields.join(", "))]
    Duplication {
        /// Fields participating in the violated constraint.
        fields: Vec<String>,
    },

    /// A referenced record does not exist.
    #[error("foreign key constraint on {field}")]
    ForeignKeyConstraint {
        /// The referencing field.
        field: String,
    },

    /// The `allowed_to_change` predicate rejected the operation.
    #[error("not allowed to change this record")]
    DoNotAllowToChange,

    /// The target entity does not exist.
    #[error("entity not found in {collection}")]
    EntityNotFound {
        /// Collection that was searched.
        collection: String,
    },

    /// A hook rejected the operation; the message is hook-authored and
    /// meant for the end user verbatim.
    #[error("{message}")]
    HookRejected {
        /// Hook-authored message.
        message: String,
    },

    /// A filter key carried a recognized suffix with a malformed payload,
    /// or no field name at all. Fail-fast programming error.
    #[error("unknown filter key: {key}")]
    UnknownFilterKey {
        /// The offending filter key.
        key: String,
    },

    /// Opaque delegate failure with no closed-taxonomy mapping.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl CoreError {
    /// Creates a hook rejection with the given user-facing message.
    pub fn hook_rejected(message: impl Into<String>) -> Self {
        Self::HookRejected {
            message: message.into(),
        }
    }

    /// Creates an unknown-filter-key error.
    pub fn unknown_filter_key(key: impl Into<String>) -> Self {
        Self::UnknownFilterKey { key: key.into() }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { fields, .. } => Self::Duplication { fields },
            StoreError::ForeignKeyViolation { field, .. } => Self::ForeignKeyConstraint { field },
            StoreError::RecordNotFound { collection } => Self::EntityNotFound { collection },
            other => Self::Store(other),
        }
    }
}
