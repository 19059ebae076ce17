//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the persistence delegate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated.
    #[error("unique constraint violated on {collection}: {}", fields.join(", "))]
    UniqueViolation {
        /// Collection where the violation occurred.
        collection: String,
        /// Fields participating in the violated constraint.
        fields: Vec<String>,
    },

    /// A referenced record does not exist.
    #[error("foreign key violation on {collection}.{field}")]
    ForeignKeyViolation {
        /// Collection holding the dangling reference.
        collection: String,
        /// Referencing field.
        field: String,
    },

    /// The target record of an update/delete does not exist.
    #[error("record not found in {collection}")]
    RecordNotFound {
        /// Collection that was searched.
        collection: String,
    },

    /// The collection has not been defined on this store.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Name of the missing collection.
        name: String,
    },

    /// A write statement is missing the collection's key field.
    #[error("missing key field {field} in {collection}")]
    MissingKey {
        /// Collection the statement targeted.
        collection: String,
        /// The key field that was absent.
        field: String,
    },

    /// The transaction was aborted before commit.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },
}

impl StoreError {
    /// Creates a unique violation error.
    pub fn unique_violation(collection: impl Into<String>, fields: Vec<String>) -> Self {
        Self::UniqueViolation {
            collection: collection.into(),
            fields,
        }
    }

    /// Creates a foreign key violation error.
    pub fn foreign_key(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ForeignKeyViolation {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// Creates a record-not-found error.
    pub fn not_found(collection: impl Into<String>) -> Self {
        Self::RecordNotFound {
            collection: collection.into(),
        }
    }

    /// Creates an unknown-collection error.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Creates a transaction-aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }
}
