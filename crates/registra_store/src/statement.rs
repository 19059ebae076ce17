//! Write statements and their positional results.
//!
//! A mutating service operation assembles one `Vec<Statement>` — the primary
//! write plus hook-contributed side effects and posting — and hands it to the
//! delegate's `transaction`, which commits or rolls back the whole list.

use crate::predicate::Predicate;
use crate::record::{Key, Record};

/// A single write statement inside a transaction.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Insert one record.
    Create {
        /// Target collection.
        collection: String,
        /// The record to insert.
        data: Record,
    },
    /// Insert many records.
    CreateMany {
        /// Target collection.
        collection: String,
        /// Records to insert.
        data: Vec<Record>,
        /// Silently skip records that violate a unique constraint.
        skip_duplicates: bool,
    },
    /// Update the record with the given key.
    Update {
        /// Target collection.
        collection: String,
        /// Key of the record to update.
        key: Key,
        /// Fields to overwrite.
        data: Record,
    },
    /// Insert or update keyed by `key`.
    Upsert {
        /// Target collection.
        collection: String,
        /// Key to upsert on.
        key: Key,
        /// Record to insert when absent.
        create: Record,
        /// Fields to overwrite when present.
        update: Record,
    },
    /// Delete the record with the given key.
    Delete {
        /// Target collection.
        collection: String,
        /// Key of the record to delete.
        key: Key,
    },
    /// Delete every record matching the predicates.
    DeleteMany {
        /// Target collection.
        collection: String,
        /// Predicates selecting the records to delete.
        predicates: Vec<Predicate>,
    },
}

impl Statement {
    /// Returns the collection this statement targets.
    pub fn collection(&self) -> &str {
        match self {
            Statement::Create { collection, .. }
            | Statement::CreateMany { collection, .. }
            | Statement::Update { collection, .. }
            | Statement::Upsert { collection, .. }
            | Statement::Delete { collection, .. }
            | Statement::DeleteMany { collection, .. } => collection,
        }
    }
}

/// Positional result of one statement in a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    /// The affected record (create/update/upsert/delete return the row).
    Record(Record),
    /// The rows a batch insert actually inserted, with store-assigned keys.
    /// Silently skipped duplicates do not appear.
    Records(Vec<Record>),
    /// Number of affected records (`DeleteMany`).
    Count(usize),
}

impl StatementResult {
    /// Returns the record, if this result carries one.
    pub fn record(&self) -> Option<&Record> {
        match self {
            StatementResult::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the inserted rows, if this result carries them.
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            StatementResult::Records(rows) => Some(rows),
            _ => None,
        }
    }

    /// Returns the affected-row count, if this result carries one.
    pub fn count(&self) -> Option<usize> {
        match self {
            StatementResult::Count(n) => Some(*n),
            _ => None,
        }
    }
}
