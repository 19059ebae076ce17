//! Persistence delegate trait definition.

use crate::error::StoreResult;
use crate::predicate::{Predicate, Query};
use crate::record::{Key, Record};
use crate::statement::{Statement, StatementResult};

/// The narrow interface through which the service core reads and writes
/// the underlying store.
///
/// Delegates wrap an existing transactional store. The core performs no
/// query planning, indexing, or replication; it only hands over predicate
/// descriptors and statement lists.
///
/// # Invariants
///
/// - `transaction` executes its statement list atomically: either every
///   statement applies, or none does. Results are returned positionally.
/// - Unique and foreign-key violations are reported as the corresponding
///   `StoreError` variants so callers can translate them without parsing
///   messages.
/// - The handle is long-lived and shared; implementations must be safe for
///   concurrent use (`Send + Sync`).
///
/// # Implementors
///
/// - [`super::MemoryStore`] - in-memory reference delegate, used in tests
pub trait StoreDelegate: Send + Sync {
    /// Returns every record matching the query, in query order.
    fn find_many(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>>;

    /// Returns the first record matching the query, if any.
    fn find_first(&self, collection: &str, query: &Query) -> StoreResult<Option<Record>>;

    /// Counts records matching the predicates.
    fn count(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<usize>;

    /// Inserts one record, returning it with any store-assigned key.
    fn create(&self, collection: &str, data: Record) -> StoreResult<Record>;

    /// Inserts many records, returning how many were inserted.
    ///
    /// With `skip_duplicates`, records violating a unique constraint are
    /// silently dropped instead of failing the batch.
    fn create_many(
        &self,
        collection: &str,
        data: Vec<Record>,
        skip_duplicates: bool,
    ) -> StoreResult<usize>;

    /// Updates the record with the given key, returning the updated record.
    fn update(&self, collection: &str, key: &Key, data: Record) -> StoreResult<Record>;

    /// Inserts or updates keyed by `key`, returning the resulting record.
    fn upsert(
        &self,
        collection: &str,
        key: &Key,
        create: Record,
        update: Record,
    ) -> StoreResult<Record>;

    /// Deletes the record with the given key, returning its last state.
    fn delete(&self, collection: &str, key: &Key) -> StoreResult<Record>;

    /// Groups matching records by the given fields.
    ///
    /// Each result record holds the grouping fields plus a `_count` field.
    fn group_by(
        &self,
        collection: &str,
        by: &[String],
        predicates: &[Predicate],
    ) -> StoreResult<Vec<Record>>;

    /// Sums the given numeric fields over matching records.
    ///
    /// The result record holds one entry per requested field; records where
    /// the field is null or non-numeric contribute zero.
    fn aggregate(
        &self,
        collection: &str,
        predicates: &[Predicate],
        sum_fields: &[String],
    ) -> StoreResult<Record>;

    /// Executes a heterogeneous statement list atomically.
    ///
    /// Returns one result per statement, positionally. On error, no
    /// statement's effect is visible.
    fn transaction(&self, statements: Vec<Statement>) -> StoreResult<Vec<StatementResult>>;
}
