//! # Registra Store
//!
//! Persistence layer for Registra:
//! - Dynamic [`Record`] model and entity [`Key`]s
//! - [`Predicate`] descriptors and read [`Query`] shapes
//! - Heterogeneous write [`Statement`]s with positional results
//! - The [`StoreDelegate`] trait the service core consumes
//! - [`MemoryStore`], an in-memory transactional delegate
//!
//! The service core in `registra_core` performs no query planning; it
//! compiles filters to predicates and hands statement lists to a delegate,
//! which commits them atomically.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod delegate;
mod error;
mod memory;
mod predicate;
mod record;
mod statement;

pub use delegate::StoreDelegate;
pub use error::{StoreError, StoreResult};
pub use memory::{CollectionSpec, IdMode, MemoryStore, Reference};
pub use predicate::{compare_values, matches_all, Predicate, Query, RangeOp, SortOrder};
pub use record::{field_or_null, merge_over, record_key, Key, Record};
pub use statement::{Statement, StatementResult};
