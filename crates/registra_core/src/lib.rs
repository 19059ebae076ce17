//! # Registra Core
//!
//! Entity service engine for Registra.
//!
//! This crate provides:
//! - A generic CRUD [`EntityService`] with a fixed, overridable hook
//!   pipeline and atomic multi-statement transactions
//! - The filter compiler turning flat filter objects into store predicates
//! - A derived full-text search column kept consistent with source fields
//! - [`DocumentService`], keeping dependent registry rows consistent with a
//!   document's lifecycle (posting / un-posting)
//! - [`InfoRegistryService`] and [`SumRegistryService`] read specializations
//!
//! Persistence goes through the narrow `StoreDelegate` interface from
//! `registra_store`; this crate performs no query planning, indexing or
//! replication.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod filter;
mod hooks;
mod posting;
mod registry;
mod search;
mod service;

pub use config::{IdStrategy, SearchConfig, ServiceConfig};
pub use error::{CoreError, CoreResult};
pub use filter::{compile, compile_filter, parse, tokenize, Filter, FilterTerm};
pub use hooks::{
    AfterHook, AllowedToChangeHook, Hooks, ListFilterHook, MutateHook, SideEffectsHook,
    UpsertHook, ValidateHook, VetoHook,
};
pub use posting::{
    AfterPostHook, DocumentService, Posting, RegistryEntries, RegistryEntriesFn,
    REGISTRAR_FIELD, REGISTRAR_TYPE_FIELD, ROW_FIELD,
};
pub use registry::{InfoRegistryService, SliceDirection, SumRegistryService};
pub use search::{derive_search, SEARCH_FIELD};
pub use service::{EntityService, Meta, ID_FIELD};
