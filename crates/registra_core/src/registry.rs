//! Registry read services.
//!
//! Registries are the dependent side of posting: documents write into
//! them, readers slice and aggregate them. An information registry answers
//! point-in-time questions ("the record in force at this timestamp"); a
//! summation registry accumulates postable quantities and reacts to posted
//! batches.

use crate::config::ServiceConfig;
use crate::error::CoreResult;
use crate::filter::{compile_filter, Filter};
use crate::hooks::Hooks;
use crate::posting::AfterPostHook;
use crate::search::SEARCH_FIELD;
use crate::service::{EntityService, ID_FIELD};
use registra_store::{Predicate, Query, RangeOp, Record, SortOrder, StoreDelegate};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Which side of the timestamp a slice looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDirection {
    /// The last record at or before the timestamp.
    AtOrBefore,
    /// The first record at or after the timestamp.
    AtOrAfter,
}

/// Read service for an information registry.
///
/// Built by embedding the generic core; the specialization is the
/// point-in-time slice query.
#[derive(Debug)]
pub struct InfoRegistryService {
    service: EntityService,
    period_field: String,
}

impl InfoRegistryService {
    /// Creates an info-registry service ordering slices by `period_field`.
    pub fn new(
        store: Arc<dyn StoreDelegate>,
        config: ServiceConfig,
        hooks: Hooks,
        period_field: impl Into<String>,
    ) -> Self {
        Self {
            service: EntityService::new(store, config, hooks),
            period_field: period_field.into(),
        }
    }

    /// Returns the underlying generic service for ordinary CRUD.
    pub fn service(&self) -> &EntityService {
        &self.service
    }

    /// Returns the slice of the registry at a timestamp: the last record
    /// at-or-before (or first at-or-after) `at`, optionally restricted by
    /// a dimension filter. Returns `None` when nothing qualifies.
    pub fn slice(
        &self,
        at: &Value,
        direction: SliceDirection,
        dimensions: &Filter,
    ) -> CoreResult<Option<Record>> {
        let mut predicates = compile_filter(dimensions, ID_FIELD, SEARCH_FIELD)?;
        let (op, order) = match direction {
            SliceDirection::AtOrBefore => (RangeOp::Lte, SortOrder::Desc),
            SliceDirection::AtOrAfter => (RangeOp::Gte, SortOrder::Asc),
        };
        predicates.push(Predicate::Range {
            field: self.period_field.clone(),
            op,
            value: at.clone(),
        });
        let query = Query::new(predicates)
            .order_by(self.period_field.clone(), order)
            .take(1);
        Ok(self
            .service
            .store()
            .find_first(&self.service.config().collection, &query)?)
    }
}

/// Read/accumulation service for a summation registry.
///
/// Ordinary CRUD through the embedded core, aggregate totals through the
/// delegate, plus an `after_post` hook (default no-op) reacting to batches
/// of posted entries.
pub struct SumRegistryService {
    service: EntityService,
    after_post: Option<AfterPostHook>,
}

impl SumRegistryService {
    /// Creates a sum-registry service.
    pub fn new(store: Arc<dyn StoreDelegate>, config: ServiceConfig, hooks: Hooks) -> Self {
        Self {
            service: EntityService::new(store, config, hooks),
            after_post: None,
        }
    }

    /// Sets the hook reacting to posted entry batches.
    #[must_use]
    pub fn with_after_post(mut self, hook: AfterPostHook) -> Self {
        self.after_post = Some(hook);
        self
    }

    /// Returns the underlying generic service for ordinary CRUD.
    pub fn service(&self) -> &EntityService {
        &self.service
    }

    /// Returns an observer suitable for [`crate::DocumentService::observe`],
    /// forwarding posted batches to this registry's `after_post` hook.
    pub fn post_observer(&self) -> AfterPostHook {
        match &self.after_post {
            Some(hook) => Arc::clone(hook),
            None => Arc::new(|_: &[Record]| Ok(())),
        }
    }

    /// Invokes the `after_post` hook with a batch of posted entries.
    pub fn notify_posted(&self, entries: &[Record]) -> CoreResult<()> {
        match &self.after_post {
            Some(hook) => hook(entries),
            None => Ok(()),
        }
    }

    /// Sums the given numeric fields over entries matching the filter.
    pub fn totals(&self, filter: &Filter, sum_fields: &[String]) -> CoreResult<Record> {
        let predicates = compile_filter(filter, ID_FIELD, SEARCH_FIELD)?;
        Ok(self.service.store().aggregate(
            &self.service.config().collection,
            &predicates,
            sum_fields,
        )?)
    }
}

impl fmt::Debug for SumRegistryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumRegistryService")
            .field("service", &self.service)
            .field("after_post", &self.after_post.is_some())
            .finish()
    }
}
