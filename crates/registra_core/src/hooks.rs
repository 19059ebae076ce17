//! Hook pipeline.
//!
//! Each entity service carries a fixed, ordered set of extension points.
//! Every hook defaults to a no-op (or identity) and can be overridden per
//! entity at construction. Hooks run strictly sequentially per operation;
//! an error aborts the remaining pipeline and the enclosing transaction.
//! Post-commit hooks (`after_*`) run outside the transaction: their failure
//! propagates but never rolls back the committed write.

use crate::error::CoreResult;
use crate::filter::Filter;
use registra_store::{Record, Statement};
use std::fmt;

/// Validation hook, auto-wired ahead of `before_create`/`before_update`/
/// `before_upsert`. Not bypassable.
pub type ValidateHook = Box<dyn Fn(&Record) -> CoreResult<()> + Send + Sync>;

/// Payload-transforming hook (`before_create`, `before_update`).
pub type MutateHook = Box<dyn Fn(Record) -> CoreResult<Record> + Send + Sync>;

/// Upsert hook receiving both the create- and update-shaped payloads.
pub type UpsertHook = Box<dyn Fn(Record, Record) -> CoreResult<(Record, Record)> + Send + Sync>;

/// Veto hook (`before_delete`); an error aborts before any mutation.
pub type VetoHook = Box<dyn Fn(&Record) -> CoreResult<()> + Send + Sync>;

/// Pure, synchronous authorization predicate.
pub type AllowedToChangeHook = Box<dyn Fn(&Record) -> bool + Send + Sync>;

/// Hook contributing extra statements to the operation's transaction.
/// Contributed statements must not commit independently.
pub type SideEffectsHook = Box<dyn Fn(&Record) -> CoreResult<Vec<Statement>> + Send + Sync>;

/// Post-commit observation hook.
pub type AfterHook = Box<dyn Fn(&Record) -> CoreResult<()> + Send + Sync>;

/// Read-path filter augmentation hook (`change_list_filter`).
pub type ListFilterHook = Box<dyn Fn(Filter) -> CoreResult<Filter> + Send + Sync>;

/// The hook table of one entity service.
///
/// Represented as a struct of optional function values rather than
/// overridable methods: explicit, independently testable, no dynamic
/// dispatch hierarchy.
#[derive(Default)]
pub struct Hooks {
    /// Payload validation; runs ahead of every `before_*` transform.
    pub validate: Option<ValidateHook>,
    /// Authorization predicate; `false` fails with a not-permitted error.
    pub allowed_to_change: Option<AllowedToChangeHook>,
    /// Transforms the create payload.
    pub before_create: Option<MutateHook>,
    /// Transforms the merged update payload.
    pub before_update: Option<MutateHook>,
    /// Transforms both upsert payload shapes.
    pub before_upsert: Option<UpsertHook>,
    /// May veto a delete before any mutation happens.
    pub before_delete: Option<VetoHook>,
    /// Extra statements for the create transaction.
    pub additional_operations_on_create: Option<SideEffectsHook>,
    /// Extra statements for the update transaction.
    pub additional_operations_on_update: Option<SideEffectsHook>,
    /// Extra statements for the delete transaction.
    pub additional_operations_on_delete: Option<SideEffectsHook>,
    /// Observes the created record after commit.
    pub after_create: Option<AfterHook>,
    /// Observes the updated record after commit.
    pub after_update: Option<AfterHook>,
    /// Observes the pre-deletion snapshot after commit.
    pub after_delete: Option<AfterHook>,
    /// Augments read-path filters in `by_user` mode.
    pub change_list_filter: Option<ListFilterHook>,
    /// Posting statements joined to the write (wired by the document
    /// posting subsystem, not by entity customizations).
    pub post_operations: Option<SideEffectsHook>,
    /// Un-posting statements joined to the delete (wired by the document
    /// posting subsystem).
    pub unpost_operations: Option<SideEffectsHook>,
}

impl Hooks {
    /// Creates an empty hook table: every extension point is a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the validation hook.
    #[must_use]
    pub fn validate(mut self, f: impl Fn(&Record) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.validate = Some(Box::new(f));
        self
    }

    /// Sets the authorization predicate.
    #[must_use]
    pub fn allowed_to_change(mut self, f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.allowed_to_change = Some(Box::new(f));
        self
    }

    /// Sets the `before_create` transform.
    #[must_use]
    pub fn before_create(
        mut self,
        f: impl Fn(Record) -> CoreResult<Record> + Send + Sync + 'static,
    ) -> Self {
        self.before_create = Some(Box::new(f));
        self
    }

    /// Sets the `before_update` transform.
    #[must_use]
    pub fn before_update(
        mut self,
        f: impl Fn(Record) -> CoreResult<Record> + Send + Sync + 'static,
    ) -> Self {
        self.before_update = Some(Box::new(f));
        self
    }

    /// Sets the `before_upsert` transform.
    #[must_use]
    pub fn before_upsert(
        mut self,
        f: impl Fn(Record, Record) -> CoreResult<(Record, Record)> + Send + Sync + 'static,
    ) -> Self {
        self.before_upsert = Some(Box::new(f));
        self
    }

    /// Sets the `before_delete` veto hook.
    #[must_use]
    pub fn before_delete(
        mut self,
        f: impl Fn(&Record) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.before_delete = Some(Box::new(f));
        self
    }

    /// Sets the create-transaction side effects hook.
    #[must_use]
    pub fn additional_operations_on_create(
        mut self,
        f: impl Fn(&Record) -> CoreResult<Vec<Statement>> + Send + Sync + 'static,
    ) -> Self {
        self.additional_operations_on_create = Some(Box::new(f));
        self
    }

    /// Sets the update-transaction side effects hook.
    #[must_use]
    pub fn additional_operations_on_update(
        mut self,
        f: impl Fn(&Record) -> CoreResult<Vec<Statement>> + Send + Sync + 'static,
    ) -> Self {
        self.additional_operations_on_update = Some(Box::new(f));
        self
    }

    /// Sets the delete-transaction side effects hook.
    #[must_use]
    pub fn additional_operations_on_delete(
        mut self,
        f: impl Fn(&Record) -> CoreResult<Vec<Statement>> + Send + Sync + 'static,
    ) -> Self {
        self.additional_operations_on_delete = Some(Box::new(f));
        self
    }

    /// Sets the post-commit create observer.
    #[must_use]
    pub fn after_create(
        mut self,
        f: impl Fn(&Record) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_create = Some(Box::new(f));
        self
    }

    /// Sets the post-commit update observer.
    #[must_use]
    pub fn after_update(
        mut self,
        f: impl Fn(&Record) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_update = Some(Box::new(f));
        self
    }

    /// Sets the post-commit delete observer.
    #[must_use]
    pub fn after_delete(
        mut self,
        f: impl Fn(&Record) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.after_delete = Some(Box::new(f));
        self
    }

    /// Sets the read-path filter augmentation hook.
    #[must_use]
    pub fn change_list_filter(
        mut self,
        f: impl Fn(Filter) -> CoreResult<Filter> + Send + Sync + 'static,
    ) -> Self {
        self.change_list_filter = Some(Box::new(f));
        self
    }

    /// Wires the posting statements hook.
    #[must_use]
    pub fn post_operations(
        mut self,
        f: impl Fn(&Record) -> CoreResult<Vec<Statement>> + Send + Sync + 'static,
    ) -> Self {
        self.post_operations = Some(Box::new(f));
        self
    }

    /// Wires the un-posting statements hook.
    #[must_use]
    pub fn unpost_operations(
        mut self,
        f: impl Fn(&Record) -> CoreResult<Vec<Statement>> + Send + Sync + 'static,
    ) -> Self {
        self.unpost_operations = Some(Box::new(f));
        self
    }

    // Invocation helpers used by the service core. Each falls back to the
    // no-op/identity default when the hook is unset.

    pub(crate) fn run_validate(&self, record: &Record) -> CoreResult<()> {
        match &self.validate {
            Some(f) => f(record),
            None => Ok(()),
        }
    }

    pub(crate) fn is_allowed_to_change(&self, record: &Record) -> bool {
        match &self.allowed_to_change {
            Some(f) => f(record),
            None => true,
        }
    }

    pub(crate) fn run_before_create(&self, record: Record) -> CoreResult<Record> {
        match &self.before_create {
            Some(f) => f(record),
            None => Ok(record),
        }
    }

    pub(crate) fn run_before_update(&self, record: Record) -> CoreResult<Record> {
        match &self.before_update {
            Some(f) => f(record),
            None => Ok(record),
        }
    }

    pub(crate) fn run_before_upsert(
        &self,
        create: Record,
        update: Record,
    ) -> CoreResult<(Record, Record)> {
        match &self.before_upsert {
            Some(f) => f(create, update),
            None => Ok((create, update)),
        }
    }

    pub(crate) fn run_before_delete(&self, record: &Record) -> CoreResult<()> {
        match &self.before_delete {
            Some(f) => f(record),
            None => Ok(()),
        }
    }

    pub(crate) fn run_side_effects(
        &self,
        hook: &Option<SideEffectsHook>,
        record: &Record,
    ) -> CoreResult<Vec<Statement>> {
        match hook {
            Some(f) => f(record),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn run_after(&self, hook: &Option<AfterHook>, record: &Record) -> CoreResult<()> {
        match hook {
            Some(f) => f(record),
            None => Ok(()),
        }
    }

    pub(crate) fn run_change_list_filter(&self, filter: Filter) -> CoreResult<Filter> {
        match &self.change_list_filter {
            Some(f) => f(filter),
            None => Ok(filter),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("validate", &self.validate.is_some())
            .field("allowed_to_change", &self.allowed_to_change.is_some())
            .field("before_create", &self.before_create.is_some())
            .field("before_update", &self.before_update.is_some())
            .field("before_upsert", &self.before_upsert.is_some())
            .field("before_delete", &self.before_delete.is_some())
            .field("after_create", &self.after_create.is_some())
            .field("after_update", &self.after_update.is_some())
            .field("after_delete", &self.after_delete.is_some())
            .field("change_list_filter", &self.change_list_filter.is_some())
            .field("post_operations", &self.post_operations.is_some())
            .finish_non_exhaustive()
    }
}
