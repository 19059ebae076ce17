//! Entity service core.
//!
//! One `EntityService` owns the uniform CRUD contract for a single entity
//! shape: hook pipeline, filter compilation, derived search maintenance,
//! and assembly of each mutating operation's atomic statement set. It holds
//! a shared persistence delegate and performs no query planning itself.

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::filter::{compile_filter, Filter};
use crate::hooks::Hooks;
use crate::search::{derive_search, SEARCH_FIELD};
use registra_store::{
    merge_over, record_key, Key, Predicate, Query, Record, Statement, StatementResult,
    StoreDelegate, StoreError,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Key field name on stored entities.
pub const ID_FIELD: &str = "id";

/// List metadata for a filtered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Meta {
    /// Number of records matching the filter.
    pub total: usize,
}

/// Generic CRUD service over one entity collection.
///
/// Mutating operations run the hook pipeline, then hand exactly one
/// statement list per transactional boundary to the delegate. Post-commit
/// hooks run after the delegate has durably committed; their failure
/// propagates but never rolls back the write.
pub struct EntityService {
    store: Arc<dyn StoreDelegate>,
    config: ServiceConfig,
    hooks: Hooks,
}

impl EntityService {
    /// Creates a service from a shared delegate, configuration and hooks.
    pub fn new(store: Arc<dyn StoreDelegate>, config: ServiceConfig, hooks: Hooks) -> Self {
        Self {
            store,
            config,
            hooks,
        }
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the shared persistence delegate.
    pub fn store(&self) -> &Arc<dyn StoreDelegate> {
        &self.store
    }

    fn strip_forbidden(&self, mut record: Record, by_user: bool) -> Record {
        if by_user {
            for field in &self.config.forbidden_for_user_fields {
                record.remove(field);
            }
        }
        record
    }

    fn augment_defaults(&self, mut record: Record) -> Record {
        for (field, value) in &self.config.defaulted_fields {
            if !record.contains_key(field) {
                record.insert(field.clone(), value.clone());
            }
        }
        for field in &self.config.required_store_fields {
            if !record.contains_key(field) {
                record.insert(field.clone(), Value::Null);
            }
        }
        record
    }

    fn authorize(&self, record: &Record) -> CoreResult<()> {
        if self.hooks.is_allowed_to_change(record) {
            Ok(())
        } else {
            Err(CoreError::DoNotAllowToChange)
        }
    }

    fn apply_search(&self, record: &mut Record) {
        if let Some(search) = &self.config.search {
            let value = derive_search(search, record);
            record.insert(SEARCH_FIELD.to_string(), Value::String(value));
        }
    }

    fn load(&self, key: &Key) -> CoreResult<Record> {
        let query = Query::new(vec![Predicate::Equals {
            field: ID_FIELD.to_string(),
            value: key.to_value(),
        }]);
        self.store
            .find_first(&self.config.collection, &query)?
            .ok_or_else(|| CoreError::EntityNotFound {
                collection: self.config.collection.clone(),
            })
    }

    fn compiled(&self, filter: &Filter, by_user: bool) -> CoreResult<Vec<Predicate>> {
        let filter = if by_user {
            self.hooks.run_change_list_filter(filter.clone())?
        } else {
            filter.clone()
        };
        compile_filter(&filter, ID_FIELD, SEARCH_FIELD)
    }

    fn expect_record(result: Option<&StatementResult>) -> CoreResult<Record> {
        result
            .and_then(StatementResult::record)
            .cloned()
            .ok_or_else(|| CoreError::Store(StoreError::aborted("primary statement lost")))
    }

    /// Creates an entity.
    ///
    /// The insert and hook-contributed `additional_operations_on_create`
    /// commit as one transaction; posting (and the deferred search patch for
    /// store-assigned keys) commits as a second; `after_create` runs only
    /// after both.
    pub fn create(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        tracing::debug!(collection = %self.config.collection, by_user, "create");
        let record = self.strip_forbidden(input, by_user);
        let record = self.augment_defaults(record);
        self.hooks.run_validate(&record)?;
        let mut record = self.hooks.run_before_create(record)?;

        // With a caller-supplied key the search value rides the insert;
        // otherwise it is patched once the store has assigned the key.
        let search_in_insert = self.config.id_strategy.key_known_before_insert();
        if search_in_insert {
            self.apply_search(&mut record);
        }
        self.authorize(&record)?;

        let mut statements = vec![Statement::Create {
            collection: self.config.collection.clone(),
            data: record.clone(),
        }];
        statements.extend(
            self.hooks
                .run_side_effects(&self.hooks.additional_operations_on_create, &record)?,
        );
        let results = self.store.transaction(statements)?;
        let mut created = Self::expect_record(results.first())?;

        let mut follow_up = Vec::new();
        if self.config.search.is_some() && !search_in_insert {
            self.apply_search(&mut created);
            let key = record_key(&created, ID_FIELD)
                .ok_or_else(|| CoreError::Store(StoreError::aborted("created row has no key")))?;
            let mut patch = Record::new();
            patch.insert(
                SEARCH_FIELD.to_string(),
                created
                    .get(SEARCH_FIELD)
                    .cloned()
                    .unwrap_or(Value::Null),
            );
            follow_up.push(Statement::Update {
                collection: self.config.collection.clone(),
                key,
                data: patch,
            });
        }
        follow_up.extend(
            self.hooks
                .run_side_effects(&self.hooks.post_operations, &created)?,
        );
        if !follow_up.is_empty() {
            self.store.transaction(follow_up)?;
        }

        self.hooks.run_after(&self.hooks.after_create, &created)?;
        Ok(created)
    }

    /// Updates an entity.
    ///
    /// The input is left-merged over the current record, so omitted fields
    /// keep their stored values and an explicit null clears a field. The
    /// field update, `additional_operations_on_update` and re-posting commit
    /// as one transaction.
    pub fn update(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        tracing::debug!(collection = %self.config.collection, by_user, "update");
        let key = record_key(&input, ID_FIELD).ok_or_else(|| CoreError::EntityNotFound {
            collection: self.config.collection.clone(),
        })?;
        let current = self.load(&key)?;
        let input = self.strip_forbidden(input, by_user);
        let mut merged = merge_over(&current, &input);
        self.apply_search(&mut merged);
        self.authorize(&merged)?;
        self.hooks.run_validate(&merged)?;
        let record = self.hooks.run_before_update(merged)?;

        let mut statements = vec![Statement::Update {
            collection: self.config.collection.clone(),
            key,
            data: record.clone(),
        }];
        statements.extend(
            self.hooks
                .run_side_effects(&self.hooks.additional_operations_on_update, &record)?,
        );
        statements.extend(
            self.hooks
                .run_side_effects(&self.hooks.post_operations, &record)?,
        );
        let results = self.store.transaction(statements)?;
        let updated = Self::expect_record(results.first())?;

        self.hooks.run_after(&self.hooks.after_update, &updated)?;
        Ok(updated)
    }

    /// Inserts or updates an entity keyed by its id.
    ///
    /// Builds create- and update-shaped payloads by left-merging the input
    /// over the loaded record (or nothing), runs one `before_upsert` hook
    /// over both shapes, then performs an atomic store upsert. Without a
    /// supplied id there is no key to upsert on and the create path is used.
    pub fn upsert(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        tracing::debug!(collection = %self.config.collection, by_user, "upsert");
        let input = self.strip_forbidden(input, by_user);
        let key = record_key(&input, ID_FIELD);
        let current = match &key {
            Some(key) => self.load(key).ok(),
            None => None,
        };

        let create_shape = self.augment_defaults(input.clone());
        let update_shape = match &current {
            Some(current) => merge_over(current, &input),
            None => create_shape.clone(),
        };
        self.authorize(current.as_ref().map_or(&create_shape, |_| &update_shape))?;
        self.hooks.run_validate(&create_shape)?;
        self.hooks.run_validate(&update_shape)?;
        let (mut create_shape, mut update_shape) =
            self.hooks.run_before_upsert(create_shape, update_shape)?;

        let Some(key) = key else {
            // No key supplied: degrade to the create path.
            return self.create_via_store(create_shape);
        };
        self.apply_search(&mut create_shape);
        self.apply_search(&mut update_shape);
        let record =
            self.store
                .upsert(&self.config.collection, &key, create_shape, update_shape)?;
        Ok(record)
    }

    fn create_via_store(&self, mut record: Record) -> CoreResult<Record> {
        let search_in_insert = self.config.id_strategy.key_known_before_insert();
        if search_in_insert {
            self.apply_search(&mut record);
        }
        let mut created = self.store.create(&self.config.collection, record)?;
        if self.config.search.is_some() && !search_in_insert {
            self.apply_search(&mut created);
            if let Some(key) = record_key(&created, ID_FIELD) {
                let mut patch = Record::new();
                patch.insert(
                    SEARCH_FIELD.to_string(),
                    created.get(SEARCH_FIELD).cloned().unwrap_or(Value::Null),
                );
                created = self.store.update(&self.config.collection, &key, patch)?;
            }
        }
        Ok(created)
    }

    /// Deletes an entity.
    ///
    /// `before_delete` runs first and may veto by returning an error, before
    /// any read or mutation. The delete, `additional_operations_on_delete`
    /// and un-posting commit as one transaction; `after_delete` observes the
    /// pre-deletion snapshot.
    pub fn delete(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        tracing::debug!(collection = %self.config.collection, by_user, "delete");
        self.hooks.run_before_delete(&input)?;
        let key = record_key(&input, ID_FIELD).ok_or_else(|| CoreError::EntityNotFound {
            collection: self.config.collection.clone(),
        })?;
        let current = self.load(&key)?;
        self.authorize(&current)?;

        let mut statements = vec![Statement::Delete {
            collection: self.config.collection.clone(),
            key,
        }];
        statements.extend(
            self.hooks
                .run_side_effects(&self.hooks.additional_operations_on_delete, &current)?,
        );
        statements.extend(
            self.hooks
                .run_side_effects(&self.hooks.unpost_operations, &current)?,
        );
        let results = self.store.transaction(statements)?;
        let snapshot = Self::expect_record(results.first())?;

        self.hooks.run_after(&self.hooks.after_delete, &snapshot)?;
        Ok(snapshot)
    }

    /// Batch insert. Duplicate keys are skipped silently at the store
    /// level; the batch insert and every entry's
    /// `additional_operations_on_create` statements join one transaction.
    /// Posting commits as a follow-up transaction computed from the rows the
    /// store actually inserted, so store-assigned keys are present and
    /// skipped duplicates never post.
    pub fn create_many(&self, entries: Vec<Record>, by_user: bool) -> CoreResult<usize> {
        tracing::debug!(
            collection = %self.config.collection,
            by_user,
            entries = entries.len(),
            "create_many"
        );
        let mut rows = Vec::with_capacity(entries.len());
        let mut side_effects = Vec::new();
        for entry in entries {
            let record = self.strip_forbidden(entry, by_user);
            let record = self.augment_defaults(record);
            self.hooks.run_validate(&record)?;
            let mut record = self.hooks.run_before_create(record)?;
            self.apply_search(&mut record);
            self.authorize(&record)?;
            side_effects.extend(
                self.hooks
                    .run_side_effects(&self.hooks.additional_operations_on_create, &record)?,
            );
            rows.push(record);
        }

        let mut statements = vec![Statement::CreateMany {
            collection: self.config.collection.clone(),
            data: rows,
            skip_duplicates: true,
        }];
        statements.append(&mut side_effects);
        let results = self.store.transaction(statements)?;
        let inserted = results
            .first()
            .and_then(StatementResult::records)
            .ok_or_else(|| CoreError::Store(StoreError::aborted("batch insert lost")))?
            .to_vec();

        let mut follow_up = Vec::new();
        for record in &inserted {
            follow_up.extend(
                self.hooks
                    .run_side_effects(&self.hooks.post_operations, record)?,
            );
        }
        if !follow_up.is_empty() {
            self.store.transaction(follow_up)?;
        }
        Ok(inserted.len())
    }

    /// Returns every entity matching the filter.
    pub fn all(&self, filter: &Filter, by_user: bool) -> CoreResult<Vec<Record>> {
        let predicates = self.compiled(filter, by_user)?;
        Ok(self
            .store
            .find_many(&self.config.collection, &Query::new(predicates))?)
    }

    /// Returns the first entity matching the filter, if any.
    pub fn find_one(&self, filter: &Filter, by_user: bool) -> CoreResult<Option<Record>> {
        let predicates = self.compiled(filter, by_user)?;
        Ok(self
            .store
            .find_first(&self.config.collection, &Query::new(predicates))?)
    }

    /// Counts entities matching the filter.
    pub fn count(&self, filter: &Filter, by_user: bool) -> CoreResult<usize> {
        let predicates = self.compiled(filter, by_user)?;
        Ok(self.store.count(&self.config.collection, &predicates)?)
    }

    /// Returns list metadata for the filter.
    pub fn meta(&self, filter: &Filter, by_user: bool) -> CoreResult<Meta> {
        Ok(Meta {
            total: self.count(filter, by_user)?,
        })
    }

    /// Point lookup by key.
    ///
    /// Implemented as `find_one` over an id-equality filter, so the
    /// `change_list_filter` hook transparently gates point lookups too.
    pub fn get(&self, key: &Key, by_user: bool) -> CoreResult<Option<Record>> {
        let mut filter = Filter::new();
        filter.insert(ID_FIELD.to_string(), key.to_value());
        self.find_one(&filter, by_user)
    }
}

impl fmt::Debug for EntityService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityService")
            .field("collection", &self.config.collection)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
