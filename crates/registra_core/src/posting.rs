//! Document posting subsystem.
//!
//! A document is the registrar — the source of truth — for entries in its
//! dependent registries. Posting mirrors the document's current state into
//! those registries; un-posting removes every entry the document owns.
//! Registry entry rows are created and removed solely here, never through
//! the registries' own services.

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::hooks::Hooks;
use crate::service::{EntityService, Meta, ID_FIELD};
use registra_store::{record_key, Key, Predicate, Record, Statement, StoreDelegate, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Registry entry field naming the registrar's entity type.
pub const REGISTRAR_TYPE_FIELD: &str = "registrar_type";
/// Registry entry field naming the registrar's key.
pub const REGISTRAR_FIELD: &str = "registrar";
/// Registry entry field numbering rows within one registrar's batch.
pub const ROW_FIELD: &str = "row";

/// Entry fragments produced for a document, keyed by registry name.
pub type RegistryEntries = BTreeMap<String, Vec<Record>>;

/// Entity-specific callback computing a document's registry entries.
pub type RegistryEntriesFn = Arc<dyn Fn(&Record) -> CoreResult<RegistryEntries> + Send + Sync>;

/// Observer invoked with the batch of entries posted to one registry.
pub type AfterPostHook = Arc<dyn Fn(&[Record]) -> CoreResult<()> + Send + Sync>;

/// The posting component embedded in a [`DocumentService`].
///
/// Holds the entity-type discriminator, the registrar-depended registry
/// list, and the entry-producing callback. Registries the document merely
/// reads never participate in post/un-post.
pub struct Posting {
    entity_type_id: String,
    depended: Vec<String>,
    entries_fn: RegistryEntriesFn,
}

impl Posting {
    /// Creates a posting component for a document configuration.
    pub fn new(config: &ServiceConfig, entries_fn: RegistryEntriesFn) -> Self {
        Self {
            entity_type_id: config.entity_type_id.clone(),
            depended: config.registrar_depended_registries.clone(),
            entries_fn,
        }
    }

    fn registrar_key(record: &Record) -> CoreResult<Key> {
        record_key(record, ID_FIELD)
            .ok_or_else(|| CoreError::Store(StoreError::aborted("document has no key")))
    }

    /// Computes the document's entries, restricted to depended registries
    /// and tagged with the registrar identity `(entity_type_id, id, row)`.
    pub fn tagged_entries(&self, record: &Record) -> CoreResult<RegistryEntries> {
        let key = Self::registrar_key(record)?;
        let produced = (self.entries_fn)(record)?;
        let mut tagged = RegistryEntries::new();
        for (registry, fragments) in produced {
            if !self.depended.contains(&registry) {
                continue;
            }
            let entries = fragments
                .into_iter()
                .enumerate()
                .map(|(row, mut fragment)| {
                    fragment.insert(
                        REGISTRAR_TYPE_FIELD.to_string(),
                        Value::String(self.entity_type_id.clone()),
                    );
                    fragment.insert(REGISTRAR_FIELD.to_string(), key.to_value());
                    fragment.insert(ROW_FIELD.to_string(), Value::Number((row as i64).into()));
                    fragment
                })
                .collect();
            tagged.insert(registry, entries);
        }
        Ok(tagged)
    }

    fn identity_predicates(&self, key: &Key) -> Vec<Predicate> {
        vec![
            Predicate::Equals {
                field: REGISTRAR_TYPE_FIELD.to_string(),
                value: Value::String(self.entity_type_id.clone()),
            },
            Predicate::Equals {
                field: REGISTRAR_FIELD.to_string(),
                value: key.to_value(),
            },
        ]
    }

    /// Statements that re-post the document: delete every existing entry
    /// for its registrar identity, then insert the freshly computed set.
    ///
    /// Always full regeneration, never a diff. On first post the deletes
    /// are no-ops.
    pub fn post_statements(&self, record: &Record) -> CoreResult<Vec<Statement>> {
        let key = Self::registrar_key(record)?;
        let entries = self.tagged_entries(record)?;
        let mut statements = Vec::new();
        for registry in &self.depended {
            statements.push(Statement::DeleteMany {
                collection: registry.clone(),
                predicates: self.identity_predicates(&key),
            });
            if let Some(batch) = entries.get(registry) {
                if !batch.is_empty() {
                    statements.push(Statement::CreateMany {
                        collection: registry.clone(),
                        data: batch.clone(),
                        skip_duplicates: false,
                    });
                }
            }
        }
        Ok(statements)
    }

    /// Statements removing all and only the document's entries.
    pub fn unpost_statements(&self, record: &Record) -> CoreResult<Vec<Statement>> {
        let key = Self::registrar_key(record)?;
        Ok(self
            .depended
            .iter()
            .map(|registry| Statement::DeleteMany {
                collection: registry.clone(),
                predicates: self.identity_predicates(&key),
            })
            .collect())
    }
}

impl fmt::Debug for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Posting")
            .field("entity_type_id", &self.entity_type_id)
            .field("depended", &self.depended)
            .finish_non_exhaustive()
    }
}

/// A document entity service: the generic core plus an embedded posting
/// component keeping dependent registry rows consistent with the
/// document's lifecycle.
pub struct DocumentService {
    service: EntityService,
    posting: Arc<Posting>,
    observers: Vec<(String, AfterPostHook)>,
}

impl DocumentService {
    /// Creates a document service.
    ///
    /// The posting component is wired into the core's `post_operations` /
    /// `unpost_operations` hooks, so posting statements join the create,
    /// update and delete transactions the core assembles.
    pub fn new(
        store: Arc<dyn StoreDelegate>,
        config: ServiceConfig,
        hooks: Hooks,
        entries_fn: RegistryEntriesFn,
    ) -> Self {
        let posting = Arc::new(Posting::new(&config, entries_fn));
        let post = Arc::clone(&posting);
        let unpost = Arc::clone(&posting);
        let hooks = hooks
            .post_operations(move |record| post.post_statements(record))
            .unpost_operations(move |record| unpost.unpost_statements(record));
        Self {
            service: EntityService::new(store, config, hooks),
            posting,
            observers: Vec::new(),
        }
    }

    /// Registers an after-post observer for one registry.
    pub fn observe(&mut self, registry: impl Into<String>, hook: AfterPostHook) {
        self.observers.push((registry.into(), hook));
    }

    /// Returns the underlying generic service.
    pub fn service(&self) -> &EntityService {
        &self.service
    }

    fn notify_observers(&self, record: &Record) -> CoreResult<()> {
        if self.observers.is_empty() {
            return Ok(());
        }
        let entries = self.posting.tagged_entries(record)?;
        for (registry, hook) in &self.observers {
            if let Some(batch) = entries.get(registry) {
                if !batch.is_empty() {
                    hook(batch)?;
                }
            }
        }
        Ok(())
    }

    /// Creates the document and posts its registry entries.
    pub fn create(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        let created = self.service.create(input, by_user)?;
        self.notify_observers(&created)?;
        Ok(created)
    }

    /// Updates the document, fully regenerating its registry entries in the
    /// same transaction.
    pub fn update(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        let updated = self.service.update(input, by_user)?;
        self.notify_observers(&updated)?;
        Ok(updated)
    }

    /// Inserts or updates the document keyed by its id.
    pub fn upsert(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        self.service.upsert(input, by_user)
    }

    /// Deletes the document, un-posting its entries in the same transaction.
    pub fn delete(&self, input: Record, by_user: bool) -> CoreResult<Record> {
        self.service.delete(input, by_user)
    }

    /// Batch insert. Posting follows in a second transaction, covering only
    /// the documents the store actually inserted.
    pub fn create_many(&self, entries: Vec<Record>, by_user: bool) -> CoreResult<usize> {
        self.service.create_many(entries, by_user)
    }

    /// Returns every document matching the filter.
    pub fn all(&self, filter: &Filter, by_user: bool) -> CoreResult<Vec<Record>> {
        self.service.all(filter, by_user)
    }

    /// Returns the first document matching the filter, if any.
    pub fn find_one(&self, filter: &Filter, by_user: bool) -> CoreResult<Option<Record>> {
        self.service.find_one(filter, by_user)
    }

    /// Counts documents matching the filter.
    pub fn count(&self, filter: &Filter, by_user: bool) -> CoreResult<usize> {
        self.service.count(filter, by_user)
    }

    /// Returns list metadata for the filter.
    pub fn meta(&self, filter: &Filter, by_user: bool) -> CoreResult<Meta> {
        self.service.meta(filter, by_user)
    }

    /// Point lookup by key.
    pub fn get(&self, key: &Key, by_user: bool) -> CoreResult<Option<Record>> {
        self.service.get(key, by_user)
    }

    /// Externally replays posting for a document, e.g. after an
    /// out-of-band correction of registry rows.
    pub fn re_post(&self, key: &Key) -> CoreResult<Record> {
        let record = self
            .service
            .get(key, false)?
            .ok_or_else(|| CoreError::EntityNotFound {
                collection: self.service.config().collection.clone(),
            })?;
        let statements = self.posting.post_statements(&record)?;
        if !statements.is_empty() {
            self.service.store().transaction(statements)?;
        }
        self.notify_observers(&record)?;
        Ok(record)
    }
}

impl fmt::Debug for DocumentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentService")
            .field("service", &self.service)
            .field("posting", &self.posting)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdStrategy;
    use registra_store::{CollectionSpec, IdMode, MemoryStore};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn entries_by_line(record: &Record) -> CoreResult<RegistryEntries> {
        let mut entries = RegistryEntries::new();
        let lines = record["lines"].as_array().cloned().unwrap_or_default();
        entries.insert(
            "stock".to_string(),
            lines
                .iter()
                .map(|line| {
                    let mut entry = Record::new();
                    entry.insert("item".into(), line["item"].clone());
                    entry.insert("quantity".into(), line["quantity"].clone());
                    entry
                })
                .collect(),
        );
        // Produced for a registry the document only reads; must be ignored.
        entries.insert("prices".to_string(), vec![Record::new()]);
        Ok(entries)
    }

    fn invoice_service() -> DocumentService {
        let store = Arc::new(MemoryStore::new());
        store.define_collection(CollectionSpec::new("invoices").id_mode(IdMode::AutoIncrement));
        store.define_collection(CollectionSpec::new("stock").id_mode(IdMode::AutoIncrement));
        store.define_collection(CollectionSpec::new("prices").id_mode(IdMode::AutoIncrement));
        let config = ServiceConfig::new("invoices")
            .entity_type_id("invoice")
            .id_strategy(IdStrategy::AutoIncrement)
            .registries(&["stock", "prices"])
            .registrar_depended_registries(&["stock"]);
        DocumentService::new(store, config, Hooks::new(), Arc::new(entries_by_line))
    }

    fn stock_entries(service: &DocumentService) -> Vec<Record> {
        let store: &Arc<dyn StoreDelegate> = service.service().store();
        store
            .find_many("stock", &registra_store::Query::default())
            .unwrap()
    }

    #[test]
    fn create_posts_tagged_entries() {
        let service = invoice_service();
        let created = service
            .create(
                record(json!({"lines": [
                    {"item": "widget", "quantity": 10},
                    {"item": "gear", "quantity": 2},
                ]})),
                true,
            )
            .unwrap();

        let entries = stock_entries(&service);
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry[REGISTRAR_TYPE_FIELD], json!("invoice"));
            assert_eq!(entry[REGISTRAR_FIELD], created["id"]);
        }
        let rows: Vec<i64> = entries.iter().map(|e| e[ROW_FIELD].as_i64().unwrap()).collect();
        assert_eq!(rows, vec![0, 1]);
    }

    #[test]
    fn non_depended_registries_are_untouched() {
        let service = invoice_service();
        service
            .create(record(json!({"lines": [{"item": "w", "quantity": 1}]})), true)
            .unwrap();
        let store: &Arc<dyn StoreDelegate> = service.service().store();
        assert_eq!(store.count("prices", &[]).unwrap(), 0);
    }

    #[test]
    fn update_fully_replaces_entries() {
        let service = invoice_service();
        let created = service
            .create(
                record(json!({"lines": [
                    {"item": "widget", "quantity": 10},
                    {"item": "gear", "quantity": 2},
                ]})),
                true,
            )
            .unwrap();

        service
            .update(
                record(json!({
                    "id": created["id"],
                    "lines": [{"item": "bolt", "quantity": 7}],
                })),
                true,
            )
            .unwrap();

        let entries = stock_entries(&service);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["item"], json!("bolt"));
    }

    #[test]
    fn delete_unposts_only_this_document() {
        let service = invoice_service();
        let a = service
            .create(record(json!({"lines": [{"item": "a", "quantity": 1}]})), true)
            .unwrap();
        let b = service
            .create(record(json!({"lines": [{"item": "b", "quantity": 1}]})), true)
            .unwrap();

        service.delete(record(json!({"id": a["id"]})), true).unwrap();

        let entries = stock_entries(&service);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0][REGISTRAR_FIELD], b["id"]);
    }

    #[test]
    fn create_many_posts_with_store_assigned_keys() {
        let service = invoice_service();
        let inserted = service
            .create_many(
                vec![
                    record(json!({"lines": [
                        {"item": "widget", "quantity": 10},
                        {"item": "gear", "quantity": 2},
                    ]})),
                    record(json!({"lines": [{"item": "bolt", "quantity": 7}]})),
                ],
                true,
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let entries = stock_entries(&service);
        assert_eq!(entries.len(), 3);
        // Entries carry the keys the store assigned during the batch.
        for entry in &entries {
            assert!(entry[REGISTRAR_FIELD].as_i64().is_some_and(|id| id > 0));
        }
        let bolt = entries.iter().find(|e| e["item"] == json!("bolt")).unwrap();
        let widget = entries.iter().find(|e| e["item"] == json!("widget")).unwrap();
        assert_ne!(bolt[REGISTRAR_FIELD], widget[REGISTRAR_FIELD]);
    }

    #[test]
    fn skipped_duplicate_keeps_existing_entries() {
        let service = invoice_service();
        let created = service
            .create(record(json!({"lines": [{"item": "widget", "quantity": 10}]})), true)
            .unwrap();

        let inserted = service
            .create_many(
                vec![
                    record(json!({
                        "id": created["id"],
                        "lines": [{"item": "bogus", "quantity": 1}],
                    })),
                    record(json!({"lines": [{"item": "gear", "quantity": 2}]})),
                ],
                true,
            )
            .unwrap();
        assert_eq!(inserted, 1);

        // The rejected payload must not have re-posted over the stored
        // document's entries.
        let entries = stock_entries(&service);
        let owned: Vec<&Record> = entries
            .iter()
            .filter(|e| e[REGISTRAR_FIELD] == created["id"])
            .collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0]["item"], json!("widget"));
        assert_eq!(owned[0]["quantity"], json!(10));
        assert!(entries.iter().any(|e| e["item"] == json!("gear")));
    }

    #[test]
    fn re_post_replays_after_out_of_band_correction() {
        let service = invoice_service();
        let created = service
            .create(record(json!({"lines": [{"item": "w", "quantity": 3}]})), true)
            .unwrap();

        // Out-of-band damage: wipe the registry behind the service's back.
        let store: &Arc<dyn StoreDelegate> = service.service().store();
        store
            .transaction(vec![Statement::DeleteMany {
                collection: "stock".into(),
                predicates: vec![],
            }])
            .unwrap();
        assert!(stock_entries(&service).is_empty());

        let key = record_key(&created, ID_FIELD).unwrap();
        service.re_post(&key).unwrap();
        let entries = stock_entries(&service);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["quantity"], json!(3));
    }

    #[test]
    fn observers_receive_posted_batches() {
        use parking_lot::Mutex;
        let mut service = invoice_service();
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service.observe(
            "stock",
            Arc::new(move |batch: &[Record]| {
                sink.lock().push(batch.len());
                Ok(())
            }),
        );

        service
            .create(
                record(json!({"lines": [
                    {"item": "a", "quantity": 1},
                    {"item": "b", "quantity": 2},
                ]})),
                true,
            )
            .unwrap();

        assert_eq!(*seen.lock(), vec![2]);
    }
}
