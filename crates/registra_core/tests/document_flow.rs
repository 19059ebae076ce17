//! Full engine flow: a document service posting into a summation registry,
//! with an info registry read alongside, over one shared delegate.

use parking_lot::Mutex;
use registra_core::{
    CoreResult, DocumentService, Filter, Hooks, IdStrategy, InfoRegistryService, RegistryEntries,
    SearchConfig, ServiceConfig, SliceDirection, SumRegistryService, REGISTRAR_FIELD,
};
use registra_store::{
    record_key, CollectionSpec, IdMode, MemoryStore, Query, Record, StoreDelegate,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn record(value: Value) -> Record {
    value.as_object().unwrap().clone()
}

fn filter(value: Value) -> Filter {
    value.as_object().unwrap().clone()
}

fn shipment_entries(record: &Record) -> CoreResult<RegistryEntries> {
    let mut entries = RegistryEntries::new();
    let lines = record
        .get("lines")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
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
    Ok(entries)
}

struct Engine {
    shipments: DocumentService,
    stock: SumRegistryService,
    rates: InfoRegistryService,
    store: Arc<MemoryStore>,
    posted_batches: Arc<Mutex<Vec<usize>>>,
}

fn engine() -> Engine {
    let store = Arc::new(MemoryStore::new());
    store.define_collection(CollectionSpec::new("shipments").id_mode(IdMode::Generated));
    store.define_collection(CollectionSpec::new("stock").id_mode(IdMode::AutoIncrement));
    store.define_collection(CollectionSpec::new("rates").id_mode(IdMode::AutoIncrement));

    let posted_batches: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&posted_batches);
    let stock = SumRegistryService::new(
        Arc::clone(&store) as Arc<dyn StoreDelegate>,
        ServiceConfig::new("stock"),
        Hooks::new(),
    )
    .with_after_post(Arc::new(move |batch: &[Record]| {
        sink.lock().push(batch.len());
        Ok(())
    }));

    let mut shipments = DocumentService::new(
        Arc::clone(&store) as Arc<dyn StoreDelegate>,
        ServiceConfig::new("shipments")
            .entity_type_id("shipment")
            .id_strategy(IdStrategy::Generated)
            .with_search(SearchConfig::new(&["number", "date"]).date_fields(&["date"]))
            .registries(&["stock", "rates"])
            .registrar_depended_registries(&["stock"]),
        Hooks::new(),
        Arc::new(shipment_entries),
    );
    shipments.observe("stock", stock.post_observer());

    let rates = InfoRegistryService::new(
        Arc::clone(&store) as Arc<dyn StoreDelegate>,
        ServiceConfig::new("rates"),
        Hooks::new(),
        "period",
    );

    Engine {
        shipments,
        stock,
        rates,
        store,
        posted_batches,
    }
}

#[test]
fn document_lifecycle_drives_registry_totals() {
    let engine = engine();
    let first = engine
        .shipments
        .create(
            record(json!({
                "number": "SH-1",
                "date": "2024-03-01T09:00:00Z",
                "lines": [
                    {"item": "widget", "quantity": 10},
                    {"item": "gear", "quantity": 4},
                ],
            })),
            true,
        )
        .unwrap();
    engine
        .shipments
        .create(
            record(json!({
                "number": "SH-2",
                "date": "2024-03-02T09:00:00Z",
                "lines": [{"item": "widget", "quantity": 5}],
            })),
            true,
        )
        .unwrap();

    let totals = engine
        .stock
        .totals(&filter(json!({"item": "widget"})), &["quantity".to_string()])
        .unwrap();
    assert_eq!(totals["quantity"], json!(15));

    // Update fully replaces the first shipment's entries.
    engine
        .shipments
        .update(
            record(json!({
                "id": first["id"],
                "lines": [{"item": "widget", "quantity": 1}],
            })),
            true,
        )
        .unwrap();
    let totals = engine
        .stock
        .totals(&filter(json!({"item": "widget"})), &["quantity".to_string()])
        .unwrap();
    assert_eq!(totals["quantity"], json!(6));

    // Delete un-posts the first shipment only.
    engine
        .shipments
        .delete(record(json!({"id": first["id"]})), true)
        .unwrap();
    let remaining = engine
        .store
        .find_many("stock", &Query::default())
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0][REGISTRAR_FIELD], first["id"]);

    // The after_post observer saw each posted batch.
    assert_eq!(*engine.posted_batches.lock(), vec![2, 1, 1]);
}

#[test]
fn generated_id_document_still_gets_search_column() {
    let engine = engine();
    let created = engine
        .shipments
        .create(
            record(json!({
                "number": "SH-9",
                "date": "2024-04-01T12:00:00Z",
                "lines": [],
            })),
            true,
        )
        .unwrap();
    // The id was unknown pre-insert; the search value is patched afterwards.
    assert_eq!(created["search"], json!("sh-9 2024-04-01"));

    let key = record_key(&created, "id").unwrap();
    let stored = engine.shipments.get(&key, true).unwrap().unwrap();
    assert_eq!(stored["search"], json!("sh-9 2024-04-01"));

    let hits = engine.shipments.all(&filter(json!({"q": "SH-9"})), true).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn re_post_restores_registry_after_manual_damage() {
    let engine = engine();
    let created = engine
        .shipments
        .create(
            record(json!({
                "number": "SH-5",
                "date": "2024-05-01T00:00:00Z",
                "lines": [{"item": "bolt", "quantity": 7}],
            })),
            true,
        )
        .unwrap();

    engine
        .store
        .transaction(vec![registra_store::Statement::DeleteMany {
            collection: "stock".into(),
            predicates: vec![],
        }])
        .unwrap();

    let key = record_key(&created, "id").unwrap();
    engine.shipments.re_post(&key).unwrap();
    let totals = engine
        .stock
        .totals(&filter(json!({"item": "bolt"})), &["quantity".to_string()])
        .unwrap();
    assert_eq!(totals["quantity"], json!(7));
}

#[test]
fn info_registry_slice_alongside_documents() {
    let engine = engine();
    for (period, value) in [("2024-01-01", 100), ("2024-06-01", 110)] {
        engine
            .rates
            .service()
            .create(record(json!({"period": period, "value": value})), false)
            .unwrap();
    }
    let in_force = engine
        .rates
        .slice(&json!("2024-03-15"), SliceDirection::AtOrBefore, &Filter::new())
        .unwrap()
        .unwrap();
    assert_eq!(in_force["value"], json!(100));
}
