//! In-memory persistence delegate.

use crate::delegate::StoreDelegate;
use crate::error::{StoreError, StoreResult};
use crate::predicate::{compare_values, matches_all, Predicate, Query, SortOrder};
use crate::record::{field_or_null, record_key, Key, Record};
use crate::statement::{Statement, StatementResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How the store assigns keys on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMode {
    /// The caller supplies the key; inserting without one is an error.
    #[default]
    Supplied,
    /// Missing keys are assigned from a per-collection integer sequence.
    AutoIncrement,
    /// Missing keys are assigned an opaque generated string.
    Generated,
}

/// A foreign-key reference from a field to another collection's key.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Referencing field on this collection.
    pub field: String,
    /// Referenced collection.
    pub collection: String,
}

/// Schema declaration for one collection of the in-memory store.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Key field name.
    pub key_field: String,
    /// Key assignment mode.
    pub id_mode: IdMode,
    /// Unique field sets (beyond the always-unique key field).
    ///
    /// A set with any null member does not conflict.
    pub unique: Vec<Vec<String>>,
    /// Foreign-key references checked on insert and update.
    pub references: Vec<Reference>,
}

impl CollectionSpec {
    /// Creates a spec with the conventional `id` key field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: "id".to_string(),
            id_mode: IdMode::default(),
            unique: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Sets the key assignment mode.
    #[must_use]
    pub fn id_mode(mut self, mode: IdMode) -> Self {
        self.id_mode = mode;
        self
    }

    /// Sets the key field name.
    #[must_use]
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    /// Adds a unique field set.
    #[must_use]
    pub fn unique(mut self, fields: &[&str]) -> Self {
        self.unique.push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Adds a foreign-key reference.
    #[must_use]
    pub fn references(mut self, field: impl Into<String>, collection: impl Into<String>) -> Self {
        self.references.push(Reference {
            field: field.into(),
            collection: collection.into(),
        });
        self
    }
}

#[derive(Debug, Clone)]
struct Table {
    spec: CollectionSpec,
    rows: Vec<Record>,
    next_id: i64,
}

impl Table {
    fn new(spec: CollectionSpec) -> Self {
        Self {
            spec,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn position(&self, key: &Key) -> Option<usize> {
        let key_value = key.to_value();
        self.rows
            .iter()
            .position(|row| field_or_null(row, &self.spec.key_field) == &key_value)
    }

    /// Returns the violated field names if `row` conflicts with an existing
    /// row other than `exclude`.
    fn unique_conflict(&self, row: &Record, exclude: Option<usize>) -> Option<Vec<String>> {
        let key = field_or_null(row, &self.spec.key_field);
        if !key.is_null() {
            for (i, existing) in self.rows.iter().enumerate() {
                if Some(i) == exclude {
                    continue;
                }
                if field_or_null(existing, &self.spec.key_field) == key {
                    return Some(vec![self.spec.key_field.clone()]);
                }
            }
        }
        for set in &self.spec.unique {
            let values: Vec<&Value> = set.iter().map(|f| field_or_null(row, f)).collect();
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            for (i, existing) in self.rows.iter().enumerate() {
                if Some(i) == exclude {
                    continue;
                }
                if set
                    .iter()
                    .zip(&values)
                    .all(|(f, v)| field_or_null(existing, f) == *v)
                {
                    return Some(set.clone());
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<String, Table>,
}

impl State {
    fn table(&self, name: &str) -> StoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::unknown_collection(name))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::unknown_collection(name))
    }

    fn check_references(&self, collection: &str, row: &Record) -> StoreResult<()> {
        let table = self.table(collection)?;
        for reference in table.spec.references.clone() {
            let value = field_or_null(row, &reference.field);
            if value.is_null() {
                continue;
            }
            let target = self.table(&reference.collection)?;
            let hit = target
                .rows
                .iter()
                .any(|r| field_or_null(r, &target.spec.key_field) == value);
            if !hit {
                return Err(StoreError::foreign_key(collection, reference.field));
            }
        }
        Ok(())
    }

    fn assign_key(&mut self, collection: &str, row: &mut Record) -> StoreResult<()> {
        let table = self.table_mut(collection)?;
        let key_field = table.spec.key_field.clone();
        let supplied = !field_or_null(row, &key_field).is_null();
        match table.spec.id_mode {
            IdMode::Supplied => {
                if !supplied {
                    return Err(StoreError::MissingKey {
                        collection: collection.to_string(),
                        field: key_field,
                    });
                }
            }
            IdMode::AutoIncrement => {
                if supplied {
                    // Keep the sequence ahead of explicitly supplied keys.
                    if let Some(Key::Int(n)) = record_key(row, &key_field) {
                        table.next_id = table.next_id.max(n + 1);
                    }
                } else {
                    let id = table.next_id;
                    table.next_id += 1;
                    row.insert(key_field, Value::Number(id.into()));
                }
            }
            IdMode::Generated => {
                if !supplied {
                    let id = uuid::Uuid::new_v4().simple().to_string();
                    row.insert(key_field, Value::String(id));
                }
            }
        }
        Ok(())
    }

    fn apply_create(&mut self, collection: &str, mut data: Record) -> StoreResult<Record> {
        self.assign_key(collection, &mut data)?;
        self.check_references(collection, &data)?;
        let table = self.table_mut(collection)?;
        if let Some(fields) = table.unique_conflict(&data, None) {
            return Err(StoreError::unique_violation(collection, fields));
        }
        table.rows.push(data.clone());
        Ok(data)
    }

    fn apply_create_many(
        &mut self,
        collection: &str,
        data: Vec<Record>,
        skip_duplicates: bool,
    ) -> StoreResult<Vec<Record>> {
        let mut inserted = Vec::new();
        for row in data {
            match self.apply_create(collection, row) {
                Ok(stored) => inserted.push(stored),
                Err(StoreError::UniqueViolation { .. }) if skip_duplicates => {}
                Err(e) => return Err(e),
            }
        }
        Ok(inserted)
    }

    fn apply_update(&mut self, collection: &str, key: &Key, data: Record) -> StoreResult<Record> {
        let table = self.table(collection)?;
        let index = table
            .position(key)
            .ok_or_else(|| StoreError::not_found(collection))?;
        let mut updated = table.rows[index].clone();
        for (field, value) in data {
            updated.insert(field, value);
        }
        self.check_references(collection, &updated)?;
        let table = self.table_mut(collection)?;
        if let Some(fields) = table.unique_conflict(&updated, Some(index)) {
            return Err(StoreError::unique_violation(collection, fields));
        }
        table.rows[index] = updated.clone();
        Ok(updated)
    }

    fn apply_upsert(
        &mut self,
        collection: &str,
        key: &Key,
        create: Record,
        update: Record,
    ) -> StoreResult<Record> {
        let table = self.table(collection)?;
        let key_field = table.spec.key_field.clone();
        if table.position(key).is_some() {
            self.apply_update(collection, key, update)
        } else {
            let mut create = create;
            create.entry(key_field).or_insert_with(|| key.to_value());
            self.apply_create(collection, create)
        }
    }

    fn apply_delete(&mut self, collection: &str, key: &Key) -> StoreResult<Record> {
        let table = self.table_mut(collection)?;
        let index = table
            .position(key)
            .ok_or_else(|| StoreError::not_found(collection))?;
        Ok(table.rows.remove(index))
    }

    fn apply_delete_many(
        &mut self,
        collection: &str,
        predicates: &[Predicate],
    ) -> StoreResult<usize> {
        let table = self.table_mut(collection)?;
        let before = table.rows.len();
        table.rows.retain(|row| !matches_all(row, predicates));
        Ok(before - table.rows.len())
    }

    fn apply(&mut self, statement: Statement) -> StoreResult<StatementResult> {
        match statement {
            Statement::Create { collection, data } => {
                self.apply_create(&collection, data).map(StatementResult::Record)
            }
            Statement::CreateMany {
                collection,
                data,
                skip_duplicates,
            } => self
                .apply_create_many(&collection, data, skip_duplicates)
                .map(StatementResult::Records),
            Statement::Update {
                collection,
                key,
                data,
            } => self
                .apply_update(&collection, &key, data)
                .map(StatementResult::Record),
            Statement::Upsert {
                collection,
                key,
                create,
                update,
            } => self
                .apply_upsert(&collection, &key, create, update)
                .map(StatementResult::Record),
            Statement::Delete { collection, key } => self
                .apply_delete(&collection, &key)
                .map(StatementResult::Record),
            Statement::DeleteMany {
                collection,
                predicates,
            } => self
                .apply_delete_many(&collection, &predicates)
                .map(StatementResult::Count),
        }
    }
}

/// An in-memory transactional store.
///
/// Collections are declared up front with [`CollectionSpec`]; records live
/// under a single lock. `transaction` applies its statement list to a
/// scratch copy of the state and swaps it in only when every statement
/// succeeds, so a failing statement rolls back the whole list.
///
/// # Thread Safety
///
/// The store is `Send + Sync` and intended to be shared behind an `Arc`
/// across many logical requests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store with no collections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a collection. Replaces any previous declaration and rows.
    pub fn define_collection(&self, spec: CollectionSpec) {
        let mut state = self.state.write();
        state.tables.insert(spec.name.clone(), Table::new(spec));
    }

    /// Returns a copy of every row of a collection, unfiltered.
    ///
    /// Useful for tests and debugging.
    pub fn dump(&self, collection: &str) -> StoreResult<Vec<Record>> {
        Ok(self.state.read().table(collection)?.rows.clone())
    }
}

fn sort_rows(rows: &mut [Record], field: &str, order: SortOrder) {
    rows.sort_by(|a, b| {
        let (va, vb) = (field_or_null(a, field), field_or_null(b, field));
        // Nulls sort last regardless of direction.
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => compare_values(va, vb).unwrap_or(Ordering::Equal),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

impl StoreDelegate for MemoryStore {
    fn find_many(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>> {
        let state = self.state.read();
        let table = state.table(collection)?;
        let mut rows: Vec<Record> = table
            .rows
            .iter()
            .filter(|row| matches_all(row, &query.predicates))
            .cloned()
            .collect();
        if let Some((field, order)) = &query.order_by {
            sort_rows(&mut rows, field, *order);
        }
        if let Some(take) = query.take {
            rows.truncate(take);
        }
        Ok(rows)
    }

    fn find_first(&self, collection: &str, query: &Query) -> StoreResult<Option<Record>> {
        let limited = Query {
            predicates: query.predicates.clone(),
            order_by: query.order_by.clone(),
            take: Some(1),
        };
        Ok(self.find_many(collection, &limited)?.into_iter().next())
    }

    fn count(&self, collection: &str, predicates: &[Predicate]) -> StoreResult<usize> {
        let state = self.state.read();
        let table = state.table(collection)?;
        Ok(table
            .rows
            .iter()
            .filter(|row| matches_all(row, predicates))
            .count())
    }

    fn create(&self, collection: &str, data: Record) -> StoreResult<Record> {
        let results = self.transaction(vec![Statement::Create {
            collection: collection.to_string(),
            data,
        }])?;
        match results.into_iter().next() {
            Some(StatementResult::Record(record)) => Ok(record),
            _ => Err(StoreError::aborted("create returned no record")),
        }
    }

    fn create_many(
        &self,
        collection: &str,
        data: Vec<Record>,
        skip_duplicates: bool,
    ) -> StoreResult<usize> {
        let results = self.transaction(vec![Statement::CreateMany {
            collection: collection.to_string(),
            data,
            skip_duplicates,
        }])?;
        match results.into_iter().next() {
            Some(StatementResult::Records(rows)) => Ok(rows.len()),
            _ => Err(StoreError::aborted("create_many returned no rows")),
        }
    }

    fn update(&self, collection: &str, key: &Key, data: Record) -> StoreResult<Record> {
        let results = self.transaction(vec![Statement::Update {
            collection: collection.to_string(),
            key: key.clone(),
            data,
        }])?;
        match results.into_iter().next() {
            Some(StatementResult::Record(record)) => Ok(record),
            _ => Err(StoreError::aborted("update returned no record")),
        }
    }

    fn upsert(
        &self,
        collection: &str,
        key: &Key,
        create: Record,
        update: Record,
    ) -> StoreResult<Record> {
        let results = self.transaction(vec![Statement::Upsert {
            collection: collection.to_string(),
            key: key.clone(),
            create,
            update,
        }])?;
        match results.into_iter().next() {
            Some(StatementResult::Record(record)) => Ok(record),
            _ => Err(StoreError::aborted("upsert returned no record")),
        }
    }

    fn delete(&self, collection: &str, key: &Key) -> StoreResult<Record> {
        let results = self.transaction(vec![Statement::Delete {
            collection: collection.to_string(),
            key: key.clone(),
        }])?;
        match results.into_iter().next() {
            Some(StatementResult::Record(record)) => Ok(record),
            _ => Err(StoreError::aborted("delete returned no record")),
        }
    }

    fn group_by(
        &self,
        collection: &str,
        by: &[String],
        predicates: &[Predicate],
    ) -> StoreResult<Vec<Record>> {
        let state = self.state.read();
        let table = state.table(collection)?;
        let mut groups: BTreeMap<String, (Record, usize)> = BTreeMap::new();
        for row in table.rows.iter().filter(|r| matches_all(r, predicates)) {
            let values: Vec<Value> = by.iter().map(|f| field_or_null(row, f).clone()).collect();
            let group_key = serde_json::to_string(&values).unwrap_or_default();
            let entry = groups.entry(group_key).or_insert_with(|| {
                let mut group = Record::new();
                for (field, value) in by.iter().zip(&values) {
                    group.insert(field.clone(), value.clone());
                }
                (group, 0)
            });
            entry.1 += 1;
        }
        Ok(groups
            .into_values()
            .map(|(mut group, count)| {
                group.insert("_count".to_string(), Value::Number(count.into()));
                group
            })
            .collect())
    }

    fn aggregate(
        &self,
        collection: &str,
        predicates: &[Predicate],
        sum_fields: &[String],
    ) -> StoreResult<Record> {
        let state = self.state.read();
        let table = state.table(collection)?;
        let mut sums = Record::new();
        for field in sum_fields {
            let total: f64 = table
                .rows
                .iter()
                .filter(|row| matches_all(row, predicates))
                .filter_map(|row| field_or_null(row, field).as_f64())
                .sum();
            let number = if total.fract() == 0.0 && total.abs() < i64::MAX as f64 {
                Value::Number((total as i64).into())
            } else {
                serde_json::Number::from_f64(total)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            };
            sums.insert(field.clone(), number);
        }
        Ok(sums)
    }

    fn transaction(&self, statements: Vec<Statement>) -> StoreResult<Vec<StatementResult>> {
        let mut state = self.state.write();
        // Apply against a scratch copy; swap in only on full success.
        let mut scratch = state.clone();
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(scratch.apply(statement)?);
        }
        *state = scratch;
        Ok(results)
    }
}
