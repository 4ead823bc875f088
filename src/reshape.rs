//! Reshaping of columnar store responses into REST payloads.
//!
//! List responses are accumulated per column. Objects are interned into an
//! identity table keyed by the store's metadata so an entity reached through
//! several paths is renamed once and listed once per column.

use std::collections::{HashMap, HashSet};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, ServiceError};
use crate::model::{rename, Entity, ID_FIELD, LABEL_FIELD, NAME_FIELD};
use crate::params::QueryParams;
use crate::store::{Row, StatementResult, TransactionResponse};

/// Fails with [`ServiceError::StoreQuery`] when the store reported errors.
pub fn check_errors(response: &TransactionResponse, params: &QueryParams) -> Result<()> {
    if response.errors.is_empty() {
        return Ok(());
    }
    Err(ServiceError::StoreQuery {
        params: params.clone(),
        errors: response.errors.clone(),
    })
}

/// Column name to accumulated values, in column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collections {
    columns: Vec<Column>,
}

/// Values gathered for one column, with their metadata alongside.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Column {
    /// Column name as returned by the store.
    pub name: String,
    /// Accumulated values.
    pub values: Vec<Value>,
    /// Metadata for each value; `null` for values that came from scalar cells.
    pub meta: Vec<Value>,
}

impl Collections {
    /// Values accumulated under `name`.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.column(name).map(|c| c.values.as_slice())
    }

    /// Full column record for `name`.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in return order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

impl Serialize for Collections {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in &self.columns {
            map.serialize_entry(&column.name, &column.values)?;
        }
        map.end()
    }
}

/// Identity of an object as reported by the store's metadata.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct StoreIdentity {
    kind: String,
    id: String,
}

impl StoreIdentity {
    fn from_meta(meta: &Value) -> Option<Self> {
        let record = meta.as_object()?;
        let id = match record.get(ID_FIELD)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let kind = record
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Some(Self { kind, id })
    }
}

#[derive(Default)]
struct EntityTable {
    entries: Vec<Map<String, Value>>,
    by_identity: HashMap<StoreIdentity, usize>,
}

impl EntityTable {
    /// Returns the slot for `fields`; objects without an identity always get a new slot.
    fn intern(&mut self, fields: Map<String, Value>, meta: &Value) -> usize {
        let Some(identity) = StoreIdentity::from_meta(meta) else {
            self.entries.push(fields);
            return self.entries.len() - 1;
        };
        if let Some(&slot) = self.by_identity.get(&identity) {
            return slot;
        }
        self.entries.push(fields);
        let slot = self.entries.len() - 1;
        self.by_identity.insert(identity, slot);
        slot
    }

    fn rename_all(&mut self) {
        for fields in &mut self.entries {
            rename(fields, NAME_FIELD, LABEL_FIELD);
        }
    }
}

enum Slot {
    Entity(usize),
    Scalar(Value),
}

struct Bucket {
    name: String,
    slots: Vec<Slot>,
    meta: Vec<Value>,
    seen: HashSet<usize>,
}

impl Bucket {
    fn new(name: String) -> Self {
        Self {
            name,
            slots: Vec::new(),
            meta: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, value: Value, meta: Value, table: &mut EntityTable) {
        match value {
            Value::Object(fields) => {
                let slot = table.intern(fields, &meta);
                if self.seen.insert(slot) {
                    self.slots.push(Slot::Entity(slot));
                    self.meta.push(meta);
                }
            }
            other => {
                self.slots.push(Slot::Scalar(other));
                self.meta.push(meta);
            }
        }
    }

    fn project(self, table: &EntityTable) -> Column {
        let values = self
            .slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Entity(idx) => Value::Object(table.entries[idx].clone()),
                Slot::Scalar(value) => value,
            })
            .collect();
        Column {
            name: self.name,
            values,
            meta: self.meta,
        }
    }
}

/// Reshapes a list/traverse response into per-column collections.
pub fn reshape_collections(
    response: TransactionResponse,
    params: &QueryParams,
) -> Result<Collections> {
    check_errors(&response, params)?;
    let result = first_result(response)?;

    let mut table = EntityTable::default();
    let mut buckets: Vec<Bucket> = result.columns.into_iter().map(Bucket::new).collect();
    for (index, row) in result.data.into_iter().enumerate() {
        accumulate_row(index, row, &mut buckets, &mut table)?;
    }

    table.rename_all();
    Ok(Collections {
        columns: buckets
            .into_iter()
            .map(|bucket| bucket.project(&table))
            .collect(),
    })
}

fn accumulate_row(
    index: usize,
    row: Row,
    buckets: &mut [Bucket],
    table: &mut EntityTable,
) -> Result<()> {
    if row.row.len() != buckets.len() {
        return Err(ServiceError::malformed_response(format!(
            "row {index} has {} cells for {} columns",
            row.row.len(),
            buckets.len()
        )));
    }
    let Row { row: cells, meta } = row;
    let mut pool = meta.into_iter();
    let mut consumed = 0usize;
    let available = pool.len();

    for (bucket, cell) in buckets.iter_mut().zip(cells) {
        match cell {
            Value::Array(items) => {
                consumed += items.len();
                if consumed > available {
                    return Err(ServiceError::malformed_response(format!(
                        "row {index} column '{}' needs {consumed} metadata entries, row has {available}",
                        bucket.name
                    )));
                }
                for item in items {
                    let meta = pool.next().unwrap_or(Value::Null);
                    bucket.push(item, meta, table);
                }
            }
            scalar => bucket.push(scalar, Value::Null, table),
        }
    }
    Ok(())
}

fn first_result(response: TransactionResponse) -> Result<StatementResult> {
    response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::malformed_response("response carries no statement result"))
}

fn first_row(response: TransactionResponse) -> Option<Row> {
    response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.data.into_iter().next())
}

/// Reshapes a get/create/update/patch response into one entity.
///
/// A statement that matched nothing yields an empty entity.
pub fn reshape_entity(response: TransactionResponse, params: &QueryParams) -> Result<Entity> {
    check_errors(&response, params)?;
    let cell = first_row(response).and_then(|row| row.row.into_iter().next());
    match cell {
        None | Some(Value::Null) => Ok(Entity::new()),
        Some(Value::Object(fields)) => {
            let mut entity = Entity::from_store(fields);
            entity.name_to_label();
            Ok(entity)
        }
        Some(other) => Err(ServiceError::malformed_response(format!(
            "expected an entity object, got {}",
            crate::model::kind_of(&other)
        ))),
    }
}

/// Delete confirmation: the deleted object's metadata without its `id`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(Map<String, Value>);

impl Receipt {
    /// Metadata field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the receipt carries no metadata.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reshapes a delete response into its [`Receipt`].
pub fn reshape_receipt(response: TransactionResponse, params: &QueryParams) -> Result<Receipt> {
    check_errors(&response, params)?;
    let meta = first_row(response).and_then(|row| row.meta.into_iter().next());
    let mut record = match meta {
        Some(Value::Object(record)) => record,
        _ => Map::new(),
    };
    record.remove(ID_FIELD);
    Ok(Receipt(record))
}
