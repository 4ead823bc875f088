//! Entity representation shared by requests and responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ServiceError};

/// Reserved field holding the entity identifier.
pub const ID_FIELD: &str = "id";
/// Client-facing display name.
pub const LABEL_FIELD: &str = "label";
/// Store-side display name.
pub const NAME_FIELD: &str = "name";
/// Edge source endpoint.
pub const FROM_FIELD: &str = "from";
/// Edge target endpoint.
pub const TO_FIELD: &str = "to";

/// A node or edge as a flat bag of fields.
///
/// The store imposes no schema, so only the reserved fields are validated.
/// Values are limited to scalars and arrays of scalars; the store cannot hold
/// nested maps as properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Creates an empty entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a request body value as an entity.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => {
                let entity = Self(fields);
                entity.validate()?;
                Ok(entity)
            }
            other => Err(ServiceError::malformed_input(format!(
                "entity must be a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Wraps a store-produced map without validation.
    pub fn from_store(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in &self.0 {
            match value {
                Value::Object(_) => {
                    return Err(ServiceError::malformed_input(format!(
                        "field '{key}' is a nested object"
                    )))
                }
                Value::Array(items) => {
                    if let Some(bad) = items
                        .iter()
                        .find(|item| matches!(item, Value::Array(_) | Value::Object(_)))
                    {
                        return Err(ServiceError::malformed_input(format!(
                            "field '{key}' holds a nested {}",
                            kind_of(bad)
                        )));
                    }
                }
                _ => {}
            }
        }
        for reserved in [ID_FIELD, LABEL_FIELD, NAME_FIELD, FROM_FIELD, TO_FIELD] {
            if let Some(value) = self.0.get(reserved) {
                if !value.is_string() {
                    return Err(ServiceError::malformed_input(format!(
                        "reserved field '{reserved}' must be a string, got {}",
                        kind_of(value)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns the entity id when present.
    pub fn id(&self) -> Option<&str> {
        self.get_str(ID_FIELD)
    }

    /// Returns the client-facing label when present.
    pub fn label(&self) -> Option<&str> {
        self.get_str(LABEL_FIELD)
    }

    /// Returns a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns a field of any kind.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the entity carries `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets a string field, replacing any previous value.
    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_owned(), Value::String(value.into()));
    }

    /// Whether the entity has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renames the client `label` to the stored `name`.
    pub fn label_to_name(&mut self) {
        rename(&mut self.0, LABEL_FIELD, NAME_FIELD);
    }

    /// Renames the stored `name` to the client `label`.
    pub fn name_to_label(&mut self) {
        rename(&mut self.0, NAME_FIELD, LABEL_FIELD);
    }

    /// Consumes the entity into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Moves `from` to `to` in place; a no-op when `from` is missing.
pub(crate) fn rename(fields: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = fields.remove(from) {
        fields.insert(to.to_owned(), value);
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
