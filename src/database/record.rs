use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map used for rows, lookups, defaults and update assignments
pub type Values = Map<String, Value>;

/// Fields that only the store may assign
pub const SYSTEM_FIELDS: &[&str] = &["id"];

/// Errors that can occur during Record operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("System field '{0}' cannot be set directly")]
    SystemFieldNotAllowed(String),
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
}

/// A dynamic row. `id` is present once the store has saved it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Values,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unsaved record from a JSON object, rejecting system fields
    pub fn from_json(json: Value) -> Result<Self, RecordError> {
        let map = values_from_json(json)?;
        if let Some(field) = map.keys().find(|k| SYSTEM_FIELDS.contains(&k.as_str())) {
            return Err(RecordError::SystemFieldNotAllowed(field.clone()));
        }
        Ok(Self { fields: map })
    }

    /// Rebuild a stored row (system fields allowed)
    pub(crate) fn from_row(fields: Values) -> Self {
        Self { fields }
    }

    /// Chainable setter for building records inline
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();

        if SYSTEM_FIELDS.contains(&key.as_str()) {
            tracing::warn!("Attempted to set system field '{}' - ignoring", key);
            return self;
        }

        self.fields.insert(key, value.into());
        self
    }

    pub(crate) fn set_pk(&mut self, pk: i64) -> &mut Self {
        self.fields.insert("id".to_string(), Value::from(pk));
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn apply(&mut self, changes: &Values) -> &mut Self {
        for (key, value) in changes {
            self.set(key.clone(), value.clone());
        }
        self
    }

    pub fn pk(&self) -> Option<i64> {
        self.fields.get("id").and_then(Value::as_i64)
    }

    pub fn is_saved(&self) -> bool {
        self.pk().is_some()
    }

    pub fn fields(&self) -> &Values {
        &self.fields
    }

    pub fn into_fields(self) -> Values {
        self.fields
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Accept a JSON object as a field map
pub fn values_from_json(json: Value) -> Result<Values, RecordError> {
    match json {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Values::new()),
        _ => Err(RecordError::InvalidJson("Expected JSON object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_rejects_system_fields() {
        let err = Record::from_json(json!({"id": 4, "username": "x"})).unwrap_err();
        assert_eq!(err, RecordError::SystemFieldNotAllowed("id".to_string()));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(Record::from_json(json!([1, 2])), Err(RecordError::InvalidJson(_))));
    }

    #[test]
    fn set_ignores_system_fields() {
        let record = Record::new().with("username", "test1").with("id", 9);
        assert_eq!(record.pk(), None);
        assert_eq!(record.get_str("username"), Some("test1"));
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut record = Record::new().with("username", "test1");
        record.set_pk(3);
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"username": "test1", "id": 3}));
    }
}
