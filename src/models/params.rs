//! Parameter values and the normalized parameter bag.
//!
//! A [`ParameterBag`] is the single name → value mapping used both as
//! validation input and as routine input. Keys are kept in lexical order so
//! merging and binding are deterministic.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A scalar value bound as a routine input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(serialize_with = "base64_bytes::serialize", skip_deserializing)]
    Bytes(Vec<u8>),
    /// Arrays and objects, passed to the store as JSON documents
    Json(JsonValue),
}

impl ParamValue {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    pub fn to_json(&self) -> JsonValue {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(v) => JsonValue::String(v.clone()),
            Self::Bytes(v) => JsonValue::String(STANDARD.encode(v)),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<JsonValue> for ParamValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Json(JsonValue::Number(n))),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

/// Mapping of parameter name to value with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBag(BTreeMap<String, ParamValue>);

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Overlay `higher` on top of this bag: same-named entries are replaced.
    pub fn overlay(&mut self, higher: ParameterBag) {
        self.0.extend(higher.0);
    }

    /// Build a bag from the fields of a JSON object. Other JSON values yield
    /// an empty bag.
    pub fn from_json_fields(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, ParamValue::from(v)))
                .collect(),
            _ => Self::default(),
        }
    }

    /// Build a bag from any value serializing to a JSON object, such as a
    /// validated request struct.
    pub fn from_serialize<T: Serialize>(value: &T) -> DbResult<Self> {
        let json = serde_json::to_value(value)
            .map_err(|e| DbError::invalid_input(format!("Cannot serialize parameters: {}", e)))?;
        if !json.is_object() {
            return Err(DbError::invalid_input(
                "Routine parameters must serialize to an object",
            ));
        }
        Ok(Self::from_json_fields(json))
    }

    /// JSON object view, used as schema input.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParameterBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for ParameterBag {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParameterBag {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_value_types() {
        assert!(ParamValue::Null.is_null());
        assert!(!ParamValue::Bool(true).is_null());
        assert_eq!(ParamValue::Int(42).type_name(), "int");
        assert_eq!(ParamValue::from("hello").type_name(), "string");
        assert_eq!(ParamValue::from(json!([1, 2])).type_name(), "json");
    }

    #[test]
    fn test_param_value_from_json_numbers() {
        assert_eq!(ParamValue::from(json!(7)), ParamValue::Int(7));
        assert_eq!(ParamValue::from(json!(1.5)), ParamValue::Float(1.5));
        assert_eq!(ParamValue::from(json!(null)), ParamValue::Null);
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let value = ParamValue::Bytes(b"hello world".to_vec());
        assert_eq!(serde_json::to_value(&value).unwrap(), json!("aGVsbG8gd29ybGQ="));
        assert_eq!(value.to_json(), json!("aGVsbG8gd29ybGQ="));
    }

    #[test]
    fn test_overlay_replaces_same_named_entries() {
        let mut low = ParameterBag::new().with("id", "1").with("name", "low");
        let high = ParameterBag::new().with("id", "2").with("extra", true);
        low.overlay(high);

        assert_eq!(low.get("id"), Some(&ParamValue::from("2")));
        assert_eq!(low.get("name"), Some(&ParamValue::from("low")));
        assert_eq!(low.get("extra"), Some(&ParamValue::Bool(true)));
        assert_eq!(low.len(), 3);
    }

    #[test]
    fn test_from_json_fields_ignores_non_objects() {
        assert!(ParameterBag::from_json_fields(json!([1, 2, 3])).is_empty());
        assert!(ParameterBag::from_json_fields(json!("text")).is_empty());

        let bag = ParameterBag::from_json_fields(json!({"a": 1, "b": {"c": true}}));
        assert_eq!(bag.get("a"), Some(&ParamValue::Int(1)));
        assert_eq!(bag.get("b"), Some(&ParamValue::Json(json!({"c": true}))));
    }

    #[test]
    fn test_from_serialize_requires_object() {
        #[derive(Serialize)]
        struct Input {
            id: i64,
            name: String,
        }

        let bag = ParameterBag::from_serialize(&Input {
            id: 5,
            name: "Ann".to_string(),
        })
        .unwrap();
        assert_eq!(bag.get("id"), Some(&ParamValue::Int(5)));

        assert!(ParameterBag::from_serialize(&vec![1, 2]).is_err());
    }

    #[test]
    fn test_bag_round_trips_through_json_view() {
        let bag = ParameterBag::new().with("id", 7).with("active", false);
        assert_eq!(bag.to_json(), json!({"active": false, "id": 7}));
        assert_eq!(serde_json::to_value(&bag).unwrap(), bag.to_json());
    }

    #[test]
    fn test_keys_are_ordered() {
        let bag: ParameterBag = vec![("b", 1), ("a", 2), ("c", 3)].into_iter().collect();
        let keys: Vec<&String> = bag.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
