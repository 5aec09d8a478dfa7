//! Merging heterogeneous request sources into one parameter bag.

use crate::models::ParameterBag;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Raw request input, before merging.
///
/// Path and query values are always strings; body fields keep their JSON type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInput {
    pub path: HashMap<String, String>,
    pub body: Option<JsonValue>,
    pub query: HashMap<String, String>,
}

impl RequestInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Replace the query parameters with those of a raw query string.
    pub fn with_query_string(mut self, raw: &str) -> Self {
        self.query = parse_query(raw);
        self
    }

    /// Overlay the sources: path < body < query.
    ///
    /// A body that is not a JSON object contributes nothing.
    pub fn merge(&self) -> ParameterBag {
        let mut bag: ParameterBag = self
            .path
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        if let Some(body) = &self.body {
            bag.overlay(ParameterBag::from_json_fields(body.clone()));
        }

        bag.overlay(
            self.query
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        );
        bag
    }
}

/// Decode a form-urlencoded query string. Repeated keys keep the last value.
pub fn parse_query(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}
