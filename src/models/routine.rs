//! Routine result models.
//!
//! This module defines the declared return kind, the raw per-statement
//! output collected from the driver, and the shaped output handed back to
//! callers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Rows returned by one statement, in order.
pub type ResultSet = Vec<Row>;

/// How the caller wants the raw routine output shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedReturn {
    /// First row of the first result set
    Single,
    /// Every result set, optionally labelled
    Multi,
    /// Affected-row counts only
    None,
}

impl std::fmt::Display for ExpectedReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Shaped routine output.
///
/// Serializes untagged, so the JSON shape follows the declared return kind:
/// an object (or `null`), an array of arrays, an object of arrays, or an
/// array of counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RoutineOutput {
    /// `None` when the first result set is empty or absent.
    Single(Option<Row>),
    Multi(Vec<ResultSet>),
    /// Names past the last returned set map to `None`.
    Named(BTreeMap<String, Option<ResultSet>>),
    RowsAffected(Vec<u64>),
}

impl RoutineOutput {
    pub fn as_single(&self) -> Option<&Row> {
        match self {
            Self::Single(row) => row.as_ref(),
            _ => None,
        }
    }

    /// Look up a labelled result set.
    pub fn named(&self, name: &str) -> Option<&ResultSet> {
        match self {
            Self::Named(sets) => sets.get(name).and_then(Option::as_ref),
            _ => None,
        }
    }

    pub fn into_json(self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Output of one routine call as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub result_sets: Vec<ResultSet>,
    /// Per-statement affected-row counts, in completion order
    pub rows_affected: Vec<u64>,
}

impl RawResult {
    /// Shape the raw output by the declared return kind.
    pub fn shape(self, returns: ExpectedReturn, names: Option<&[String]>) -> RoutineOutput {
        match returns {
            ExpectedReturn::Single => RoutineOutput::Single(
                self.result_sets
                    .into_iter()
                    .next()
                    .and_then(|set| set.into_iter().next()),
            ),
            ExpectedReturn::Multi => match names {
                Some(names) if !names.is_empty() => {
                    let mut sets = self.result_sets.into_iter().map(Some);
                    let mut named = BTreeMap::new();
                    for name in names {
                        named.insert(name.clone(), sets.next().flatten());
                    }
                    RoutineOutput::Named(named)
                }
                _ => RoutineOutput::Multi(self.result_sets),
            },
            ExpectedReturn::None => RoutineOutput::RowsAffected(self.rows_affected),
        }
    }
}

/// Accumulates driver output into [`RawResult`].
///
/// The driver reports rows and statement completions as one stream; each
/// completion closes a segment, and every segment is a result set. A MySQL
/// `CALL` ends with one extra completion for the call itself; when
/// `trailing_status` is set that final row-less segment is not a result set.
#[derive(Debug, Default)]
pub struct RawResultBuilder {
    current: ResultSet,
    segments: Vec<ResultSet>,
    rows_affected: Vec<u64>,
    trailing_status: bool,
}

impl RawResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a stream that ends with the call's own status.
    pub fn with_trailing_status() -> Self {
        Self {
            trailing_status: true,
            ..Self::default()
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.current.push(row);
    }

    /// Close the current segment.
    pub fn end_statement(&mut self, rows_affected: u64) {
        self.rows_affected.push(rows_affected);
        self.segments.push(std::mem::take(&mut self.current));
    }

    pub fn finish(mut self) -> RawResult {
        if !self.current.is_empty() {
            self.segments.push(std::mem::take(&mut self.current));
        } else if self.trailing_status && self.segments.last().is_some_and(Vec::is_empty) {
            self.segments.pop();
        }

        RawResult {
            result_sets: self.segments,
            rows_affected: self.rows_affected,
        }
    }
}
