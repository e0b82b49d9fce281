//! Conversion of Lua values into host values
//!
//! Marshaling is total: every Lua value maps to a [`MarshaledValue`], cycles
//! included. Each table is copied at most once per traversal and the number
//! of copied values is capped, so the work is bounded by the budget rather
//! than by the shape of the graph.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use mlua::{Table, Value};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::types::LENGTH_MARKER;

/// Largest explicit array length honoured from the length marker
pub const MAX_ARRAY_LENGTH: usize = 1_000_000;

/// Default cap on values copied out of one result
pub const DEFAULT_MAX_NODES: usize = 100_000;

const FUNCTION_TEXT: &str = "[Function]";
const CIRCULAR_TEXT: &str = "[Circular]";
const TRUNCATED_TEXT: &str = "[Truncated]";
const EMPTY_ERROR: &str = "<empty error>";
const EMPTY_ERROR_MESSAGE: &str = "<empty error message>";

/// Host-side copy of a Lua value
#[derive(Debug, Clone, PartialEq)]
pub enum MarshaledValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Array(Vec<MarshaledValue>),
    Map(BTreeMap<String, MarshaledValue>),
    /// Any callable
    Function,
    /// A table already visited in this traversal
    Circular,
    /// A value past the node budget
    Truncated,
}

impl MarshaledValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, MarshaledValue::Nil)
    }
}

impl Serialize for MarshaledValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MarshaledValue::Nil => serializer.serialize_unit(),
            MarshaledValue::Boolean(b) => serializer.serialize_bool(*b),
            MarshaledValue::Integer(i) => serializer.serialize_i64(*i),
            MarshaledValue::Number(n) => serializer.serialize_f64(*n),
            MarshaledValue::String(s) => serializer.serialize_str(s),
            MarshaledValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            MarshaledValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            MarshaledValue::Function => serializer.serialize_str(FUNCTION_TEXT),
            MarshaledValue::Circular => serializer.serialize_str(CIRCULAR_TEXT),
            MarshaledValue::Truncated => serializer.serialize_str(TRUNCATED_TEXT),
        }
    }
}

/// Inspect-style rendering: `[1, "a", null]`, `{ key: true }`
impl fmt::Display for MarshaledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarshaledValue::Nil => f.write_str("null"),
            MarshaledValue::Boolean(b) => write!(f, "{}", b),
            MarshaledValue::Integer(i) => write!(f, "{}", i),
            MarshaledValue::Number(n) => write!(f, "{}", format_number(*n)),
            MarshaledValue::String(s) => write!(f, "{:?}", s),
            MarshaledValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            MarshaledValue::Map(entries) if entries.is_empty() => f.write_str("{}"),
            MarshaledValue::Map(entries) => {
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str(" }")
            }
            MarshaledValue::Function => f.write_str(FUNCTION_TEXT),
            MarshaledValue::Circular => f.write_str(CIRCULAR_TEXT),
            MarshaledValue::Truncated => f.write_str(TRUNCATED_TEXT),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        // Rust prints integral floats without a fraction already
        n.to_string()
    }
}

/// Coarse shape of a Lua value
pub enum Classified<'lua> {
    Primitive,
    Callable,
    Container(&'lua Table),
}

pub fn classify(value: &Value) -> Classified<'_> {
    match value {
        Value::Function(_) => Classified::Callable,
        Value::Table(table) => Classified::Container(table),
        _ => Classified::Primitive,
    }
}

/// Deep-copy a Lua value into a host value.
pub fn marshal(value: &Value) -> MarshaledValue {
    marshal_with_budget(value, DEFAULT_MAX_NODES)
}

/// Like [`marshal`], copying at most `max_nodes` values. Anything past the
/// budget becomes [`MarshaledValue::Truncated`].
pub fn marshal_with_budget(value: &Value, max_nodes: usize) -> MarshaledValue {
    Marshaler {
        seen: HashSet::new(),
        remaining: max_nodes,
    }
    .value(value)
}

struct Marshaler {
    /// Tables visited so far, never pruned
    seen: HashSet<usize>,
    remaining: usize,
}

impl Marshaler {
    fn value(&mut self, value: &Value) -> MarshaledValue {
        if self.remaining == 0 {
            return MarshaledValue::Truncated;
        }
        self.remaining -= 1;

        match classify(value) {
            Classified::Callable => MarshaledValue::Function,
            Classified::Container(table) => self.table(table),
            Classified::Primitive => primitive(value),
        }
    }

    fn table(&mut self, table: &Table) -> MarshaledValue {
        let signature = table.to_pointer() as usize;
        if !self.seen.insert(signature) {
            return MarshaledValue::Circular;
        }
        self.table_contents(table)
    }

    fn table_contents(&mut self, table: &Table) -> MarshaledValue {
        // Entries that fail to convert are skipped
        let entries: Vec<(Value, Value)> = table
            .pairs::<Value, Value>()
            .filter_map(Result::ok)
            .collect();

        match array_layout(&entries) {
            Some(length) => {
                let mut items = vec![MarshaledValue::Nil; length];
                for (key, value) in &entries {
                    if let Some(index) = array_index(key).filter(|i| *i <= length) {
                        items[index - 1] = self.value(value);
                    }
                }
                MarshaledValue::Array(items)
            }
            None => {
                let mut map = BTreeMap::new();
                for (key, value) in &entries {
                    if let Some(key) = key_string(key) {
                        let value = self.value(value);
                        map.insert(key, value);
                    }
                }
                MarshaledValue::Map(map)
            }
        }
    }
}

fn primitive(value: &Value) -> MarshaledValue {
    match value {
        Value::Nil => MarshaledValue::Nil,
        Value::Boolean(b) => MarshaledValue::Boolean(*b),
        Value::Integer(i) => MarshaledValue::Integer(*i),
        Value::Number(n) => MarshaledValue::Number(*n),
        Value::String(s) => MarshaledValue::String(s.to_string_lossy().to_string()),
        other => MarshaledValue::String(format!("[{}]", other.type_name())),
    }
}

/// 1-based array position of a key, if it is a positive whole number
fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Integer(i) if *i >= 1 => usize::try_from(*i).ok(),
        Value::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= MAX_ARRAY_LENGTH as f64 => {
            Some(*n as usize)
        }
        _ => None,
    }
}

fn is_length_marker(key: &Value) -> bool {
    matches!(key, Value::String(s) if *s == LENGTH_MARKER)
}

/// Decide whether a table's entries describe an array, and of what length.
///
/// An explicit [`LENGTH_MARKER`] wins when every other key fits inside it.
/// Otherwise all keys must be positive integers whose maximum is at most
/// twice the entry count, which admits sparse arrays with holes while
/// keeping integer-keyed records with large ids as maps. Empty tables are
/// maps.
pub fn array_layout(entries: &[(Value, Value)]) -> Option<usize> {
    let marker = entries
        .iter()
        .find(|(key, _)| is_length_marker(key))
        .and_then(|(_, value)| match value {
            Value::Integer(0) => Some(0),
            other => array_index(other),
        });

    if let Some(length) = marker.filter(|len| *len <= MAX_ARRAY_LENGTH) {
        let fits = entries.iter().all(|(key, _)| {
            is_length_marker(key) || array_index(key).is_some_and(|i| i <= length)
        });
        if fits {
            return Some(length);
        }
    }

    if entries.is_empty() {
        return None;
    }

    let mut max = 0;
    for (key, _) in entries {
        max = max.max(array_index(key)?);
    }
    (max <= entries.len() * 2).then_some(max)
}

fn key_string(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.to_string_lossy().to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(format_number(*n)),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Text shown for a runtime fault's error payload.
pub fn format_error_payload(value: &Value) -> String {
    let text = match value {
        Value::Nil | Value::Boolean(false) => return EMPTY_ERROR.to_string(),
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Error(err) => err.to_string(),
        other => match marshal(other) {
            MarshaledValue::Map(map) if map.contains_key("message") => match &map["message"] {
                MarshaledValue::String(message) => message.clone(),
                message => message.to_string(),
            },
            container @ (MarshaledValue::Map(_) | MarshaledValue::Array(_)) => {
                serde_json::to_string(&container).unwrap_or_default()
            }
            plain => plain.to_string(),
        },
    };

    if text.trim().is_empty() {
        EMPTY_ERROR_MESSAGE.to_string()
    } else {
        text
    }
}
