//! Keys and key paths.
//!
//! A key path is the dot-joined address of a value inside a store, e.g.
//! `nested.object.a` or `list.3`. Key paths double as subscription keys, so
//! every key (index, name or symbol) has exactly one canonical string form.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::value::Value;

/// Separator between key path segments.
pub const PERIOD: char = '.';

// =============================================================================
// Symbol
// =============================================================================

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// A unique key that never collides with another symbol, even one with the
/// same description.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Rc<str>>,
}

impl Symbol {
    /// Create a new unique symbol.
    pub fn new(description: impl Into<String>) -> Self {
        let description: String = description.into();
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: (!description.is_empty()).then(|| Rc::from(description)),
        }
    }

    /// The symbol's description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}#{}", self.id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

// =============================================================================
// Key
// =============================================================================

/// A single admissible key: an array index, a property name or a symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(String),
    Symbol(Symbol),
}

impl Key {
    /// The numeric index this key addresses, if it is one.
    ///
    /// Names made only of ASCII digits count, so `"2"` and `2` address the
    /// same array slot.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => parse_index(name),
            Key::Symbol(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{index}"),
            Key::Name(name) => f.write_str(name),
            Key::Symbol(symbol) => write!(f, "{symbol}"),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<u32> for Key {
    fn from(index: u32) -> Self {
        Key::Index(index as usize)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        usize::try_from(value).map_or_else(|_| Key::Name(value.to_string()), Key::Index)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        usize::try_from(value).map_or_else(|_| Key::Name(value.to_string()), Key::Index)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        if value.fract() == 0.0 && value >= 0.0 && value < usize::MAX as f64 {
            Key::Index(value as usize)
        } else {
            Key::Name(format_number(value))
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Name(name.clone())
    }
}

impl From<Symbol> for Key {
    fn from(symbol: Symbol) -> Self {
        Key::Symbol(symbol)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl TryFrom<serde_json::Value> for Key {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(number) => match number.as_u64() {
                Some(index) => Ok(Key::Index(index as usize)),
                None => Ok(Key::from(number.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(name) => Ok(Key::Name(name)),
            other => Err(Error::InvalidKey(json_type_name(&other))),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Join key parts into a canonical key path.
///
/// Parts are trimmed and empty parts are dropped, so
/// `get_key(["", " a ", "b"])` is `"a.b"`.
pub fn get_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = String::new();
    for part in parts {
        let part = part.as_ref().trim();
        if part.is_empty() {
            continue;
        }
        if !path.is_empty() {
            path.push(PERIOD);
        }
        path.push_str(part);
    }
    path
}

/// Key path for `key` below an optional prefix.
pub fn child_key(prefix: Option<&str>, key: &Key) -> String {
    let key = key.to_string();
    get_key([prefix.unwrap_or(""), key.as_str()])
}

/// Every ancestor path of `prefix`, most specific first.
///
/// `"a.b.c"` yields `["a.b.c", "a.b", "a"]`.
pub fn ancestors(prefix: &str) -> Vec<String> {
    let parts: Vec<&str> = prefix.split(PERIOD).collect();
    (1..=parts.len())
        .rev()
        .map(|length| parts[..length].join("."))
        .collect()
}

/// Read a nested value by key path without recording the read.
///
/// Scalars are returned as they are; a path that runs into a scalar or a
/// missing key yields `Null`.
pub fn get_value(data: &Value, path: &str) -> Value {
    if !matches!(data, Value::Store(_) | Value::List(_) | Value::Map(_)) {
        return data.clone();
    }

    let mut value = data.clone();
    for part in path.split(PERIOD) {
        value = match &value {
            Value::Store(store) => store.child(part),
            Value::Map(entries) => entries.get(part).cloned().unwrap_or_default(),
            Value::List(items) if part == "length" => Value::from(items.len()),
            Value::List(items) => parse_index(part)
                .and_then(|index| items.get(index).cloned())
                .unwrap_or_default(),
            _ => return Value::Null,
        };
    }
    value
}

/// Stringify a number the way the web platform does.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Whether a dynamic value may be used as a key.
pub fn is_key(value: &serde_json::Value) -> bool {
    matches!(
        value,
        serde_json::Value::Number(_) | serde_json::Value::String(_)
    )
}

/// Largest array length, as on the web platform (2^32 - 1).
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Array index named by `name`. Indices stop one short of the maximum length.
pub(crate) fn parse_index(name: &str) -> Option<usize> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    name.parse().ok().filter(|index| *index < MAX_ARRAY_LENGTH)
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
