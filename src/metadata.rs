//! The normalized metadata shape shared by every format adapter.
//!
//! Each adapter turns its library's output into a [`NormalizedMetadata`]: an
//! ordered mapping from a name to either a scalar ([`MetaValue`]) or a group of
//! scalars one level deep. Order is the extraction order and is kept through
//! JSON serialization, so exported files list fields the way they were read.
//!
//! ```rust
//! use tagit::metadata::{Fields, MetaValue, NormalizedMetadata};
//!
//! let mut basic = Fields::new();
//! basic.insert("Make", MetaValue::from("Canon"));
//! basic.insert("Model", MetaValue::Null);
//!
//! let mut meta = NormalizedMetadata::new();
//! meta.insert_group("Basic Info", basic);
//! meta.insert_value("PageCount", 3_i64);
//!
//! let json = meta.to_json_pretty().unwrap();
//! assert_eq!(NormalizedMetadata::from_json(&json).unwrap(), meta);
//! ```

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Name of the single field carried by an extraction-failure record.
pub const ERROR_FIELD: &str = "Error";

/// A primitive, renderable metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl MetaValue {
    /// Text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Integer(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::Null => Ok(()),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<Option<String>> for MetaValue {
    fn from(s: Option<String>) -> Self {
        s.map(MetaValue::Text).unwrap_or(MetaValue::Null)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Integer(i)
    }
}

impl From<u32> for MetaValue {
    fn from(i: u32) -> Self {
        MetaValue::Integer(i64::from(i))
    }
}

impl From<usize> for MetaValue {
    fn from(i: usize) -> Self {
        MetaValue::Integer(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self {
        MetaValue::Float(x)
    }
}

/// An insertion-ordered list of named values that serializes as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Fields<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for Fields<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> Fields<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. An existing name keeps its position and gets the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: V) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<V> {
        let pos = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Fields<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl<V: Serialize> Serialize for Fields<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct FieldsVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for FieldsVisitor<V> {
    type Value = Fields<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of metadata fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut fields = Fields::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            fields.insert(k, v);
        }
        Ok(fields)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Fields<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor(PhantomData))
    }
}

/// A top-level entry: a scalar or a one-level group of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Group(Fields<MetaValue>),
    Value(MetaValue),
}

impl Entry {
    pub fn as_group(&self) -> Option<&Fields<MetaValue>> {
        match self {
            Entry::Group(g) => Some(g),
            Entry::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&MetaValue> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Group(_) => None,
        }
    }
}

/// Grouped key/value metadata for one file, as produced by an adapter's `extract`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedMetadata {
    entries: Fields<Entry>,
}

impl NormalizedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record whose sole content is an `Error` field.
    pub fn error(message: impl Into<String>) -> Self {
        let mut meta = Self::new();
        meta.insert_value(ERROR_FIELD, message.into());
        meta
    }

    /// The failure message, if this is an extraction-failure record.
    pub fn error_message(&self) -> Option<&str> {
        if self.entries.len() != 1 {
            return None;
        }
        self.value(ERROR_FIELD).and_then(MetaValue::as_text)
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: impl Into<MetaValue>) {
        self.entries.insert(name, Entry::Value(value.into()));
    }

    pub fn insert_group(&mut self, name: impl Into<String>, group: Fields<MetaValue>) {
        self.entries.insert(name, Entry::Group(group));
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&MetaValue> {
        self.get(name).and_then(Entry::as_value)
    }

    pub fn group(&self, name: &str) -> Option<&Fields<MetaValue>> {
        self.get(name).and_then(Entry::as_group)
    }

    /// Look a field up either at the top level or inside any group.
    pub fn find(&self, field: &str) -> Option<&MetaValue> {
        if let Some(v) = self.value(field) {
            return Some(v);
        }
        self.entries
            .iter()
            .filter_map(|(_, e)| e.as_group())
            .find_map(|g| g.get(field))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize with 2-space indentation.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
