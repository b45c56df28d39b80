//! Constructor keyword arguments.
//!
//! Components receive their configuration as a string-keyed map of YAML
//! values. Keys are unique; inserting an existing key replaces its value.
//! Typed access goes through [`Kwargs::extract`], which deserializes the whole
//! map into a component-specific parameter struct.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Keyword arguments passed to a component constructor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kwargs(BTreeMap<String, Value>);

impl Kwargs {
    /// Create an empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, returning the previous one for this key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a value as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove a key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy of this map with the given keys removed.
    pub fn without(&self, keys: &[&str]) -> Kwargs {
        self.0
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Overlay `other` on top of `self`: every key of `other` replaces the
    /// value held here.
    pub fn overlay(&mut self, other: &Kwargs) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Deserialize the arguments into a typed parameter struct.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T, serde_yaml::Error> {
        serde_yaml::from_value(self.to_value())
    }

    /// Build from a YAML mapping. Returns `None` if `value` is not a mapping
    /// or has non-string keys.
    pub fn from_value(value: &Value) -> Option<Kwargs> {
        let mapping = value.as_mapping()?;
        let mut kwargs = Kwargs::new();
        for (key, value) in mapping {
            kwargs.insert(key.as_str()?, value.clone());
        }
        Some(kwargs)
    }

    /// Convert into a YAML mapping value.
    pub fn to_value(&self) -> Value {
        let mut mapping = Mapping::new();
        for (key, value) in &self.0 {
            mapping.insert(Value::String(key.clone()), value.clone());
        }
        Value::Mapping(mapping)
    }
}

impl FromIterator<(String, Value)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Kwargs(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Kwargs {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
