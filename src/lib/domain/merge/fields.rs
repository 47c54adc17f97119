//! Substitution fields

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ordered mapping of placeholder name to substitution value, with unique keys
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FieldMap(IndexMap<String, String>);

impl FieldMap {
    /// Creates an empty field map
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a field value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Sets a field, replacing any previous value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for FieldMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Merges a recipient's own fields over the document defaults.
///
/// Recipient values win on key collision. Only configured fields take part: nothing is derived
/// from the recipient's address or name.
pub fn resolve(defaults: &FieldMap, recipient: &FieldMap) -> FieldMap {
    let mut resolved = defaults.clone();

    for (key, value) in recipient.iter() {
        resolved.insert(key, value);
    }

    resolved
}
