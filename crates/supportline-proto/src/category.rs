//! Topic category sets.
//!
//! Clients have historically sent categories either as a JSON array of
//! integers or as that same array serialized into a string. Both shapes are
//! accepted; anything that does not normalize cleanly to a set of positive
//! integers becomes the empty set, which never matches anyone.

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A set of topic tags. Always holds strictly positive integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CategorySet(BTreeSet<u32>);

impl CategorySet {
    /// An empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Normalize an arbitrary JSON value into a category set.
    ///
    /// Accepts an array of numbers or numeric strings, a single number, or a
    /// string containing a JSON array. Any element that is not a positive
    /// integer fitting in `u32` invalidates the whole input.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
                Ok(inner @ (Value::Array(_) | Value::Number(_))) => Self::from_value(&inner),
                _ => Self::new(),
            },
            Value::Number(_) => parse_tag(value)
                .map(|t| Self(BTreeSet::from([t])))
                .unwrap_or_default(),
            Value::Array(items) => items
                .iter()
                .map(parse_tag)
                .collect::<Option<BTreeSet<u32>>>()
                .map(Self)
                .unwrap_or_default(),
            _ => Self::new(),
        }
    }

    /// Parse the storage encoding (a JSON array string).
    pub fn from_json(text: &str) -> Self {
        Self::from_value(&Value::String(text.to_string()))
    }

    /// Storage encoding: a compact JSON array, e.g. `[1,3,5]`.
    pub fn to_json(&self) -> String {
        let tags: Vec<String> = self.0.iter().map(u32::to_string).collect();
        format!("[{}]", tags.join(","))
    }

    /// Tags present in both sets.
    pub fn intersection(&self, other: &CategorySet) -> CategorySet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Whether the two sets share at least one tag.
    pub fn overlaps(&self, other: &CategorySet) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }

    /// Whether the set holds no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether a tag is present.
    pub fn contains(&self, tag: u32) -> bool {
        self.0.contains(&tag)
    }

    /// Tags in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

fn parse_tag(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if n == 0 {
        return None;
    }
    u32::try_from(n).ok()
}

impl FromIterator<u32> for CategorySet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|t| *t > 0).collect())
    }
}

impl<const N: usize> From<[u32; N]> for CategorySet {
    fn from(tags: [u32; N]) -> Self {
        tags.into_iter().collect()
    }
}

impl Serialize for CategorySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for tag in &self.0 {
            seq.serialize_element(tag)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CategorySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}
