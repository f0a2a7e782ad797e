use crate::Variant;
use ng_da_error::DaError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Working (mutable) attribute map handed to chain processors.
pub type AttributeMap = BTreeMap<String, Variant>;

/// Per-key outcome of an attribute write request.
pub type WriteAttributeResults = BTreeMap<String, Result<(), DaError>>;

static EMPTY: Lazy<Arc<AttributeMap>> = Lazy::new(|| Arc::new(AttributeMap::new()));

/// How a set of attribute changes is applied to an existing snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMode {
    /// Apply changes on top of the current attributes; a `Null` value removes the key.
    #[default]
    Update,
    /// Replace the current attributes with the changes.
    Set,
}

/// Immutable key/value map published atomically.
///
/// A snapshot is never mutated once created: every "modification" returns a
/// new snapshot, so a snapshot handed to subscribers cannot be observed in a
/// half-written state or be corrupted by a later processing pass. Cloning is
/// a reference-count increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSnapshot(Arc<AttributeMap>);

impl Default for AttributeSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl AttributeSnapshot {
    #[inline]
    pub fn empty() -> Self {
        Self(Arc::clone(&EMPTY))
    }

    #[inline]
    pub fn from_map(map: AttributeMap) -> Self {
        if map.is_empty() {
            return Self::empty();
        }
        Self(Arc::new(map))
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.0.get(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variant)> {
        self.0.iter()
    }

    /// Copy the attributes into a working map.
    #[inline]
    pub fn to_map(&self) -> AttributeMap {
        self.0.as_ref().clone()
    }

    /// Returns a new snapshot with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Variant>) -> Self {
        let mut map = self.to_map();
        map.insert(key.into(), value.into());
        Self::from_map(map)
    }

    /// Returns a new snapshot without `key`.
    pub fn without(&self, key: &str) -> Self {
        if !self.contains_key(key) {
            return self.clone();
        }
        let mut map = self.to_map();
        map.remove(key);
        Self::from_map(map)
    }

    /// Apply `changes` according to `mode` and return the resulting snapshot.
    pub fn merge(&self, changes: &AttributeMap, mode: AttributeMode) -> Self {
        let mut map = match mode {
            AttributeMode::Update => self.to_map(),
            AttributeMode::Set => AttributeMap::new(),
        };
        for (key, value) in changes {
            if value.is_null() {
                map.remove(key);
            } else {
                map.insert(key.clone(), value.clone());
            }
        }
        Self::from_map(map)
    }

    /// True when both snapshots share the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<AttributeMap> for AttributeSnapshot {
    fn from(map: AttributeMap) -> Self {
        Self::from_map(map)
    }
}

impl<K: Into<String>, V: Into<Variant>> FromIterator<(K, V)> for AttributeSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Reject every requested key; used by items that do not store attributes.
pub fn reject_all_attributes(attributes: &AttributeMap) -> WriteAttributeResults {
    attributes
        .keys()
        .map(|key| {
            (
                key.clone(),
                Err(DaError::invalid_operation(format!(
                    "attribute '{key}' is not handled"
                ))),
            )
        })
        .collect()
}
