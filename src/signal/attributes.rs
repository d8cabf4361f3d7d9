use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

/// Reserved key under which a signal's tags live.
pub const TAGS_KEY: &str = "tags";

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Tags(BTreeSet<String>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Metadata carried by a signal across stages.
///
/// The map is only allocated on first write. Every access, read or write,
/// goes through the same lock, so a bag may be shared with the delivery
/// thread while the pipeline keeps tagging it.
#[derive(Debug, Default)]
pub struct Attributes {
    inner: Mutex<Option<HashMap<String, AttributeValue>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        self.inner.lock().as_ref().and_then(|map| map.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .as_ref()
            .is_some_and(|map| map.contains_key(key))
    }

    /// Returns the previous value, if any.
    pub fn set(&self, key: &str, value: impl Into<AttributeValue>) -> Option<AttributeValue> {
        self.inner
            .lock()
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<AttributeValue> {
        self.inner.lock().as_mut().and_then(|map| map.remove(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .as_ref()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether anything was ever written to this bag.
    pub fn is_allocated(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn tags(&self) -> BTreeSet<String> {
        match self.get(TAGS_KEY) {
            Some(AttributeValue::Tags(tags)) => tags,
            _ => BTreeSet::new(),
        }
    }

    /// Returns false if the tag was already present.
    pub fn add_tag(&self, tag: &str) -> bool {
        let mut guard = self.inner.lock();
        let map = guard.get_or_insert_with(HashMap::new);
        let entry = map
            .entry(TAGS_KEY.to_string())
            .or_insert_with(|| AttributeValue::Tags(BTreeSet::new()));

        // a non-tag value under the reserved key is replaced
        if !matches!(entry, AttributeValue::Tags(_)) {
            *entry = AttributeValue::Tags(BTreeSet::new());
        }
        match entry {
            AttributeValue::Tags(tags) => tags.insert(tag.to_string()),
            _ => false,
        }
    }

    pub fn remove_tag(&self, tag: &str) -> bool {
        let mut guard = self.inner.lock();
        match guard.as_mut().and_then(|map| map.get_mut(TAGS_KEY)) {
            Some(AttributeValue::Tags(tags)) => tags.remove(tag),
            _ => false,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let guard = self.inner.lock();
        matches!(
            guard.as_ref().and_then(|map| map.get(TAGS_KEY)),
            Some(AttributeValue::Tags(tags)) if tags.contains(tag)
        )
    }
}

impl Clone for Attributes {
    fn clone(&self) -> Self {
        Self {
            inner: Mutex::new(self.inner.lock().clone()),
        }
    }
}
