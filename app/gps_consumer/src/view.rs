use std::collections::BTreeMap;

use dashmap::DashMap;

/// Last value received per key, overwritten on every update.
pub struct LatestValues<V> {
    values: DashMap<String, V>,
}

impl<V> LatestValues<V>
where
    V: Clone,
{
    pub fn new() -> Self {
        Self { values: DashMap::new() }
    }

    /// Returns the replaced value, if any.
    pub fn upsert(&self, key: String, value: V) -> Option<V> {
        self.values.insert(key, value)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> BTreeMap<String, V> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<V> Default for LatestValues<V>
where
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
