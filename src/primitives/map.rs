//! Shared Map
//!
//! String-keyed map of JSON values. Typed access goes through serde.

use crate::error::Result;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Cluster-wide map; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct SharedMap {
    entries: Arc<DashMap<String, Value>>,
}

impl SharedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, returning the previous raw value
    pub fn put<V: Serialize>(&self, key: impl Into<String>, value: &V) -> Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.entries.insert(key.into(), value))
    }

    /// Store `value` only if `key` is absent; returns the existing raw value otherwise
    pub fn put_if_absent<V: Serialize>(
        &self,
        key: impl Into<String>,
        value: &V,
    ) -> Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        match self.entries.entry(key.into()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Ok(Some(e.get().clone())),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(value);
                Ok(None)
            }
        }
    }

    /// Read and deserialize the value under `key`
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.get_raw(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
