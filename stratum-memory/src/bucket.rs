// Copyright 2025 stratum Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use stratum_common::code::Value;

use crate::item::Item;

/// A shard of the key space: a map from key to [`Item`] behind a single lock.
///
/// Every operation holds the lock for its whole duration and never sends on a channel while holding it.
pub(crate) struct Bucket<V>
where
    V: Value,
{
    lookup: RwLock<HashMap<String, Arc<Item<V>>>>,
}

impl<V> Default for Bucket<V>
where
    V: Value,
{
    fn default() -> Self {
        Self {
            lookup: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Bucket<V>
where
    V: Value,
{
    pub fn get(&self, key: &str) -> Option<Arc<Item<V>>> {
        self.lookup.read().get(key).cloned()
    }

    /// Insert a new item, returning it along with the item it replaced.
    pub fn set(
        &self,
        key: &str,
        group: &str,
        value: V,
        expires: i64,
        size: i64,
    ) -> (Arc<Item<V>>, Option<Arc<Item<V>>>) {
        let item = Arc::new(Item::new(key.to_string(), group.to_string(), value, expires, size));
        let existing = self.lookup.write().insert(key.to_string(), item.clone());
        (item, existing)
    }

    /// Swap the value of an existing key, keeping its expiry. Returns the new and the replaced item.
    pub fn replace(&self, key: &str, group: &str, value: V, size: i64) -> Option<(Arc<Item<V>>, Arc<Item<V>>)> {
        let mut lookup = self.lookup.write();
        let expires = lookup.get(key)?.expires_nanos();
        let item = Arc::new(Item::new(key.to_string(), group.to_string(), value, expires, size));
        let existing = lookup.insert(key.to_string(), item.clone())?;
        Some((item, existing))
    }

    pub fn delete(&self, key: &str) -> Option<Arc<Item<V>>> {
        self.lookup.write().remove(key)
    }

    /// Remove `item` only if the key still maps to that very item.
    pub fn delete_item(&self, item: &Arc<Item<V>>) -> bool {
        let mut lookup = self.lookup.write();
        match lookup.get(item.key()) {
            Some(current) if Arc::ptr_eq(current, item) => {
                lookup.remove(item.key());
                true
            }
            _ => false,
        }
    }

    /// Remove every item under one lock hold.
    pub fn drain(&self) -> Vec<Arc<Item<V>>> {
        self.lookup.write().drain().map(|(_, item)| item).collect_vec()
    }

    pub fn len(&self) -> usize {
        self.lookup.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::item::deadline;

    fn bucket() -> Bucket<String> {
        let bucket = Bucket::default();
        bucket.set("power", "", "9000".to_string(), deadline(Duration::from_secs(60)), 1);
        bucket
    }

    #[test]
    fn test_get_missing() {
        assert!(bucket().get("invalid").is_none());
    }

    #[test]
    fn test_get_existing() {
        let item = bucket().get("power").unwrap();
        assert_eq!(item.key(), "power");
        assert_eq!(item.value(), "9000");
        assert_eq!(item.group(), "");
    }

    #[test]
    fn test_delete() {
        let bucket = bucket();
        assert!(bucket.delete("invalid").is_none());
        let item = bucket.delete("power").unwrap();
        assert_eq!(item.value(), "9000");
        assert!(bucket.get("power").is_none());
        assert_eq!(bucket.len(), 0);
    }

    #[test]
    fn test_set_new() {
        let bucket = bucket();
        let (item, existing) = bucket.set("spice", "", "flow".to_string(), deadline(Duration::from_secs(60)), 1);
        assert!(existing.is_none());
        assert_eq!(item.value(), "flow");
        assert_eq!(bucket.get("spice").unwrap().value(), "flow");
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn test_set_replace() {
        let bucket = bucket();
        let (item, existing) = bucket.set("power", "", "9001".to_string(), deadline(Duration::from_secs(60)), 1);
        assert_eq!(item.value(), "9001");
        assert_eq!(existing.unwrap().value(), "9000");
        assert_eq!(bucket.get("power").unwrap().value(), "9001");
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn test_replace() {
        let bucket = bucket();
        assert!(bucket.replace("spice", "", "flow".to_string(), 1).is_none());
        assert!(bucket.get("spice").is_none());

        let old = bucket.get("power").unwrap();
        let (item, existing) = bucket.replace("power", "", "9001".to_string(), 1).unwrap();
        assert!(Arc::ptr_eq(&old, &existing));
        assert_eq!(item.value(), "9001");
        assert_eq!(item.expires(), old.expires());
    }

    #[test]
    fn test_delete_item_identity() {
        let bucket = bucket();
        let old = bucket.get("power").unwrap();
        bucket.set("power", "", "9001".to_string(), deadline(Duration::from_secs(60)), 1);

        // A stale item must not take its successor out.
        assert!(!bucket.delete_item(&old));
        assert_eq!(bucket.get("power").unwrap().value(), "9001");

        let current = bucket.get("power").unwrap();
        assert!(bucket.delete_item(&current));
        assert!(bucket.get("power").is_none());
    }

    #[test]
    fn test_drain() {
        let bucket = bucket();
        bucket.set("spice", "", "flow".to_string(), deadline(Duration::from_secs(60)), 1);
        let mut keys = bucket.drain().into_iter().map(|item| item.key().to_string()).collect_vec();
        keys.sort();
        assert_eq!(keys, vec!["power".to_string(), "spice".to_string()]);
        assert_eq!(bucket.len(), 0);
    }
}
