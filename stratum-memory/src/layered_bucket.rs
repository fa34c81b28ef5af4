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
use parking_lot::RwLock;
use stratum_common::code::Value;

use crate::{bucket::Bucket, item::Item};

/// A shard of a layered cache: a map from primary key to the [`Bucket`] holding its secondary keys.
///
/// Lock order is always this map first, then the secondary bucket.
pub(crate) struct LayeredBucket<V>
where
    V: Value,
{
    buckets: RwLock<HashMap<String, Arc<Bucket<V>>>>,
}

impl<V> Default for LayeredBucket<V>
where
    V: Value,
{
    fn default() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> LayeredBucket<V>
where
    V: Value,
{
    pub fn get(&self, primary: &str, secondary: &str) -> Option<Arc<Item<V>>> {
        self.buckets.read().get(primary)?.get(secondary)
    }

    pub fn get_secondary_bucket(&self, primary: &str) -> Option<Arc<Bucket<V>>> {
        self.buckets.read().get(primary).cloned()
    }

    pub fn get_or_create_secondary_bucket(&self, primary: &str) -> Arc<Bucket<V>> {
        if let Some(bucket) = self.get_secondary_bucket(primary) {
            return bucket;
        }
        self.buckets.write().entry(primary.to_string()).or_default().clone()
    }

    pub fn set(
        &self,
        primary: &str,
        secondary: &str,
        value: V,
        expires: i64,
        size: i64,
    ) -> (Arc<Item<V>>, Option<Arc<Item<V>>>) {
        {
            let buckets = self.buckets.read();
            if let Some(bucket) = buckets.get(primary) {
                return bucket.set(secondary, primary, value, expires, size);
            }
        }
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(primary.to_string()).or_default();
        bucket.set(secondary, primary, value, expires, size)
    }

    pub fn replace(
        &self,
        primary: &str,
        secondary: &str,
        value: V,
        size: i64,
    ) -> Option<(Arc<Item<V>>, Arc<Item<V>>)> {
        self.buckets.read().get(primary)?.replace(secondary, primary, value, size)
    }

    pub fn delete(&self, primary: &str, secondary: &str) -> Option<Arc<Item<V>>> {
        self.buckets.read().get(primary)?.delete(secondary)
    }

    /// Remove `item` only if its group and key still map to that very item.
    pub fn delete_item(&self, item: &Arc<Item<V>>) -> bool {
        self.buckets
            .read()
            .get(item.group())
            .map(|bucket| bucket.delete_item(item))
            .unwrap_or_default()
    }

    /// Remove every secondary entry of `primary` at once.
    ///
    /// The secondary bucket itself is kept so that existing secondary cache views stay usable.
    pub fn delete_all(&self, primary: &str) -> Vec<Arc<Item<V>>> {
        self.buckets
            .read()
            .get(primary)
            .map(|bucket| bucket.drain())
            .unwrap_or_default()
    }

    /// Remove every entry and forget every primary key.
    pub fn drain(&self) -> Vec<Arc<Item<V>>> {
        let mut buckets = self.buckets.write();
        let items = buckets.values().flat_map(|bucket| bucket.drain()).collect();
        buckets.clear();
        items
    }

    pub fn len(&self) -> usize {
        self.buckets.read().values().map(|bucket| bucket.len()).sum()
    }
}
