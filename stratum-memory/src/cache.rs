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

use std::{fmt::Debug, sync::Arc, time::Duration};

use itertools::Itertools;
use stratum_common::{code::Value, event::Event, hasher::ShardMask};

use crate::{
    bucket::Bucket,
    config::{CacheConfig, Weighter},
    error::Result,
    item::{deadline, now, Item, TrackedItem},
    worker::{Shards, Worker},
};

struct FlatShards<V>
where
    V: Value,
{
    buckets: Vec<Bucket<V>>,
    mask: ShardMask,
}

impl<V> FlatShards<V>
where
    V: Value,
{
    fn bucket(&self, key: &str) -> &Bucket<V> {
        &self.buckets[self.mask.shard(key)]
    }
}

impl<V> Shards<V> for FlatShards<V>
where
    V: Value,
{
    fn delete_item(&self, item: &Arc<Item<V>>) -> bool {
        self.bucket(item.key()).delete_item(item)
    }
}

/// A concurrent, size-bounded LRU cache with per-entry expiry.
///
/// Keys are spread over independently locked buckets. Recency order and size accounting belong to a single worker
/// thread which is fed through bounded queues, so reads and writes never contend on a global lock.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stratum_memory::{Cache, CacheConfig};
///
/// let cache = Cache::new(CacheConfig::default()).unwrap();
/// cache.set("spice", "flow".to_string(), Duration::from_secs(60));
///
/// let item = cache.get("spice").unwrap();
/// assert_eq!(item.value(), "flow");
/// assert!(!item.is_expired());
///
/// cache.stop();
/// ```
pub struct Cache<V>
where
    V: Value,
{
    shards: Arc<FlatShards<V>>,
    weighter: Arc<dyn Weighter<V>>,
    worker: Worker<V>,
}

impl<V> Debug for Cache<V>
where
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("buckets", &self.shards.buckets.len())
            .field("stopped", &self.worker.is_stopped())
            .finish()
    }
}

impl<V> Cache<V>
where
    V: Value,
{
    /// Create a cache and start its worker thread.
    ///
    /// Invalid settings are normalized, see [`CacheConfig::normalized`].
    pub fn new(config: CacheConfig<V>) -> Result<Self> {
        let config = config.normalized();

        let shards = Arc::new(FlatShards {
            buckets: (0..config.buckets).map(|_| Bucket::default()).collect_vec(),
            mask: ShardMask::new(config.buckets),
        });
        let worker = Worker::spawn(&config, shards.clone())?;
        tracing::debug!(
            buckets = config.buckets,
            max_size = config.max_size,
            tracking = config.tracking,
            "[cache]: cache created"
        );

        Ok(Self {
            shards,
            weighter: config.weighter,
            worker,
        })
    }

    /// Get an entry.
    ///
    /// Expired entries are returned as well; check [`Item::is_expired`]. Only live entries are promoted.
    pub fn get(&self, key: &str) -> Option<Arc<Item<V>>> {
        let item = self.shards.bucket(key).get(key)?;
        if item.expires_nanos() > now() {
            self.worker.promote(item.clone());
        }
        Some(item)
    }

    /// Get an entry and pin it against eviction until the returned handle is released.
    ///
    /// Returns [`TrackedItem::none`] for a missing key.
    pub fn tracking_get(&self, key: &str) -> TrackedItem<V> {
        match self.get(key) {
            Some(item) => TrackedItem::new(item),
            None => TrackedItem::none(),
        }
    }

    /// Insert or overwrite an entry that expires `ttl` from now.
    pub fn set(&self, key: &str, value: V, ttl: Duration) -> Arc<Item<V>> {
        let size = (self.weighter)(key, &value);
        let (item, existing) = self.shards.bucket(key).set(key, "", value, deadline(ttl), size);
        if let Some(existing) = existing {
            self.worker.delete(existing, Event::Replace);
        }
        self.worker.insert(item.clone());
        item
    }

    /// Overwrite the value of an existing entry, keeping its expiry.
    ///
    /// Returns false and does nothing if the key is missing.
    pub fn replace(&self, key: &str, value: V) -> bool {
        let size = (self.weighter)(key, &value);
        match self.shards.bucket(key).replace(key, "", value, size) {
            Some((item, existing)) => {
                self.worker.delete(existing, Event::Replace);
                self.worker.insert(item);
                true
            }
            None => false,
        }
    }

    /// Get a live entry, or produce and insert it.
    ///
    /// `fetch` is called when the key is missing or expired. Its error is returned as is and nothing is cached.
    /// Concurrent misses on the same key are not coalesced: every caller runs its own `fetch` and the last insert
    /// wins.
    pub fn fetch<F, E>(&self, key: &str, ttl: Duration, fetch: F) -> std::result::Result<Arc<Item<V>>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(item) = self.get(key) {
            if !item.is_expired() {
                return Ok(item);
            }
        }
        let value = fetch()?;
        Ok(self.set(key, value, ttl))
    }

    /// Remove an entry. Returns whether the key was present.
    pub fn delete(&self, key: &str) -> bool {
        match self.shards.bucket(key).delete(key) {
            Some(item) => {
                self.worker.delete(item, Event::Remove);
                true
            }
            None => false,
        }
    }

    /// Count the entries of every bucket.
    pub fn item_count(&self) -> usize {
        self.shards.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    /// Remove every entry and reset the size accounting.
    ///
    /// Buckets are emptied one after another; writes racing with the clear may survive it.
    pub fn clear(&self) {
        let items = self.shards.buckets.iter().flat_map(|bucket| bucket.drain()).collect_vec();
        self.worker.clear(items);
    }

    /// Wait until the worker has processed every event enqueued before this call.
    pub fn sync(&self) {
        self.worker.sync();
    }

    /// Number of entries evicted by the collector since the last call.
    pub fn get_dropped(&self) -> usize {
        self.worker.get_dropped()
    }

    /// Stop the worker after it has drained pending deletions.
    ///
    /// Calling it more than once is fine. Dropping the cache stops the worker as well.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Returns true once [`Cache::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.worker.is_stopped()
    }
}
