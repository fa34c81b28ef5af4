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
    layered_bucket::LayeredBucket,
    worker::{Shards, Worker},
};

struct LayeredShards<V>
where
    V: Value,
{
    buckets: Vec<LayeredBucket<V>>,
    mask: ShardMask,
}

impl<V> LayeredShards<V>
where
    V: Value,
{
    fn bucket(&self, primary: &str) -> &LayeredBucket<V> {
        &self.buckets[self.mask.shard(primary)]
    }
}

impl<V> Shards<V> for LayeredShards<V>
where
    V: Value,
{
    fn delete_item(&self, item: &Arc<Item<V>>) -> bool {
        self.bucket(item.group()).delete_item(item)
    }
}

/// A cache keyed by `(primary, secondary)` pairs.
///
/// Entries sharing a primary key live in the same secondary bucket and can be dropped together with
/// [`LayeredCache::delete_all`]. Recency order, size budget and eviction are global, exactly as in
/// [`Cache`](crate::Cache).
pub struct LayeredCache<V>
where
    V: Value,
{
    shards: Arc<LayeredShards<V>>,
    weighter: Arc<dyn Weighter<V>>,
    worker: Worker<V>,
}

impl<V> Debug for LayeredCache<V>
where
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredCache")
            .field("buckets", &self.shards.buckets.len())
            .field("stopped", &self.worker.is_stopped())
            .finish()
    }
}

impl<V> LayeredCache<V>
where
    V: Value,
{
    /// Create a layered cache and start its worker thread.
    pub fn new(config: CacheConfig<V>) -> Result<Self> {
        let config = config.normalized();

        let shards = Arc::new(LayeredShards {
            buckets: (0..config.buckets).map(|_| LayeredBucket::default()).collect_vec(),
            mask: ShardMask::new(config.buckets),
        });
        let worker = Worker::spawn(&config, shards.clone())?;
        tracing::debug!(
            buckets = config.buckets,
            max_size = config.max_size,
            tracking = config.tracking,
            "[cache]: layered cache created"
        );

        Ok(Self {
            shards,
            weighter: config.weighter,
            worker,
        })
    }

    /// Get an entry. Expired entries are returned but not promoted.
    pub fn get(&self, primary: &str, secondary: &str) -> Option<Arc<Item<V>>> {
        self.lookup(self.shards.bucket(primary).get(primary, secondary))
    }

    /// Get a view on the entries of `primary`, creating the underlying secondary bucket if needed.
    pub fn get_or_create_secondary_cache(&self, primary: &str) -> SecondaryCache<'_, V> {
        SecondaryCache {
            primary: primary.to_string(),
            bucket: self.shards.bucket(primary).get_or_create_secondary_bucket(primary),
            cache: self,
        }
    }

    /// Get an entry and pin it against eviction until the returned handle is released.
    pub fn tracking_get(&self, primary: &str, secondary: &str) -> TrackedItem<V> {
        match self.get(primary, secondary) {
            Some(item) => TrackedItem::new(item),
            None => TrackedItem::none(),
        }
    }

    /// Insert or overwrite an entry that expires `ttl` from now.
    pub fn set(&self, primary: &str, secondary: &str, value: V, ttl: Duration) -> Arc<Item<V>> {
        let size = (self.weighter)(secondary, &value);
        let res = self
            .shards
            .bucket(primary)
            .set(primary, secondary, value, deadline(ttl), size);
        self.inserted(res)
    }

    /// Overwrite the value of an existing entry, keeping its expiry. Returns false if the entry is missing.
    pub fn replace(&self, primary: &str, secondary: &str, value: V) -> bool {
        let size = (self.weighter)(secondary, &value);
        let res = self.shards.bucket(primary).replace(primary, secondary, value, size);
        self.replaced(res)
    }

    /// Get a live entry, or produce and insert it. Errors from `fetch` are returned as is and nothing is cached.
    pub fn fetch<F, E>(
        &self,
        primary: &str,
        secondary: &str,
        ttl: Duration,
        fetch: F,
    ) -> std::result::Result<Arc<Item<V>>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(item) = self.get(primary, secondary) {
            if !item.is_expired() {
                return Ok(item);
            }
        }
        let value = fetch()?;
        Ok(self.set(primary, secondary, value, ttl))
    }

    /// Remove an entry. Returns whether it was present.
    pub fn delete(&self, primary: &str, secondary: &str) -> bool {
        self.removed(self.shards.bucket(primary).delete(primary, secondary))
    }

    /// Remove every entry under `primary` at once. Returns whether anything was removed.
    pub fn delete_all(&self, primary: &str) -> bool {
        let items = self.shards.bucket(primary).delete_all(primary);
        let deleted = !items.is_empty();
        for item in items {
            self.worker.delete(item, Event::Remove);
        }
        deleted
    }

    /// Count the entries of every bucket.
    pub fn item_count(&self) -> usize {
        self.shards.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    /// Remove every entry and every primary key, and reset the size accounting.
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
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Returns true once [`LayeredCache::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.worker.is_stopped()
    }

    fn lookup(&self, item: Option<Arc<Item<V>>>) -> Option<Arc<Item<V>>> {
        let item = item?;
        if item.expires_nanos() > now() {
            self.worker.promote(item.clone());
        }
        Some(item)
    }

    fn inserted(&self, (item, existing): (Arc<Item<V>>, Option<Arc<Item<V>>>)) -> Arc<Item<V>> {
        if let Some(existing) = existing {
            self.worker.delete(existing, Event::Replace);
        }
        self.worker.insert(item.clone());
        item
    }

    fn replaced(&self, res: Option<(Arc<Item<V>>, Arc<Item<V>>)>) -> bool {
        match res {
            Some((item, existing)) => {
                self.worker.delete(existing, Event::Replace);
                self.worker.insert(item);
                true
            }
            None => false,
        }
    }

    fn removed(&self, item: Option<Arc<Item<V>>>) -> bool {
        match item {
            Some(item) => {
                self.worker.delete(item, Event::Remove);
                true
            }
            None => false,
        }
    }
}

/// A view on the entries of one primary key of a [`LayeredCache`].
///
/// The view addresses its secondary bucket directly and shares the worker of its parent cache. It stays usable after
/// [`LayeredCache::delete_all`] on its primary key, but a [`LayeredCache::clear`] detaches it: entries written
/// through a detached view are not visible through the parent cache.
pub struct SecondaryCache<'a, V>
where
    V: Value,
{
    primary: String,
    bucket: Arc<Bucket<V>>,
    cache: &'a LayeredCache<V>,
}

impl<V> Debug for SecondaryCache<'_, V>
where
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryCache")
            .field("primary", &self.primary)
            .field("items", &self.bucket.len())
            .finish()
    }
}

impl<V> SecondaryCache<'_, V>
where
    V: Value,
{
    /// The primary key of this view.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Get an entry. Expired entries are returned but not promoted.
    pub fn get(&self, secondary: &str) -> Option<Arc<Item<V>>> {
        self.cache.lookup(self.bucket.get(secondary))
    }

    /// Get an entry and pin it against eviction until the returned handle is released.
    pub fn tracking_get(&self, secondary: &str) -> TrackedItem<V> {
        match self.get(secondary) {
            Some(item) => TrackedItem::new(item),
            None => TrackedItem::none(),
        }
    }

    /// Insert or overwrite an entry that expires `ttl` from now.
    pub fn set(&self, secondary: &str, value: V, ttl: Duration) -> Arc<Item<V>> {
        let size = (self.cache.weighter)(secondary, &value);
        let res = self.bucket.set(secondary, &self.primary, value, deadline(ttl), size);
        self.cache.inserted(res)
    }

    /// Overwrite the value of an existing entry, keeping its expiry. Returns false if the entry is missing.
    pub fn replace(&self, secondary: &str, value: V) -> bool {
        let size = (self.cache.weighter)(secondary, &value);
        let res = self.bucket.replace(secondary, &self.primary, value, size);
        self.cache.replaced(res)
    }

    /// Get a live entry, or produce and insert it. Errors from `fetch` are returned as is and nothing is cached.
    pub fn fetch<F, E>(&self, secondary: &str, ttl: Duration, fetch: F) -> std::result::Result<Arc<Item<V>>, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(item) = self.get(secondary) {
            if !item.is_expired() {
                return Ok(item);
            }
        }
        let value = fetch()?;
        Ok(self.set(secondary, value, ttl))
    }

    /// Remove an entry. Returns whether it was present.
    pub fn delete(&self, secondary: &str) -> bool {
        self.cache.removed(self.bucket.delete(secondary))
    }
}
