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

use std::{fmt::Debug, sync::Arc};

use stratum_common::{code::Value, event::EventListener};

use crate::{
    error::{Error, Result},
    item::Item,
};

/// Bucket count used when the configured one is not a power of two.
pub const DEFAULT_BUCKETS: usize = 16;

/// The weighter for the cache.
///
/// The weighter computes the size of an entry from its key and value. The cache evicts entries once the sum of the
/// sizes of its entries exceeds [`CacheConfig::max_size`].
pub trait Weighter<V>: Fn(&str, &V) -> i64 + Send + Sync + 'static {}
impl<V, T> Weighter<V> for T where T: Fn(&str, &V) -> i64 + Send + Sync + 'static {}

/// Cache configuration.
///
/// The configuration is consumed by the cache constructor and cannot be changed afterwards.
pub struct CacheConfig<V>
where
    V: Value,
{
    /// Maximum aggregate size of all entries before the collector kicks in.
    pub max_size: i64,
    /// Shard count. Must be a power of two, otherwise [`DEFAULT_BUCKETS`] is used.
    pub buckets: usize,
    /// Maximum number of entries visited by one collector pass.
    pub items_to_prune: usize,
    /// Capacity of the deletion queue. Writers block when it is full.
    pub delete_buffer: usize,
    /// Capacity of the promotion queue. Reads skip promotion when it is full.
    pub promote_buffer: usize,
    /// Number of reads an entry needs before it is moved to the head of the recency list again.
    pub gets_per_promote: i32,
    /// Honor the reference count of tracked entries when evicting.
    pub tracking: bool,
    /// Computes the size of an entry.
    pub weighter: Arc<dyn Weighter<V>>,
    /// Called on the worker thread for every entry that leaves the cache.
    pub event_listener: Option<Arc<dyn EventListener<Item<V>>>>,
}

impl<V> Default for CacheConfig<V>
where
    V: Value,
{
    fn default() -> Self {
        Self {
            max_size: 5000,
            buckets: DEFAULT_BUCKETS,
            items_to_prune: 500,
            delete_buffer: 1024,
            promote_buffer: 1024,
            gets_per_promote: 3,
            tracking: false,
            weighter: Arc::new(|_: &str, _: &V| 1i64),
            event_listener: None,
        }
    }
}

impl<V> Debug for CacheConfig<V>
where
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("max_size", &self.max_size)
            .field("buckets", &self.buckets)
            .field("items_to_prune", &self.items_to_prune)
            .field("delete_buffer", &self.delete_buffer)
            .field("promote_buffer", &self.promote_buffer)
            .field("gets_per_promote", &self.gets_per_promote)
            .field("tracking", &self.tracking)
            .field("event_listener", &self.event_listener.is_some())
            .finish()
    }
}

impl<V> CacheConfig<V>
where
    V: Value,
{
    /// Replace invalid settings with safe ones instead of rejecting them.
    ///
    /// - A bucket count that is zero or not a power of two becomes [`DEFAULT_BUCKETS`].
    /// - A zero queue capacity becomes 1.
    /// - `gets_per_promote` below 1 becomes 1.
    pub fn normalized(mut self) -> Self {
        if !self.buckets.is_power_of_two() {
            tracing::debug!(
                "[config]: bucket count {} is not a power of two, fall back to {DEFAULT_BUCKETS}",
                self.buckets
            );
            self.buckets = DEFAULT_BUCKETS;
        }
        self.delete_buffer = self.delete_buffer.max(1);
        self.promote_buffer = self.promote_buffer.max(1);
        self.gets_per_promote = self.gets_per_promote.max(1);
        self
    }

    /// Check the settings without correcting them.
    ///
    /// The cache constructors never call this; they normalize instead.
    pub fn verify(&self) -> Result<()> {
        if !self.buckets.is_power_of_two() {
            return Err(Error::Config(format!(
                "buckets must be a power of two, given: {}",
                self.buckets
            )));
        }
        if self.delete_buffer == 0 {
            return Err(Error::Config("delete_buffer must be greater than zero".to_string()));
        }
        if self.promote_buffer == 0 {
            return Err(Error::Config("promote_buffer must be greater than zero".to_string()));
        }
        if self.gets_per_promote < 1 {
            return Err(Error::Config(format!(
                "gets_per_promote must be at least 1, given: {}",
                self.gets_per_promote
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::<u64>::default();
        assert_eq!(config.max_size, 5000);
        assert_eq!(config.buckets, 16);
        assert_eq!(config.items_to_prune, 500);
        assert_eq!(config.delete_buffer, 1024);
        assert_eq!(config.promote_buffer, 1024);
        assert_eq!(config.gets_per_promote, 3);
        assert!(!config.tracking);
        assert_eq!((config.weighter)("k", &42), 1);
        assert!(config.verify().is_ok());
    }

    #[test]
    fn test_normalize_buckets() {
        for (given, expected) in [(0, 16), (1, 1), (2, 2), (3, 16), (12, 16), (64, 64), (100, 16)] {
            let config = CacheConfig::<u64> {
                buckets: given,
                ..Default::default()
            };
            assert_eq!(config.normalized().buckets, expected, "given: {given}");
        }
    }

    #[test]
    fn test_normalize_buffers() {
        let config = CacheConfig::<u64> {
            delete_buffer: 0,
            promote_buffer: 0,
            gets_per_promote: -1,
            ..Default::default()
        };
        assert!(config.verify().is_err());

        let config = config.normalized();
        assert_eq!(config.delete_buffer, 1);
        assert_eq!(config.promote_buffer, 1);
        assert_eq!(config.gets_per_promote, 1);
        assert!(config.verify().is_ok());
    }

    #[test]
    fn test_verify_reports_buckets() {
        let config = CacheConfig::<u64> {
            buckets: 10,
            ..Default::default()
        };
        let err = config.verify().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("power of two"));
    }
}
