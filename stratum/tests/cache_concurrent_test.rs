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

//! Concurrent stress test for stratum caches.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use stratum::{Cache, CacheConfig, Event, EventListener, Item, LayeredCache};

const WRITERS: usize = 8;
const READERS: usize = 8;
const FETCHERS: usize = 4;
const DELETERS: usize = 2;

const OPS: usize = 2000;
const KEYS: u64 = 1024;
const MAX_SIZE: i64 = 256;

const TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct LeaveCounter {
    evict: AtomicUsize,
    replace: AtomicUsize,
    remove: AtomicUsize,
    clear: AtomicUsize,
}

impl EventListener<Item<u64>> for LeaveCounter {
    fn on_leave(&self, reason: Event, _: &Item<u64>) {
        let counter = match reason {
            Event::Evict => &self.evict,
            Event::Replace => &self.replace,
            Event::Remove => &self.remove,
            Event::Clear => &self.clear,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl LeaveCounter {
    fn total(&self) -> usize {
        self.evict.load(Ordering::Relaxed)
            + self.replace.load(Ordering::Relaxed)
            + self.remove.load(Ordering::Relaxed)
            + self.clear.load(Ordering::Relaxed)
    }
}

fn config(listener: Arc<LeaveCounter>) -> CacheConfig<u64> {
    CacheConfig {
        max_size: MAX_SIZE,
        buckets: 8,
        items_to_prune: 64,
        promote_buffer: 64,
        delete_buffer: 64,
        event_listener: Some(listener),
        ..Default::default()
    }
}

#[test_log::test]
fn test_concurrent_cache() {
    let listener = Arc::new(LeaveCounter::default());
    let cache = Arc::new(Cache::new(config(listener.clone())).unwrap());
    let created = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for i in 0..WRITERS + READERS + FETCHERS + DELETERS {
        let cache = cache.clone();
        let created = created.clone();
        handles.push(thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(i as u64);
            for _ in 0..OPS {
                let k = rng.random_range(0..KEYS);
                let key = k.to_string();
                match i {
                    i if i < WRITERS => {
                        cache.set(&key, k, TTL);
                        created.fetch_add(1, Ordering::Relaxed);
                    }
                    i if i < WRITERS + READERS => {
                        if let Some(item) = cache.get(&key) {
                            assert_eq!(*item.value(), k);
                        }
                    }
                    i if i < WRITERS + READERS + FETCHERS => {
                        let item = cache
                            .fetch(&key, TTL, || {
                                created.fetch_add(1, Ordering::Relaxed);
                                Ok::<_, ()>(k)
                            })
                            .unwrap();
                        assert_eq!(*item.value(), k);
                    }
                    _ => {
                        cache.delete(&key);
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    cache.sync();

    let count = cache.item_count();
    assert!(count as i64 <= MAX_SIZE, "{count} items exceed the budget");
    assert_eq!(created.load(Ordering::Relaxed), listener.total() + count);
    assert!(listener.evict.load(Ordering::Relaxed) > 0);

    cache.clear();
    assert_eq!(cache.item_count(), 0);
    assert_eq!(created.load(Ordering::Relaxed), listener.total());
    assert_eq!(listener.clear.load(Ordering::Relaxed), count);

    cache.stop();
}

#[test_log::test]
fn test_concurrent_layered_cache() {
    let listener = Arc::new(LeaveCounter::default());
    let cache = Arc::new(LayeredCache::new(config(listener.clone())).unwrap());
    let created = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for i in 0..WRITERS + READERS + DELETERS {
        let cache = cache.clone();
        let created = created.clone();
        handles.push(thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(i as u64);
            for _ in 0..OPS {
                let primary = rng.random_range(0..16u64).to_string();
                let k = rng.random_range(0..KEYS / 16);
                let secondary = k.to_string();
                match i {
                    i if i < WRITERS => {
                        if rng.random_bool(0.5) {
                            cache.set(&primary, &secondary, k, TTL);
                        } else {
                            cache.get_or_create_secondary_cache(&primary).set(&secondary, k, TTL);
                        }
                        created.fetch_add(1, Ordering::Relaxed);
                    }
                    i if i < WRITERS + READERS => {
                        if let Some(item) = cache.get(&primary, &secondary) {
                            assert_eq!(*item.value(), k);
                            assert_eq!(item.group(), primary);
                        }
                    }
                    _ => {
                        if rng.random_bool(0.05) {
                            cache.delete_all(&primary);
                        } else {
                            cache.delete(&primary, &secondary);
                        }
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    cache.sync();

    let count = cache.item_count();
    assert!(count as i64 <= MAX_SIZE, "{count} items exceed the budget");
    assert_eq!(created.load(Ordering::Relaxed), listener.total() + count);

    cache.stop();
    assert!(cache.is_stopped());
}

#[test_log::test]
fn test_tracked_items_survive_pressure() {
    let cache = Cache::new(CacheConfig {
        max_size: 16,
        items_to_prune: 32,
        tracking: true,
        ..Default::default()
    })
    .unwrap();

    cache.set("pinned", u64::MAX, TTL);
    cache.sync();
    let pinned = cache.tracking_get("pinned");

    for k in 0..256u64 {
        cache.set(&k.to_string(), k, TTL);
    }
    cache.sync();

    assert_eq!(pinned.value(), Some(&u64::MAX));
    assert!(cache.get("pinned").is_some());
    assert!(cache.item_count() <= 16);
    pinned.release();
}
