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

//! Observe entries leaving the cache.

use std::{sync::Arc, time::Duration};

use stratum::{Cache, CacheConfig, Event, EventListener, Item};

struct EchoEventListener;

impl EventListener<Item<String>> for EchoEventListener {
    fn on_leave(&self, reason: Event, item: &Item<String>) {
        println!("Entry [key = {}] [value = {}] left: {reason:?}.", item.key(), item.value())
    }
}

/// Output:
///
/// ```plain
/// Entry [key = 1] [value = First] left: Replace.
/// Entry [key = 2] [value = Second] left: Evict.
/// Entry [key = 3] [value = Third] left: Remove.
/// Entry [key = 1] [value = Forth] left: Clear.
/// ```
fn main() -> stratum::Result<()> {
    demos::init_logger();

    let cache: Cache<String> = Cache::new(CacheConfig {
        max_size: 2,
        event_listener: Some(Arc::new(EchoEventListener)),
        ..Default::default()
    })?;
    let ttl = Duration::from_secs(60);

    cache.set("1", "First".to_string(), ttl);
    cache.set("2", "Second".to_string(), ttl);
    cache.set("1", "Forth".to_string(), ttl);
    cache.sync();
    cache.set("3", "Third".to_string(), ttl);
    cache.sync();
    cache.delete("3");
    cache.clear();

    Ok(())
}
