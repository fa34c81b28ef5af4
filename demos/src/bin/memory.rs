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

//! Basic usage of the flat cache.

use std::time::Duration;

use stratum::{Cache, CacheConfig};

fn main() -> stratum::Result<()> {
    demos::init_logger();

    let cache = Cache::new(CacheConfig {
        max_size: 2,
        ..Default::default()
    })?;

    let item = cache.set("hello", "world".to_string(), Duration::from_secs(60));
    let e = cache.get("hello").unwrap();
    assert_eq!(item.value(), e.value());

    cache.set("foo", "bar".to_string(), Duration::from_secs(60));
    cache.set("baz", "qux".to_string(), Duration::from_secs(60));
    cache.sync();

    // "hello" was the least recently used entry.
    assert!(cache.get("hello").is_none());
    tracing::info!(items = cache.item_count(), dropped = cache.get_dropped(), "done");

    Ok(())
}
