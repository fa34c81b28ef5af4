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

//! Layered cache with per-user entries dropped at once.

use std::time::Duration;

use stratum::{CacheConfig, LayeredCache};

const TTL: Duration = Duration::from_secs(300);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    demos::init_logger();

    let cache: LayeredCache<String> = LayeredCache::new(CacheConfig::default())?;

    cache.set("user:1", "profile", "Alice".to_string(), TTL);
    cache.set("user:1", "settings", "dark".to_string(), TTL);
    cache.set("user:2", "profile", "Bob".to_string(), TTL);

    let user = cache.get_or_create_secondary_cache("user:2");
    user.set("settings", "light".to_string(), TTL);
    println!("user:2 settings = {:?}", cache.get("user:2", "settings").map(|i| i.value().clone()));

    let avatar = cache
        .fetch("user:1", "avatar", TTL, || Ok::<_, std::io::Error>("alice.png".to_string()))?;
    println!("user:1 avatar = {}", avatar.value());

    cache.delete_all("user:1");
    assert!(cache.get("user:1", "profile").is_none());
    assert!(cache.get("user:2", "profile").is_some());

    cache.sync();
    println!("{} entries left", cache.item_count());

    Ok(())
}
