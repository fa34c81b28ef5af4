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

/// Event identifier.
///
/// Describes why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Removed by the collector to bring the cache back under its size budget.
    Evict,
    /// Superseded by a newer entry under the same key.
    Replace,
    /// Explicitly deleted.
    Remove,
    /// Dropped by a cache clear.
    Clear,
}

/// Trait for the customized event listener.
///
/// The listener is called on the cache worker thread, once for every entry that leaves the cache. It must not block
/// and must not call back into the cache that owns it, or the worker stalls and every writer stalls behind it.
pub trait EventListener<T>: Send + Sync + 'static {
    /// Called when a cache entry leaves the cache with the reason.
    fn on_leave(&self, reason: Event, entry: &T);
}

impl<T, F> EventListener<T> for F
where
    F: Fn(Event, &T) + Send + Sync + 'static,
{
    fn on_leave(&self, reason: Event, entry: &T) {
        self(reason, entry)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn test_closure_listener() {
        let removed = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn EventListener<u64>> = {
            let removed = removed.clone();
            Arc::new(move |reason: Event, v: &u64| {
                if reason == Event::Remove {
                    removed.fetch_add(*v as usize, Ordering::Relaxed);
                }
            })
        };

        listener.on_leave(Event::Remove, &3);
        listener.on_leave(Event::Evict, &5);
        listener.on_leave(Event::Remove, &4);

        assert_eq!(removed.load(Ordering::Relaxed), 7);
    }
}
