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

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicI32, AtomicI64, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use intrusive_collections::{intrusive_adapter, LinkedListAtomicLink};
use stratum_common::{code::Value, strict_assert};

/// Wall clock in nanoseconds since the unix epoch.
pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Absolute expiry `ttl` from now.
pub(crate) fn deadline(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
    now().saturating_add(ttl)
}

/// Position of an [`Item`] in the lifecycle driven by the cache worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemState {
    /// Created, but the worker has not linked it into the recency list yet.
    Pending = 0,
    /// Linked into the recency list and counted in the cache size.
    Active = 1,
    /// Left the cache. Any further promotion or deletion event for it is ignored.
    Deleted = 2,
}

impl From<u8> for ItemState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Active,
            _ => Self::Deleted,
        }
    }
}

/// [`Item`] holds a cached value along with its expiry and recency bookkeeping.
pub struct Item<V>
where
    V: Value,
{
    key: String,
    group: String,
    value: V,
    size: i64,

    expires: AtomicI64,
    promotions: AtomicI32,
    refs: AtomicUsize,
    state: AtomicU8,

    link: LinkedListAtomicLink,
}

intrusive_adapter! { pub(crate) ItemAdapter<V> = Arc<Item<V>>: Item<V> { link => LinkedListAtomicLink } where V: Value }

impl<V> Debug for Item<V>
where
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("key", &self.key)
            .field("group", &self.group)
            .field("size", &self.size)
            .field("expires", &self.expires.load(Ordering::Relaxed))
            .field("state", &self.state())
            .finish()
    }
}

impl<V> Item<V>
where
    V: Value,
{
    pub(crate) fn new(key: String, group: String, value: V, expires: i64, size: i64) -> Self {
        Self {
            key,
            group,
            value,
            size,
            expires: AtomicI64::new(expires),
            promotions: AtomicI32::new(0),
            refs: AtomicUsize::new(0),
            state: AtomicU8::new(ItemState::Pending as u8),
            link: LinkedListAtomicLink::new(),
        }
    }

    /// The key of the entry. For a layered cache this is the secondary key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The primary key of a layered cache entry, empty for a flat cache entry.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The size the entry is accounted with.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Absolute expiry time.
    pub fn expires(&self) -> SystemTime {
        let nanos = self.expires_nanos();
        if nanos <= 0 {
            return UNIX_EPOCH;
        }
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    }

    /// Returns true once the expiry time has passed.
    ///
    /// Expired entries are still returned by lookups; callers decide whether a stale value is acceptable.
    pub fn is_expired(&self) -> bool {
        self.expires_nanos() <= now()
    }

    /// Remaining time to live, zero once expired.
    pub fn ttl(&self) -> Duration {
        let remaining = self.expires_nanos().saturating_sub(now());
        Duration::from_nanos(remaining.max(0) as u64)
    }

    /// Push the expiry time to `ttl` from now.
    pub fn extend(&self, ttl: Duration) {
        self.expires.store(deadline(ttl), Ordering::Release);
    }

    /// Number of outstanding tracked handles.
    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Lifecycle state of the entry.
    pub fn state(&self) -> ItemState {
        self.state.load(Ordering::Acquire).into()
    }

    pub(crate) fn expires_nanos(&self) -> i64 {
        self.expires.load(Ordering::Acquire)
    }

    /// Transition to `state`, returning the previous state.
    pub(crate) fn swap_state(&self, state: ItemState) -> ItemState {
        self.state.swap(state as u8, Ordering::AcqRel).into()
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.link.is_linked()
    }

    /// Count one read. Returns true when the read count reached `gets_per_promote`.
    pub(crate) fn should_promote(&self, gets_per_promote: i32) -> bool {
        self.promotions.fetch_add(1, Ordering::Relaxed) + 1 >= gets_per_promote
    }

    pub(crate) fn reset_promotions(&self) {
        self.promotions.store(0, Ordering::Relaxed);
    }

    pub(crate) fn inc_refs(&self) -> usize {
        let old = self.refs.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("[item]: inc item (key: {}) refs: {} => {}", self.key, old, old + 1);
        old + 1
    }

    pub(crate) fn dec_refs(&self) -> usize {
        let old = self.refs.fetch_sub(1, Ordering::SeqCst);
        strict_assert!(old > 0);
        tracing::trace!("[item]: dec item (key: {}) refs: {} => {}", self.key, old, old - 1);
        old - 1
    }
}

/// A reference-counted handle on a cache entry.
///
/// While the handle is alive the collector of a tracking cache never evicts the entry. The count is released on
/// [`TrackedItem::release`] or on drop, whichever comes first.
pub struct TrackedItem<V>
where
    V: Value,
{
    item: Option<Arc<Item<V>>>,
}

impl<V> Debug for TrackedItem<V>
where
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedItem").field("item", &self.item).finish()
    }
}

impl<V> TrackedItem<V>
where
    V: Value,
{
    pub(crate) fn new(item: Arc<Item<V>>) -> Self {
        item.inc_refs();
        Self { item: Some(item) }
    }

    /// The empty handle returned for a missing key. Releasing it is a no-op.
    pub fn none() -> Self {
        Self { item: None }
    }

    /// Returns true for the empty handle.
    pub fn is_none(&self) -> bool {
        self.item.is_none()
    }

    /// The tracked entry.
    pub fn item(&self) -> Option<&Arc<Item<V>>> {
        self.item.as_ref()
    }

    /// The tracked value.
    pub fn value(&self) -> Option<&V> {
        self.item.as_ref().map(|item| item.value())
    }

    /// Remaining time to live of the tracked entry.
    pub fn ttl(&self) -> Option<Duration> {
        self.item.as_ref().map(|item| item.ttl())
    }

    /// Returns true if the handle is empty or the tracked entry has expired.
    pub fn is_expired(&self) -> bool {
        self.item.as_ref().map(|item| item.is_expired()).unwrap_or(true)
    }

    /// Give the reference back.
    pub fn release(self) {
        drop(self)
    }
}

impl<V> Clone for TrackedItem<V>
where
    V: Value,
{
    fn clone(&self) -> Self {
        match self.item.as_ref() {
            Some(item) => Self::new(item.clone()),
            None => Self::none(),
        }
    }
}

impl<V> Drop for TrackedItem<V>
where
    V: Value,
{
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            item.dec_refs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(ttl: Duration) -> Arc<Item<u64>> {
        Arc::new(Item::new("k".to_string(), String::new(), 42, deadline(ttl), 1))
    }

    #[test]
    fn test_clock_saturates() {
        let before = now();
        assert!(before > 0);
        assert!(now() >= before);
        assert_eq!(deadline(Duration::MAX), i64::MAX);

        let forever = item(Duration::MAX);
        assert!(!forever.is_expired());
        assert!(forever.ttl() > Duration::from_secs(60 * 60 * 24 * 365));
    }

    #[test]
    fn test_item_expiry() {
        let live = item(Duration::from_secs(60));
        assert!(!live.is_expired());
        assert!(live.ttl() > Duration::from_secs(59));
        assert!(live.expires() > SystemTime::now());

        let stale = item(Duration::ZERO);
        assert!(stale.is_expired());
        assert_eq!(stale.ttl(), Duration::ZERO);

        stale.extend(Duration::from_secs(10));
        assert!(!stale.is_expired());
        assert!(stale.ttl() <= Duration::from_secs(10));
    }

    #[test]
    fn test_item_promotions() {
        let item = item(Duration::from_secs(60));
        assert!(!item.should_promote(3));
        assert!(!item.should_promote(3));
        assert!(item.should_promote(3));
        item.reset_promotions();
        assert!(!item.should_promote(3));
        assert!(item.should_promote(1));
    }

    #[test]
    fn test_item_state() {
        let item = item(Duration::from_secs(60));
        assert_eq!(item.state(), ItemState::Pending);
        assert_eq!(item.swap_state(ItemState::Active), ItemState::Pending);
        assert_eq!(item.swap_state(ItemState::Deleted), ItemState::Active);
        assert_eq!(item.swap_state(ItemState::Deleted), ItemState::Deleted);
        assert!(!item.is_linked());
    }

    #[test]
    fn test_tracked_item() {
        let item = item(Duration::from_secs(60));

        let t1 = TrackedItem::new(item.clone());
        let t2 = t1.clone();
        assert_eq!(item.refs(), 2);
        assert_eq!(t1.value(), Some(&42));
        assert!(!t1.is_expired());

        t1.release();
        assert_eq!(item.refs(), 1);
        drop(t2);
        assert_eq!(item.refs(), 0);

        let none = TrackedItem::<u64>::none();
        assert!(none.is_none());
        assert!(none.is_expired());
        assert_eq!(none.value(), None);
        assert_eq!(none.ttl(), None);
        none.release();
    }
}
