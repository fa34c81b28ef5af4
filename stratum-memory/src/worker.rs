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

use std::{collections::VecDeque, sync::Arc, thread::JoinHandle};

use arc_swap::ArcSwapOption;
use flume::{Receiver, Selector, Sender, TryRecvError, TrySendError};
use intrusive_collections::LinkedList;
use parking_lot::Mutex;
use stratum_common::{
    code::Value,
    event::{Event, EventListener},
    strict_assert, strict_assert_eq,
};

use crate::{
    config::CacheConfig,
    error::Result,
    item::{Item, ItemAdapter, ItemState},
};

/// The shard side of a cache, as seen by the collector.
pub(crate) trait Shards<V>: Send + Sync + 'static
where
    V: Value,
{
    /// Remove `item` from its shard if the shard still maps its key to it.
    fn delete_item(&self, item: &Arc<Item<V>>) -> bool;
}

pub(crate) enum Command<V>
where
    V: Value,
{
    Delete { item: Arc<Item<V>>, reason: Event },
    Clear { items: Vec<Arc<Item<V>>>, done: Sender<()> },
    Sync { done: Sender<()> },
    GetDropped { tx: Sender<usize> },
}

enum Message<V>
where
    V: Value,
{
    Promote(Arc<Item<V>>),
    Command(Command<V>),
    Closed,
}

/// Handle of the worker thread that owns the recency list and the size counter.
///
/// Cache operations only talk to the worker through two bounded queues: promotions, which are dropped when the
/// queue is full, and commands (deletions mostly), which block when the queue is full.
pub(crate) struct Worker<V>
where
    V: Value,
{
    promote_tx: ArcSwapOption<Sender<Arc<Item<V>>>>,
    command_tx: Sender<Command<V>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<V> Worker<V>
where
    V: Value,
{
    pub fn spawn<S>(config: &CacheConfig<V>, shards: Arc<S>) -> Result<Self>
    where
        S: Shards<V>,
    {
        let (promote_tx, promote_rx) = flume::bounded(config.promote_buffer);
        let (command_tx, command_rx) = flume::bounded(config.delete_buffer);

        let runner = Runner {
            promote_rx,
            command_rx,
            list: LinkedList::new(ItemAdapter::new()),
            size: 0,
            dropped: 0,
            max_size: config.max_size,
            items_to_prune: config.items_to_prune,
            gets_per_promote: config.gets_per_promote,
            tracking: config.tracking,
            event_listener: config.event_listener.clone(),
            deferred: VecDeque::new(),
            shards,
        };

        let handle = std::thread::Builder::new()
            .name("stratum-worker".to_string())
            .spawn(move || runner.run())?;

        Ok(Self {
            promote_tx: ArcSwapOption::new(Some(Arc::new(promote_tx))),
            command_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Best-effort promotion of a read. Skipped if the promotion queue is full.
    pub fn promote(&self, item: Arc<Item<V>>) {
        if let Some(tx) = &*self.promote_tx.load() {
            match tx.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(item)) => {
                    tracing::trace!(key = item.key(), "[worker]: promotion queue is full, skip promotion");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// Promotion of a newly inserted item. Blocks if the promotion queue is full.
    pub fn insert(&self, item: Arc<Item<V>>) {
        match &*self.promote_tx.load() {
            Some(tx) => {
                if let Err(e) = tx.send(item) {
                    let item = e.into_inner();
                    tracing::warn!(key = item.key(), "[worker]: cannot promote new item after stopped");
                }
            }
            None => tracing::warn!(key = item.key(), "[worker]: cannot promote new item after stopped"),
        }
    }

    /// Hand a removed item over to the worker. Blocks if the command queue is full.
    pub fn delete(&self, item: Arc<Item<V>>, reason: Event) {
        if let Err(e) = self.command_tx.send(Command::Delete { item, reason }) {
            if let Command::Delete { item, .. } = e.into_inner() {
                tracing::warn!(key = item.key(), "[worker]: cannot delete item after stopped");
            }
        }
    }

    /// Reset the recency list and the size counter, notifying the listener for `items`.
    ///
    /// Returns after the worker has processed the clear.
    pub fn clear(&self, items: Vec<Arc<Item<V>>>) {
        let (done, rx) = flume::bounded(1);
        if self.command_tx.send(Command::Clear { items, done }).is_err() {
            tracing::warn!("[worker]: cannot clear after stopped");
            return;
        }
        let _ = rx.recv();
    }

    /// Wait until every event enqueued before this call has been processed.
    pub fn sync(&self) {
        let (done, rx) = flume::bounded(1);
        if self.command_tx.send(Command::Sync { done }).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Number of items evicted by the collector since the last call.
    pub fn get_dropped(&self) -> usize {
        let (tx, rx) = flume::bounded(1);
        if self.command_tx.send(Command::GetDropped { tx }).is_err() {
            return 0;
        }
        rx.recv().unwrap_or_default()
    }

    /// Close the promotion queue and wait for the worker to drain pending commands and exit.
    pub fn stop(&self) {
        self.promote_tx.store(None);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("[worker]: worker thread panicked");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.promote_tx.load().is_none()
    }
}

impl<V> Drop for Worker<V>
where
    V: Value,
{
    fn drop(&mut self) {
        self.stop();
    }
}

struct Runner<V, S>
where
    V: Value,
    S: Shards<V>,
{
    promote_rx: Receiver<Arc<Item<V>>>,
    command_rx: Receiver<Command<V>>,

    list: LinkedList<ItemAdapter<V>>,
    size: i64,
    dropped: usize,

    max_size: i64,
    items_to_prune: usize,
    gets_per_promote: i32,
    tracking: bool,
    event_listener: Option<Arc<dyn EventListener<Item<V>>>>,

    /// Non-deletion commands pulled off the queue while catching up on deletions, handled in arrival order.
    deferred: VecDeque<Command<V>>,

    shards: Arc<S>,
}

impl<V, S> Runner<V, S>
where
    V: Value,
    S: Shards<V>,
{
    fn run(mut self) {
        tracing::debug!("[worker]: start");

        loop {
            let msg = Selector::new()
                .recv(&self.promote_rx, |res| res.map(Message::Promote).unwrap_or(Message::Closed))
                .recv(&self.command_rx, |res| res.map(Message::Command).unwrap_or(Message::Closed))
                .wait();
            match msg {
                Message::Promote(item) => self.promote(item),
                Message::Command(cmd) => self.handle(cmd),
                Message::Closed => break,
            }
            self.handle_deferred();
        }

        // Promotions are closed. Deletions still queued must not be lost.
        self.handle_deferred();
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle(cmd),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        tracing::debug!(size = self.size, "[worker]: exit");
    }

    fn handle(&mut self, cmd: Command<V>) {
        match cmd {
            Command::Delete { item, reason } => self.delete(item, reason),
            Command::Clear { items, done } => {
                self.clear(items);
                let _ = done.send(());
            }
            Command::Sync { done } => {
                while let Ok(item) = self.promote_rx.try_recv() {
                    self.promote(item);
                }
                let _ = done.send(());
            }
            Command::GetDropped { tx } => {
                let _ = tx.send(self.dropped);
                self.dropped = 0;
            }
        }
    }

    fn handle_deferred(&mut self) {
        while let Some(cmd) = self.deferred.pop_front() {
            self.handle(cmd);
        }
    }

    /// Apply every queued deletion before a promotion.
    ///
    /// A writer enqueues the deletion of a superseded item before the insertion of its successor, so once the
    /// insertion is received here the deletion is already queued. Other commands keep their order in `deferred`.
    fn catch_up_deletions(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                Command::Delete { item, reason } => self.delete(item, reason),
                cmd => self.deferred.push_back(cmd),
            }
        }
    }

    fn promote(&mut self, item: Arc<Item<V>>) {
        self.catch_up_deletions();
        match item.state() {
            ItemState::Deleted => {}
            ItemState::Active => {
                // An active item that is not linked has been dropped from the list by a clear and is waiting for its
                // deletion.
                if item.is_linked() && item.should_promote(self.gets_per_promote) {
                    let item = unsafe { self.list.remove_from_ptr(Arc::as_ptr(&item)) };
                    item.reset_promotions();
                    self.list.push_front(item);
                }
            }
            ItemState::Pending => {
                strict_assert!(!item.is_linked());
                item.swap_state(ItemState::Active);
                self.size += item.size();
                tracing::trace!(key = item.key(), size = self.size, "[worker]: insert");
                self.list.push_front(item);
                if self.size > self.max_size {
                    self.gc();
                }
            }
        }
    }

    fn delete(&mut self, item: Arc<Item<V>>, reason: Event) {
        if item.is_linked() {
            unsafe { self.list.remove_from_ptr(Arc::as_ptr(&item)) };
            self.size -= item.size();
        }
        // An item deleted before its promotion is marked here so that the late promotion is ignored.
        if item.swap_state(ItemState::Deleted) != ItemState::Deleted {
            tracing::trace!(key = item.key(), ?reason, size = self.size, "[worker]: delete");
            self.notify(reason, &item);
        }
    }

    fn clear(&mut self, items: Vec<Arc<Item<V>>>) {
        let count = items.len();
        for item in items {
            if item.swap_state(ItemState::Deleted) != ItemState::Deleted {
                self.notify(Event::Clear, &item);
            }
        }
        self.list.clear();
        self.size = 0;
        tracing::debug!(count, "[worker]: clear");
    }

    /// Evict from the tail of the recency list until the size fits the budget, visiting at most `items_to_prune`
    /// items. Referenced items of a tracking cache are skipped.
    fn gc(&mut self) {
        let mut next = self.list.back().clone_pointer();
        let mut visited = 0;
        let mut evicted = 0;

        while visited < self.items_to_prune && self.size > self.max_size {
            let Some(item) = next.take() else {
                break;
            };
            visited += 1;
            next = {
                let mut cursor = unsafe { self.list.cursor_from_ptr(Arc::as_ptr(&item)) };
                cursor.move_prev();
                cursor.clone_pointer()
            };

            if self.tracking && item.refs() > 0 {
                continue;
            }

            self.shards.delete_item(&item);
            unsafe { self.list.remove_from_ptr(Arc::as_ptr(&item)) };
            self.size -= item.size();
            let old = item.swap_state(ItemState::Deleted);
            strict_assert_eq!(old, ItemState::Active);
            tracing::trace!(key = item.key(), group = item.group(), "[worker]: evict");
            self.notify(Event::Evict, &item);
            evicted += 1;
        }
        self.dropped += evicted;

        tracing::debug!(visited, evicted, size = self.size, "[worker]: collect");
    }

    fn notify(&self, reason: Event, item: &Item<V>) {
        if let Some(listener) = self.event_listener.as_ref() {
            listener.on_leave(reason, item);
        }
    }
}
