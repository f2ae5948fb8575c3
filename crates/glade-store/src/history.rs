//! History store (C8): per-group append of `(outer_cursor, rumor)` pairs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use glade_codec::event::EventId;
use glade_codec::{OuterCursor, Rumor};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// One persisted `(rumor, outer cursor)` pair (E8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// The decrypted application rumor.
    pub rumor: Rumor,
    /// The outer transport event's cursor this rumor arrived bound to.
    pub outer: OuterCursor,
}

/// Opaque handle returned by [`HistoryStore::subscribe`]; pass back to
/// [`HistoryStore::unsubscribe`] to stop receiving callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Per-group history: idempotent append, monotonic resume cursor, stable
/// pagination, and a "subscribe after durable persistence" live feed (§4.7).
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Idempotently mark `outer` processed; advances the resume watermark if `outer` is newer.
    async fn mark_outer_event_processed(&self, outer: OuterCursor) -> Result<(), StoreError>;
    /// The greatest processed outer cursor, if any event has been processed yet.
    async fn resume_cursor(&self) -> Result<Option<OuterCursor>, StoreError>;
    /// Idempotently persist a rumor (no-op if `entry.rumor.id` was already recorded).
    async fn add_rumor(&self, entry: HistoryEntry) -> Result<(), StoreError>;
    /// Query rumors newest-first; if `until` is given, strictly older than that cursor.
    async fn query_rumors(
        &self,
        until: Option<OuterCursor>,
        limit: usize,
    ) -> Result<Vec<Rumor>, StoreError>;
    /// Register a callback invoked once per newly persisted entry, after it durably lands.
    async fn subscribe(
        &self,
        handler: Box<dyn Fn(&HistoryEntry) + Send + Sync>,
    ) -> Result<SubscriptionId, StoreError>;
    /// Stop a previously registered subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError>;
}

#[derive(Default)]
struct State {
    resume_cursor: Option<OuterCursor>,
    processed_outer_ids: std::collections::HashSet<EventId>,
    seen_rumor_ids: std::collections::HashSet<EventId>,
    entries: Vec<HistoryEntry>,
    subscribers: HashMap<u64, Box<dyn Fn(&HistoryEntry) + Send + Sync>>,
}

/// In-memory reference implementation, for tests and single-process use.
pub struct InMemoryHistoryStore {
    state: RwLock<State>,
    next_subscriber_id: AtomicU64,
}

impl InMemoryHistoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        InMemoryHistoryStore {
            state: RwLock::new(State::default()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn mark_outer_event_processed(&self, outer: OuterCursor) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.processed_outer_ids.insert(outer.id) {
            return Ok(());
        }
        if state.resume_cursor.is_none_or(|current| outer > current) {
            state.resume_cursor = Some(outer);
        }
        Ok(())
    }

    async fn resume_cursor(&self) -> Result<Option<OuterCursor>, StoreError> {
        Ok(self.state.read().await.resume_cursor)
    }

    async fn add_rumor(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.seen_rumor_ids.insert(entry.rumor.id) {
            return Ok(());
        }
        let insert_at = state
            .entries
            .partition_point(|existing| existing.outer <= entry.outer);
        state.entries.insert(insert_at, entry.clone());
        for handler in state.subscribers.values() {
            handler(&entry);
        }
        Ok(())
    }

    async fn query_rumors(
        &self,
        until: Option<OuterCursor>,
        limit: usize,
    ) -> Result<Vec<Rumor>, StoreError> {
        let state = self.state.read().await;
        let mut rumors: Vec<Rumor> = state
            .entries
            .iter()
            .rev()
            .filter(|entry| until.is_none_or(|cursor| entry.outer < cursor))
            .map(|entry| entry.rumor.clone())
            .collect();
        if limit > 0 {
            rumors.truncate(limit);
        }
        Ok(rumors)
    }

    async fn subscribe(
        &self,
        handler: Box<dyn Fn(&HistoryEntry) + Send + Sync>,
    ) -> Result<SubscriptionId, StoreError> {
        let id = self.next_subscriber_id.fetch_add(1, AtomicOrdering::SeqCst);
        self.state.write().await.subscribers.insert(id, handler);
        Ok(SubscriptionId(id))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        self.state.write().await.subscribers.remove(&id.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glade_codec::event::PubKey;
    use std::sync::{Arc, Mutex};

    fn rumor(id_byte: u8) -> Rumor {
        Rumor::new(PubKey([1u8; 32]), 1000, 9, vec![], format!("msg-{id_byte}"))
    }

    fn cursor(created_at: i64, id_byte: u8) -> OuterCursor {
        OuterCursor::new(created_at, EventId([id_byte; 32]))
    }

    #[tokio::test]
    async fn resume_cursor_advances_monotonically() {
        let store = InMemoryHistoryStore::new();
        store
            .mark_outer_event_processed(cursor(10, 1))
            .await
            .expect("mark");
        store
            .mark_outer_event_processed(cursor(5, 2))
            .await
            .expect("mark");
        assert_eq!(store.resume_cursor().await.unwrap(), Some(cursor(10, 1)));
        store
            .mark_outer_event_processed(cursor(20, 3))
            .await
            .expect("mark");
        assert_eq!(store.resume_cursor().await.unwrap(), Some(cursor(20, 3)));
    }

    #[tokio::test]
    async fn add_rumor_is_idempotent_on_rumor_id() {
        let store = InMemoryHistoryStore::new();
        let entry = HistoryEntry {
            rumor: rumor(1),
            outer: cursor(10, 1),
        };
        store.add_rumor(entry.clone()).await.expect("add");
        store.add_rumor(entry).await.expect("add again");
        let rumors = store.query_rumors(None, 0).await.expect("query");
        assert_eq!(rumors.len(), 1);
    }

    #[tokio::test]
    async fn query_rumors_is_newest_first() {
        let store = InMemoryHistoryStore::new();
        store
            .add_rumor(HistoryEntry {
                rumor: rumor(1),
                outer: cursor(10, 1),
            })
            .await
            .unwrap();
        store
            .add_rumor(HistoryEntry {
                rumor: rumor(2),
                outer: cursor(20, 2),
            })
            .await
            .unwrap();
        let rumors = store.query_rumors(None, 0).await.expect("query");
        assert_eq!(rumors, vec![rumor(2), rumor(1)]);
    }

    #[tokio::test]
    async fn query_rumors_respects_until_and_limit() {
        let store = InMemoryHistoryStore::new();
        for (created_at, id_byte) in [(10, 1), (20, 2), (30, 3)] {
            store
                .add_rumor(HistoryEntry {
                    rumor: rumor(id_byte),
                    outer: cursor(created_at, id_byte),
                })
                .await
                .unwrap();
        }
        let page = store
            .query_rumors(Some(cursor(30, 3)), 1)
            .await
            .expect("query");
        assert_eq!(page, vec![rumor(2)]);
    }

    #[tokio::test]
    async fn subscribers_fire_only_for_newly_persisted_entries() {
        let store = InMemoryHistoryStore::new();
        let seen: Arc<Mutex<Vec<EventId>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store
            .subscribe(Box::new(move |entry| {
                seen_clone.lock().unwrap().push(entry.rumor.id);
            }))
            .await
            .expect("subscribe");

        let entry = HistoryEntry {
            rumor: rumor(1),
            outer: cursor(10, 1),
        };
        store.add_rumor(entry.clone()).await.unwrap();
        store.add_rumor(entry.clone()).await.unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), [entry.rumor.id]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_callbacks() {
        let store = InMemoryHistoryStore::new();
        let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let seen_clone = seen.clone();
        let id = store
            .subscribe(Box::new(move |_| {
                *seen_clone.lock().unwrap() += 1;
            }))
            .await
            .expect("subscribe");
        store.unsubscribe(id).await.expect("unsubscribe");
        store
            .add_rumor(HistoryEntry {
                rumor: rumor(1),
                outer: cursor(10, 1),
            })
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
