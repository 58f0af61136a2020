// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Knowledge Store
//!
//! A conflict-resolving key/value registry shared across squads. Each key
//! behaves as a last-writer-wins register ordered by [`ClockTimestamp`]s,
//! with a deterministic lexicographic tiebreak for concurrent writes so that
//! every replica converges to the same winner regardless of arrival order.
//!
//! Deletions are tombstones: entries are marked rather than removed so the
//! conflict rule keeps working across replicas, and are physically evicted
//! by [`KnowledgeStore::cleanup`].

use crate::domain::clock::{AgentId, CausalOrder, ClockTimestamp};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One versioned value in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub key: String,
    pub value: Value,
    pub timestamp: ClockTimestamp,
    pub owner: AgentId,
    pub version: u64,
    #[serde(default)]
    pub tombstone: bool,
}

/// Outcome of a [`KnowledgeStore::put`]. Writes never fail; they are either
/// applied or superseded by an entry the caller has not seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Applied,
    Superseded,
}

impl PutOutcome {
    pub fn applied(self) -> bool {
        matches!(self, PutOutcome::Applied)
    }
}

/// Glob-style key pattern: `*`, `prefix*`, or an exact key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    Any,
    Prefix(String),
    Exact(String),
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            KeyPattern::Any
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            KeyPattern::Prefix(prefix.to_string())
        } else {
            KeyPattern::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Any => true,
            KeyPattern::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::Exact(exact) => key == exact,
        }
    }
}

/// Change notification delivered to subscribers on every accepted write.
#[derive(Debug, Clone)]
pub struct KnowledgeUpdate {
    pub key: String,
    pub value: Value,
    pub timestamp: ClockTimestamp,
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

struct Subscription {
    id: SubscriptionId,
    pattern: KeyPattern,
    tx: mpsc::Sender<KnowledgeUpdate>,
}

/// Serialized snapshot of the store, used by [`KnowledgeStore::export`] and
/// [`KnowledgeStore::import`] to converge two replicas after a partition.
#[derive(Debug, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    pub entries: HashMap<String, KnowledgeEntry>,
    pub active_owners: HashMap<AgentId, DateTime<Utc>>,
}

struct StoreState {
    entries: HashMap<String, KnowledgeEntry>,
    active_owners: HashMap<AgentId, DateTime<Utc>>,
    subscriptions: Vec<Subscription>,
}

/// Conflict-resolving shared registry.
///
/// Explicitly owned and passed by reference to every component that needs it
/// at construction time; never a process-wide global.
pub struct KnowledgeStore {
    state: RwLock<StoreState>,
    subscriber_buffer: usize,
}

impl KnowledgeStore {
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            state: RwLock::new(StoreState {
                entries: HashMap::new(),
                active_owners: HashMap::new(),
                subscriptions: Vec::new(),
            }),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    /// Insert or resolve a write against any existing entry for `key`.
    pub fn put(&self, key: &str, value: Value, timestamp: ClockTimestamp) -> PutOutcome {
        let entry = KnowledgeEntry {
            key: key.to_string(),
            value,
            owner: timestamp.owner.clone(),
            version: timestamp.logical,
            timestamp,
            tombstone: false,
        };
        self.apply(entry)
    }

    /// Tombstone `key`. Goes through the same conflict rule as `put`, so a
    /// delete that lost the race to a newer write is superseded.
    pub fn remove(&self, key: &str, timestamp: ClockTimestamp) -> PutOutcome {
        let entry = KnowledgeEntry {
            key: key.to_string(),
            value: Value::Null,
            owner: timestamp.owner.clone(),
            version: timestamp.logical,
            timestamp,
            tombstone: true,
        };
        self.apply(entry)
    }

    /// Live value and timestamp for `key`, or `None` if absent or tombstoned.
    pub fn get(&self, key: &str) -> Option<(Value, ClockTimestamp)> {
        let state = self.state.read();
        state
            .entries
            .get(key)
            .filter(|e| !e.tombstone)
            .map(|e| (e.value.clone(), e.timestamp.clone()))
    }

    /// All live key/value pairs.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter(|(_, e)| !e.tombstone)
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.entries.values().filter(|e| !e.tombstone).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `handler` for every accepted write whose key matches
    /// `pattern`.
    ///
    /// Each subscription gets a bounded queue drained by its own worker task,
    /// so a slow handler backs up its own queue instead of the writer: a full
    /// queue drops the notification with a warning. Requires a tokio runtime.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(KnowledgeUpdate) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<KnowledgeUpdate>(self.subscriber_buffer);
        let id = SubscriptionId(Uuid::new_v4());
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                handler(update);
            }
        });
        let mut state = self.state.write();
        state.subscriptions.push(Subscription {
            id,
            pattern: KeyPattern::parse(pattern),
            tx,
        });
        id
    }

    /// Remove a subscription; its worker exits once the queue drains.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.write();
        state.subscriptions.retain(|s| s.id != id);
    }

    /// Owners that wrote within `window`.
    pub fn active_owners(&self, window: Duration) -> Vec<AgentId> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));
        let state = self.state.read();
        state
            .active_owners
            .iter()
            .filter(|(_, seen)| **seen > cutoff)
            .map(|(owner, _)| owner.clone())
            .collect()
    }

    /// Evict owners inactive past `owner_ttl` (with their entries) and cap
    /// each remaining owner's entry count at `per_owner_cap`, dropping oldest
    /// first. Idempotent: a second call with no intervening writes is a no-op.
    pub fn cleanup(&self, owner_ttl: Duration, per_owner_cap: usize) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(owner_ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut state = self.state.write();

        let inactive: Vec<AgentId> = state
            .active_owners
            .iter()
            .filter(|(_, seen)| **seen <= cutoff)
            .map(|(owner, _)| owner.clone())
            .collect();
        for owner in &inactive {
            state.active_owners.remove(owner);
            state.entries.retain(|_, e| e.owner != *owner);
            debug!(%owner, "evicted inactive owner");
        }

        let mut per_owner: HashMap<AgentId, Vec<(String, u64, DateTime<Utc>)>> = HashMap::new();
        for (key, entry) in &state.entries {
            per_owner.entry(entry.owner.clone()).or_default().push((
                key.clone(),
                entry.version,
                entry.timestamp.wall,
            ));
        }
        for (owner, mut keys) in per_owner {
            if keys.len() <= per_owner_cap {
                continue;
            }
            // Oldest first: version, then wall capture, then key for determinism.
            keys.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));
            let excess = keys.len() - per_owner_cap;
            for (key, _, _) in keys.into_iter().take(excess) {
                state.entries.remove(&key);
            }
            debug!(%owner, excess, "capped owner entries");
        }
    }

    /// Serialize the full entry set (tombstones included) to JSON.
    pub fn export(&self) -> anyhow::Result<Vec<u8>> {
        let state = self.state.read();
        let snapshot = KnowledgeSnapshot {
            entries: state.entries.clone(),
            active_owners: state.active_owners.clone(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Merge a serialized snapshot, applying the `put` conflict rule to every
    /// incoming entry. Two stores that import each other's exports converge.
    pub fn import(&self, data: &[u8]) -> anyhow::Result<usize> {
        let snapshot: KnowledgeSnapshot = serde_json::from_slice(data)?;
        let mut applied = 0;
        for (_, entry) in snapshot.entries {
            if self.apply(entry).applied() {
                applied += 1;
            }
        }
        let mut state = self.state.write();
        for (owner, seen) in snapshot.active_owners {
            let slot = state.active_owners.entry(owner).or_insert(seen);
            if seen > *slot {
                *slot = seen;
            }
        }
        Ok(applied)
    }

    fn apply(&self, entry: KnowledgeEntry) -> PutOutcome {
        let update = KnowledgeUpdate {
            key: entry.key.clone(),
            value: entry.value.clone(),
            timestamp: entry.timestamp.clone(),
        };
        let tombstone = entry.tombstone;

        let (outcome, receivers) = {
            let mut state = self.state.write();
            state
                .active_owners
                .insert(entry.owner.clone(), Utc::now());

            let outcome = match state.entries.get(&entry.key) {
                None => {
                    state.entries.insert(entry.key.clone(), entry);
                    PutOutcome::Applied
                }
                Some(existing) => match existing.timestamp.compare(&entry.timestamp) {
                    CausalOrder::Before => {
                        state.entries.insert(entry.key.clone(), entry);
                        PutOutcome::Applied
                    }
                    CausalOrder::After => PutOutcome::Superseded,
                    CausalOrder::Concurrent => {
                        // Deterministic tiebreak: the lexicographically greater
                        // owner wins, so every replica picks the same entry.
                        if entry.owner > existing.owner {
                            state.entries.insert(entry.key.clone(), entry);
                            PutOutcome::Applied
                        } else {
                            PutOutcome::Superseded
                        }
                    }
                    CausalOrder::Equal => {
                        if existing.owner != entry.owner {
                            warn!(
                                key = %entry.key,
                                existing = %existing.owner,
                                incoming = %entry.owner,
                                "equal timestamps from different owners"
                            );
                            state.entries.insert(entry.key.clone(), entry);
                            PutOutcome::Applied
                        } else {
                            PutOutcome::Superseded
                        }
                    }
                },
            };

            let receivers: Vec<mpsc::Sender<KnowledgeUpdate>> = if outcome.applied() && !tombstone
            {
                state
                    .subscriptions
                    .iter()
                    .filter(|s| s.pattern.matches(&update.key))
                    .map(|s| s.tx.clone())
                    .collect()
            } else {
                Vec::new()
            };
            (outcome, receivers)
        };

        // Notify outside the lock; a full or closed queue never blocks the writer.
        for tx in receivers {
            if let Err(err) = tx.try_send(update.clone()) {
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!(key = %update.key, "subscriber queue full, dropping update")
                    }
                    mpsc::error::TrySendError::Closed(_) => {}
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::VectorClock;
    use serde_json::json;

    fn clock(owner: &str) -> VectorClock {
        VectorClock::new(AgentId::from(owner))
    }

    #[test]
    fn newer_write_replaces_older() {
        let store = KnowledgeStore::new(8);
        let vc = clock("alpha");

        assert!(store.put("k", json!(1), vc.tick()).applied());
        assert!(store.put("k", json!(2), vc.tick()).applied());
        assert_eq!(store.get("k").unwrap().0, json!(2));
    }

    #[test]
    fn older_write_is_superseded() {
        let store = KnowledgeStore::new(8);
        let vc = clock("alpha");
        let old = vc.tick();
        let new = vc.tick();

        assert!(store.put("k", json!("new"), new).applied());
        assert_eq!(store.put("k", json!("old"), old), PutOutcome::Superseded);
        assert_eq!(store.get("k").unwrap().0, json!("new"));
    }

    #[test]
    fn concurrent_writes_pick_greater_owner_either_order() {
        let ts_a = clock("squad-a").tick();
        let ts_b = clock("squad-b").tick();
        assert_eq!(ts_a.compare(&ts_b), CausalOrder::Concurrent);

        let first = KnowledgeStore::new(8);
        first.put("status:ready", json!("from-a"), ts_a.clone());
        first.put("status:ready", json!("from-b"), ts_b.clone());

        let second = KnowledgeStore::new(8);
        second.put("status:ready", json!("from-b"), ts_b);
        second.put("status:ready", json!("from-a"), ts_a);

        assert_eq!(first.get("status:ready").unwrap().0, json!("from-b"));
        assert_eq!(second.get("status:ready").unwrap().0, json!("from-b"));
    }

    #[test]
    fn tombstone_hides_key_until_newer_write() {
        let store = KnowledgeStore::new(8);
        let vc = clock("alpha");

        store.put("k", json!(1), vc.tick());
        assert!(store.remove("k", vc.tick()).applied());
        assert!(store.get("k").is_none());
        assert_eq!(store.len(), 0);

        store.put("k", json!(2), vc.tick());
        assert_eq!(store.get("k").unwrap().0, json!(2));
    }

    #[test]
    fn redelivered_own_write_is_a_no_op() {
        let store = KnowledgeStore::new(8);
        let ts = clock("alpha").tick();
        assert!(store.put("k", json!(1), ts.clone()).applied());
        assert_eq!(store.put("k", json!(1), ts), PutOutcome::Superseded);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let store = KnowledgeStore::new(8);
        let vc = clock("alpha");
        for i in 0..5 {
            store.put(&format!("k{i}"), json!(i), vc.tick());
        }

        store.cleanup(Duration::from_secs(3600), 3);
        let after_first = store.snapshot();
        assert_eq!(after_first.len(), 3);

        store.cleanup(Duration::from_secs(3600), 3);
        assert_eq!(store.snapshot(), after_first);
    }

    #[test]
    fn cleanup_evicts_inactive_owner_entries() {
        let store = KnowledgeStore::new(8);
        store.put("gone", json!(1), clock("idle").tick());
        store.cleanup(Duration::ZERO, 100);
        assert!(store.get("gone").is_none());
        assert!(store.active_owners(Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn export_import_converges_across_partition() {
        let left = KnowledgeStore::new(8);
        let right = KnowledgeStore::new(8);
        let ts_a = clock("squad-a").tick();
        let ts_b = clock("squad-b").tick();

        left.put("k", json!("left"), ts_a);
        right.put("k", json!("right"), ts_b);

        left.import(&right.export().unwrap()).unwrap();
        right.import(&left.export().unwrap()).unwrap();

        assert_eq!(left.get("k").unwrap().0, json!("right"));
        assert_eq!(right.get("k").unwrap().0, json!("right"));
    }

    #[test]
    fn key_pattern_matching() {
        assert!(KeyPattern::parse("*").matches("anything"));
        assert!(KeyPattern::parse("status:*").matches("status:ready"));
        assert!(!KeyPattern::parse("status:*").matches("message:1"));
        assert!(KeyPattern::parse("exact").matches("exact"));
        assert!(!KeyPattern::parse("exact").matches("exact-not"));
    }

    #[tokio::test]
    async fn subscribers_receive_accepted_writes() {
        let store = KnowledgeStore::new(8);
        let (tx, mut rx) = mpsc::channel(8);
        store.subscribe("status:*", move |update| {
            let _ = tx.try_send(update.key);
        });

        let vc = clock("alpha");
        store.put("status:ready", json!(true), vc.tick());
        store.put("message:1", json!("ignored"), vc.tick());

        let key = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("subscriber notified")
            .unwrap();
        assert_eq!(key, "status:ready");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_notifications() {
        let store = KnowledgeStore::new(8);
        let (tx, mut rx) = mpsc::channel(8);
        let id = store.subscribe("*", move |update| {
            let _ = tx.try_send(update.key);
        });
        store.unsubscribe(id);

        store.put("k", json!(1), clock("alpha").tick());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
