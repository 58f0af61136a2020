// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Vector Clock — Causality Tracking
//!
//! Every squad carries a [`VectorClock`] that stamps local events with a
//! [`ClockTimestamp`]. Timestamps are partially ordered: two timestamps
//! compare to exactly one of [`CausalOrder::Before`], [`CausalOrder::After`],
//! [`CausalOrder::Equal`], or [`CausalOrder::Concurrent`] by per-owner
//! counter dominance. Wall-clock capture is informational only and never
//! participates in ordering.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Identity of one autonomous squad (owner of a clock and knowledge writes).
///
/// Backed by a plain string so concurrent-write tiebreaks can use
/// lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Relationship between two [`ClockTimestamp`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CausalOrder {
    Before,
    After,
    Equal,
    Concurrent,
}

/// A causality-stamped point in time for one owner.
///
/// Immutable after creation; each [`VectorClock::tick`] produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTimestamp {
    /// The squad that produced this timestamp.
    pub owner: AgentId,
    /// The owner's logical counter at the time of capture.
    pub logical: u64,
    /// Last-observed counter for every known owner (including `owner`).
    pub observed: HashMap<AgentId, u64>,
    /// Wall-clock capture. Informational only; never used for ordering.
    pub wall: DateTime<Utc>,
}

impl ClockTimestamp {
    /// Compare two timestamps by per-owner counter dominance.
    ///
    /// Missing owners count as zero, so timestamps from clocks with disjoint
    /// membership still order correctly.
    pub fn compare(&self, other: &ClockTimestamp) -> CausalOrder {
        let mut self_le = true;
        let mut other_le = true;

        for owner in self.observed.keys().chain(other.observed.keys()) {
            let a = self.observed.get(owner).copied().unwrap_or(0);
            let b = other.observed.get(owner).copied().unwrap_or(0);
            if a > b {
                self_le = false;
            }
            if b > a {
                other_le = false;
            }
        }

        match (self_le, other_le) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (false, false) => CausalOrder::Concurrent,
        }
    }
}

/// Snapshot of a clock's state for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSummary {
    pub owner: AgentId,
    pub logical: u64,
    pub known_owners: usize,
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
}

struct ClockState {
    logical: u64,
    observed: HashMap<AgentId, u64>,
    last_seen: HashMap<AgentId, Instant>,
}

/// Per-squad logical clock.
///
/// All mutation goes through the exclusive lock path ([`tick`](Self::tick),
/// [`observe`](Self::observe)); reads take the shared path. The clock never
/// fails — it is a pure, always-succeeding primitive.
pub struct VectorClock {
    owner: AgentId,
    state: RwLock<ClockState>,
    started_at: Instant,
}

impl VectorClock {
    pub fn new(owner: AgentId) -> Self {
        Self {
            owner,
            state: RwLock::new(ClockState {
                logical: 0,
                observed: HashMap::new(),
                last_seen: HashMap::new(),
            }),
            started_at: Instant::now(),
        }
    }

    pub fn owner(&self) -> &AgentId {
        &self.owner
    }

    /// Advance the local counter and return a fresh timestamp.
    pub fn tick(&self) -> ClockTimestamp {
        let mut state = self.state.write();
        self.advance(&mut state)
    }

    /// Fold a received timestamp into local state (counter-wise max), then
    /// tick — receipt of a message is itself a causal event.
    pub fn observe(&self, remote: &ClockTimestamp) -> ClockTimestamp {
        let mut state = self.state.write();
        let now = Instant::now();
        for (owner, &counter) in &remote.observed {
            let slot = state.observed.entry(owner.clone()).or_insert(0);
            if counter > *slot {
                *slot = counter;
            }
            state.last_seen.insert(owner.clone(), now);
        }
        self.advance(&mut state)
    }

    /// Current view without advancing the counter.
    pub fn now(&self) -> ClockTimestamp {
        let state = self.state.read();
        ClockTimestamp {
            owner: self.owner.clone(),
            logical: state.logical,
            observed: state.observed.clone(),
            wall: Utc::now(),
        }
    }

    /// Drop foreign owners not observed within `retention`.
    ///
    /// Best-effort memory bound, not correctness-critical: a pruned owner
    /// reappears (at its full counter) the next time it is observed.
    pub fn prune(&self, retention: Duration) {
        let mut state = self.state.write();
        let cutoff = Instant::now();
        let owner = self.owner.clone();
        let last_seen = std::mem::take(&mut state.last_seen);
        let (kept, stale): (HashMap<_, _>, HashMap<_, _>) = last_seen
            .into_iter()
            .partition(|(_, seen)| cutoff.duration_since(*seen) <= retention);
        for id in stale.keys() {
            if *id != owner {
                state.observed.remove(id);
                tracing::debug!(owner = %id, "pruned stale clock entry");
            }
        }
        state.last_seen = kept;
    }

    /// Status snapshot for the coordination loop.
    pub fn summary(&self) -> ClockSummary {
        let state = self.state.read();
        ClockSummary {
            owner: self.owner.clone(),
            logical: state.logical,
            known_owners: state.observed.len(),
            uptime: self.started_at.elapsed(),
        }
    }

    fn advance(&self, state: &mut ClockState) -> ClockTimestamp {
        state.logical += 1;
        let logical = state.logical;
        state.observed.insert(self.owner.clone(), logical);
        ClockTimestamp {
            owner: self.owner.clone(),
            logical,
            observed: state.observed.clone(),
            wall: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_monotonic() {
        let clock = VectorClock::new(AgentId::from("alpha"));
        let a = clock.tick();
        let b = clock.tick();
        assert_eq!(a.logical, 1);
        assert_eq!(b.logical, 2);
        assert_eq!(a.compare(&b), CausalOrder::Before);
        assert_eq!(b.compare(&a), CausalOrder::After);
    }

    #[test]
    fn observe_merges_and_advances() {
        let alpha = VectorClock::new(AgentId::from("alpha"));
        let beta = VectorClock::new(AgentId::from("beta"));

        let from_alpha = alpha.tick();
        let merged = beta.observe(&from_alpha);

        assert_eq!(merged.observed.get(&AgentId::from("alpha")), Some(&1));
        assert_eq!(merged.observed.get(&AgentId::from("beta")), Some(&1));
        // A later alpha tick that never saw beta is concurrent with beta's view.
        let alpha_again = alpha.tick();
        assert_eq!(merged.compare(&alpha_again), CausalOrder::Concurrent);
    }

    #[test]
    fn independent_ticks_are_concurrent_both_ways() {
        let alpha = VectorClock::new(AgentId::from("alpha"));
        let beta = VectorClock::new(AgentId::from("beta"));
        let a = alpha.tick();
        let b = beta.tick();
        assert_eq!(a.compare(&b), CausalOrder::Concurrent);
        assert_eq!(b.compare(&a), CausalOrder::Concurrent);
    }

    #[test]
    fn identical_views_are_equal() {
        let alpha = VectorClock::new(AgentId::from("alpha"));
        let a = alpha.tick();
        let same = a.clone();
        assert_eq!(a.compare(&same), CausalOrder::Equal);
    }

    #[test]
    fn causal_chain_orders_before() {
        let alpha = VectorClock::new(AgentId::from("alpha"));
        let beta = VectorClock::new(AgentId::from("beta"));
        let a = alpha.tick();
        let b = beta.observe(&a);
        assert_eq!(a.compare(&b), CausalOrder::Before);
        assert_eq!(b.compare(&a), CausalOrder::After);
    }

    #[test]
    fn prune_drops_stale_foreign_owners_only() {
        let alpha = VectorClock::new(AgentId::from("alpha"));
        let beta = VectorClock::new(AgentId::from("beta"));
        alpha.observe(&beta.tick());

        assert_eq!(alpha.summary().known_owners, 2);
        alpha.prune(Duration::ZERO);
        let ts = alpha.now();
        assert!(ts.observed.contains_key(&AgentId::from("alpha")));
        assert!(!ts.observed.contains_key(&AgentId::from("beta")));

        // Recently observed owners survive a generous retention window.
        alpha.observe(&beta.tick());
        alpha.prune(Duration::from_secs(3600));
        assert!(alpha.now().observed.contains_key(&AgentId::from("beta")));
    }

    #[test]
    fn summary_reflects_logical_counter() {
        let clock = VectorClock::new(AgentId::from("alpha"));
        clock.tick();
        clock.tick();
        let summary = clock.summary();
        assert_eq!(summary.logical, 2);
        assert_eq!(summary.owner, AgentId::from("alpha"));
        assert_eq!(summary.known_owners, 1);
    }
}
