// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Synchronization Pipeline
//!
//! Reconciles local state against the durable store in five stages:
//! fetch → detect → resolve → pull → push. Each invocation runs to
//! completion or aborts at the first failing stage; either way the
//! [`SyncStatus`] counters are updated so the coordination loop can react
//! without the failure ever being fatal to its own cycle.

use crate::domain::clock::AgentId;
use crate::domain::sync::{DurableStore, ResolutionPolicy, Side, SyncStatus};
use anyhow::Result;
use chrono::Utc;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Five-stage reconciliation pipeline with per-outcome statistics.
pub struct SyncPipeline {
    owner: AgentId,
    store: Arc<dyn DurableStore>,
    policy: Arc<dyn ResolutionPolicy>,
    status: RwLock<SyncStatus>,
}

impl SyncPipeline {
    pub fn new(
        owner: AgentId,
        store: Arc<dyn DurableStore>,
        policy: Arc<dyn ResolutionPolicy>,
    ) -> Self {
        Self {
            owner,
            store,
            policy,
            status: RwLock::new(SyncStatus::default()),
        }
    }

    /// Run one full reconciliation.
    ///
    /// A failed stage aborts the remaining stages, records the error, and
    /// leaves the conflict flag set; only a fully successful run clears it.
    pub async fn run(&self) -> Result<()> {
        {
            let mut status = self.status.write();
            status.in_progress = true;
        }

        let outcome = self.run_stages().await;

        let mut status = self.status.write();
        status.in_progress = false;
        status.last_sync = Utc::now();
        match &outcome {
            Ok(()) => {
                status.last_error = None;
                status.has_conflicts = false;
                status.conflict_count = 0;
                status.successful_syncs += 1;
                counter!("squad_sync_success_total").increment(1);
                gauge!("squad_sync_conflicts").set(0.0);
            }
            Err(err) => {
                warn!(owner = %self.owner, error = %err, "sync run failed");
                status.last_error = Some(err.to_string());
                status.has_conflicts = true;
                status.failed_syncs += 1;
                counter!("squad_sync_failure_total").increment(1);
            }
        }

        outcome
    }

    async fn run_stages(&self) -> Result<()> {
        self.store.fetch().await?;

        let conflicts = self.store.check_conflicts().await?;
        {
            let mut status = self.status.write();
            status.has_conflicts = !conflicts.is_empty();
            status.conflict_count = conflicts.len();
        }
        gauge!("squad_sync_conflicts").set(conflicts.len() as f64);

        for path in &conflicts {
            match self.policy.classify(path) {
                Side::Local => {
                    debug!(path = %path.display(), "resolving conflict with local side");
                    self.store.resolve_ours(path).await?;
                }
                Side::Remote => {
                    debug!(path = %path.display(), "resolving conflict with remote side");
                    self.store.resolve_theirs(path).await?;
                }
            }
        }
        if !conflicts.is_empty() {
            info!(owner = %self.owner, count = conflicts.len(), "resolved sync conflicts");
        }

        self.store.pull().await?;
        self.store.push(&self.owner).await?;
        Ok(())
    }

    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    pub fn has_conflicts(&self) -> bool {
        self.status.read().has_conflicts
    }
}
