// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Squad Configuration
//!
//! YAML-loadable configuration for the coordination core. Every interval and
//! batch size lives here rather than as an embedded constant so tests can run
//! the loops at accelerated rates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Control-loop and message-bus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// OODA cycle interval.
    #[serde(with = "humantime_serde")]
    pub loop_interval: Duration,
    /// Message-bus drain interval (runs faster than the OODA loop).
    #[serde(with = "humantime_serde")]
    pub bus_interval: Duration,
    /// Maximum messages drained per bus tick.
    pub message_batch: usize,
    /// Pending-message count above which backlog drain wins the decision.
    pub backlog_threshold: usize,
    /// Cross-squad queue depth above which coordination is called for.
    pub global_queue_threshold: u64,
    /// Time since last sync after which a forced sync is due.
    #[serde(with = "humantime_serde")]
    pub sync_staleness: Duration,
    /// Window used when listing active squads for coordination.
    #[serde(with = "humantime_serde")]
    pub activity_window: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_millis(100),
            bus_interval: Duration::from_millis(50),
            message_batch: 50,
            backlog_threshold: 100,
            global_queue_threshold: 1000,
            sync_staleness: Duration::from_secs(300),
            activity_window: Duration::from_secs(300),
        }
    }
}

/// Durable-store reconciliation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed interval between background sync runs.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Resolution strategy name: `local`, `remote`, or `auto`.
    pub strategy: StrategyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Local,
    Remote,
    Auto,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            strategy: StrategyKind::Auto,
        }
    }
}

/// Knowledge-store retention tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Owners silent for longer than this are evicted with their entries.
    #[serde(with = "humantime_serde")]
    pub owner_ttl: Duration,
    /// Maximum live entries retained per owner.
    pub per_owner_cap: usize,
    /// Queue depth of each subscription worker.
    pub subscriber_buffer: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            owner_ttl: Duration::from_secs(3600),
            per_owner_cap: 1000,
            subscriber_buffer: 64,
        }
    }
}

/// Clock pruning tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Foreign owners not observed within this window are pruned.
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600),
        }
    }
}

/// Top-level configuration for one squad's coordination core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SquadConfig {
    pub coordinator: CoordinatorConfig,
    pub sync: SyncConfig,
    pub knowledge: KnowledgeConfig,
    pub clock: ClockConfig,
}

impl SquadConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SquadConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}
