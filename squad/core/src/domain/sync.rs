// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Synchronization Types & Ports
//!
//! The durable layer is an external version-control system reached through
//! the [`DurableStore`] port; this module owns only the status bookkeeping
//! and the pluggable conflict-resolution policy.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::clock::AgentId;

/// Outcome of the last reconciliation attempt, read by the coordination loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync: DateTime<Utc>,
    pub in_progress: bool,
    pub has_conflicts: bool,
    pub conflict_count: usize,
    pub last_error: Option<String>,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            last_sync: Utc::now(),
            in_progress: false,
            has_conflicts: false,
            conflict_count: 0,
            last_error: None,
            successful_syncs: 0,
            failed_syncs: 0,
        }
    }
}

/// Port to the external version-control-backed durable store.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Fetch remote state.
    async fn fetch(&self) -> Result<()>;
    /// Paths currently in a conflicted state.
    async fn check_conflicts(&self) -> Result<Vec<PathBuf>>;
    /// Resolve one path by keeping the local side.
    async fn resolve_ours(&self, path: &Path) -> Result<()>;
    /// Resolve one path by keeping the remote side.
    async fn resolve_theirs(&self, path: &Path) -> Result<()>;
    /// Merge remote changes into the local copy.
    async fn pull(&self) -> Result<()>;
    /// Publish local changes, tagged with the owning squad's identity.
    async fn push(&self, owner: &AgentId) -> Result<()>;
}

/// Which side of a conflict survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// Pluggable per-path resolution policy.
///
/// Which side is authoritative per file type is a policy choice, not a
/// correctness requirement, so the classification lives behind this trait
/// instead of a hard-coded extension list.
pub trait ResolutionPolicy: Send + Sync {
    fn classify(&self, path: &Path) -> Side;
}

/// Always keep the local side.
pub struct PreferLocal;

impl ResolutionPolicy for PreferLocal {
    fn classify(&self, _path: &Path) -> Side {
        Side::Local
    }
}

/// Always take the remote side.
pub struct PreferRemote;

impl ResolutionPolicy for PreferRemote {
    fn classify(&self, _path: &Path) -> Side {
        Side::Remote
    }
}

/// Extension-based classification: structural/code paths assume upstream is
/// authoritative, configuration-like paths assume local intent wins, and
/// everything else defaults to remote.
pub struct Classifying {
    code_extensions: Vec<String>,
    config_extensions: Vec<String>,
}

impl Classifying {
    pub fn new(code_extensions: Vec<String>, config_extensions: Vec<String>) -> Self {
        Self {
            code_extensions,
            config_extensions,
        }
    }
}

impl Default for Classifying {
    fn default() -> Self {
        Self::new(
            ["go", "swift", "rs"].map(String::from).to_vec(),
            ["json", "yaml", "yml", "toml"].map(String::from).to_vec(),
        )
    }
}

impl ResolutionPolicy for Classifying {
    fn classify(&self, path: &Path) -> Side {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Side::Remote;
        };
        if self.config_extensions.iter().any(|c| c == ext) {
            Side::Local
        } else if self.code_extensions.iter().any(|c| c == ext) {
            Side::Remote
        } else {
            Side::Remote
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifying_policy_prefers_local_for_config() {
        let policy = Classifying::default();
        assert_eq!(policy.classify(Path::new("settings.json")), Side::Local);
        assert_eq!(policy.classify(Path::new("deploy.yaml")), Side::Local);
        assert_eq!(policy.classify(Path::new("src/main.rs")), Side::Remote);
        assert_eq!(policy.classify(Path::new("notes.md")), Side::Remote);
        assert_eq!(policy.classify(Path::new("Makefile")), Side::Remote);
    }

    #[test]
    fn fixed_policies_ignore_the_path() {
        assert_eq!(PreferLocal.classify(Path::new("a.rs")), Side::Local);
        assert_eq!(PreferRemote.classify(Path::new("a.json")), Side::Remote);
    }
}
