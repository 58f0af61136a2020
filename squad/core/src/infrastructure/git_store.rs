// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Git-backed [`DurableStore`] adapter.
//!
//! Shells out to the `git` binary through `tokio::process` instead of an
//! in-process library: the repository is shared with humans and other tools,
//! so the adapter must see exactly the state the CLI sees, hooks included.

use crate::domain::clock::AgentId;
use crate::domain::sync::DurableStore;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable store rooted at a local git worktree.
pub struct GitStore {
    worktree: PathBuf,
    remote: String,
    branch: String,
}

impl GitStore {
    pub fn new(worktree: impl Into<PathBuf>, remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            worktree: worktree.into(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        debug!(worktree = %self.worktree.display(), ?args, "running git");
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.worktree)
            .output()
            .await
            .with_context(|| format!("spawning git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DurableStore for GitStore {
    async fn fetch(&self) -> Result<()> {
        self.git(&["fetch", "--all", "--prune"]).await?;
        Ok(())
    }

    async fn check_conflicts(&self) -> Result<Vec<PathBuf>> {
        let porcelain = self.git(&["status", "--porcelain"]).await?;
        Ok(parse_conflicts(&porcelain))
    }

    async fn resolve_ours(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.git(&["checkout", "--ours", &path]).await?;
        self.git(&["add", &path]).await?;
        Ok(())
    }

    async fn resolve_theirs(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.git(&["checkout", "--theirs", &path]).await?;
        self.git(&["add", &path]).await?;
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        self.git(&["pull", &self.remote, &self.branch, "--no-edit"])
            .await?;
        Ok(())
    }

    async fn push(&self, owner: &AgentId) -> Result<()> {
        let dirty = !self.git(&["status", "--porcelain"]).await?.trim().is_empty();
        if dirty {
            self.git(&["add", "-A"]).await?;
            let subject = format!("sync: state update from {owner}");
            self.git(&["commit", "-m", &subject]).await?;
        }
        self.git(&["push", &self.remote, &self.branch]).await?;
        Ok(())
    }
}

/// Conflicted paths out of `git status --porcelain` output.
///
/// `UU` is both-modified, `AA` both-added; either way the path needs a
/// resolution pass before the merge can complete.
fn parse_conflicts(porcelain: &str) -> Vec<PathBuf> {
    porcelain
        .lines()
        .filter_map(|line| {
            let status = line.get(..2)?;
            if status == "UU" || status == "AA" {
                Some(PathBuf::from(line.get(3..)?.trim()))
            } else {
                None
            }
        })
        .collect()
}
