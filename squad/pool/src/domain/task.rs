// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tasks & Analytics
//!
//! Wire-faithful task model shared with the orchestration service. Field
//! names and status strings match the service's JSON exactly.

use aegis_squad_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque task identifier assigned by the orchestration service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Whether `self → to` is a legal lifecycle step. The lifecycle only
    /// moves forward; terminal states never transition.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full task record as stored by the orchestration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// New-task request body for task creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Lightweight view returned by the ready-tasks query: tasks whose
/// dependencies are all satisfied, in the service's priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyTask {
    pub id: TaskId,
    #[serde(default)]
    pub uri: String,
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

/// One hop in a task's dependency chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLink {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
}

/// Distribution analytics as reported by the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskAnalytics {
    #[serde(default)]
    pub status_counts: HashMap<String, u64>,
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub running_count: u64,
    #[serde(default)]
    pub max_concurrent: u64,
    #[serde(default)]
    pub available_slots: u64,
}

impl TaskAnalytics {
    pub fn count(&self, status: TaskStatus) -> u64 {
        self.status_counts.get(status.as_str()).copied().unwrap_or(0)
    }
}
