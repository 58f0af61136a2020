// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ports to the orchestration service and to the thing that actually runs a
//! task. Both live behind traits so the pool is testable without a network
//! or a real workload.

use crate::domain::task::{ChainLink, NewTask, ReadyTask, Task, TaskAnalytics, TaskId, TaskStatus};
use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Port to the task-distribution service.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Liveness probe; an error means the service is unreachable.
    async fn health(&self) -> Result<()>;

    /// Up to `limit` tasks whose dependencies are satisfied, best first.
    async fn ready_tasks(&self, limit: usize) -> Result<Vec<ReadyTask>>;

    /// Distribution-wide analytics.
    async fn analytics(&self) -> Result<TaskAnalytics>;

    /// Report a lifecycle transition, with the outcome for terminal states.
    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<()>;

    /// Register a new task; returns the service-assigned identifier.
    async fn create_task(&self, task: &NewTask) -> Result<TaskId>;

    /// Full record for one task.
    async fn get_task(&self, id: &TaskId) -> Result<Task>;

    /// Transitive dependency chain of one task, dependencies first.
    async fn dependency_chain(&self, id: &TaskId) -> Result<Vec<ChainLink>>;
}

/// Port to the workload runner.
///
/// `execute` receives a cancellation token that fires on task cancellation
/// and on pool shutdown; a well-behaved executor stops promptly when it
/// fires. The returned string is recorded as the task result.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, cancel: CancellationToken, task: &ReadyTask) -> Result<String>;
}
