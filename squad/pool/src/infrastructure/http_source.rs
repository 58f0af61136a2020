// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP [`TaskSource`] adapter for the orchestration service's REST API.

use crate::domain::source::TaskSource;
use crate::domain::task::{
    ChainLink, NewTask, ReadyTask, Task, TaskAnalytics, TaskId, TaskStatus,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// REST client for the task-distribution service.
pub struct HttpTaskSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct ReadyResponse {
    tasks: Vec<ReadyTask>,
}

#[derive(Deserialize)]
struct ChainResponse {
    chain: Vec<ChainLink>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    task_id: TaskId,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a str>,
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn health(&self) -> Result<()> {
        self.client
            .get(self.url("/health"))
            .send()
            .await
            .context("health request failed")?
            .error_for_status()
            .context("unhealthy task source")?;
        Ok(())
    }

    async fn ready_tasks(&self, limit: usize) -> Result<Vec<ReadyTask>> {
        let response: ReadyResponse = self
            .client
            .get(self.url(&format!("/tasks/ready?limit={limit}")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding ready tasks")?;
        debug!(count = response.tasks.len(), "fetched ready tasks");
        Ok(response.tasks)
    }

    async fn analytics(&self) -> Result<TaskAnalytics> {
        Ok(self
            .client
            .get(self.url("/analytics"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding analytics")?)
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<()> {
        self.client
            .put(self.url(&format!("/tasks/{id}/status")))
            .json(&StatusUpdate { status, result })
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("updating status of {id}"))?;
        Ok(())
    }

    async fn create_task(&self, task: &NewTask) -> Result<TaskId> {
        let response = self
            .client
            .post(self.url("/tasks"))
            .json(task)
            .send()
            .await?;
        if response.status() != reqwest::StatusCode::CREATED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("create task returned {status}: {body}");
        }
        let created: CreatedResponse = response.json().await.context("decoding created task")?;
        Ok(created.task_id)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        Ok(self
            .client
            .get(self.url(&format!("/tasks/{id}")))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("fetching task {id}"))?
            .json()
            .await
            .context("decoding task")?)
    }

    async fn dependency_chain(&self, id: &TaskId) -> Result<Vec<ChainLink>> {
        let response: ChainResponse = self
            .client
            .get(self.url(&format!("/tasks/{id}/chain")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding dependency chain")?;
        Ok(response.chain)
    }
}
