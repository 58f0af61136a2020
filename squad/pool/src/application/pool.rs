// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Pool
//!
//! Pulls ready tasks from a [`TaskSource`] and runs them through a
//! [`TaskExecutor`] under a hard concurrency bound. Admission is a semaphore
//! permit held for the task's whole lifetime, so the bound holds no matter
//! how bursty the source is. Every running task carries its own cancellation
//! token, a child of the pool-wide shutdown token.

use crate::domain::source::{TaskExecutor, TaskSource};
use crate::domain::task::{NewTask, ReadyTask, TaskAnalytics, TaskId, TaskStatus};
use anyhow::{Context, Result};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Pool tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard bound on concurrently running tasks.
    pub capacity: usize,
    /// Interval between ready-task polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Per-task wall-clock limit; an overrunning task fails.
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,
    /// Interval between checks while waiting for the pool to drain.
    #[serde(with = "humantime_serde")]
    pub completion_poll: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            poll_interval: Duration::from_secs(2),
            task_timeout: Duration::from_secs(600),
            completion_poll: Duration::from_secs(1),
        }
    }
}

struct Inner {
    config: PoolConfig,
    source: Arc<dyn TaskSource>,
    executor: Arc<dyn TaskExecutor>,
    slots: Arc<Semaphore>,
    running: Mutex<HashMap<TaskId, CancellationToken>>,
    max_concurrent: AtomicUsize,
    started: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Bounded task execution pool. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct ExecutionPool {
    inner: Arc<Inner>,
}

impl ExecutionPool {
    /// Verify the source is reachable, then construct the pool.
    pub async fn connect(
        config: PoolConfig,
        source: Arc<dyn TaskSource>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<Self> {
        source.health().await.context("task source unavailable")?;
        let capacity = config.capacity.max(1);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                source,
                executor,
                slots: Arc::new(Semaphore::new(capacity)),
                running: Mutex::new(HashMap::new()),
                max_concurrent: AtomicUsize::new(0),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        })
    }

    /// Spawn the polling loop. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(capacity = self.inner.config.capacity, "starting execution pool");
        let pool = self.clone();
        self.inner.tracker.spawn(async move {
            let mut tick = tokio::time::interval(pool.inner.config.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = pool.inner.shutdown.cancelled() => break,
                    _ = tick.tick() => pool.poll_once().await,
                }
            }
        });
    }

    /// Cancel everything in flight and wait for all task futures to exit.
    pub async fn stop(&self) {
        info!("stopping execution pool");
        self.inner.started.store(false, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.running.lock().clear();
    }

    /// One poll: fill however many slots are free with ready tasks.
    async fn poll_once(&self) {
        let free = self.inner.slots.available_permits();
        if free == 0 {
            return;
        }
        let ready = match self.inner.source.ready_tasks(free).await {
            Ok(ready) => ready,
            Err(err) => {
                warn!(error = %err, "ready-task poll failed");
                return;
            }
        };
        if !ready.is_empty() {
            debug!(count = ready.len(), free, "admitting ready tasks");
        }
        for task in ready {
            if self.inner.running.lock().contains_key(&task.id) {
                continue;
            }
            let Ok(permit) = self.inner.slots.clone().try_acquire_owned() else {
                break;
            };
            self.spawn_task(task, permit);
        }
    }

    fn spawn_task(&self, task: ReadyTask, permit: OwnedSemaphorePermit) {
        let cancel = self.inner.shutdown.child_token();
        self.inner
            .running
            .lock()
            .insert(task.id.clone(), cancel.clone());

        let in_flight = self.inner.config.capacity - self.inner.slots.available_permits();
        self.inner
            .max_concurrent
            .fetch_max(in_flight, Ordering::SeqCst);
        counter!("squad_pool_admitted_total").increment(1);
        gauge!("squad_pool_running_tasks").set(in_flight as f64);

        let pool = self.clone();
        self.inner.tracker.spawn(async move {
            let _permit = permit;
            pool.run_task(task, cancel).await;
        });
    }

    async fn run_task(&self, task: ReadyTask, cancel: CancellationToken) {
        debug!(task = %task.id, "task starting");
        if let Err(err) = self
            .inner
            .source
            .update_status(&task.id, TaskStatus::Running, None)
            .await
        {
            warn!(task = %task.id, error = %err, "failed to report running status");
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
            run = tokio::time::timeout(
                self.inner.config.task_timeout,
                self.inner.executor.execute(cancel.clone(), &task),
            ) => match run {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(anyhow::anyhow!(
                        "timed out after {:?}",
                        self.inner.config.task_timeout
                    ))
                }
            },
        };

        let (status, result) = match &outcome {
            Ok(result) => {
                counter!("squad_pool_completed_total").increment(1);
                debug!(task = %task.id, "task completed");
                (TaskStatus::Completed, result.clone())
            }
            Err(err) => {
                counter!("squad_pool_failed_total").increment(1);
                warn!(task = %task.id, error = %err, "task failed");
                (TaskStatus::Failed, err.to_string())
            }
        };
        if let Err(err) = self
            .inner
            .source
            .update_status(&task.id, status, Some(result.as_str()))
            .await
        {
            warn!(task = %task.id, error = %err, "failed to report terminal status");
        }

        self.inner.running.lock().remove(&task.id);
        let in_flight = self.inner.running.lock().len();
        gauge!("squad_pool_running_tasks").set(in_flight as f64);
    }

    /// Register a new task with the source; the pool picks it up once its
    /// dependencies are satisfied.
    pub async fn submit_task(&self, task: &NewTask) -> Result<TaskId> {
        self.inner.source.create_task(task).await
    }

    /// Cancel one running task. Returns `false` when it is not running here.
    pub fn cancel_task(&self, id: &TaskId) -> bool {
        let running = self.inner.running.lock();
        match running.get(id) {
            Some(cancel) => {
                info!(task = %id, "cancelling task");
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.inner.running.lock().len()
    }

    pub fn available_slots(&self) -> usize {
        self.inner.slots.available_permits()
    }

    /// Highest concurrency observed since the pool started.
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent.load(Ordering::SeqCst)
    }

    pub async fn analytics(&self) -> Result<TaskAnalytics> {
        self.inner.source.analytics().await
    }

    /// Wait until nothing is running here and the source reports no pending
    /// tasks, or until `deadline` passes.
    pub async fn wait_for_completion(&self, deadline: Duration) -> Result<()> {
        tokio::time::timeout(deadline, async {
            loop {
                let pending = match self.inner.source.analytics().await {
                    Ok(analytics) => analytics.count(TaskStatus::Pending),
                    Err(err) => {
                        warn!(error = %err, "analytics poll failed while draining");
                        u64::MAX
                    }
                };
                if self.running_count() == 0 && pending == 0 {
                    return;
                }
                tokio::time::sleep(self.inner.config.completion_poll).await;
            }
        })
        .await
        .context("pool did not drain before the deadline")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_rates() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.completion_poll, Duration::from_secs(1));
    }

    #[test]
    fn config_parses_humantime_intervals() {
        let yaml_like = r#"{"capacity": 4, "poll_interval": "100ms"}"#;
        let config: PoolConfig = serde_json::from_str(yaml_like).unwrap();
        assert_eq!(config.capacity, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.task_timeout, Duration::from_secs(600));
    }
}
