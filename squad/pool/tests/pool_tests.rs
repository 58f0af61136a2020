// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Admission, cancellation, and shutdown behavior of the execution pool.

use aegis_squad_pool::{
    ExecutionPool, NewTask, PoolConfig, ReadyTask, TaskAnalytics, TaskExecutor, TaskId,
    TaskSource, TaskStatus,
};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct InMemorySource {
    next_id: AtomicUsize,
    tasks: Mutex<Vec<(ReadyTask, TaskStatus, Option<String>)>>,
}

impl InMemorySource {
    fn status_of(&self, id: &TaskId) -> Option<(TaskStatus, Option<String>)> {
        self.tasks
            .lock()
            .iter()
            .find(|(task, _, _)| task.id == *id)
            .map(|(_, status, result)| (*status, result.clone()))
    }
}

#[async_trait]
impl TaskSource for InMemorySource {
    async fn health(&self) -> Result<()> {
        Ok(())
    }

    async fn ready_tasks(&self, limit: usize) -> Result<Vec<ReadyTask>> {
        Ok(self
            .tasks
            .lock()
            .iter()
            .filter(|(_, status, _)| *status == TaskStatus::Pending)
            .take(limit)
            .map(|(task, _, _)| task.clone())
            .collect())
    }

    async fn analytics(&self) -> Result<TaskAnalytics> {
        let tasks = self.tasks.lock();
        let mut status_counts: HashMap<String, u64> = HashMap::new();
        for (_, status, _) in tasks.iter() {
            *status_counts.entry(status.as_str().to_string()).or_default() += 1;
        }
        Ok(TaskAnalytics {
            status_counts,
            total_tasks: tasks.len() as u64,
            ..Default::default()
        })
    }

    async fn update_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let slot = tasks
            .iter_mut()
            .find(|(task, _, _)| task.id == *id)
            .ok_or_else(|| anyhow::anyhow!("unknown task {id}"))?;
        slot.1 = status;
        slot.2 = result.map(str::to_string);
        Ok(())
    }

    async fn create_task(&self, task: &NewTask) -> Result<TaskId> {
        let id = TaskId::new(format!("t{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.tasks.lock().push((
            ReadyTask {
                id: id.clone(),
                uri: format!("task://{id}"),
                description: task.description.clone(),
                priority: task.priority,
            },
            TaskStatus::Pending,
            None,
        ));
        Ok(id)
    }

    async fn get_task(&self, id: &TaskId) -> Result<aegis_squad_pool::Task> {
        let (ready, status, result) = self
            .tasks
            .lock()
            .iter()
            .find(|(task, _, _)| task.id == *id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown task {id}"))?;
        Ok(aegis_squad_pool::Task {
            id: ready.id,
            agent_id: None,
            description: ready.description,
            status,
            priority: ready.priority,
            dependencies: Vec::new(),
            created_at: String::new(),
            started_at: None,
            completed_at: None,
            result,
            metadata: HashMap::new(),
        })
    }

    async fn dependency_chain(&self, _id: &TaskId) -> Result<Vec<aegis_squad_pool::ChainLink>> {
        Ok(Vec::new())
    }
}

/// Sleeps for a fixed duration, tracking peak concurrency.
struct SleepingExecutor {
    duration: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SleepingExecutor {
    fn new(duration: Duration) -> Self {
        Self {
            duration,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskExecutor for SleepingExecutor {
    async fn execute(&self, cancel: CancellationToken, task: &ReadyTask) -> Result<String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(anyhow::anyhow!("interrupted")),
            _ = tokio::time::sleep(self.duration) => Ok(format!("done: {}", task.description)),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn fast_config(capacity: usize) -> PoolConfig {
    PoolConfig {
        capacity,
        poll_interval: Duration::from_millis(10),
        task_timeout: Duration::from_secs(10),
        completion_poll: Duration::from_millis(10),
    }
}

async fn pool_with(
    config: PoolConfig,
    executor: Arc<SleepingExecutor>,
) -> (ExecutionPool, Arc<InMemorySource>) {
    let source = Arc::new(InMemorySource::default());
    let pool = ExecutionPool::connect(config, source.clone(), executor)
        .await
        .unwrap();
    (pool, source)
}

#[tokio::test]
async fn tenfold_burst_never_exceeds_capacity() {
    let executor = Arc::new(SleepingExecutor::new(Duration::from_millis(30)));
    let (pool, source) = pool_with(fast_config(3), executor.clone()).await;

    // Ten times the pool's capacity, submitted up front.
    let mut ids = Vec::new();
    for i in 0..30 {
        let task = NewTask {
            description: format!("task {i}"),
            ..Default::default()
        };
        ids.push(pool.submit_task(&task).await.unwrap());
    }

    pool.start();
    pool.wait_for_completion(Duration::from_secs(5))
        .await
        .unwrap();
    pool.stop().await;

    assert!(executor.peak.load(Ordering::SeqCst) <= 3);
    assert!(pool.max_concurrent() <= 3);
    for id in &ids {
        let (status, result) = source.status_of(id).unwrap();
        assert_eq!(status, TaskStatus::Completed);
        assert!(result.unwrap().starts_with("done:"));
    }
}

#[tokio::test]
async fn stop_cancels_in_flight_work_and_releases_slots() {
    let executor = Arc::new(SleepingExecutor::new(Duration::from_secs(30)));
    let (pool, source) = pool_with(fast_config(2), executor).await;

    let mut ids = Vec::new();
    for i in 0..2 {
        let task = NewTask {
            description: format!("long {i}"),
            ..Default::default()
        };
        ids.push(pool.submit_task(&task).await.unwrap());
    }
    pool.start();

    for _ in 0..200 {
        if pool.running_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pool.running_count(), 2);
    assert_eq!(pool.available_slots(), 0);

    pool.stop().await;

    assert_eq!(pool.running_count(), 0);
    assert_eq!(pool.available_slots(), 2);
    for id in &ids {
        let (status, result) = source.status_of(id).unwrap();
        assert_eq!(status, TaskStatus::Failed);
        assert!(result.unwrap().contains("cancelled"));
    }
}

#[tokio::test]
async fn cancel_fails_only_the_targeted_task() {
    let executor = Arc::new(SleepingExecutor::new(Duration::from_millis(200)));
    let (pool, source) = pool_with(fast_config(2), executor).await;

    let long = pool
        .submit_task(&NewTask {
            description: "long".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let short = pool
        .submit_task(&NewTask {
            description: "short".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    pool.start();

    for _ in 0..200 {
        if pool.running_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(pool.cancel_task(&long));
    assert!(!pool.cancel_task(&TaskId::from("no-such-task")));

    pool.wait_for_completion(Duration::from_secs(5))
        .await
        .unwrap();
    pool.stop().await;

    let (long_status, long_result) = source.status_of(&long).unwrap();
    assert_eq!(long_status, TaskStatus::Failed);
    assert!(long_result.unwrap().contains("cancelled"));
    assert_eq!(source.status_of(&short).unwrap().0, TaskStatus::Completed);
}

#[tokio::test]
async fn overrunning_task_fails_with_a_timeout() {
    let executor = Arc::new(SleepingExecutor::new(Duration::from_secs(30)));
    let mut config = fast_config(1);
    config.task_timeout = Duration::from_millis(30);
    let (pool, source) = pool_with(config, executor).await;

    let id = pool
        .submit_task(&NewTask {
            description: "slow".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    pool.start();

    pool.wait_for_completion(Duration::from_secs(5))
        .await
        .unwrap();
    pool.stop().await;

    let (status, result) = source.status_of(&id).unwrap();
    assert_eq!(status, TaskStatus::Failed);
    assert!(result.unwrap().contains("timed out"));
    assert_eq!(pool.available_slots(), 1);
}
