// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Aegis Squad Pool
//!
//! Bounded-concurrency task execution for squads: polls a task-distribution
//! service for dependency-ready work and runs it under a fixed concurrency
//! cap with per-task cancellation and timeouts.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::pool::{ExecutionPool, PoolConfig};
pub use domain::source::{TaskExecutor, TaskSource};
pub use domain::task::{
    ChainLink, NewTask, ReadyTask, Task, TaskAnalytics, TaskId, TaskStatus,
};
pub use infrastructure::http_source::HttpTaskSource;
