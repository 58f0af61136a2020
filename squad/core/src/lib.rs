// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Aegis Squad Core
//!
//! Coordination core for cooperating agent squads: a per-squad vector clock,
//! a conflict-resolving shared knowledge store, a git-backed sync pipeline,
//! and the observe-orient-decide-act control loop that drives them.
//!
//! The crate is layered the same way as the rest of the platform:
//!
//! - [`domain`] — clocks, knowledge entries, messages, sync ports, config
//! - [`application`] — the coordinator and the sync pipeline
//! - [`infrastructure`] — the wire codec and the git adapter

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::coordinator::{
    ControlAction, CoordinatorStatus, Observation, Orientation, SquadCoordinator,
};
pub use application::sync::SyncPipeline;
pub use domain::clock::{AgentId, CausalOrder, ClockSummary, ClockTimestamp, VectorClock};
pub use domain::config::{
    ClockConfig, CoordinatorConfig, KnowledgeConfig, SquadConfig, StrategyKind, SyncConfig,
};
pub use domain::knowledge::{
    KeyPattern, KnowledgeEntry, KnowledgeSnapshot, KnowledgeStore, KnowledgeUpdate, PutOutcome,
    SubscriptionId,
};
pub use domain::message::{
    Command, CommandParseError, Directive, Message, MessageId, MessageKind, Operator, Recipient,
};
pub use domain::sync::{
    Classifying, DurableStore, PreferLocal, PreferRemote, ResolutionPolicy, Side, SyncStatus,
};
pub use infrastructure::codec::{CodecError, WireCodec};
pub use infrastructure::git_store::GitStore;
