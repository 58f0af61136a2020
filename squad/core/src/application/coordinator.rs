// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Squad Coordinator — Control Loop & Message Bus
//!
//! Runs the observe → orient → decide → act cycle at a fixed rate, a faster
//! message-bus drain loop, and the periodic durable-store sync. Exactly one
//! [`ControlAction`] is chosen per cycle by strict priority. All collaborators
//! (clock, knowledge store, sync pipeline) are injected at construction and
//! shared by reference; there is no ambient global state.

use crate::application::sync::SyncPipeline;
use crate::domain::clock::{AgentId, ClockSummary, VectorClock};
use crate::domain::config::SquadConfig;
use crate::domain::knowledge::KnowledgeStore;
use crate::domain::message::{
    Command, Directive, Message, MessageId, MessageKind, Operator, Recipient,
};
use crate::domain::sync::SyncStatus;
use crate::infrastructure::codec::WireCodec;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Typed snapshot gathered in the observe phase.
#[derive(Debug, Clone)]
pub struct Observation {
    pub pending_messages: usize,
    pub sync: SyncStatus,
    pub clock: ClockSummary,
    pub knowledge_entries: usize,
    pub global_queue_depth: u64,
}

/// Booleans derived in the orient phase.
#[derive(Debug, Clone, Copy)]
pub struct Orientation {
    pub backlog: bool,
    pub sync_stale: bool,
    pub needs_coordination: bool,
}

/// Output of one decide phase. Lower priority value is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    DrainBacklog,
    ForceSync,
    Coordinate,
    Optimize,
}

impl ControlAction {
    pub fn priority(&self) -> u8 {
        match self {
            ControlAction::DrainBacklog => 1,
            ControlAction::ForceSync => 2,
            ControlAction::Coordinate => 3,
            ControlAction::Optimize => 10,
        }
    }
}

/// Aggregate status snapshot exposed to collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub squad: AgentId,
    pub clock: ClockSummary,
    pub pending_messages: usize,
    pub sync: SyncStatus,
    pub running: bool,
}

struct Inner {
    id: AgentId,
    config: SquadConfig,
    clock: Arc<VectorClock>,
    knowledge: Arc<KnowledgeStore>,
    sync: Arc<SyncPipeline>,
    codec: WireCodec,
    pending: Mutex<VecDeque<Message>>,
    running: AtomicBool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Per-squad coordination service. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct SquadCoordinator {
    inner: Arc<Inner>,
}

impl SquadCoordinator {
    pub fn new(
        id: AgentId,
        config: SquadConfig,
        clock: Arc<VectorClock>,
        knowledge: Arc<KnowledgeStore>,
        sync: Arc<SyncPipeline>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                config,
                clock,
                knowledge,
                sync,
                codec: WireCodec::new(),
                pending: Mutex::new(VecDeque::new()),
                running: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.inner.id
    }

    /// Spawn the control loop, the message-bus drain loop, and the periodic
    /// sync loop. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(squad = %self.inner.id, "starting squad coordinator");

        let ooda = self.clone();
        self.inner.tracker.spawn(async move {
            let mut tick = tokio::time::interval(ooda.inner.config.coordinator.loop_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ooda.inner.shutdown.cancelled() => break,
                    _ = tick.tick() => ooda.cycle().await,
                }
            }
        });

        let bus = self.clone();
        self.inner.tracker.spawn(async move {
            let mut tick = tokio::time::interval(bus.inner.config.coordinator.bus_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = bus.inner.shutdown.cancelled() => break,
                    _ = tick.tick() => bus.drain_batch(),
                }
            }
        });

        let syncer = self.clone();
        self.inner.tracker.spawn(async move {
            let mut tick = tokio::time::interval(syncer.inner.config.sync.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = syncer.inner.shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        if syncer.inner.sync.has_conflicts() {
                            let _ = syncer.force_sync().await;
                        }
                    }
                }
            }
        });
    }

    /// Cancel the loops and wait for every in-flight handler to exit.
    pub async fn stop(&self) {
        info!(squad = %self.inner.id, "stopping squad coordinator");
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// One observe → orient → decide → act cycle.
    async fn cycle(&self) {
        let observation = self.observe();
        let orientation = self.orient(&observation);
        let action = self.decide(&orientation);
        self.act(action).await;
        self.inner.clock.tick();
    }

    fn observe(&self) -> Observation {
        Observation {
            pending_messages: self.inner.pending.lock().len(),
            sync: self.inner.sync.status(),
            clock: self.inner.clock.summary(),
            knowledge_entries: self.inner.knowledge.len(),
            global_queue_depth: self.global_queue_depth(),
        }
    }

    fn orient(&self, observation: &Observation) -> Orientation {
        let cfg = &self.inner.config.coordinator;
        let staleness = chrono::Duration::from_std(cfg.sync_staleness)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        Orientation {
            backlog: observation.pending_messages > cfg.backlog_threshold,
            sync_stale: chrono::Utc::now() - observation.sync.last_sync > staleness,
            needs_coordination: observation.sync.has_conflicts
                || observation.global_queue_depth > cfg.global_queue_threshold,
        }
    }

    fn decide(&self, orientation: &Orientation) -> ControlAction {
        if orientation.backlog {
            ControlAction::DrainBacklog
        } else if orientation.sync_stale {
            ControlAction::ForceSync
        } else if orientation.needs_coordination {
            ControlAction::Coordinate
        } else {
            ControlAction::Optimize
        }
    }

    async fn act(&self, action: ControlAction) {
        debug!(squad = %self.inner.id, ?action, "acting");
        match action {
            ControlAction::DrainBacklog => self.drain_batch(),
            ControlAction::ForceSync => {
                let _ = self.force_sync().await;
            }
            ControlAction::Coordinate => self.coordinate(),
            ControlAction::Optimize => self.optimize(),
        }
    }

    /// Queue an outbound text message, encoded through the wire codec, and
    /// persist it into the knowledge store.
    pub fn send_message(&self, to: Recipient, content: &str) -> MessageId {
        self.send(to, content, MessageKind::Text)
    }

    /// Broadcast a command to every squad.
    pub fn send_command(&self, command: &Command) -> MessageId {
        self.send(Recipient::Broadcast, &command.to_wire(), MessageKind::Command)
    }

    fn send(&self, to: Recipient, content: &str, kind: MessageKind) -> MessageId {
        let message = Message {
            id: MessageId::new(),
            from: self.inner.id.clone(),
            to,
            payload: self.inner.codec.encode(content),
            timestamp: self.inner.clock.tick(),
            kind,
        };
        let id = message.id;

        if let Ok(value) = serde_json::to_value(&message) {
            self.inner
                .knowledge
                .put(&format!("message:{id}"), value, self.inner.clock.tick());
        }

        self.inner.pending.lock().push_back(message);
        id
    }

    /// Ingress for messages from other squads: folds the remote timestamp
    /// into the local clock, then queues the message for the bus.
    pub fn deliver(&self, message: Message) {
        self.inner.clock.observe(&message.timestamp);
        self.inner.pending.lock().push_back(message);
    }

    /// Drain one batch off the queue and dispatch each message concurrently.
    fn drain_batch(&self) {
        let batch: Vec<Message> = {
            let mut pending = self.inner.pending.lock();
            let take = pending.len().min(self.inner.config.coordinator.message_batch);
            pending.drain(..take).collect()
        };
        if batch.is_empty() {
            return;
        }
        debug!(squad = %self.inner.id, count = batch.len(), "draining message batch");
        for message in batch {
            let this = self.clone();
            self.inner.tracker.spawn(async move {
                this.handle_message(message).await;
            });
        }
    }

    /// Decode and dispatch one message. A decode failure drops only this
    /// message; it never aborts the batch or the loop.
    async fn handle_message(&self, message: Message) {
        let content = match self.inner.codec.decode(&message.payload) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    squad = %self.inner.id,
                    id = %message.id,
                    error = %err,
                    "dropping undecodable message"
                );
                return;
            }
        };

        match message.kind {
            MessageKind::Text => {
                debug!(squad = %self.inner.id, from = %message.from, "received message");
            }
            MessageKind::SyncNotice => {
                debug!(squad = %self.inner.id, from = %message.from, %content, "sync notice");
            }
            MessageKind::Command => match Command::parse(&content) {
                Ok(command) => self.execute_command(command).await,
                Err(err) => {
                    warn!(
                        squad = %self.inner.id,
                        id = %message.id,
                        error = %err,
                        "dropping malformed command"
                    );
                }
            },
        }
    }

    async fn execute_command(&self, command: Command) {
        debug!(
            squad = %self.inner.id,
            directive = command.directive.as_str(),
            target = %command.target,
            "executing command"
        );
        match command.directive {
            Directive::Synchronize => {
                let _ = self.force_sync().await;
            }
            Directive::Coordinate => self.coordinate(),
            Directive::Optimize => self.optimize(),
            Directive::Query => {
                if let Ok(status) = serde_json::to_value(self.status()) {
                    self.inner.knowledge.put(
                        &format!("status:{}", self.inner.id),
                        status,
                        self.inner.clock.tick(),
                    );
                }
            }
            other => {
                debug!(
                    squad = %self.inner.id,
                    directive = other.as_str(),
                    "directive has no local handler"
                );
            }
        }
    }

    /// Run the sync pipeline now and broadcast completion on success.
    async fn force_sync(&self) -> anyhow::Result<()> {
        let outcome = self.inner.sync.run().await;
        if outcome.is_ok() {
            let logical = self.inner.clock.now().logical;
            self.send(
                Recipient::Broadcast,
                &format!("SYNC_COMPLETE:{}:{}", self.inner.id, logical),
                MessageKind::SyncNotice,
            );
        }
        outcome
    }

    /// Send a mirror-coordination command to every other active squad.
    fn coordinate(&self) {
        let window = self.inner.config.coordinator.activity_window;
        for squad in self.inner.knowledge.active_owners(window) {
            if squad == self.inner.id {
                continue;
            }
            let mut params = std::collections::HashMap::new();
            params.insert("source".to_string(), self.inner.id.to_string());
            params.insert(
                "logical".to_string(),
                self.inner.clock.now().logical.to_string(),
            );
            let command = Command::new(Directive::Coordinate, Operator::Mirror, squad.as_str())
                .with_params(params);
            self.send_command(&command);
        }
    }

    /// Idle housekeeping: prune the clock and evict stale knowledge.
    fn optimize(&self) {
        self.inner.clock.prune(self.inner.config.clock.retention);
        self.inner.knowledge.cleanup(
            self.inner.config.knowledge.owner_ttl,
            self.inner.config.knowledge.per_owner_cap,
        );
    }

    /// Total queue depth advertised by all squads under `message_queue:*`.
    fn global_queue_depth(&self) -> u64 {
        self.inner
            .knowledge
            .snapshot()
            .iter()
            .filter(|(key, _)| key.starts_with("message_queue:"))
            .filter_map(|(_, value)| value.as_u64())
            .sum()
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            squad: self.inner.id.clone(),
            clock: self.inner.clock.summary(),
            pending_messages: self.inner.pending.lock().len(),
            sync: self.inner.sync.status(),
            running: self.inner.running.load(Ordering::SeqCst),
        }
    }
}
