// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Messages & Commands
//!
//! Units of inter-squad communication carried by the coordinator's message
//! bus. Payloads are opaque bytes produced by the wire codec; commands have
//! a small text grammar (`DIRECTIVE OPERATOR TARGET [json-params]`) so they
//! survive the dictionary-compression pass.

use crate::domain::clock::{AgentId, ClockTimestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Destination of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipient {
    Agent { id: AgentId },
    Broadcast,
}

/// Kind tag for dispatching received messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Free-form text payload.
    Text,
    /// Encoded [`Command`].
    Command,
    /// Notification that a squad finished a sync run.
    SyncNotice,
}

/// A unit of inter-squad communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: AgentId,
    pub to: Recipient,
    /// Codec-encoded payload; round-trips exactly through encode/decode.
    pub payload: Vec<u8>,
    pub timestamp: ClockTimestamp,
    pub kind: MessageKind,
}

/// Command verbs understood by every squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Directive {
    Synchronize,
    Coordinate,
    Optimize,
    Execute,
    Query,
    Update,
    Merge,
    Broadcast,
    Reflect,
    Analyze,
}

impl Directive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::Synchronize => "SYNCHRONIZE",
            Directive::Coordinate => "COORDINATE",
            Directive::Optimize => "OPTIMIZE",
            Directive::Execute => "EXECUTE",
            Directive::Query => "QUERY",
            Directive::Update => "UPDATE",
            Directive::Merge => "MERGE",
            Directive::Broadcast => "BROADCAST",
            Directive::Reflect => "REFLECT",
            Directive::Analyze => "ANALYZE",
        }
    }
}

impl FromStr for Directive {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYNCHRONIZE" => Ok(Directive::Synchronize),
            "COORDINATE" => Ok(Directive::Coordinate),
            "OPTIMIZE" => Ok(Directive::Optimize),
            "EXECUTE" => Ok(Directive::Execute),
            "QUERY" => Ok(Directive::Query),
            "UPDATE" => Ok(Directive::Update),
            "MERGE" => Ok(Directive::Merge),
            "BROADCAST" => Ok(Directive::Broadcast),
            "REFLECT" => Ok(Directive::Reflect),
            "ANALYZE" => Ok(Directive::Analyze),
            other => Err(CommandParseError::UnknownDirective(other.to_string())),
        }
    }
}

/// Delivery/processing mode for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Immediate,
    Batch,
    Async,
    Mirror,
    Fractal,
    Vector,
    Quantum,
    Recursive,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Immediate => "IMMEDIATE",
            Operator::Batch => "BATCH",
            Operator::Async => "ASYNC",
            Operator::Mirror => "MIRROR",
            Operator::Fractal => "FRACTAL",
            Operator::Vector => "VECTOR",
            Operator::Quantum => "QUANTUM",
            Operator::Recursive => "RECURSIVE",
        }
    }
}

impl FromStr for Operator {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMMEDIATE" => Ok(Operator::Immediate),
            "BATCH" => Ok(Operator::Batch),
            "ASYNC" => Ok(Operator::Async),
            "MIRROR" => Ok(Operator::Mirror),
            "FRACTAL" => Ok(Operator::Fractal),
            "VECTOR" => Ok(Operator::Vector),
            "QUANTUM" => Ok(Operator::Quantum),
            "RECURSIVE" => Ok(Operator::Recursive),
            other => Err(CommandParseError::UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandParseError {
    #[error("input does not match the command grammar")]
    Malformed,

    #[error("unknown directive {0:?}")]
    UnknownDirective(String),

    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    #[error("invalid params json: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

/// A squad-level command.
///
/// `params` stays a string map as the opaque extension point; everything
/// else is strongly typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub directive: Directive,
    pub operator: Operator,
    pub target: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn command_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^(\w+)\s+(\w+)\s+(\S+)(?:\s+(.*))?$").expect("valid command pattern")
    })
}

impl Command {
    pub fn new(directive: Directive, operator: Operator, target: impl Into<String>) -> Self {
        Self {
            directive,
            operator,
            target: target.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Render to the wire grammar: `DIRECTIVE OPERATOR TARGET [json-params]`.
    pub fn to_wire(&self) -> String {
        let mut wire = format!(
            "{} {} {}",
            self.directive.as_str(),
            self.operator.as_str(),
            self.target
        );
        if !self.params.is_empty() {
            // Sorted map keeps the rendering deterministic.
            let ordered: std::collections::BTreeMap<_, _> = self.params.iter().collect();
            if let Ok(json) = serde_json::to_string(&ordered) {
                wire.push(' ');
                wire.push_str(&json);
            }
        }
        wire
    }

    /// Parse from the wire grammar.
    pub fn parse(input: &str) -> Result<Command, CommandParseError> {
        let captures = command_pattern()
            .captures(input.trim())
            .ok_or(CommandParseError::Malformed)?;

        let directive: Directive = captures[1].parse()?;
        let operator: Operator = captures[2].parse()?;
        let target = captures[3].to_string();
        let params = match captures.get(4).map(|m| m.as_str().trim()) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => HashMap::new(),
        };

        Ok(Command {
            directive,
            operator,
            target,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_wire_grammar() {
        let mut params = HashMap::new();
        params.insert("source".to_string(), "squad-a".to_string());
        params.insert("logical".to_string(), "42".to_string());
        let cmd = Command::new(Directive::Coordinate, Operator::Mirror, "squad-b")
            .with_params(params);

        let parsed = Command::parse(&cmd.to_wire()).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn command_without_params_parses() {
        let cmd = Command::parse("SYNCHRONIZE IMMEDIATE ALL_SQUADS").unwrap();
        assert_eq!(cmd.directive, Directive::Synchronize);
        assert_eq!(cmd.operator, Operator::Immediate);
        assert_eq!(cmd.target, "ALL_SQUADS");
        assert!(cmd.params.is_empty());
    }

    #[test]
    fn malformed_commands_are_rejected() {
        assert!(matches!(
            Command::parse("SYNCHRONIZE"),
            Err(CommandParseError::Malformed)
        ));
        assert!(matches!(
            Command::parse("FLY IMMEDIATE ALL_SQUADS"),
            Err(CommandParseError::UnknownDirective(_))
        ));
        assert!(matches!(
            Command::parse("QUERY SIDEWAYS ALL_SQUADS"),
            Err(CommandParseError::UnknownOperator(_))
        ));
        assert!(matches!(
            Command::parse("QUERY BATCH t {not json}"),
            Err(CommandParseError::InvalidParams(_))
        ));
    }
}
