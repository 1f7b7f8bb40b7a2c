//! Typed payloads carried inside envelopes
//!
//! `Command` envelopes hold a [`NodeCommand`], `Event` envelopes produced in
//! response hold a [`NodeEvent`], `Snapshot` envelopes hold a [`NodeSnapshot`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the built-in doubling procedure
pub const EXAMPLE_PROCEDURE: &str = "Example";

/// Instruction from the hub to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NodeCommand {
    /// Call `procedure` on the peer listening at `target`
    Invoke {
        target: String,
        procedure: String,
        #[serde(default)]
        args: Value,
    },

    /// Report node state as a `Snapshot` envelope
    Snapshot,
}

/// Notification from a node, sent after it handled a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NodeEvent {
    Invoke {
        target: String,
        procedure: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Point-in-time node state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub address: String,
    pub calls_served: u64,
    pub invokes_sent: u64,
    pub uptime_secs: u64,
}

/// Request for the doubling procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleArgs {
    #[serde(rename = "X")]
    pub x: i64,
}

/// Reply of the doubling procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleReply {
    #[serde(rename = "Y")]
    pub y: i64,
}
