//! # distrual-foundation
//!
//! Foundation layer for distrual:
//! - Error: shared error taxonomy (`Error`, `Result`)
//! - Message: the envelope codec spoken between hub and nodes
//! - Config: hub settings and the JSON/TOML config store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Hub (distrual)                                          │
//! │   registry ── relay ── monitor ── dispatcher             │
//! │        │  stdin: Command envelopes / text                │
//! │        ▼                        ▲ stdout: Init / Event   │
//! │  Node (distrual-node)  ── RPC (HTTP/JSON) ──▶ other Node │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod types;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Types
// ============================================================================
pub use types::ChildId;

// ============================================================================
// Message
// ============================================================================
pub use message::{
    Envelope, ExampleArgs, ExampleReply, MessageType, NodeCommand, NodeEvent, NodeSnapshot,
    EXAMPLE_PROCEDURE,
};

// ============================================================================
// Config
// ============================================================================
pub use config::{ConfigStore, HubConfig};
