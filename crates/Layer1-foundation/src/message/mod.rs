//! Message - hub/node wire protocol
//!
//! - `envelope.rs` - line framing codec (`Envelope`, `MessageType`)
//! - `command.rs` - typed payloads (commands, events, snapshots, RPC args)

mod command;
mod envelope;

pub use command::{
    ExampleArgs, ExampleReply, NodeCommand, NodeEvent, NodeSnapshot, EXAMPLE_PROCEDURE,
};
pub use envelope::{Envelope, MessageType};
