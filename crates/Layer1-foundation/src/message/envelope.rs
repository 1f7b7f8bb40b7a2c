//! Envelope - tagged, newline-framed message
//!
//! Wire form is one compact JSON object per line:
//!
//! ```text
//! {"type":"Init","payload":"127.0.0.1:40511"}
//! {"type":"Command","payload":{"op":"snapshot"},"id":3}
//! ```

use crate::{Error, Result};
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ============================================================================
// MessageType
// ============================================================================

/// Envelope discriminant
///
/// The known set is closed. Anything else decodes as [`MessageType::Unknown`]
/// so newer nodes can talk to older hubs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Event,
    Init,
    Snapshot,
    Command,
    Unknown(String),
}

impl MessageType {
    /// Legacy integer discriminants (Event = 0 .. Command = 3)
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => MessageType::Event,
            1 => MessageType::Init,
            2 => MessageType::Snapshot,
            3 => MessageType::Command,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "Event" => MessageType::Event,
            "Init" => MessageType::Init,
            "Snapshot" => MessageType::Snapshot,
            "Command" => MessageType::Command,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Event => "Event",
            MessageType::Init => "Init",
            MessageType::Snapshot => "Snapshot",
            MessageType::Command => "Command",
            MessageType::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MessageType::Unknown(_))
    }

    /// Known variant for an `Unknown` that holds a known name
    pub fn normalized(self) -> Self {
        match self {
            MessageType::Unknown(name) => MessageType::from_name(&name),
            known => known,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TypeVisitor;

        impl<'de> Visitor<'de> for TypeVisitor {
            type Value = MessageType;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a message type name or integer code")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<MessageType, E> {
                Ok(MessageType::from_name(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<MessageType, E> {
                Ok(MessageType::from_code(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<MessageType, E> {
                Ok(MessageType::Unknown(v.to_string()))
            }
        }

        deserializer.deserialize_any(TypeVisitor)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A single framed message between hub and node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", alias = "Type")]
    pub msg_type: MessageType,

    #[serde(default, alias = "Payload")]
    pub payload: Value,

    /// Correlation id pairing a `Command` with the `Event` it produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Envelope {
    pub fn new(msg_type: MessageType, payload: Value) -> Self {
        Self {
            msg_type: msg_type.normalized(),
            payload,
            id: None,
        }
    }

    /// Handshake announcing the node's RPC address
    pub fn init(address: impl std::fmt::Display) -> Self {
        Self::new(MessageType::Init, Value::String(address.to_string()))
    }

    pub fn event(payload: Value) -> Self {
        Self::new(MessageType::Event, payload)
    }

    pub fn snapshot(payload: Value) -> Self {
        Self::new(MessageType::Snapshot, payload)
    }

    pub fn command(payload: Value) -> Self {
        Self::new(MessageType::Command, payload)
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Address carried by an `Init` envelope
    pub fn init_address(&self) -> Option<&str> {
        match (&self.msg_type, &self.payload) {
            (MessageType::Init, Value::String(addr)) => Some(addr.as_str()),
            _ => None,
        }
    }

    /// Deserialize the payload into a typed value
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| Error::Decode(format!("{} payload: {}", self.msg_type, e)))
    }

    /// Serialize to a single line, newline included
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line. Trailing CR/LF is ignored.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if line.trim().is_empty() {
            return Err(Error::Decode("empty line".to_string()));
        }
        serde_json::from_str(line).map_err(|e| Error::Decode(e.to_string()))
    }
}
