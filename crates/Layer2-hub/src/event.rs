//! Hub events - everything the operator display gets to see

use crate::child::{ExitEvent, StreamKind};
use distrual_foundation::{ChildId, Envelope};
use tokio::sync::mpsc;

/// Event delivered to the operator-facing surface.
///
/// For one child, `Output`/`Envelope` events always precede its `Exited`.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Process started and registered
    Spawned {
        id: ChildId,
        pid: Option<u32>,
        program: String,
    },

    /// Plain text line
    Output {
        id: ChildId,
        stream: StreamKind,
        line: String,
    },

    /// Line that decoded as an envelope
    Envelope {
        id: ChildId,
        stream: StreamKind,
        envelope: Envelope,
    },

    /// Child removed from the registry
    Exited(ExitEvent),
}

pub(crate) type EventSender = mpsc::UnboundedSender<HubEvent>;

/// Receiving end handed out by [`crate::Hub::new`]
pub type HubEvents = mpsc::UnboundedReceiver<HubEvent>;
