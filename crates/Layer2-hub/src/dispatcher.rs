//! Call dispatcher - routes "node A calls node B" through A's stdin
//!
//! The address recorded from B's handshake is the only source of truth for
//! where B listens. The call itself is performed by A; the result comes back
//! later as an `Event` envelope on A's stdout.

use crate::address::reachable;
use crate::registry::Hub;
use distrual_foundation::{
    ChildId, Envelope, Error, ExampleArgs, NodeCommand, Result, EXAMPLE_PROCEDURE,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CallDispatcher {
    hub: Hub,
    next_id: Arc<AtomicU64>,
}

impl CallDispatcher {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Tell `from` to call the example procedure on `to` with `x`.
    ///
    /// Returns the correlation id stamped on the command; the matching
    /// `Event` envelope from `from` carries the same id.
    pub async fn invoke(&self, from: ChildId, to: ChildId, x: i64) -> Result<u64> {
        let target = self.resolve(from, to)?;
        self.dispatch(from, to, target, x).await
    }

    /// Like [`invoke`](Self::invoke), but waits up to `timeout` for the
    /// target's handshake first
    pub async fn invoke_when_ready(
        &self,
        from: ChildId,
        to: ChildId,
        x: i64,
        timeout: Duration,
    ) -> Result<u64> {
        self.ensure_live(from)?;

        let target = match self.hub.address_of(to)? {
            Some(addr) => addr,
            None => {
                debug!(child = %to, "Waiting for handshake");
                self.hub
                    .addresses()
                    .wait_for(to, timeout)
                    .await
                    .ok_or(Error::AddressUnknown(to))?
            }
        };

        // Either side may have exited while we waited
        self.ensure_live(from)?;
        self.ensure_live(to)?;
        self.dispatch(from, to, target, x).await
    }

    /// Ask a node to report its state as a `Snapshot` envelope
    pub async fn request_snapshot(&self, id: ChildId) -> Result<u64> {
        self.ensure_live(id)?;
        let correlation = self.next_correlation();
        let envelope =
            Envelope::command(serde_json::to_value(NodeCommand::Snapshot)?).with_id(correlation);
        self.hub.send_envelope(id, &envelope).await?;
        debug!(child = %id, correlation, "Snapshot requested");
        Ok(correlation)
    }

    fn resolve(&self, from: ChildId, to: ChildId) -> Result<SocketAddr> {
        self.ensure_live(from)?;
        self.hub.address_of(to)?.ok_or(Error::AddressUnknown(to))
    }

    fn ensure_live(&self, id: ChildId) -> Result<()> {
        if self.hub.contains(id) {
            Ok(())
        } else {
            Err(Error::UnknownChild(id))
        }
    }

    async fn dispatch(&self, from: ChildId, to: ChildId, target: SocketAddr, x: i64) -> Result<u64> {
        let target = reachable(target);
        let correlation = self.next_correlation();

        let command = NodeCommand::Invoke {
            target: target.to_string(),
            procedure: EXAMPLE_PROCEDURE.to_string(),
            args: serde_json::to_value(ExampleArgs { x })?,
        };
        let envelope = Envelope::command(serde_json::to_value(command)?).with_id(correlation);

        self.hub.send_envelope(from, &envelope).await?;
        info!(%from, %to, %target, correlation, "Dispatched {} call", EXAMPLE_PROCEDURE);
        Ok(correlation)
    }

    fn next_correlation(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
