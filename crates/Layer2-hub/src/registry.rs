//! Hub registry - bounded map of live children
//!
//! Features:
//! - Lowest-free-slot id allocation, ids reused after removal
//! - Spawn with piped stdio, output relay and lifecycle monitor per child
//! - Fire-and-forget kill, best-effort reap, bounded two-phase shutdown
//! - Single exit-delivery consumer: the only place children are removed

use crate::address::AddressBook;
use crate::child::{ChildHandle, ChildInfo, ExitEvent};
use crate::event::{EventSender, HubEvent, HubEvents};
use crate::monitor::LifecycleMonitor;
use crate::relay::{ErrorCapture, OutputRelay};
use distrual_foundation::{ChildId, Envelope, Error, HubConfig, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

// ============================================================================
// Registry
// ============================================================================

struct Registry {
    children: BTreeMap<ChildId, ChildHandle>,
    capacity: usize,
}

impl Registry {
    fn new(capacity: usize) -> Self {
        Self {
            children: BTreeMap::new(),
            capacity,
        }
    }

    /// Smallest id in `[0, capacity)` not held by a live child
    fn next_free_id(&self) -> Option<ChildId> {
        (0..self.capacity as u32)
            .map(ChildId)
            .find(|id| !self.children.contains_key(id))
    }
}

// ============================================================================
// Hub
// ============================================================================

struct HubInner {
    registry: Mutex<Registry>,
    addresses: AddressBook,
    events: EventSender,
    exits: mpsc::UnboundedSender<ExitEvent>,
    live: watch::Sender<usize>,
    config: HubConfig,
}

/// Process supervisor.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// Create a hub and start its exit-delivery consumer.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: HubConfig) -> (Self, HubEvents) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (exits, exits_rx) = mpsc::unbounded_channel();
        let (live, _) = watch::channel(0);

        let inner = Arc::new(HubInner {
            registry: Mutex::new(Registry::new(config.max_children())),
            addresses: AddressBook::new(),
            events,
            exits,
            live,
            config,
        });

        tokio::spawn(deliver_exits(Arc::downgrade(&inner), exits_rx));

        (Self { inner }, events_rx)
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn capacity(&self) -> usize {
        self.inner.registry.lock().capacity
    }

    pub fn addresses(&self) -> &AddressBook {
        &self.inner.addresses
    }

    // ========================================================================
    // Spawn / Kill
    // ========================================================================

    /// Start `program` and register it under the lowest free id
    pub fn spawn<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<ChildId> {
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        let mut registry = self.inner.registry.lock();

        let id = registry.next_free_id().ok_or(Error::CapacityExceeded {
            capacity: registry.capacity,
        })?;

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch_failed(program, e))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stderr".to_string()))?;
        let pid = child.id();

        // Announce before the relay can forward any of this child's lines
        let _ = self.inner.events.send(HubEvent::Spawned {
            id,
            pid,
            program: program.to_string(),
        });

        let errors = ErrorCapture::new();
        let drain = OutputRelay::new(
            id,
            self.inner.events.clone(),
            self.inner.addresses.clone(),
            errors.clone(),
        )
        .start(stdout, stderr);

        let killed_by_parent = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();

        let monitor = LifecycleMonitor {
            id,
            child,
            kill_rx,
            killed_by_parent: Arc::clone(&killed_by_parent),
            drain,
            errors,
            drain_grace: self.inner.config.drain_grace(),
            exits: self.inner.exits.clone(),
        };

        registry.children.insert(
            id,
            ChildHandle::new(
                id,
                pid,
                program.to_string(),
                args,
                stdin,
                killed_by_parent,
                kill_tx,
            ),
        );
        self.inner.live.send_replace(registry.children.len());

        // Its exit event needs the registry lock, so it lands after the insert
        tokio::spawn(monitor.run());

        info!(child = %id, ?pid, "Spawned {}", program);
        Ok(id)
    }

    /// Mark the child as supervisor-killed and request termination.
    ///
    /// Returns immediately; removal happens when its exit event arrives.
    pub fn kill(&self, id: ChildId) -> Result<()> {
        let mut registry = self.inner.registry.lock();
        let handle = registry
            .children
            .get_mut(&id)
            .ok_or(Error::UnknownChild(id))?;
        handle.request_kill();
        info!(child = %id, "Kill requested");
        Ok(())
    }

    /// Request termination of every live child. Does not wait.
    pub fn reap_all(&self) -> usize {
        let mut registry = self.inner.registry.lock();
        for handle in registry.children.values_mut() {
            handle.request_kill();
        }
        let count = registry.children.len();
        if count > 0 {
            info!("Reaping {} children", count);
        }
        count
    }

    /// Reap everything, then wait up to `timeout` for the registry to empty.
    ///
    /// Returns how many children were still registered when it gave up.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.reap_all();

        let mut live = self.inner.live.subscribe();
        // The watch borrow must be released before the registry lock is taken
        let emptied = matches!(
            tokio::time::timeout(timeout, live.wait_for(|count| *count == 0)).await,
            Ok(Ok(_))
        );

        let remaining = self.inner.registry.lock().children.len();
        if !emptied {
            warn!("Shutdown timed out with {} children still running", remaining);
        }
        remaining
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Live ids, ascending
    pub fn list(&self) -> Vec<ChildId> {
        self.inner.registry.lock().children.keys().copied().collect()
    }

    pub fn describe(&self) -> Vec<ChildInfo> {
        let registry = self.inner.registry.lock();
        registry
            .children
            .values()
            .map(|handle| handle.info(self.inner.addresses.get(handle.id)))
            .collect()
    }

    pub fn contains(&self, id: ChildId) -> bool {
        self.inner.registry.lock().children.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.registry.lock().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address from the child's handshake, if seen
    pub fn address_of(&self, id: ChildId) -> Result<Option<SocketAddr>> {
        // Exit handling clears the address under the same lock
        let registry = self.inner.registry.lock();
        if !registry.children.contains_key(&id) {
            return Err(Error::UnknownChild(id));
        }
        Ok(self.inner.addresses.get(id))
    }

    // ========================================================================
    // Stdin
    // ========================================================================

    /// Write one line of plain text to the child's stdin
    pub async fn send(&self, id: ChildId, text: &str) -> Result<()> {
        let mut line = text.trim_end_matches(|c| c == '\r' || c == '\n').to_string();
        line.push('\n');
        self.write_line(id, &line).await
    }

    /// Write an encoded envelope to the child's stdin
    pub async fn send_envelope(&self, id: ChildId, envelope: &Envelope) -> Result<()> {
        let line = envelope.encode()?;
        self.write_line(id, &line).await
    }

    /// Close the child's stdin; nodes treat this as a request to exit
    pub async fn close_stdin(&self, id: ChildId) -> Result<()> {
        let stdin = self.stdin_of(id)?;
        let mut stdin = stdin.lock().await;
        if let Some(mut pipe) = stdin.take() {
            pipe.shutdown().await?;
        }
        debug!(child = %id, "Stdin closed");
        Ok(())
    }

    fn stdin_of(
        &self,
        id: ChildId,
    ) -> Result<Arc<tokio::sync::Mutex<Option<tokio::process::ChildStdin>>>> {
        let registry = self.inner.registry.lock();
        registry
            .children
            .get(&id)
            .map(|handle| Arc::clone(&handle.stdin))
            .ok_or(Error::UnknownChild(id))
    }

    async fn write_line(&self, id: ChildId, line: &str) -> Result<()> {
        // Registry lock is released before any await
        let stdin = self.stdin_of(id)?;
        let mut stdin = stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| Error::InvalidInput(format!("Stdin of child {} is closed", id)))?;

        pipe.write_all(line.as_bytes()).await?;
        pipe.flush().await?;
        debug!(child = %id, "Wrote {} bytes to stdin", line.len());
        Ok(())
    }
}

impl HubInner {
    /// Remove the exited child and report it. Runs only on the exit consumer.
    fn on_exit(&self, event: ExitEvent) {
        let removed = {
            let mut registry = self.registry.lock();
            let removed = registry.children.remove(&event.id);
            // Before the id can be handed out again
            if removed.is_some() {
                self.addresses.remove(event.id);
            }
            self.live.send_replace(registry.children.len());
            removed
        };

        if removed.is_none() {
            warn!(child = %event.id, "Exit event for unregistered child");
        }

        match event.error() {
            Some(e) => warn!(child = %event.id, code = ?event.exit_code, "{}", e),
            None => info!(child = %event.id, outcome = %event.outcome, "Child exited"),
        }
        let _ = self.events.send(HubEvent::Exited(event));
    }
}

/// The single exit-delivery path
async fn deliver_exits(hub: Weak<HubInner>, mut exits: mpsc::UnboundedReceiver<ExitEvent>) {
    while let Some(event) = exits.recv().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        hub.on_exit(event);
    }
    debug!("Exit delivery stopped");
}
