//! Lifecycle monitor - one task per child
//!
//! Waits for the process to terminate, then for the output relay to drain,
//! then emits exactly one [`ExitEvent`] on the hub's exit queue.

use crate::child::{ExitEvent, ExitOutcome};
use crate::relay::{DrainHandle, ErrorCapture};
use distrual_foundation::ChildId;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub(crate) struct LifecycleMonitor {
    pub id: ChildId,
    pub child: Child,
    pub kill_rx: oneshot::Receiver<()>,
    pub killed_by_parent: Arc<AtomicBool>,
    pub drain: DrainHandle,
    pub errors: ErrorCapture,
    pub drain_grace: Duration,
    pub exits: mpsc::UnboundedSender<ExitEvent>,
}

impl LifecycleMonitor {
    pub async fn run(mut self) {
        let status = self.wait_for_exit().await;
        debug!(child = %self.id, ?status, "Process terminated");

        if !self.drain.wait_with_grace(self.drain_grace).await {
            warn!(
                child = %self.id,
                "Output still open {:.1}s after exit, dropping remaining output",
                self.drain_grace.as_secs_f64()
            );
        }

        let outcome = ExitOutcome::classify(
            self.killed_by_parent.load(Ordering::SeqCst),
            &status,
            &self.errors.text(),
        );
        let exit_code = status.as_ref().ok().and_then(|s| s.code());

        if self.exits.send(ExitEvent::new(self.id, outcome, exit_code)).is_err() {
            debug!(child = %self.id, "Hub gone, exit event dropped");
        }
    }

    /// Wait for the OS to report termination, killing first if asked to
    async fn wait_for_exit(&mut self) -> std::io::Result<ExitStatus> {
        tokio::select! {
            status = self.child.wait() => return status,
            Ok(()) = &mut self.kill_rx => {}
        }

        debug!(child = %self.id, "Kill requested");
        if let Err(e) = self.child.start_kill() {
            // Already reaped or gone: wait() below reports the real status
            warn!(child = %self.id, "Failed to kill process: {}", e);
        }
        self.child.wait().await
    }
}
