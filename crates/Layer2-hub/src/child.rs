//! Child handle and exit types

use chrono::{DateTime, Utc};
use distrual_foundation::{ChildId, Error};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::ChildStdin;
use tokio::sync::{oneshot, Mutex};

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

// ============================================================================
// Exit
// ============================================================================

/// How a child ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitOutcome {
    /// Exited successfully on its own
    Normal,

    /// Non-zero exit or signal; carries captured stderr or the status text
    Abnormal(String),

    /// Killed through [`crate::Hub::kill`] or shutdown
    TerminatedBySupervisor,
}

impl ExitOutcome {
    /// Decide the outcome of a finished process.
    ///
    /// A supervisor kill always wins over the raw status.
    pub fn classify(
        killed_by_parent: bool,
        status: &std::io::Result<ExitStatus>,
        captured_stderr: &str,
    ) -> Self {
        if killed_by_parent {
            return ExitOutcome::TerminatedBySupervisor;
        }

        match status {
            Ok(status) if status.success() => ExitOutcome::Normal,
            Ok(status) => {
                let captured = captured_stderr.trim_end();
                if captured.is_empty() {
                    ExitOutcome::Abnormal(status.to_string())
                } else {
                    ExitOutcome::Abnormal(captured.to_string())
                }
            }
            Err(e) => ExitOutcome::Abnormal(format!("wait failed: {}", e)),
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Normal => write!(f, "exited normally"),
            ExitOutcome::Abnormal(detail) => write!(f, "exited abnormally: {}", detail),
            ExitOutcome::TerminatedBySupervisor => write!(f, "terminated by supervisor"),
        }
    }
}

/// Exactly one per child, produced by its lifecycle monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub id: ChildId,
    pub outcome: ExitOutcome,
    pub exit_code: Option<i32>,
    pub exited_at: DateTime<Utc>,
}

impl ExitEvent {
    pub fn new(id: ChildId, outcome: ExitOutcome, exit_code: Option<i32>) -> Self {
        Self {
            id,
            outcome,
            exit_code,
            exited_at: Utc::now(),
        }
    }

    /// [`Error::AbnormalExit`] for an abnormal outcome, reported rather than raised
    pub fn error(&self) -> Option<Error> {
        match &self.outcome {
            ExitOutcome::Abnormal(detail) => Some(Error::AbnormalExit(detail.clone())),
            ExitOutcome::Normal | ExitOutcome::TerminatedBySupervisor => None,
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Registry entry for one live process.
///
/// The OS process itself is owned by the child's lifecycle monitor; the
/// handle reaches it through `kill_tx`.
pub(crate) struct ChildHandle {
    pub id: ChildId,
    pub pid: Option<u32>,
    pub program: String,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,

    /// `None` once closed
    pub stdin: Arc<Mutex<Option<ChildStdin>>>,

    /// Set only by the kill path
    pub killed_by_parent: Arc<AtomicBool>,

    kill_tx: Option<oneshot::Sender<()>>,
}

impl ChildHandle {
    pub fn new(
        id: ChildId,
        pid: Option<u32>,
        program: String,
        args: Vec<String>,
        stdin: Option<ChildStdin>,
        killed_by_parent: Arc<AtomicBool>,
        kill_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            pid,
            program,
            args,
            started_at: Utc::now(),
            stdin: Arc::new(Mutex::new(stdin)),
            killed_by_parent,
            kill_tx: Some(kill_tx),
        }
    }

    /// Flag the child and ask its monitor to terminate it. Repeat calls are no-ops.
    pub fn request_kill(&mut self) {
        self.killed_by_parent.store(true, Ordering::SeqCst);
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed_by_parent.load(Ordering::SeqCst)
    }

    pub fn info(&self, address: Option<SocketAddr>) -> ChildInfo {
        ChildInfo {
            id: self.id,
            pid: self.pid,
            program: self.program.clone(),
            args: self.args.clone(),
            address,
            killed: self.is_killed(),
            started_at: self.started_at,
        }
    }
}

/// Read-only view of a live child
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildInfo {
    pub id: ChildId,
    pub pid: Option<u32>,
    pub program: String,
    pub args: Vec<String>,
    pub address: Option<SocketAddr>,
    pub killed: bool,
    pub started_at: DateTime<Utc>,
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    fn exited(code: i32) -> std::io::Result<ExitStatus> {
        Ok(ExitStatus::from_raw(code << 8))
    }

    fn signaled(signal: i32) -> std::io::Result<ExitStatus> {
        Ok(ExitStatus::from_raw(signal))
    }

    #[test]
    fn test_kill_overrides_status() {
        assert_eq!(
            ExitOutcome::classify(true, &signaled(9), ""),
            ExitOutcome::TerminatedBySupervisor
        );
        assert_eq!(
            ExitOutcome::classify(true, &exited(1), "panic!"),
            ExitOutcome::TerminatedBySupervisor
        );
    }

    #[test]
    fn test_success_is_normal_even_with_stderr() {
        assert_eq!(ExitOutcome::classify(false, &exited(0), ""), ExitOutcome::Normal);
        assert_eq!(
            ExitOutcome::classify(false, &exited(0), "warning: x"),
            ExitOutcome::Normal
        );
    }

    #[test]
    fn test_failure_prefers_captured_stderr() {
        assert_eq!(
            ExitOutcome::classify(false, &exited(3), "bad input\n"),
            ExitOutcome::Abnormal("bad input".to_string())
        );
    }

    #[test]
    fn test_failure_without_stderr_uses_status() {
        match ExitOutcome::classify(false, &exited(4), "") {
            ExitOutcome::Abnormal(detail) => assert!(detail.contains('4'), "{}", detail),
            other => panic!("unexpected {:?}", other),
        }
        match ExitOutcome::classify(false, &signaled(15), "  \n") {
            ExitOutcome::Abnormal(detail) => assert!(detail.contains("15"), "{}", detail),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wait_error_is_abnormal() {
        let status = Err(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
        assert!(matches!(
            ExitOutcome::classify(false, &status, ""),
            ExitOutcome::Abnormal(_)
        ));
    }

    #[test]
    fn test_exit_event_error() {
        let event = ExitEvent::new(ChildId(1), ExitOutcome::Abnormal("boom".into()), Some(2));
        assert!(matches!(event.error(), Some(Error::AbnormalExit(d)) if d == "boom"));

        let event = ExitEvent::new(ChildId(1), ExitOutcome::TerminatedBySupervisor, None);
        assert!(event.error().is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ExitOutcome::Normal.to_string(), "exited normally");
        assert_eq!(
            ExitOutcome::Abnormal("oops".into()).to_string(),
            "exited abnormally: oops"
        );
    }
}
