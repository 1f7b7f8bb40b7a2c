//! Output relay - drains a child's stdout/stderr line by line
//!
//! One task per stream. Each line is forwarded to the hub event channel,
//! either as plain text or as a decoded envelope. Init envelopes also feed
//! the address book. Stderr is additionally captured for exit reporting.

use crate::address::AddressBook;
use crate::child::StreamKind;
use crate::event::{EventSender, HubEvent};
use distrual_foundation::{ChildId, Envelope};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Stderr lines kept for the exit report
const MAX_CAPTURED_LINES: usize = 200;

// ============================================================================
// Error capture
// ============================================================================

/// Tail of a child's stderr
#[derive(Clone, Default)]
pub(crate) struct ErrorCapture {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl ErrorCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: &str) {
        let mut lines = self.lines.lock();
        if lines.len() >= MAX_CAPTURED_LINES {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    pub fn text(&self) -> String {
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

// ============================================================================
// Drain barrier
// ============================================================================

/// Completes once every drain task of one child has finished
pub(crate) struct DrainHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl DrainHandle {
    /// Wait for all streams to hit end-of-stream, bounded by `grace`.
    /// Stragglers are aborted.
    ///
    /// Returns false if the grace period ran out.
    pub async fn wait_with_grace(self, grace: Duration) -> bool {
        let aborts: Vec<_> = self.tasks.iter().map(|t| t.abort_handle()).collect();
        match tokio::time::timeout(grace, join_all(self.tasks)).await {
            Ok(_) => true,
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}

// ============================================================================
// Relay
// ============================================================================

#[derive(Clone)]
pub(crate) struct OutputRelay {
    id: ChildId,
    events: EventSender,
    addresses: AddressBook,
    errors: ErrorCapture,
}

impl OutputRelay {
    pub fn new(
        id: ChildId,
        events: EventSender,
        addresses: AddressBook,
        errors: ErrorCapture,
    ) -> Self {
        Self {
            id,
            events,
            addresses,
            errors,
        }
    }

    /// Spawn one drain task per stream
    pub fn start<O, E>(self, stdout: O, stderr: E) -> DrainHandle
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let out = self.clone();
        let stdout_task = tokio::spawn(async move { out.drain(stdout, StreamKind::Stdout).await });
        let stderr_task = tokio::spawn(async move { self.drain(stderr, StreamKind::Stderr).await });

        DrainHandle {
            tasks: vec![stdout_task, stderr_task],
        }
    }

    async fn drain<R: AsyncRead + Unpin>(&self, reader: R, stream: StreamKind) {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
                    self.forward(stream, line);
                }
                Err(e) => {
                    warn!(child = %self.id, stream = stream.as_str(), "Read failed: {}", e);
                    break;
                }
            }
        }

        debug!(child = %self.id, stream = stream.as_str(), "Stream drained");
    }

    fn forward(&self, stream: StreamKind, line: &str) {
        trace!(child = %self.id, stream = stream.as_str(), "{}", line);

        if stream == StreamKind::Stderr {
            self.errors.push(line);
        }

        let event = match Envelope::decode(line) {
            Ok(envelope) => {
                if let Some(addr) = envelope.init_address() {
                    self.record_handshake(addr);
                } else if !envelope.msg_type.is_known() {
                    debug!(
                        child = %self.id,
                        msg_type = %envelope.msg_type,
                        "Unrecognized envelope type"
                    );
                }
                HubEvent::Envelope {
                    id: self.id,
                    stream,
                    envelope,
                }
            }
            // Not an envelope: plain text
            Err(_) => HubEvent::Output {
                id: self.id,
                stream,
                line: line.to_string(),
            },
        };

        let _ = self.events.send(event);
    }

    fn record_handshake(&self, addr: &str) {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => {
                debug!(child = %self.id, %addr, "Handshake received");
                self.addresses.record(self.id, addr);
            }
            Err(e) => warn!(child = %self.id, "Ignoring Init with bad address '{}': {}", addr, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distrual_foundation::MessageType;
    use tokio::sync::mpsc;

    const GRACE: Duration = Duration::from_secs(5);

    fn relay(id: u32) -> (OutputRelay, crate::event::HubEvents, AddressBook, ErrorCapture) {
        let (tx, rx) = mpsc::unbounded_channel();
        let addresses = AddressBook::new();
        let errors = ErrorCapture::new();
        let relay = OutputRelay::new(ChildId(id), tx, addresses.clone(), errors.clone());
        (relay, rx, addresses, errors)
    }

    fn drain_events(rx: &mut crate::event::HubEvents) -> Vec<HubEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_lines_forwarded_in_order() {
        let (relay, mut rx, _, _) = relay(0);
        let stdout: &'static [u8] = b"one\ntwo\r\nthree";
        relay.start(stdout, &b""[..]).wait_with_grace(GRACE).await;

        let lines: Vec<_> = drain_events(&mut rx)
            .into_iter()
            .map(|e| match e {
                HubEvent::Output { line, .. } => line,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_non_utf8_bytes_do_not_end_stream() {
        let (relay, mut rx, _, errors) = relay(0);
        let bytes: &'static [u8] = b"\xff\xfe\nok\n";
        relay.start(bytes, bytes).wait_with_grace(GRACE).await;

        let events = drain_events(&mut rx);
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            let lines: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    HubEvent::Output { stream: s, line, .. } if *s == stream => Some(line.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(lines, vec!["\u{FFFD}\u{FFFD}", "ok"], "{:?}", stream);
        }
        assert_eq!(errors.text(), "\u{FFFD}\u{FFFD}\nok");
    }

    #[tokio::test]
    async fn test_init_envelope_records_address() {
        let (relay, mut rx, addresses, _) = relay(3);
        let stdout: &'static [u8] = b"booting\n{\"type\":\"Init\",\"payload\":\"127.0.0.1:4100\"}\n";
        relay.start(stdout, &b""[..]).wait_with_grace(GRACE).await;

        assert_eq!(addresses.get(ChildId(3)), Some("127.0.0.1:4100".parse().unwrap()));

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 2);
        match &events[1] {
            HubEvent::Envelope { id, envelope, .. } => {
                assert_eq!(*id, ChildId(3));
                assert_eq!(envelope.msg_type, MessageType::Init);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_init_address_is_ignored() {
        let (relay, mut rx, addresses, _) = relay(1);
        let stdout: &'static [u8] = b"{\"type\":\"Init\",\"payload\":\"not-an-address\"}\n";
        relay.start(stdout, &b""[..]).wait_with_grace(GRACE).await;

        assert!(addresses.get(ChildId(1)).is_none());
        assert!(matches!(drain_events(&mut rx)[0], HubEvent::Envelope { .. }));
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_poison_stream() {
        let (relay, mut rx, addresses, _) = relay(2);
        let stdout: &'static [u8] =
            b"{\"type\":\"Init\",\"payl\n{\"type\":\"Init\",\"payload\":\"127.0.0.1:9\"}\n";
        relay.start(stdout, &b""[..]).wait_with_grace(GRACE).await;

        let events = drain_events(&mut rx);
        assert!(matches!(events[0], HubEvent::Output { .. }));
        assert!(matches!(events[1], HubEvent::Envelope { .. }));
        assert!(addresses.get(ChildId(2)).is_some());
    }

    #[tokio::test]
    async fn test_stderr_is_captured_and_forwarded() {
        let (relay, mut rx, _, errors) = relay(0);
        let stderr: &'static [u8] = b"first problem\nsecond problem\n";
        relay.start(&b""[..], stderr).wait_with_grace(GRACE).await;

        assert_eq!(errors.text(), "first problem\nsecond problem");
        let events = drain_events(&mut rx);
        assert!(events.iter().all(|e| matches!(
            e,
            HubEvent::Output {
                stream: StreamKind::Stderr,
                ..
            }
        )));
    }

    #[test]
    fn test_error_capture_keeps_tail() {
        let errors = ErrorCapture::new();
        for i in 0..(MAX_CAPTURED_LINES + 5) {
            errors.push(&format!("line {}", i));
        }
        let text = errors.text();
        assert!(text.starts_with("line 5\n"));
        assert!(text.ends_with(&format!("line {}", MAX_CAPTURED_LINES + 4)));
    }

    #[tokio::test]
    async fn test_grace_aborts_stuck_stream() {
        let (relay, _rx, _, _) = relay(0);
        // Writer half kept alive so the reader never sees EOF
        let (reader, _writer) = tokio::io::duplex(64);
        let drained = relay
            .start(reader, &b""[..])
            .wait_with_grace(Duration::from_millis(50))
            .await;
        assert!(!drained);
    }
}
