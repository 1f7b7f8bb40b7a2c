//! End-to-end tests against the real `distrual-node` and `distrual` binaries

use distrual_foundation::{ChildId, Envelope, HubConfig, MessageType, NodeEvent, NodeSnapshot};
use distrual_hub::{CallDispatcher, ExitOutcome, Hub, HubEvent, HubEvents};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

const NODE: &str = env!("CARGO_BIN_EXE_distrual-node");
const WAIT: Duration = Duration::from_secs(10);

fn hub() -> (Hub, HubEvents) {
    Hub::new(HubConfig::default().with_max_children(4))
}

fn spawn_node(hub: &Hub) -> ChildId {
    hub.spawn(NODE, &[] as &[&str]).expect("spawn node")
}

async fn address_of(hub: &Hub, id: ChildId) -> SocketAddr {
    hub.addresses()
        .wait_for(id, WAIT)
        .await
        .expect("node handshake")
}

/// Skip events until one matches
async fn next_matching<T>(
    events: &mut HubEvents,
    mut pick: impl FnMut(&HubEvent) -> Option<T>,
) -> T {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let Some(found) = pick(&event) {
                return found;
            }
        }
        panic!("event channel closed");
    };
    tokio::time::timeout(WAIT, wait)
        .await
        .expect("timed out waiting for event")
}

fn envelope_from(event: &HubEvent, id: ChildId, msg_type: MessageType) -> Option<Envelope> {
    match event {
        HubEvent::Envelope {
            id: from, envelope, ..
        } if *from == id && envelope.msg_type == msg_type => Some(envelope.clone()),
        _ => None,
    }
}

#[tokio::test]
async fn test_node_announces_address() {
    let (hub, _events) = hub();
    let id = spawn_node(&hub);

    let addr = address_of(&hub, id).await;
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);

    hub.shutdown(WAIT).await;
}

#[tokio::test]
async fn test_example_between_nodes() {
    let (hub, mut events) = hub();
    let dispatcher = CallDispatcher::new(hub.clone());
    let a = spawn_node(&hub);
    let b = spawn_node(&hub);

    let correlation = dispatcher.invoke_when_ready(a, b, 21, WAIT).await.unwrap();

    let event = next_matching(&mut events, |e| envelope_from(e, a, MessageType::Event)).await;
    assert_eq!(event.id, Some(correlation));
    match event.payload_as::<NodeEvent>().unwrap() {
        NodeEvent::Invoke {
            target,
            procedure,
            result,
            error,
        } => {
            assert_eq!(target, address_of(&hub, b).await.to_string());
            assert_eq!(procedure, "Example");
            assert_eq!(error, None);
            assert_eq!(result, Some(json!({"Y": 42})));
        }
    }

    // The target counts the call it served
    let snapshot_id = dispatcher.request_snapshot(b).await.unwrap();
    let snapshot = next_matching(&mut events, |e| envelope_from(e, b, MessageType::Snapshot)).await;
    assert_eq!(snapshot.id, Some(snapshot_id));
    let snapshot: NodeSnapshot = snapshot.payload_as().unwrap();
    assert_eq!(snapshot.calls_served, 1);

    hub.shutdown(WAIT).await;
}

#[tokio::test]
async fn test_plain_text_is_acknowledged() {
    let (hub, mut events) = hub();
    let id = spawn_node(&hub);
    address_of(&hub, id).await;

    hub.send(id, "hello node").await.unwrap();
    let line = next_matching(&mut events, |e| match e {
        HubEvent::Output { id: from, line, .. } if *from == id => Some(line.clone()),
        _ => None,
    })
    .await;
    assert_eq!(line, "Called with command hello node");

    hub.shutdown(WAIT).await;
}

#[tokio::test]
async fn test_kill_node() {
    let (hub, mut events) = hub();
    let id = spawn_node(&hub);
    address_of(&hub, id).await;

    hub.kill(id).unwrap();
    let exit = next_matching(&mut events, |e| match e {
        HubEvent::Exited(exit) if exit.id == id => Some(exit.clone()),
        _ => None,
    })
    .await;
    assert_eq!(exit.outcome, ExitOutcome::TerminatedBySupervisor);
    assert!(hub.addresses().get(id).is_none());
}

#[tokio::test]
async fn test_closing_stdin_stops_node_normally() {
    let (hub, mut events) = hub();
    let id = spawn_node(&hub);
    address_of(&hub, id).await;

    hub.close_stdin(id).await.unwrap();
    let exit = next_matching(&mut events, |e| match e {
        HubEvent::Exited(exit) if exit.id == id => Some(exit.clone()),
        _ => None,
    })
    .await;
    assert_eq!(exit.outcome, ExitOutcome::Normal);
    assert!(hub.is_empty());
}

#[tokio::test]
async fn test_direct_rpc() {
    let (hub, _events) = hub();
    let id = spawn_node(&hub);
    let addr = address_of(&hub, id).await;
    let http = reqwest::Client::new();

    let health: Value = http
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let reply: Value = http
        .post(format!("http://{}/rpc/Example", addr))
        .json(&json!({"X": 5}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply, json!({"Y": 10}));

    hub.shutdown(WAIT).await;
}

// ============================================================================
// Hub binary
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_hub_shell_session() {
    use std::process::Stdio;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mut hub = tokio::process::Command::new(env!("CARGO_BIN_EXE_distrual"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut stdin = hub.stdin.take().unwrap();
    let mut stdout = BufReader::new(hub.stdout.take().unwrap()).lines();

    stdin
        .write_all(b"bogus\n\xff\xfe\ncreate sh -c \"echo hi\"\n")
        .await
        .unwrap();

    let mut seen = Vec::new();
    let read = async {
        while let Some(line) = stdout.next_line().await.unwrap() {
            let done = line == "Child 0 exited normally";
            seen.push(line);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(WAIT, read).await.expect("hub output");

    assert!(seen.iter().any(|l| l == "Unknown command 'bogus', try 'help'"));
    // A line that is not UTF-8 is rejected without ending the session
    assert!(seen
        .iter()
        .any(|l| l == "Unknown command '\u{FFFD}\u{FFFD}', try 'help'"));
    assert!(seen.iter().any(|l| l == "[0] hi"));

    // End of input behaves like exit
    drop(stdin);
    let status = tokio::time::timeout(WAIT, hub.wait())
        .await
        .expect("hub exits")
        .unwrap();
    assert!(status.success());
}
