//! Operator display - renders hub events and listings as text

use distrual_foundation::{Envelope, MessageType, NodeEvent, NodeSnapshot};
use distrual_hub::{ChildInfo, HubEvent, StreamKind};
use serde_json::Value;

/// One line per event
pub fn render(event: &HubEvent) -> String {
    match event {
        HubEvent::Spawned { id, pid, program } => match pid {
            Some(pid) => format!("Started child {} (pid {}): {}", id, pid, program),
            None => format!("Started child {}: {}", id, program),
        },
        HubEvent::Output { id, stream, line } => match stream {
            StreamKind::Stdout => format!("[{}] {}", id, line),
            StreamKind::Stderr => format!("[{}:err] {}", id, line),
        },
        HubEvent::Envelope { id, envelope, .. } => format!("[{}] {}", id, render_envelope(envelope)),
        HubEvent::Exited(exit) => format!("Child {} {}", exit.id, exit.outcome),
    }
}

fn render_envelope(envelope: &Envelope) -> String {
    let tag = match envelope.id {
        Some(id) => format!(" #{}", id),
        None => String::new(),
    };

    match &envelope.msg_type {
        MessageType::Init => match envelope.init_address() {
            Some(addr) => format!("listening on {}", addr),
            None => format!("init {}", envelope.payload),
        },
        MessageType::Event => match envelope.payload_as::<NodeEvent>() {
            Ok(NodeEvent::Invoke {
                target,
                procedure,
                result,
                error,
            }) => match (result, error) {
                (_, Some(error)) => format!("{} on {} failed{}: {}", procedure, target, tag, error),
                (Some(result), None) => format!("{} on {}{} -> {}", procedure, target, tag, result),
                (None, None) => format!("{} on {}{} done", procedure, target, tag),
            },
            Err(_) => format!("event{} {}", tag, envelope.payload),
        },
        MessageType::Snapshot => match envelope.payload_as::<NodeSnapshot>() {
            Ok(s) => format!(
                "snapshot{}: address {}, {} calls served, {} invokes sent, up {}s",
                tag, s.address, s.calls_served, s.invokes_sent, s.uptime_secs
            ),
            Err(_) => format!("snapshot{} {}", tag, envelope.payload),
        },
        MessageType::Command => format!("command{} {}", tag, envelope.payload),
        MessageType::Unknown(name) => format!("{}{} {}", name, tag, compact(&envelope.payload)),
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Table of live children
pub fn render_children(children: &[ChildInfo]) -> String {
    if children.is_empty() {
        return "No children running".to_string();
    }

    let mut out = format!("{:<4} {:<8} {:<22} {}", "ID", "PID", "ADDRESS", "COMMAND");
    for child in children {
        let pid = child.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        let address = child
            .address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut command = child.program.clone();
        for arg in &child.args {
            command.push(' ');
            command.push_str(arg);
        }
        if child.killed {
            command.push_str(" (killing)");
        }
        out.push_str(&format!("\n{:<4} {:<8} {:<22} {}", child.id, pid, address, command));
    }
    out
}
