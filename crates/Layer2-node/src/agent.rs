//! Node agent - RPC server plus stdin command loop
//!
//! Lifecycle:
//! 1. Bind the RPC server and write the `Init` envelope with the bound address
//! 2. Serve RPC on a background task
//! 3. Read stdin line by line until EOF or a termination signal
//!
//! Stdin handling:
//! - blank lines are skipped
//! - `Command` envelopes carrying a [`NodeCommand`] are executed
//! - anything else is acknowledged with `Called with command <line>`

use crate::client::RpcClient;
use crate::config::NodeConfig;
use crate::output::LineWriter;
use crate::procedure::ProcedureSet;
use crate::server::RpcServer;
use crate::signal::wait_for_shutdown_signal;
use crate::stats::NodeStats;
use distrual_foundation::{Envelope, MessageType, NodeCommand, NodeEvent, NodeSnapshot, Result};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct NodeAgent {
    config: NodeConfig,
    procedures: ProcedureSet,
    client: RpcClient,
    stats: NodeStats,
    output: LineWriter,
}

impl NodeAgent {
    /// Agent with the built-in procedures, writing to stdout
    pub fn new(config: NodeConfig) -> Result<Self> {
        Ok(Self {
            config,
            procedures: ProcedureSet::with_builtins(),
            client: RpcClient::new()?,
            stats: NodeStats::new(),
            output: LineWriter::stdout(),
        })
    }

    pub fn with_procedures(mut self, procedures: ProcedureSet) -> Self {
        self.procedures = procedures;
        self
    }

    pub fn with_output(mut self, output: LineWriter) -> Self {
        self.output = output;
        self
    }

    /// Run until `input` closes or a termination signal arrives
    pub async fn run<R>(self, input: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        self.run_until(input, async {
            if let Err(e) = wait_for_shutdown_signal().await {
                warn!("Signal handling unavailable: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Termination signal received");
        })
        .await
    }

    /// Run until `input` closes or `shutdown` completes
    pub async fn run_until<R, F>(self, input: R, shutdown: F) -> Result<()>
    where
        R: AsyncRead + Unpin,
        F: Future<Output = ()>,
    {
        let server = RpcServer::bind(
            self.config.bind_addr(),
            self.procedures.clone(),
            self.stats.clone(),
        )
        .await?;
        let address = server.local_addr();
        info!(%address, procedures = ?self.procedures.names(), "Node ready");

        // Handshake goes out before the first request can be served
        self.output.send(&Envelope::init(address)).await?;

        let server_task = tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                warn!("RPC server stopped: {}", e);
            }
        });

        let result = tokio::select! {
            result = self.command_loop(input, address) => result,
            _ = shutdown => Ok(()),
        };

        server_task.abort();
        info!(%address, "Node stopped");
        result
    }

    async fn command_loop<R>(&self, input: R, address: SocketAddr) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::with_capacity(256);
        let mut in_flight = JoinSet::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            while in_flight.try_join_next().is_some() {}

            // Bytes that are not UTF-8 become U+FFFD, the line is still a command
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.handle_line(line, address, &mut in_flight).await?;
        }

        debug!("Stdin closed, finishing {} in-flight calls", in_flight.len());
        while in_flight.join_next().await.is_some() {}
        Ok(())
    }

    async fn handle_line(
        &self,
        line: &str,
        address: SocketAddr,
        in_flight: &mut JoinSet<()>,
    ) -> Result<()> {
        let command = Envelope::decode(line)
            .ok()
            .filter(|envelope| envelope.msg_type == MessageType::Command)
            .and_then(|envelope| match envelope.payload_as::<NodeCommand>() {
                Ok(command) => Some((command, envelope.id)),
                Err(e) => {
                    debug!("Unrecognized command payload: {}", e);
                    None
                }
            });

        match command {
            Some((NodeCommand::Invoke { target, procedure, args }, id)) => {
                in_flight.spawn(self.invoke(target, procedure, args, id));
                Ok(())
            }
            Some((NodeCommand::Snapshot, id)) => {
                let snapshot = NodeSnapshot {
                    address: address.to_string(),
                    calls_served: self.stats.calls_served(),
                    invokes_sent: self.stats.invokes_sent(),
                    uptime_secs: self.stats.uptime_secs(),
                };
                let envelope = correlate(Envelope::snapshot(serde_json::to_value(snapshot)?), id);
                self.output.send(&envelope).await
            }
            None => self.output.line(&format!("Called with command {}", line)).await,
        }
    }

    /// Call a peer and report the result as an `Event` envelope
    fn invoke(
        &self,
        target: String,
        procedure: String,
        args: Value,
        id: Option<u64>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let client = self.client.clone();
        let output = self.output.clone();
        let stats = self.stats.clone();

        async move {
            stats.record_invoke();
            let event = match client.call(&target, &procedure, args).await {
                Ok(result) => NodeEvent::Invoke {
                    target,
                    procedure,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    warn!(%target, "Invoke failed: {}", e);
                    NodeEvent::Invoke {
                        target,
                        procedure,
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            };

            let envelope = match serde_json::to_value(&event) {
                Ok(payload) => correlate(Envelope::event(payload), id),
                Err(e) => {
                    warn!("Failed to encode event: {}", e);
                    return;
                }
            };
            if let Err(e) = output.send(&envelope).await {
                warn!("Failed to write event: {}", e);
            }
        }
    }
}

fn correlate(envelope: Envelope, id: Option<u64>) -> Envelope {
    match id {
        Some(id) => envelope.with_id(id),
        None => envelope,
    }
}
