//! RPC client for calling peer nodes

use distrual_foundation::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl RpcClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Call `procedure` on the node listening at `target` (`host:port`)
    pub async fn call(&self, target: &str, procedure: &str, args: Value) -> Result<Value> {
        let url = format!("http://{}/rpc/{}", target, procedure);
        debug!(%url, "Calling peer");

        let response = self
            .http
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("{}: {}", target, e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("Bad reply from {}: {}", target, e)))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("no error message");
        Err(Error::Rpc(format!("{} ({}): {}", procedure, status, message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::ProcedureSet;
    use crate::server::RpcServer;
    use crate::stats::NodeStats;
    use distrual_foundation::{ExampleArgs, ExampleReply, EXAMPLE_PROCEDURE};

    async fn peer() -> String {
        let server = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            ProcedureSet::with_builtins(),
            NodeStats::new(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().to_string();
        tokio::spawn(server.serve());
        addr
    }

    #[tokio::test]
    async fn test_example_call() {
        let target = peer().await;
        let client = RpcClient::new().unwrap();
        let reply = client
            .call(&target, EXAMPLE_PROCEDURE, serde_json::to_value(ExampleArgs { x: 5 }).unwrap())
            .await
            .unwrap();
        let reply: ExampleReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.y, 10);
    }

    #[tokio::test]
    async fn test_unknown_procedure_is_rpc_error() {
        let target = peer().await;
        let client = RpcClient::new().unwrap();
        let err = client
            .call(&target, "Missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rpc(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let target = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = RpcClient::with_timeout(Duration::from_secs(2)).unwrap();
        let result = client.call(&target, "Example", serde_json::json!({"X": 1})).await;
        assert!(matches!(result, Err(Error::Rpc(_))));
    }
}
