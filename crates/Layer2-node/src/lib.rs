//! distrual node agent
//!
//! A worker process supervised by the hub. It serves procedures over
//! JSON/HTTP, announces its address with an `Init` envelope on stdout, and
//! takes commands on stdin.

pub mod agent;
pub mod client;
pub mod config;
pub mod output;
pub mod procedure;
pub mod server;
pub mod signal;
pub mod stats;

pub use agent::NodeAgent;
pub use client::RpcClient;
pub use config::NodeConfig;
pub use output::LineWriter;
pub use procedure::{Doubler, Procedure, ProcedureSet};
pub use server::{router, RpcError, RpcServer};
pub use stats::NodeStats;
