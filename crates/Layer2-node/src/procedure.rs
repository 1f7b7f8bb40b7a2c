//! Procedures - the remote-callable surface of a node

use async_trait::async_trait;
use distrual_foundation::{Error, ExampleArgs, ExampleReply, Result, EXAMPLE_PROCEDURE};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named procedure taking and returning JSON
#[async_trait]
pub trait Procedure: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, args: Value) -> Result<Value>;
}

// ============================================================================
// Registry
// ============================================================================

/// Procedures a node serves, by name
#[derive(Clone, Default)]
pub struct ProcedureSet {
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl ProcedureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set with the built-in procedures registered
    pub fn with_builtins() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(Doubler));
        set
    }

    /// Register a procedure, replacing any with the same name
    pub fn register(&mut self, procedure: Arc<dyn Procedure>) {
        self.procedures.insert(procedure.name().to_string(), procedure);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Procedure>> {
        self.procedures.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.procedures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Builtins
// ============================================================================

/// `{"X": n} -> {"Y": 2n}`
pub struct Doubler;

#[async_trait]
impl Procedure for Doubler {
    fn name(&self) -> &str {
        EXAMPLE_PROCEDURE
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let args: ExampleArgs = serde_json::from_value(args)
            .map_err(|e| Error::InvalidInput(format!("{} expects {{\"X\": int}}: {}", EXAMPLE_PROCEDURE, e)))?;

        let y = args
            .x
            .checked_mul(2)
            .ok_or_else(|| Error::InvalidInput(format!("{} * 2 overflows", args.x)))?;

        Ok(serde_json::to_value(ExampleReply { y })?)
    }
}
