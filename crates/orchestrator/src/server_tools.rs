//! The server-tool registry: dispatch is always by name lookup into a
//! map of boxed trait objects, never a name-keyed mock branch (the
//! registry-dispatch contract this design settles on).

use std::collections::HashMap;

use async_trait::async_trait;
use sa_domain::error::{Error, Result};

#[async_trait]
pub trait ServerTool: Send + Sync {
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value>;
}

pub struct ServerToolRegistry {
    tools: HashMap<String, Box<dyn ServerTool>>,
}

impl ServerToolRegistry {
    pub fn new() -> Self {
        ServerToolRegistry {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, tool: Box<dyn ServerTool>) {
        self.tools.insert(name.into(), tool);
    }

    pub async fn dispatch(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("server tool {name}")))?;
        tool.execute(args).await
    }

    /// The handful of example server tools referenced by the literal
    /// scenarios this design must satisfy: an echo-style default, a
    /// deliberately blocked command tool, and a payments transfer tool
    /// that actually performs no side effect beyond acknowledging.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register("search.web", Box::new(EchoTool));
        reg.register("dangerous.command", Box::new(EchoTool));
        reg.register("payments.transfer", Box::new(PaymentsTransferTool));
        reg
    }
}

impl Default for ServerToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct EchoTool;

#[async_trait]
impl ServerTool for EchoTool {
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "echo": args }))
    }
}

struct PaymentsTransferTool;

#[async_trait]
impl ServerTool for PaymentsTransferTool {
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value> {
        let amount = args.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let to = args.get("to").and_then(|v| v.as_str()).unwrap_or("unknown");
        Ok(serde_json::json!({ "transferred": amount, "to": to, "status": "settled" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_unknown_tool_is_not_found() {
        let reg = ServerToolRegistry::with_defaults();
        let err = reg.dispatch("no.such.tool", serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.kind(), sa_domain::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn dispatch_payments_transfer() {
        let reg = ServerToolRegistry::with_defaults();
        let result = reg
            .dispatch("payments.transfer", serde_json::json!({"amount": 200, "to": "acct_9"}))
            .await
            .unwrap();
        assert_eq!(result["status"], "settled");
    }
}
