pub mod client;
pub mod rpc;

pub use client::{InboundFrame, InvokeMessage, OutboundFrame};
pub use rpc::{IngressRequest, IngressResponse, OrchestratorRequest, OrchestratorResponse};
