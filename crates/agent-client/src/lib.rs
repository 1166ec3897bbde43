pub mod client;
pub mod event;
pub mod parser;

pub use client::{AgentClient, InvokeRequest};
pub use event::AgentStreamEvent;
