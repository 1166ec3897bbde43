//! A single outbound streaming call to an agent's `/invoke` endpoint.

use futures_util::{Stream, StreamExt};
use sa_domain::error::{Error, Result};

use crate::event::{decode, AgentStreamEvent};
use crate::parser::StreamParser;

#[derive(Debug, Clone, serde::Serialize)]
pub struct InvokeRequest<'a> {
    pub agent_id: &'a str,
    pub session_id: &'a str,
    pub run_id: &'a str,
    pub input_message: &'a str,
    pub messages: &'a [serde_json::Value],
    #[serde(default)]
    pub context: serde_json::Value,
}

pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with valid static config");
        AgentClient { http }
    }

    /// Open the stream and return it as an async `Stream` of decoded
    /// events. The underlying HTTP request itself is bound by the
    /// client's configured timeout; callers additionally race this
    /// against a cancellation signal for cooperative `CancelRun`.
    pub async fn invoke_stream(
        &self,
        endpoint: &str,
        req: &InvokeRequest<'_>,
    ) -> Result<impl Stream<Item = AgentStreamEvent>> {
        let response = self
            .http
            .post(endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("invoke {endpoint}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "agent {endpoint} returned {}",
                response.status()
            )));
        }

        let mut byte_stream = response.bytes_stream();
        Ok(async_stream::stream! {
            let mut parser = StreamParser::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield AgentStreamEvent::Error {
                            code: "transport".to_string(),
                            message: e.to_string(),
                        };
                        return;
                    }
                };
                for frame in parser.push(&chunk) {
                    if let Some(event) = decode(&frame) {
                        yield event;
                    }
                }
            }
            if let Some(frame) = parser.finish() {
                if let Some(event) = decode(&frame) {
                    yield event;
                }
            }
        })
    }
}
