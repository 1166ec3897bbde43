use std::sync::Arc;

use sa_agent_client::AgentClient;
use sa_domain::config::Config;
use sa_domain::policy::PolicyEvaluator;
use sa_domain::store::Store;

use crate::engine::cancel::CancelMap;
use crate::ingress_client::IngressClient;
use crate::server_tools::ServerToolRegistry;

/// Shared state handed to every HTTP handler, RPC handler, and background
/// task. Grouped by concern the way a gateway app state typically is.
#[derive(Clone)]
pub struct AppState {
    // ── Configuration ──────────────────────────────────────────────
    pub config: Arc<Config>,

    // ── Persistence & domain logic ─────────────────────────────────
    pub store: Arc<dyn Store>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub server_tools: Arc<ServerToolRegistry>,

    // ── Outbound collaborators ──────────────────────────────────────
    pub agent_client: Arc<AgentClient>,
    pub ingress_client: Arc<IngressClient>,

    // ── Auth ────────────────────────────────────────────────────────
    pub api_token_hash: Option<Vec<u8>>,

    // ── In-flight run cancellation ────────────────────────────────────
    pub cancel_tokens: Arc<CancelMap>,
}
