//! `POST /v1/approvals/:approval_id/decide`.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use sa_domain::model::ApprovalDecision;
use serde::Deserialize;

use crate::engine::approval::decide_approval;
use crate::http::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DecideBody {
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn decide(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(body): Json<DecideBody>,
) -> impl IntoResponse {
    let decision = match body.decision.as_str() {
        "approve" => ApprovalDecision::Approve,
        "reject" => ApprovalDecision::Reject,
        other => {
            return error_response(sa_domain::error::Error::Validation(format!(
                "decision must be \"approve\" or \"reject\", got {other:?}"
            )))
        }
    };
    match decide_approval(&state, &approval_id, decision, body.reason).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(e),
    }
}
