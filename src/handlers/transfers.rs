use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::{ApiError, AppJson};
use crate::models::{AuthUser, TransferRequest, TransferResponse};
use crate::services::transfers;
use crate::state::AppState;

/// `POST /transfers`. Thin wrapper over the ledger transfer core; all
/// validation, locking, and the atomic commit live in the service.
pub async fn transfer(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    AppJson(payload): AppJson<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let response = transfers::execute_transfer(&state, &caller, &payload).await?;
    Ok(Json(response))
}

/// `OPTIONS /transfers`: empty 204 for cross-origin preflight. Response
/// headers come from the CORS layer.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
