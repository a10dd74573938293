use axum::extract::{Extension, Path, State};
use axum::Json;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::{ApiError, AppJson};
use crate::models::{AuthUser, LoanApplicationRequest, LoanDecisionRequest, LoanResponse};
use crate::services::loans;
use crate::state::AppState;

pub async fn apply(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    AppJson(payload): AppJson<LoanApplicationRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let amount = payload.amount.minor_units()?;
    let loan = loans::apply(&state, caller.id, amount, payload.loan_type).await?;
    Ok(Json(loan))
}

pub async fn list_loans(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let mut query_str = String::from(
        "SELECT id, application_number, applicant_id, amount, loan_type, interest_rate,
                status, created_at
         FROM loan_applications",
    );
    if !caller.is_admin() {
        query_str.push_str(" WHERE applicant_id = $1");
    }
    query_str.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query(&query_str);
    if !caller.is_admin() {
        query = query.bind(caller.id);
    }

    let rows = query.fetch_all(&state.pool).await?;

    let loans = rows
        .into_iter()
        .map(|row| LoanResponse {
            id: row.get::<Uuid, _>("id").to_string(),
            application_number: row.get("application_number"),
            applicant_id: row.get::<Uuid, _>("applicant_id").to_string(),
            amount: row.get("amount"),
            loan_type: row.get("loan_type"),
            interest_rate: row.get("interest_rate"),
            status: row.get("status"),
            created_at: row
                .get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>("created_at")
                .to_rfc3339(),
        })
        .collect();

    Ok(Json(loans))
}

pub async fn decide(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(loan_id): Path<String>,
    AppJson(payload): AppJson<LoanDecisionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !caller.is_admin() {
        return Err(ApiError::PermissionDenied(
            "admin role required".to_string(),
        ));
    }

    let loan_id = Uuid::parse_str(&loan_id)
        .map_err(|_| ApiError::InvalidArgument("invalid loan id".to_string()))?;

    loans::decide(&state, loan_id, caller.id, payload.decision).await?;

    Ok(Json(serde_json::json!({
        "id": loan_id.to_string(),
        "status": payload.decision,
    })))
}
