use axum::extract::{Extension, Query, State};
use axum::Json;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::ApiError;
use crate::models::{AuthUser, ListTransactionsQuery, TransactionResponse};
use crate::state::AppState;

const PAGE_SIZE: i64 = 100;

/// `GET /transactions?account_number=`: history for one account, newest
/// first. Callers may only read accounts they own; the existence of foreign
/// accounts is not revealed.
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Query(params): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let account = sqlx::query("SELECT owner_id FROM accounts WHERE account_number = $1")
        .bind(&params.account_number)
        .fetch_optional(&state.pool)
        .await?;

    let visible = match account {
        Some(row) => caller.is_admin() || row.get::<Uuid, _>("owner_id") == caller.id,
        None => false,
    };
    if !visible {
        return Err(ApiError::NotFound("account not found".to_string()));
    }

    let rows = sqlx::query(
        "SELECT id, from_account, to_account, amount, created_at
         FROM transactions
         WHERE from_account = $1 OR to_account = $1
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(&params.account_number)
    .bind(PAGE_SIZE)
    .fetch_all(&state.pool)
    .await?;

    let records = rows
        .into_iter()
        .map(|row| TransactionResponse {
            transaction_id: row.get::<Uuid, _>("id").to_string(),
            from_account: row.get("from_account"),
            to_account: row.get("to_account"),
            amount: row.get("amount"),
            status: "completed".to_string(),
            timestamp: row
                .get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>("created_at")
                .to_rfc3339(),
        })
        .collect();

    Ok(Json(records))
}
