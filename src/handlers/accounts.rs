use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::{ApiError, AppJson};
use crate::models::{
    AccountResponse, AuthUser, GetAccountsQuery, OpenAccountRequest, SetAccountStatusRequest,
};
use crate::services::accounts;
use crate::state::AppState;

pub async fn open_account(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    AppJson(payload): AppJson<OpenAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let initial_deposit = payload.initial_deposit.minor_units()?;
    let opened =
        accounts::open_account(&state, caller.id, payload.account_type, initial_deposit).await?;

    Ok(Json(AccountResponse {
        account_number: opened.account_number,
        owner_id: caller.id.to_string(),
        balance: opened.balance,
        credit_limit: opened.credit_limit,
        account_type: opened.account_type,
        status: opened.status,
        created_at: opened.created_at,
        updated_at: opened.updated_at,
    }))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Query(params): Query<GetAccountsQuery>,
) -> Result<Json<Vec<AccountResponse>>, ApiError> {
    // Customers only ever see their own accounts; admins see everything,
    // optionally narrowed by status.
    let mut query_str = String::from(
        "SELECT account_number, owner_id, balance, credit_limit, account_type, status,
                created_at, updated_at
         FROM accounts WHERE 1=1",
    );
    let mut idx = 0;

    if !caller.is_admin() {
        idx += 1;
        query_str.push_str(&format!(" AND owner_id = ${idx}"));
    }
    if params.status.is_some() {
        idx += 1;
        query_str.push_str(&format!(" AND status = ${idx}"));
    }
    query_str.push_str(" ORDER BY created_at");

    let mut query = sqlx::query(&query_str);
    if !caller.is_admin() {
        query = query.bind(caller.id);
    }
    if let Some(status) = params.status {
        query = query.bind(status);
    }

    let rows = query.fetch_all(&state.pool).await?;

    let accounts = rows
        .into_iter()
        .map(|row| AccountResponse {
            account_number: row.get("account_number"),
            owner_id: row.get::<Uuid, _>("owner_id").to_string(),
            balance: row.get("balance"),
            credit_limit: row.get("credit_limit"),
            account_type: row.get("account_type"),
            status: row.get("status"),
            created_at: row
                .get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>("created_at")
                .to_rfc3339(),
            updated_at: row
                .get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>("updated_at")
                .to_rfc3339(),
        })
        .collect();

    Ok(Json(accounts))
}

pub async fn set_account_status(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Path(account_number): Path<String>,
    AppJson(payload): AppJson<SetAccountStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !caller.is_admin() {
        return Err(ApiError::PermissionDenied(
            "admin role required".to_string(),
        ));
    }

    accounts::set_account_status(&state, &account_number, payload.status).await?;

    Ok(Json(serde_json::json!({
        "account_number": account_number,
        "status": payload.status,
    })))
}
