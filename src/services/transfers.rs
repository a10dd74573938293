//! The ledger transfer core: validates a transfer request against two account
//! rows and applies the debit, the credit, and the audit record as a single
//! Postgres transaction. Every HTTP-facing caller is a thin wrapper around
//! [`execute_transfer`]; no other code path mutates balances.

use serde_json::Value;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::ApiError;
use crate::models::{
    AccountStatus, AuthUser, IdempotencyStatus, TransferRequest, TransferResponse,
};
use crate::state::AppState;

/// Shape and amount checks, run before any storage access. Returns the
/// normalized account numbers and the amount in minor units.
pub fn validate_transfer_input(
    payload: &TransferRequest,
) -> Result<(String, String, i64), ApiError> {
    let from = payload.from_account.trim();
    let to = payload.to_account.trim();

    if from.is_empty() || to.is_empty() {
        return Err(ApiError::InvalidArgument(
            "invalid transaction details".to_string(),
        ));
    }

    if from == to {
        return Err(ApiError::InvalidArgument(
            "sender and receiver accounts must differ".to_string(),
        ));
    }

    let amount = payload.amount.minor_units()?;

    Ok((from.to_string(), to.to_string(), amount))
}

struct LockedAccount {
    id: Uuid,
    owner_id: Uuid,
    balance: i64,
    status: AccountStatus,
}

async fn lock_account(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_number: &str,
) -> Result<Option<LockedAccount>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, owner_id, balance, status FROM accounts
         WHERE account_number = $1
         FOR UPDATE",
    )
    .bind(account_number)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|row| LockedAccount {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        balance: row.get("balance"),
        status: row.get("status"),
    }))
}

pub async fn execute_transfer(
    state: &AppState,
    caller: &AuthUser,
    payload: &TransferRequest,
) -> Result<TransferResponse, ApiError> {
    let (from_number, to_number, amount) = validate_transfer_input(payload)?;

    if let Some(key) = payload.idempotency_key.as_deref() {
        if let Some(cached) = check_idempotency_cache(state, caller.id, key).await? {
            return Ok(cached);
        }
        reserve_idempotency_key(state, caller.id, key).await?;
    }

    let result = run_transfer_tx(
        state,
        caller.id,
        &from_number,
        &to_number,
        amount,
        payload.idempotency_key.as_deref(),
    )
    .await;

    if result.is_err() {
        if let Some(key) = payload.idempotency_key.as_deref() {
            // Best effort: a lost update here only means the client can retry.
            let _ = fail_idempotency_key(state, caller.id, key).await;
        }
    }

    result
}

/// Lookup, balance check, and the atomic apply. The two account rows are
/// locked in account-number order so that opposing transfers acquire locks in
/// the same sequence; validation then runs sender-first against the locked
/// rows, which makes the balance check a commit-time check rather than a
/// stale read. Any error before commit drops the transaction and rolls
/// everything back.
async fn run_transfer_tx(
    state: &AppState,
    caller_id: Uuid,
    from_number: &str,
    to_number: &str,
    amount: i64,
    idempotency_key: Option<&str>,
) -> Result<TransferResponse, ApiError> {
    let mut tx = state.pool.begin().await?;

    let (first, second) = lock_order(from_number, to_number);
    let first_row = lock_account(&mut tx, first).await?;
    let second_row = lock_account(&mut tx, second).await?;

    let (sender_row, receiver_row) = if first == from_number {
        (first_row, second_row)
    } else {
        (second_row, first_row)
    };

    let sender = sender_row
        .filter(|account| account.status == AccountStatus::Active && account.owner_id == caller_id)
        .ok_or_else(|| {
            ApiError::NotFound("sender account not found or unauthorized".to_string())
        })?;

    let receiver = receiver_row
        .filter(|account| account.status == AccountStatus::Active)
        .ok_or_else(|| {
            ApiError::NotFound("receiver account not found or inactive".to_string())
        })?;

    if sender.balance < amount {
        return Err(ApiError::FailedPrecondition(
            "insufficient balance in sender account".to_string(),
        ));
    }

    sqlx::query("UPDATE accounts SET balance = balance - $1, updated_at = NOW() WHERE id = $2")
        .bind(amount)
        .bind(sender.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE accounts SET balance = balance + $1, updated_at = NOW() WHERE id = $2")
        .bind(amount)
        .bind(receiver.id)
        .execute(&mut *tx)
        .await?;

    let record = sqlx::query(
        "INSERT INTO transactions (caller_id, from_account, to_account, amount, idempotency_key)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(caller_id)
    .bind(from_number)
    .bind(to_number)
    .bind(amount)
    .bind(idempotency_key)
    .fetch_one(&mut *tx)
    .await?;

    let response = TransferResponse {
        success: true,
        transaction_id: record.get::<Uuid, _>("id").to_string(),
    };

    if let Some(key) = idempotency_key {
        store_idempotency_response(&mut tx, caller_id, key, &response).await?;
    }

    tx.commit().await?;

    tracing::info!(
        transaction_id = %response.transaction_id,
        from = from_number,
        to = to_number,
        amount,
        "transfer completed"
    );

    Ok(response)
}

/// Deterministic lock order for a pair of account numbers.
fn lock_order<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Returns the stored response for a key that already completed successfully.
async fn check_idempotency_cache(
    state: &AppState,
    user_id: Uuid,
    key: &str,
) -> Result<Option<TransferResponse>, ApiError> {
    let row = sqlx::query(
        "SELECT status, response_body FROM idempotency_keys WHERE user_id = $1 AND key = $2",
    )
    .bind(user_id)
    .bind(key)
    .fetch_optional(&state.pool)
    .await?;

    if let Some(row) = row {
        let status: IdempotencyStatus = row.get("status");
        if status == IdempotencyStatus::Success {
            if let Ok(body) = row.try_get::<Value, _>("response_body") {
                if let Ok(response) = serde_json::from_value::<TransferResponse>(body) {
                    return Ok(Some(response));
                }
            }
            return Err(ApiError::Internal(
                "stored idempotent response is unreadable".to_string(),
            ));
        }
    }

    Ok(None)
}

/// Claims the key before starting work. An insert that changes no row means
/// the key is held by a completed or in-flight attempt; failed attempts are
/// reclaimed for retry.
async fn reserve_idempotency_key(
    state: &AppState,
    user_id: Uuid,
    key: &str,
) -> Result<(), ApiError> {
    let result = sqlx::query(
        "INSERT INTO idempotency_keys (user_id, key, status)
         VALUES ($1, $2, 'pending'::idempotency_status)
         ON CONFLICT (user_id, key) DO UPDATE
         SET status = 'pending'::idempotency_status, created_at = NOW()
         WHERE idempotency_keys.status = 'failed'::idempotency_status",
    )
    .bind(user_id)
    .bind(key)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Aborted(
            "a transfer with this idempotency key is already in progress".to_string(),
        ));
    }

    Ok(())
}

async fn store_idempotency_response(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    key: &str,
    response: &TransferResponse,
) -> Result<(), ApiError> {
    let body = serde_json::to_value(response)
        .map_err(|e| ApiError::Internal(format!("failed to serialize response: {e}")))?;

    sqlx::query(
        "UPDATE idempotency_keys
         SET response_body = $1, status = 'success'::idempotency_status
         WHERE user_id = $2 AND key = $3",
    )
    .bind(body)
    .bind(user_id)
    .bind(key)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn fail_idempotency_key(state: &AppState, user_id: Uuid, key: &str) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE idempotency_keys
         SET status = 'failed'::idempotency_status
         WHERE user_id = $1 AND key = $2 AND status = 'pending'::idempotency_status",
    )
    .bind(user_id)
    .bind(key)
    .execute(&state.pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Amount;

    fn request(from: &str, to: &str, amount: Amount) -> TransferRequest {
        TransferRequest {
            from_account: from.to_string(),
            to_account: to.to_string(),
            amount,
            idempotency_key: None,
        }
    }

    #[test]
    fn valid_input_passes() {
        let req = request("10001111111", "10002222222", Amount::Number(2000));
        let (from, to, amount) = validate_transfer_input(&req).unwrap();
        assert_eq!(from, "10001111111");
        assert_eq!(to, "10002222222");
        assert_eq!(amount, 2000);
    }

    #[test]
    fn string_amounts_are_parsed() {
        let req = request("10001111111", "10002222222", Amount::Text("600".into()));
        let (_, _, amount) = validate_transfer_input(&req).unwrap();
        assert_eq!(amount, 600);
    }

    #[test]
    fn missing_account_numbers_are_rejected() {
        let req = request("", "10002222222", Amount::Number(100));
        let err = validate_transfer_input(&req).unwrap_err();
        assert_eq!(err.code(), "invalid-argument");

        let req = request("10001111111", "   ", Amount::Number(100));
        assert!(validate_transfer_input(&req).is_err());
    }

    #[test]
    fn self_transfer_is_rejected() {
        let req = request("10001111111", "10001111111", Amount::Number(100));
        let err = validate_transfer_input(&req).unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
    }

    #[test]
    fn non_positive_and_non_numeric_amounts_are_rejected() {
        for amount in [
            Amount::Number(0),
            Amount::Number(-10),
            Amount::Text("zero".into()),
            Amount::Text("".into()),
        ] {
            let req = request("10001111111", "10002222222", amount);
            let err = validate_transfer_input(&req).unwrap_err();
            assert_eq!(err.code(), "invalid-argument");
        }
    }

    #[test]
    fn shape_check_runs_before_amount_check() {
        // Same-account requests fail on the account pair even when the amount
        // is also bad; first failing check wins.
        let req = request("10001111111", "10001111111", Amount::Number(-1));
        let err = validate_transfer_input(&req).unwrap_err();
        assert_eq!(err.to_string(), "sender and receiver accounts must differ");
    }

    #[test]
    fn lock_order_is_deterministic() {
        assert_eq!(lock_order("a", "b"), ("a", "b"));
        assert_eq!(lock_order("b", "a"), ("a", "b"));
        let (first, second) = lock_order("10002222222", "10001111111");
        assert!(first <= second);
    }
}
