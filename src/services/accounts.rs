//! Account onboarding and the admin status workflow.

use rand::Rng;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::ApiError;
use crate::models::{AccountStatus, AccountType};
use crate::services::notifications;
use crate::state::AppState;

/// Smallest opening deposit accepted at onboarding, in minor units.
pub const MIN_OPENING_DEPOSIT: i64 = 1000;

/// Default advisory credit ceiling for new accounts. Not enforced by the
/// transfer core.
pub const DEFAULT_CREDIT_LIMIT: i64 = 100_000;

const ACCOUNT_NUMBER_PREFIX: &str = "1000";
const OPEN_ATTEMPTS: usize = 5;

/// Account numbers keep the legacy shape (`1000` + 7 digits). They are not
/// collision-free on their own, so insertion retries against the unique index.
pub fn generate_account_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000_000);
    format!("{ACCOUNT_NUMBER_PREFIX}{suffix:07}")
}

pub struct OpenedAccount {
    pub account_number: String,
    pub balance: i64,
    pub credit_limit: i64,
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Creates a `pending` account for the caller. The opening deposit becomes the
/// initial balance; the admin status workflow activates the account later.
pub async fn open_account(
    state: &AppState,
    owner_id: Uuid,
    account_type: AccountType,
    initial_deposit: i64,
) -> Result<OpenedAccount, ApiError> {
    if initial_deposit < MIN_OPENING_DEPOSIT {
        return Err(ApiError::InvalidArgument(format!(
            "initial deposit must be at least {MIN_OPENING_DEPOSIT}"
        )));
    }

    for attempt in 0..OPEN_ATTEMPTS {
        let account_number = generate_account_number();
        let result = sqlx::query(
            "INSERT INTO accounts (account_number, owner_id, balance, credit_limit, account_type)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING account_number, balance, credit_limit, account_type, status,
                       created_at, updated_at",
        )
        .bind(&account_number)
        .bind(owner_id)
        .bind(initial_deposit)
        .bind(DEFAULT_CREDIT_LIMIT)
        .bind(account_type)
        .fetch_one(&state.pool)
        .await;

        match result {
            Ok(row) => {
                return Ok(OpenedAccount {
                    account_number: row.get("account_number"),
                    balance: row.get("balance"),
                    credit_limit: row.get("credit_limit"),
                    account_type: row.get("account_type"),
                    status: row.get("status"),
                    created_at: rfc3339(&row, "created_at"),
                    updated_at: rfc3339(&row, "updated_at"),
                });
            }
            Err(err) if is_unique_violation(&err) => {
                tracing::debug!(attempt, %account_number, "account number collision, retrying");
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ApiError::Internal(
        "could not allocate a unique account number".to_string(),
    ))
}

/// Admin-only status transition. Transitions into `active` or `deleted`
/// enqueue an owner notification inside the same transaction, mirroring the
/// account-approval mails of the onboarding flow. Balance is never touched.
pub async fn set_account_status(
    state: &AppState,
    account_number: &str,
    new_status: AccountStatus,
) -> Result<(), ApiError> {
    if new_status == AccountStatus::Pending {
        return Err(ApiError::InvalidArgument(
            "accounts cannot be moved back to pending".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;

    let row = sqlx::query(
        "SELECT a.id, a.status, u.email FROM accounts a
         JOIN users u ON u.id = a.owner_id
         WHERE a.account_number = $1
         FOR UPDATE OF a",
    )
    .bind(account_number)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("account not found".to_string()))?;

    let account_id: Uuid = row.get("id");
    let old_status: AccountStatus = row.get("status");
    let owner_email: String = row.get("email");

    sqlx::query("UPDATE accounts SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(new_status)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    if new_status != old_status
        && matches!(new_status, AccountStatus::Active | AccountStatus::Deleted)
    {
        let (subject, body) = notifications::account_status_message(new_status);
        notifications::enqueue(&mut tx, "account.status_changed", &owner_email, subject, &body)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(%account_number, ?old_status, ?new_status, "account status changed");

    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .as_deref()
        == Some("23505")
}

fn rfc3339(row: &sqlx::postgres::PgRow, column: &str) -> String {
    row.get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>(column)
        .to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_have_the_legacy_shape() {
        for _ in 0..100 {
            let number = generate_account_number();
            assert_eq!(number.len(), 11);
            assert!(number.starts_with("1000"));
            assert!(number.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
