//! Loan applications and the admin decision workflow.

use rand::Rng;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::ApiError;
use crate::models::{LoanResponse, LoanStatus, LoanType};
use crate::services::notifications;
use crate::state::AppState;

const APPLICATION_NUMBER_PREFIX: &str = "PMBL00";
const APPLY_ATTEMPTS: usize = 5;

/// Legacy application-number shape (`PMBL00` + 7 digits), unique-index backed.
pub fn generate_application_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000_000);
    format!("{APPLICATION_NUMBER_PREFIX}{suffix:07}")
}

pub async fn apply(
    state: &AppState,
    applicant_id: Uuid,
    amount: i64,
    loan_type: LoanType,
) -> Result<LoanResponse, ApiError> {
    for attempt in 0..APPLY_ATTEMPTS {
        let application_number = generate_application_number();
        let result = sqlx::query(
            "INSERT INTO loan_applications
                 (application_number, applicant_id, amount, loan_type, interest_rate)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, status, created_at",
        )
        .bind(&application_number)
        .bind(applicant_id)
        .bind(amount)
        .bind(loan_type)
        .bind(loan_type.interest_rate())
        .fetch_one(&state.pool)
        .await;

        match result {
            Ok(row) => {
                return Ok(LoanResponse {
                    id: row.get::<Uuid, _>("id").to_string(),
                    application_number,
                    applicant_id: applicant_id.to_string(),
                    amount,
                    loan_type,
                    interest_rate: loan_type.interest_rate(),
                    status: row.get("status"),
                    created_at: row
                        .get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>(
                            "created_at",
                        )
                        .to_rfc3339(),
                });
            }
            Err(err) if is_unique_violation(&err) => {
                tracing::debug!(attempt, %application_number, "application number collision, retrying");
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ApiError::Internal(
        "could not allocate a unique application number".to_string(),
    ))
}

/// Admin decision on a pending application. Re-deciding is rejected; the
/// applicant is notified inside the same transaction as the status write.
pub async fn decide(
    state: &AppState,
    loan_id: Uuid,
    decided_by: Uuid,
    decision: LoanStatus,
) -> Result<(), ApiError> {
    if decision == LoanStatus::Pending {
        return Err(ApiError::InvalidArgument(
            "decision must be approved or rejected".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;

    let row = sqlx::query(
        "SELECT l.status, u.email FROM loan_applications l
         JOIN users u ON u.id = l.applicant_id
         WHERE l.id = $1
         FOR UPDATE OF l",
    )
    .bind(loan_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("loan application not found".to_string()))?;

    let current: LoanStatus = row.get("status");
    if current != LoanStatus::Pending {
        return Err(ApiError::FailedPrecondition(
            "loan application already decided".to_string(),
        ));
    }

    sqlx::query(
        "UPDATE loan_applications
         SET status = $1, decided_by = $2, updated_at = NOW()
         WHERE id = $3",
    )
    .bind(decision)
    .bind(decided_by)
    .bind(loan_id)
    .execute(&mut *tx)
    .await?;

    let applicant_email: String = row.get("email");
    let (subject, body) = notifications::loan_decision_message(decision);
    notifications::enqueue(&mut tx, "loan.decided", &applicant_email, subject, &body).await?;

    tx.commit().await?;

    tracing::info!(%loan_id, ?decision, "loan application decided");

    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .as_deref()
        == Some("23505")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_numbers_have_the_legacy_shape() {
        for _ in 0..100 {
            let number = generate_application_number();
            assert_eq!(number.len(), 13);
            assert!(number.starts_with("PMBL00"));
            assert!(number[6..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
