//! Status-change notifications: rows are enqueued in the same database
//! transaction as the state change that caused them, then drained by
//! [`dispatch_notifications`], which POSTs each one to the configured
//! mail-gateway endpoint. Delivery is fire-and-forget with respect to ledger
//! state; a lost notification never rolls anything back.

use std::time::Duration;

use serde_json::json;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::models::{AccountStatus, LoanStatus, NotificationStatus};
use crate::state::AppState;

const MAX_ATTEMPTS: i32 = 5;
const BATCH_SIZE: i64 = 10;

/// Subject and body for an account status transition.
pub fn account_status_message(status: AccountStatus) -> (&'static str, String) {
    let subject = match status {
        AccountStatus::Active => "Account Approved",
        _ => "Account Rejected",
    };
    let body = format!(
        "Your account status has been updated to {}.",
        status_label(status)
    );
    (subject, body)
}

/// Subject and body for a loan decision.
pub fn loan_decision_message(status: LoanStatus) -> (&'static str, String) {
    let subject = match status {
        LoanStatus::Approved => "Loan Approved",
        _ => "Loan Rejected",
    };
    let body = format!(
        "Your loan application status has been updated to {}.",
        match status {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
        }
    );
    (subject, body)
}

fn status_label(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Pending => "pending",
        AccountStatus::Active => "active",
        AccountStatus::Onhold => "onhold",
        AccountStatus::Deleted => "deleted",
    }
}

pub async fn enqueue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event_type: &str,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notifications (event_type, recipient, subject, body)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(event_type)
    .bind(recipient)
    .bind(subject)
    .bind(body)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Long-running dispatcher task. Picks up pending notifications whose linear
/// backoff window has elapsed, POSTs them to the sink, and records the
/// outcome. Gives up on a notification after [`MAX_ATTEMPTS`] tries.
pub async fn dispatch_notifications(state: AppState) {
    let Some(sink_url) = state.config.notify_sink_url.clone() else {
        return;
    };
    let client = reqwest::Client::new();

    loop {
        let rows = sqlx::query(
            "SELECT id, recipient, subject, body, attempts FROM notifications
             WHERE status = 'pending'::notification_status
             AND (last_attempt_at IS NULL
                  OR last_attempt_at < NOW() - INTERVAL '10 seconds' * (attempts + 1))
             ORDER BY created_at
             LIMIT $1",
        )
        .bind(BATCH_SIZE)
        .fetch_all(&state.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch pending notifications");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        if rows.is_empty() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            continue;
        }

        for row in rows {
            let id: Uuid = row.get("id");
            let recipient: String = row.get("recipient");
            let subject: String = row.get("subject");
            let body: String = row.get("body");
            let attempts: i32 = row.get("attempts");

            let delivery = client
                .post(&sink_url)
                .json(&json!({
                    "to": recipient,
                    "subject": subject,
                    "body": body,
                }))
                .send()
                .await;

            let delivered = matches!(&delivery, Ok(res) if res.status().is_success());
            let new_status = if delivered {
                NotificationStatus::Sent
            } else if attempts + 1 >= MAX_ATTEMPTS {
                NotificationStatus::Failed
            } else {
                NotificationStatus::Pending
            };

            match &delivery {
                Ok(res) if res.status().is_success() => {
                    tracing::info!(notification_id = %id, to = %recipient, "notification sent");
                }
                Ok(res) => {
                    tracing::warn!(notification_id = %id, status = %res.status(), attempts, "notification sink rejected delivery");
                }
                Err(err) => {
                    tracing::warn!(notification_id = %id, error = %err, attempts, "notification delivery failed");
                }
            }

            let update = sqlx::query(
                "UPDATE notifications
                 SET status = $1, attempts = attempts + 1, last_attempt_at = NOW()
                 WHERE id = $2",
            )
            .bind(new_status)
            .bind(id)
            .execute(&state.pool)
            .await;

            if let Err(err) = update {
                tracing::error!(notification_id = %id, error = %err, "failed to record delivery outcome");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_messages_match_the_transition() {
        let (subject, body) = account_status_message(AccountStatus::Active);
        assert_eq!(subject, "Account Approved");
        assert_eq!(body, "Your account status has been updated to active.");

        let (subject, body) = account_status_message(AccountStatus::Deleted);
        assert_eq!(subject, "Account Rejected");
        assert_eq!(body, "Your account status has been updated to deleted.");
    }

    #[test]
    fn loan_messages_match_the_decision() {
        let (subject, _) = loan_decision_message(LoanStatus::Approved);
        assert_eq!(subject, "Loan Approved");

        let (subject, body) = loan_decision_message(LoanStatus::Rejected);
        assert_eq!(subject, "Loan Rejected");
        assert_eq!(
            body,
            "Your loan application status has been updated to rejected."
        );
    }
}
