use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
    Onhold,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loan_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    Personal,
    Educational,
    Home,
}

impl LoanType {
    /// Annual interest in percent, per product.
    pub fn interest_rate(self) -> i64 {
        match self {
            LoanType::Personal => 8,
            LoanType::Educational => 6,
            LoanType::Home => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "idempotency_status", rename_all = "lowercase")]
pub enum IdempotencyStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

/// Caller identity resolved by the auth middleware and stashed in request
/// extensions. The role claim is the only authorization input handlers trust.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// An amount as it arrives on the wire: either a JSON number or a numeric
/// string, in integer minor units.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(i64),
    Text(String),
}

impl Amount {
    /// Parses and validates, rejecting zero, negatives, and non-numeric text.
    pub fn minor_units(&self) -> Result<i64, ApiError> {
        let value = match self {
            Amount::Number(n) => *n,
            Amount::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::InvalidArgument("invalid amount".to_string()))?,
        };

        if value <= 0 {
            return Err(ApiError::InvalidArgument(
                "amount must be positive".to_string(),
            ));
        }

        Ok(value)
    }
}

// --- auth ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user_id: String,
    pub role: UserRole,
}

// --- accounts ---

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub account_type: AccountType,
    pub initial_deposit: Amount,
}

#[derive(Debug, Deserialize)]
pub struct GetAccountsQuery {
    pub status: Option<AccountStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SetAccountStatusRequest {
    pub status: AccountStatus,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_number: String,
    pub owner_id: String,
    pub balance: i64,
    pub credit_limit: i64,
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub created_at: String,
    pub updated_at: String,
}

// --- transfers ---

/// Wire format of `POST /transfers`. Field names are camelCase because this
/// is the one endpoint external clients already call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: Amount,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub success: bool,
    pub transaction_id: String,
}

// --- transactions ---

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub account_number: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub from_account: String,
    pub to_account: String,
    pub amount: i64,
    pub status: String,
    pub timestamp: String,
}

// --- loans ---

#[derive(Debug, Deserialize)]
pub struct LoanApplicationRequest {
    pub amount: Amount,
    pub loan_type: LoanType,
}

#[derive(Debug, Deserialize)]
pub struct LoanDecisionRequest {
    pub decision: LoanStatus,
}

#[derive(Debug, Serialize)]
pub struct LoanResponse {
    pub id: String,
    pub application_number: String,
    pub applicant_id: String,
    pub amount: i64,
    pub loan_type: LoanType,
    pub interest_rate: i64,
    pub status: LoanStatus,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_request_accepts_numeric_amount() {
        let req: TransferRequest = serde_json::from_value(serde_json::json!({
            "fromAccount": "10001234567",
            "toAccount": "10007654321",
            "amount": 2000
        }))
        .unwrap();
        assert_eq!(req.amount.minor_units().unwrap(), 2000);
        assert!(req.idempotency_key.is_none());
    }

    #[test]
    fn transfer_request_accepts_string_amount() {
        let req: TransferRequest = serde_json::from_value(serde_json::json!({
            "fromAccount": "10001234567",
            "toAccount": "10007654321",
            "amount": "2000",
            "idempotencyKey": "abc-123"
        }))
        .unwrap();
        assert_eq!(req.amount.minor_units().unwrap(), 2000);
        assert_eq!(req.idempotency_key.as_deref(), Some("abc-123"));
    }

    #[test]
    fn non_numeric_amount_is_rejected() {
        let amount = Amount::Text("lots".to_string());
        assert!(amount.minor_units().is_err());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(Amount::Number(0).minor_units().is_err());
        assert!(Amount::Number(-5).minor_units().is_err());
        assert!(Amount::Text("-5".to_string()).minor_units().is_err());
    }

    #[test]
    fn transfer_response_uses_camel_case() {
        let response = TransferResponse {
            success: true,
            transaction_id: "tid".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], serde_json::json!(true));
        assert_eq!(value["transactionId"], serde_json::json!("tid"));
    }

    #[test]
    fn loan_interest_follows_product_type() {
        assert_eq!(LoanType::Personal.interest_rate(), 8);
        assert_eq!(LoanType::Educational.interest_rate(), 6);
        assert_eq!(LoanType::Home.interest_rate(), 10);
    }
}
