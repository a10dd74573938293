use axum::extract::State;
use axum::Json;
use rand::RngCore;
use sqlx::types::Uuid;
use sqlx::Row;

use crate::error::{ApiError, AppJson};
use crate::middlewares::auth::token_digest;
use crate::models::{LoginRequest, RegisterRequest, RegisterResponse, TokenResponse, UserRole};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::InvalidArgument("invalid email".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidArgument(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;

    let result = sqlx::query(
        "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&state.pool)
    .await;

    match result {
        Ok(row) => {
            let id: Uuid = row.get("id");
            tracing::info!(user_id = %id, "user registered");
            Ok(Json(RegisterResponse {
                user_id: id.to_string(),
                email,
            }))
        }
        Err(err)
            if err
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .as_deref()
                == Some("23505") =>
        {
            Err(ApiError::InvalidArgument(
                "email already registered".to_string(),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();

    let row = sqlx::query("SELECT id, password_hash, role FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("invalid email or password".to_string()))?;

    let password_hash: String = row.get("password_hash");
    let verified = bcrypt::verify(&payload.password, &password_hash)
        .map_err(|e| ApiError::Internal(format!("password verification failed: {e}")))?;
    if !verified {
        return Err(ApiError::Unauthenticated(
            "invalid email or password".to_string(),
        ));
    }

    let user_id: Uuid = row.get("id");
    let role: UserRole = row.get("role");

    let token = generate_token();
    sqlx::query("INSERT INTO auth_tokens (user_id, token_hash) VALUES ($1, $2)")
        .bind(user_id)
        .bind(token_digest(&token))
        .execute(&state.pool)
        .await?;

    Ok(Json(TokenResponse {
        token,
        user_id: user_id.to_string(),
        role,
    }))
}

/// 256 bits of randomness, hex encoded. Returned to the caller exactly once;
/// only the digest is stored.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
