use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tower_governor::errors::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

use crate::error::ApiError;
use crate::models::AuthUser;
use crate::state::AppState;

/// Rate-limit key: the raw Authorization header, so each caller gets its own
/// bucket. Requests without the header (e.g. CORS preflight) share one bucket.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct ApiKeyExtractor;

impl KeyExtractor for ApiKeyExtractor {
    type Key = String;

    fn extract<B>(&self, req: &axum::http::Request<B>) -> Result<Self::Key, GovernorError> {
        Ok(req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }
}

/// Hex SHA-256 of a bearer token. Only digests are persisted.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves the bearer token into an [`AuthUser`] (id + role) and stores it in
/// request extensions. The role is the server-side authorization boundary;
/// nothing downstream trusts client-supplied identity.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Preflight requests carry no credentials.
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    if token.is_empty() {
        return Err(ApiError::Unauthenticated(
            "no authentication token provided".to_string(),
        ));
    }

    let row = sqlx::query(
        "SELECT u.id, u.role FROM auth_tokens t
         JOIN users u ON u.id = t.user_id
         WHERE t.token_hash = $1 AND t.revoked = FALSE",
    )
    .bind(token_digest(token))
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::Unauthenticated("invalid or revoked token".to_string()))?;

    let caller = AuthUser {
        id: row.get("id"),
        role: row.get("role"),
    };
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_digest_is_hex_sha256() {
        // sha256("corebank"), precomputed.
        assert_eq!(
            token_digest("corebank"),
            "675b29a0bdb200ae84713a0725dfae5a3cef7ed3ba8d318361006df1c4a19259"
        );
        assert_eq!(token_digest("").len(), 64);
    }

    #[test]
    fn extractor_falls_back_to_an_empty_key() {
        let req = axum::http::Request::builder().body(()).unwrap();
        assert_eq!(ApiKeyExtractor.extract(&req).unwrap(), "");
    }
}
