use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error taxonomy for the whole API. Every failure an endpoint can surface
/// maps onto one of these kinds; the wire shape is always
/// `{"error": {"code": <kind>, "message": <text>}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    FailedPrecondition(String),

    /// Commit-time conflict with a concurrent update. The only kind the
    /// caller is expected to retry, with freshly reloaded state.
    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::FailedPrecondition(_) => StatusCode::BAD_REQUEST,
            ApiError::Aborted(_) => StatusCode::CONFLICT,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::InvalidArgument(_) => "invalid-argument",
            ApiError::NotFound(_) => "not-found",
            ApiError::FailedPrecondition(_) => "failed-precondition",
            ApiError::Aborted(_) => "aborted",
            ApiError::PermissionDenied(_) => "permission-denied",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref message) = self {
            tracing::error!(%message, "internal error");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // Serialization failures and deadlocks mean the transfer lost a
            // race; the caller retries with freshly reloaded accounts.
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => {
                    return ApiError::Aborted(
                        "operation conflicted with a concurrent update, retry".to_string(),
                    );
                }
                // balance CHECK constraint
                Some("23514") => {
                    return ApiError::FailedPrecondition(
                        "insufficient balance in sender account".to_string(),
                    );
                }
                _ => {}
            }
        }
        ApiError::Internal(format!("database error: {err}"))
    }
}

/// `axum::Json` with rejections rewritten into the API error envelope, so a
/// malformed body fails `invalid-argument` instead of axum's plain-text 422.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = match &rejection {
                    JsonRejection::JsonDataError(e) => e.to_string(),
                    JsonRejection::JsonSyntaxError(e) => e.to_string(),
                    other => other.to_string(),
                };
                Err(ApiError::InvalidArgument(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_error_kind() {
        assert_eq!(
            ApiError::Unauthenticated(String::new()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidArgument(String::new()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound(String::new()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::FailedPrecondition(String::new()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Aborted(String::new()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::PermissionDenied(String::new()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Internal(String::new()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_kebab_case() {
        assert_eq!(ApiError::InvalidArgument(String::new()).code(), "invalid-argument");
        assert_eq!(
            ApiError::FailedPrecondition(String::new()).code(),
            "failed-precondition"
        );
        assert_eq!(ApiError::Aborted(String::new()).code(), "aborted");
    }
}
