use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    /// Login denied. Carries the user-facing message shown at the login form.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Caller lacks the required capability")]
    Forbidden,

    #[error("Request token did not match the session")]
    InvalidToken,

    #[error("Refusing to {action} the acting account {user_id}")]
    SelfTarget { action: &'static str, user_id: i64 },

    #[error("Not found")]
    NotFound,

    #[error("Failed to access the user store: {0}")]
    Store(String),

    #[error("Failed to send mail: {0}")]
    Mail(String),

    #[error("Failed to (de)serialize a stored record: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for GateError {
    fn from(error: sqlx::Error) -> Self {
        GateError::Store(error.to_string())
    }
}

impl From<reqwest::Error> for GateError {
    fn from(error: reqwest::Error) -> Self {
        GateError::Mail(error.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(error: serde_json::Error) -> Self {
        GateError::Serialization(error.to_string())
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match &self {
            GateError::Unauthenticated(_) | GateError::Forbidden => StatusCode::FORBIDDEN,
            GateError::InvalidToken | GateError::SelfTarget { .. } => StatusCode::BAD_REQUEST,
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::Store(_) | GateError::Mail(_) | GateError::Serialization(_) => {
                // Internal details stay in the logs.
                tracing::error!(error = %self, "request failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal error" })),
                )
                    .into_response();
            }
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
