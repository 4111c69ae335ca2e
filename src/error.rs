use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// Role, location or amount not recognized; the question is asked again
    #[error("input could not be classified")]
    InputUnclassifiable,
    #[error("retry limit exceeded")]
    RetryLimitExceeded,
    #[error("failed to persist lead: {0}")]
    PersistenceFailure(String),
    #[error("{0}")]
    ConfigurationMissing(&'static str),
    /// Event for a call that already reached a terminal state
    #[error("duplicate event for finished call")]
    DuplicateEvent,
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("telephony provider error: {0}")]
    Telephony(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("server error: {0}")]
    Server(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Telephony(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            // these carry our own static text only
            AppError::BadRequest(_) | AppError::ConfigurationMissing(_) => self.to_string(),
            _ => "Internal error".to_string(),
        };
        error!(error=%self, status=%status, "request failed");
        (status, body).into_response()
    }
}
