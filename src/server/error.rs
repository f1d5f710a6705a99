use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, Error>;

/// every failure the proxy can hand back to a client
///
/// this is `Clone` because one login result gets broadcast to every request waiting on it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    /// missing credentials and the like, retrying won't help
    #[error("configuration error: {0}")]
    Config(String),

    /// upstream refused the login or the token
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("could not reach upstream: {0}")]
    Transport(String),

    /// non-2xx from search/download, message comes straight from the provider
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("internal server error: {0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Config(_) => "config_error",
            Self::Auth { .. } => "auth_error",
            Self::Transport(_) => "transport_error",
            Self::Upstream { .. } => "upstream_error",
            Self::InternalServerErrorWithContext(_) => "internal_server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth { status, .. } => upstream_status(*status).unwrap_or(StatusCode::UNAUTHORIZED),
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { status, .. } => upstream_status(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// only error statuses are passed through, anything else means the upstream did something weird
fn upstream_status(status: u16) -> Option<StatusCode> {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("request failed ({}): {}", status, self);
        } else {
            warn!("request rejected ({}): {}", status, self);
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
