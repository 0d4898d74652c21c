use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::Error;
use serde_json::json;

/// Reads answer failures with `{error}`, writes with `{success: false, message}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Envelope {
    Query,
    Command,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    envelope: Envelope,
}

impl ApiError {
    pub fn query(err: impl Into<Error>) -> Self {
        Self::new(err.into(), Envelope::Query)
    }

    pub fn command(err: impl Into<Error>) -> Self {
        Self::new(err.into(), Envelope::Command)
    }

    fn new(err: Error, envelope: Envelope) -> Self {
        let status = match &err {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Contention { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            message: err.to_string(),
            envelope,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
            envelope: Envelope::Command,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}: {}", self.status, self.message);
        }

        let body = match self.envelope {
            Envelope::Query => json!({ "error": self.message }),
            Envelope::Command => json!({ "success": false, "message": self.message }),
        };

        (self.status, Json(body)).into_response()
    }
}
