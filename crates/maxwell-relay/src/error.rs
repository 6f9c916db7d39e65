use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use maxwell_common::error::CommonError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),
}

/// Failures of a single forwarded request. Each variant maps to exactly one
/// response shape the browser knows how to read.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Upstream answered with a non-success status; its body is passed along as text.
    #[error("upstream returned {status}")]
    Upstream { status: StatusCode, body: String },

    /// No usable answer from upstream at all (connect failure, timeout, broken body).
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

/// The error's source chain, outermost first, one cause per line.
fn stack(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::Upstream { status, body } => {
                (status, Json(json!({ "error": body }))).into_response()
            }
            RelayError::Transport(e) => {
                let body = json!({ "error": e.to_string(), "stack": stack(&e) });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
