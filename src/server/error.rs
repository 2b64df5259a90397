use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;

use crate::errors::RecognizeError;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Transport-side wrapper deciding the status code for each error kind.
/// Internal failures are logged with full context here and leave the
/// process only as a generic message.
#[derive(Debug)]
pub struct ApiError(pub RecognizeError);

impl From<RecognizeError> for ApiError {
    fn from(err: RecognizeError) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(RecognizeError::Internal(err))
    }
}

pub fn status_for(err: &RecognizeError) -> StatusCode {
    match err {
        RecognizeError::ParseForm
        | RecognizeError::ParseFile
        | RecognizeError::BadImage
        | RecognizeError::NoSingleFace => StatusCode::BAD_REQUEST,
        RecognizeError::NoIdol => StatusCode::NOT_FOUND,
        RecognizeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let RecognizeError::Internal(cause) = &self.0 {
            error!("internal error: {cause:?}");
        }
        (status_for(&self.0), Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
