mod api;
mod error;
mod state;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;

pub use self::state::AppState;

/// Largest accepted upload.
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
/// Room for multipart framing on top of the file itself.
const MAX_OVERHEAD_SIZE: usize = 10 * 1024;

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/profiles", get(api::profiles_handler))
        .route("/api/idols/by-image/{image_id}", get(api::image_info_handler))
        .route("/api/recognize", post(api::recognize_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_FILE_SIZE + MAX_OVERHEAD_SIZE))
        .with_state(state)
}
