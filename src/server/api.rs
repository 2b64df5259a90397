use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use log::info;
use serde_json::{Value, json};

use super::error::{ApiError, Result};
use super::state::AppState;
use crate::cache::{CacheKey, CacheValue};
use crate::db;
use crate::errors::RecognizeError;
use crate::models::ImageInfo;

/// Form field carrying the uploaded photo.
const FILE_FIELD: &str = "files[]";

/// Serve the profiles snapshot. The serialized JSON is cached whole;
/// clients get a weak content-hash ETag for conditional re-fetch.
pub async fn profiles_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response> {
    let db = state.db.clone();
    let value = state
        .cache
        .get_or_compute(CacheKey::Profiles, move || async move {
            let profiles = db::get_profiles(&db).await?;
            // Serializing takes a few milliseconds, so the encoded form is
            // what gets cached.
            Ok(CacheValue::Profiles(Arc::new(serde_json::to_vec(&profiles)?)))
        })
        .await?;
    let body = value
        .into_profiles()
        .ok_or_else(|| anyhow::anyhow!("profiles cache key holds a train-data value"))?;

    let etag = format!("W/\"{}\"", blake3::hash(&body).to_hex());
    if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag)
    {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    Ok((
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-cache".to_owned()),
            (header::CONTENT_TYPE, "application/json".to_owned()),
            (header::ETAG, etag),
        ],
        body.to_vec(),
    )
        .into_response())
}

/// Look up a recognized reference image by the content hash of its bytes.
pub async fn image_info_handler(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<String>,
) -> Result<Json<ImageInfo>> {
    let info = db::get_image_info(&state.db, &image_id).await?;
    match info {
        Some(info) => Ok(Json(info)),
        None => Err(ApiError(RecognizeError::NoIdol)),
    }
}

/// Recognize an uploaded photo: exactly one `files[]` part in, idol id or
/// a structured error out.
pub async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut file: Option<Vec<u8>> = None;
    let mut count = 0usize;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return Err(ApiError(RecognizeError::ParseForm)),
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        count += 1;
        let data = field.bytes().await.map_err(|_| ApiError(RecognizeError::ParseFile))?;
        file = Some(data.to_vec());
    }

    let (Some(data), 1) = (file, count) else {
        return Err(ApiError(RecognizeError::ParseFile));
    };

    info!("recognizing uploaded image ({} bytes)", data.len());
    let idol_id = state.coordinator.submit(data).await?;
    Ok(Json(json!({"id": idol_id})))
}
