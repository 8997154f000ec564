use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{AppPath, CurrentUser};
use crate::state::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Accept one `image` field and store it under a fresh name in the upload dir.
pub async fn upload_image(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let max = state.config.storage.max_upload_bytes;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("image is missing a content type"))?;
        let ext = image_extension(&content_type)
            .ok_or_else(|| AppError::bad_request("only image uploads are accepted"))?;

        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::bad_request("image is empty"));
        }
        if bytes.len() > max {
            return Err(AppError::bad_request(format!(
                "image must be {} bytes or less",
                max
            )));
        }

        let file_name = format!("{}.{}", uuid::Uuid::now_v7(), ext);
        let dir = state.config.uploads_path();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), &bytes).await?;

        tracing::info!(user_id = %user.id, file = %file_name, size = bytes.len(), "Stored upload");
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                url: format!("/uploads/{}", file_name),
            }),
        ));
    }

    Err(AppError::bad_request("missing 'image' field"))
}

pub async fn serve_upload(
    State(state): State<AppState>,
    AppPath(file): AppPath<String>,
) -> AppResult<Response> {
    if !is_safe_file_name(&file) {
        return Err(AppError::NotFound);
    }

    let path = state.config.uploads_path().join(&file);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(AppError::NotFound),
        Err(e) => return Err(e.into()),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::CONTENT_SECURITY_POLICY, "default-src 'none'; sandbox".to_string()),
        ],
        data,
    )
        .into_response())
}

/// File extension for an accepted raster content type, `None` for anything
/// else. Scriptable image formats (SVG) are refused since uploads are served
/// from the app's own origin.
fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains(['/', '\\'])
}
