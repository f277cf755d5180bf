//! Protected render routes: image captioning, video captioning, and the
//! quota snapshot endpoint. The guard middleware has already authenticated
//! the caller and admitted the request by the time these run.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use base64::Engine;
use serde::Serialize;

use super::{log_api_issue, ApiResult, ErrorResponse};
use crate::rate_limit::RateLimitInfo;
use crate::render::{self, RenderError, MAX_CAPTION_CHARS};
use crate::state::AppState;
use crate::token::Claims;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub download_url: String,
    pub preview_url: String,
    pub filename: String,
    pub rate_limit_info: RateLimitInfo,
}

/// Uploaded media plus caption fields from one multipart request.
struct Upload {
    file: Option<(Vec<u8>, Option<String>)>,
    top_text: Option<String>,
    bottom_text: Option<String>,
}

/// POST /api/generate/image -- burn captions into an uploaded image.
pub async fn generate_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Extension(info): Extension<RateLimitInfo>,
    multipart: Multipart,
) -> ApiResult<Json<RenderResponse>> {
    let Upload {
        file,
        top_text,
        bottom_text,
    } = read_upload(multipart, "image", &info).await?;
    let (data, content_type) = file
        .ok_or_else(|| quota_error(StatusCode::BAD_REQUEST, "Image file is required", &info))?;

    if let Some(ct) = &content_type {
        if !ct.starts_with("image/") {
            return Err(quota_error(
                StatusCode::BAD_REQUEST,
                "File must be an image",
                &info,
            ));
        }
    }
    check_caption_lengths(top_text.as_deref(), bottom_text.as_deref(), &info)?;
    if data.len() > state.max_upload_bytes {
        return Err(render_failure(RenderError::PayloadTooLarge, &info));
    }

    let style = state.caption_style.clone();
    let max_bytes = state.max_upload_bytes;
    let top = top_text;
    let bottom = bottom_text;
    // Decode/encode is CPU-bound; keep it off the reactor.
    let rendered = tokio::task::spawn_blocking(move || {
        render::image::render_image(&data, top.as_deref(), bottom.as_deref(), &style, max_bytes)
    })
    .await
    .map_err(|e| {
        log_api_issue(
            StatusCode::INTERNAL_SERVER_ERROR,
            "memeforge.api.generate",
            format!("Render task failed: {}", e),
        );
        quota_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", &info)
    })?
    .map_err(|e| render_failure(e, &info))?;

    log::info!(
        target: "memeforge.api.generate",
        "Rendered image captions for {}",
        claims.subject_id
    );
    Ok(Json(media_response(rendered, "image/png", "png", info)))
}

/// POST /api/generate/video -- delegate caption burning to the configured
/// video encoder; 501 when no encoder collaborator is present.
pub async fn generate_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Extension(info): Extension<RateLimitInfo>,
    multipart: Multipart,
) -> ApiResult<Json<RenderResponse>> {
    let Upload {
        file,
        top_text,
        bottom_text,
    } = read_upload(multipart, "video", &info).await?;
    let (data, content_type) = file
        .ok_or_else(|| quota_error(StatusCode::BAD_REQUEST, "Video file is required", &info))?;

    if let Some(ct) = &content_type {
        if !ct.starts_with("video/") {
            return Err(quota_error(
                StatusCode::BAD_REQUEST,
                "File must be a video",
                &info,
            ));
        }
    }
    check_caption_lengths(top_text.as_deref(), bottom_text.as_deref(), &info)?;
    if data.len() > state.max_upload_bytes {
        return Err(render_failure(RenderError::PayloadTooLarge, &info));
    }
    let top = top_text.as_deref();
    let bottom = bottom_text.as_deref();
    if render::non_blank(top).is_none() && render::non_blank(bottom).is_none() {
        return Err(render_failure(RenderError::EmptyCaption, &info));
    }

    let Some(encoder) = &state.video else {
        // Explicit capability gap, never a silent no-op.
        return Err(render_failure(RenderError::Unsupported, &info));
    };

    let rendered = encoder
        .overlay(&data, top, bottom)
        .await
        .map_err(|e| render_failure(e, &info))?;

    log::info!(
        target: "memeforge.api.generate",
        "Rendered video captions for {}",
        claims.subject_id
    );
    Ok(Json(media_response(rendered, "video/mp4", "mp4", info)))
}

/// GET /api/rate-limit/status -- quota snapshot for the calling identity.
pub async fn rate_limit_status(
    Extension(info): Extension<RateLimitInfo>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "rateLimitInfo": info }))
}

// ── Helpers ─────────────────────────────────────────────────────────────

async fn read_upload(
    mut multipart: Multipart,
    file_field: &str,
    info: &RateLimitInfo,
) -> Result<Upload, (StatusCode, Json<ErrorResponse>)> {
    let mut upload = Upload {
        file: None,
        top_text: None,
        bottom_text: None,
    };

    loop {
        let field = multipart.next_field().await.map_err(|e| {
            quota_error(
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart: {}", e),
                info,
            )
        })?;
        let Some(field) = field else { break };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(name) if name == file_field => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    quota_error(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read file data: {}", e),
                        info,
                    )
                })?;
                upload.file = Some((data.to_vec(), content_type));
            }
            Some("topText") => {
                upload.top_text = field.text().await.ok();
            }
            Some("bottomText") => {
                upload.bottom_text = field.text().await.ok();
            }
            _ => {}
        }
    }

    Ok(upload)
}

fn check_caption_lengths(
    top: Option<&str>,
    bottom: Option<&str>,
    info: &RateLimitInfo,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    for text in [top, bottom].into_iter().flatten() {
        if text.chars().count() > MAX_CAPTION_CHARS {
            return Err(quota_error(
                StatusCode::BAD_REQUEST,
                format!("Caption text must be {} characters or fewer", MAX_CAPTION_CHARS),
                info,
            ));
        }
    }
    Ok(())
}

fn media_response(
    bytes: Vec<u8>,
    mime: &str,
    extension: &str,
    info: RateLimitInfo,
) -> RenderResponse {
    let data_url = format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    );
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    RenderResponse {
        download_url: data_url.clone(),
        preview_url: data_url,
        filename: format!("meme_{}.{}", stamp, extension),
        rate_limit_info: info,
    }
}

fn quota_error(
    status: StatusCode,
    msg: impl Into<String>,
    info: &RateLimitInfo,
) -> (StatusCode, Json<ErrorResponse>) {
    let msg = msg.into();
    log_api_issue(status, "memeforge.api.generate", &msg);
    (status, Json(ErrorResponse::with_quota(msg, info.clone())))
}

/// Sole translation point from renderer failures to wire responses.
fn render_failure(e: RenderError, info: &RateLimitInfo) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message) = match &e {
        RenderError::UnsupportedFormat | RenderError::EmptyCaption => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        RenderError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
        RenderError::Unsupported => (StatusCode::NOT_IMPLEMENTED, e.to_string()),
        RenderError::Encode(detail) => {
            // Logged with detail, returned without it.
            log_api_issue(
                StatusCode::INTERNAL_SERVER_ERROR,
                "memeforge.api.generate",
                format!("Render failed: {}", detail),
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process media".to_string(),
            )
        }
    };
    if status != StatusCode::INTERNAL_SERVER_ERROR {
        log_api_issue(status, "memeforge.api.generate", &message);
    }
    (status, Json(ErrorResponse::with_quota(message, info.clone())))
}
