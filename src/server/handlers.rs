use crate::auth::{AuthError, CurrentUser, IdentityProvider};
use crate::core::caption::{CaptionParams, CaptionRequest, CaptionResult, CaptionStyle};
use crate::core::data_url::{encode_bytes, parse};
use crate::core::hashtags::generate_hashtags;
use crate::core::validation::validate;
use crate::server::error::ApiError;
use crate::server::types::{
    AppState, CredentialsRequest, FederatedRequest, HashtagsRequest, HashtagsResponse, ListQuery,
    SaveImageResponse, SessionResponse, UploadQuery, UploadResponse,
};
use crate::store::{HistoryRecord, NewHistoryRecord, StoreError};
use crate::utils::constants::HISTORY_LIMIT;
use axum::http::HeaderMap;
use axum::{
    Json,
    extract::{Query, State},
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

// server status handler
pub async fn server_status_handler() -> Json<Value> {
    Json(json!({"status": "running"}))
}

/// Gate, caption, then add hashtags when they were asked for and the model
/// did not supply any.
async fn caption_image(
    state: &AppState,
    request: CaptionRequest,
) -> Result<CaptionResult, ApiError> {
    let wants_hashtags = request.wants_hashtags();
    let start_time = std::time::Instant::now();
    let mut result = state.captioner.generate_caption(request).await.map_err(|e| {
        warn!(error = %e, "caption generation failed");
        ApiError::from(e)
    })?;

    if !result.is_valid() {
        return Err(ApiError::BadGateway(
            "Caption service returned an empty caption".to_string(),
        ));
    }
    result.caption = result.caption.trim().to_string();
    if wants_hashtags && result.hashtags.is_none() {
        result.hashtags = Some(generate_hashtags(&result.caption));
    }

    info!(elapsed = ?start_time.elapsed(), "caption generated");
    Ok(result)
}

// caption a data URL sent as JSON
pub async fn caption_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CaptionRequest>,
) -> Result<Json<CaptionResult>, ApiError> {
    let decoded = parse(&request.photo_data_uri)?;
    validate(&decoded.mime_type, decoded.bytes.len() as u64)?;
    debug!(mime = %decoded.mime_type, size = decoded.bytes.len(), "caption request accepted");

    let result = caption_image(&state, request).await?;
    Ok(Json(result))
}

// raw image body: read in chunks, gate, caption and optionally save
pub async fn upload_binary_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadQuery>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<Json<UploadResponse>, ApiError> {
    let content_type = params
        .content_type
        .clone()
        .or_else(|| {
            headers
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let mime_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    // reject the type before touching the body
    validate(&mime_type, 0)?;
    let style = params
        .style
        .as_deref()
        .map(str::parse::<CaptionStyle>)
        .transpose()
        .map_err(ApiError::BadRequest)?
        .unwrap_or_default();

    let stream = body
        .into_data_stream()
        .map(|result| result.map_err(std::io::Error::other));
    let mut stream_reader = StreamReader::new(stream);

    let read_start = std::time::Instant::now();
    let mut full_body = Vec::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        match stream_reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                full_body.extend_from_slice(&buffer[..n]);
                // stop reading as soon as the limit is crossed
                validate(&mime_type, full_body.len() as u64)?;
            }
            Err(e) => {
                error!(error = %e, "error reading request body");
                return Err(ApiError::BadRequest(format!(
                    "Error reading request body: {}",
                    e
                )));
            }
        }
    }
    debug!(bytes = full_body.len(), elapsed = ?read_start.elapsed(), "upload body read");

    if full_body.is_empty() {
        return Err(ApiError::BadRequest("Image data is required".to_string()));
    }

    let data_url = encode_bytes(&mime_type, &full_body);
    let caption_params = CaptionParams {
        style,
        language: params.language.clone(),
        context: params.context.clone(),
        include_hashtags: params.hashtags.unwrap_or(false),
        include_emojis: params.emojis.unwrap_or(false),
    };
    let result = caption_image(&state, CaptionRequest::new(data_url.clone(), &caption_params)).await?;

    let id = if params.save.unwrap_or(false) {
        let record = NewHistoryRecord {
            image_data: data_url,
            caption: Some(result.caption.clone()),
            style: Some(style.as_str().to_string()),
            context: caption_params.context.clone(),
        };
        Some(save_record(&state, record).await?)
    } else {
        None
    };

    Ok(Json(UploadResponse {
        caption: result.caption,
        hashtags: result.hashtags,
        id,
    }))
}

async fn save_record(state: &AppState, record: NewHistoryRecord) -> Result<String, ApiError> {
    match state.history.save(record).await {
        Ok(id) => {
            info!(%id, "image saved to history");
            Ok(id)
        }
        Err(StoreError::MissingImageData) => {
            Err(ApiError::BadRequest(StoreError::MissingImageData.to_string()))
        }
        Err(e) => {
            error!(error = %e, "error saving image");
            Err(ApiError::Internal("Failed to save image".to_string()))
        }
    }
}

pub async fn save_image_handler(
    State(state): State<Arc<AppState>>,
    Json(record): Json<NewHistoryRecord>,
) -> Result<Json<SaveImageResponse>, ApiError> {
    let id = save_record(&state, record).await?;
    Ok(Json(SaveImageResponse {
        message: "Image saved".to_string(),
        id,
    }))
}

pub async fn list_images_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(HISTORY_LIMIT);
    state.history.list(limit).await.map(Json).map_err(|e| {
        error!(error = %e, "error fetching images");
        ApiError::Internal("Failed to fetch images".to_string())
    })
}

pub async fn hashtags_handler(Json(request): Json<HashtagsRequest>) -> Json<HashtagsResponse> {
    Json(HashtagsResponse {
        hashtags: generate_hashtags(&request.caption),
    })
}

fn identity(state: &AppState) -> Result<&Arc<dyn IdentityProvider>, ApiError> {
    state
        .identity
        .as_ref()
        .ok_or_else(|| ApiError::from(AuthError::NotConfigured))
}

pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let signed = identity(&state)?
        .sign_up(&credentials.email, &credentials.password)
        .await?;
    info!(uid = %signed.user.uid, "account created");
    Ok(Json(SessionResponse {
        id_token: signed.id_token,
        user: signed.user,
    }))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let signed = identity(&state)?
        .sign_in(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(SessionResponse {
        id_token: signed.id_token,
        user: signed.user,
    }))
}

pub async fn federated_login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FederatedRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let signed = identity(&state)?
        .sign_in_with_google(&request.id_token)
        .await?;
    Ok(Json(SessionResponse {
        id_token: signed.id_token,
        user: signed.user,
    }))
}

pub async fn current_user_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CurrentUser>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
    let user = identity(&state)?.lookup(token).await?;
    Ok(Json(user))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
