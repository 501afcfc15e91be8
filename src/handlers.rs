use crate::{
    accounts::unix_timestamp,
    aggregator::VoteOutcome,
    errors::{AppError, StorageError},
    extractors::{AuthUser, MaybeAuthUser},
    models::{
        AuthTokenResponse, Direction, LoginRequest, Meme, MemeCreatedResponse, MemeListResponse, PageRequest,
        ProfileResponse, RegisterRequest, VoteRequest, VoteResponse,
    },
    AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mime_guess;
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// Image types accepted on upload.
const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

const MAX_TITLE_CHARS: usize = 200;

// --- Auth ---

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let auth_token = state
        .accounts
        .register(request.username.trim(), &request.password, &request.email)
        .await?;
    Ok((StatusCode::CREATED, Json(AuthTokenResponse { auth_token })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let auth_token = state.accounts.login(request.username.trim(), &request.password).await?;
    Ok(Json(AuthTokenResponse { auth_token }))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .accounts
        .profile(&username)
        .await?
        .ok_or_else(|| AppError::ProfileNotFound(username.clone()))?;

    Ok(Json(ProfileResponse {
        is_admin: profile.username == state.config.admin_username,
        username: profile.username,
        email: profile.email,
    }))
}

// --- Memes ---

pub async fn upload_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = Uuid::new_v4();
    let mut title = None;
    let mut image_data: Option<Vec<u8>> = None;
    let mut image_filename: Option<String> = None;
    let mut image_content_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "title" => title = Some(field.text().await.map_err(|e| AppError::InvalidInput(format!("Failed to read title: {}", e)))?),
            "image" => {
                image_filename = field.file_name().map(|s| s.to_string());
                image_content_type = field.content_type().map(|m| m.to_ascii_lowercase());
                image_data = Some(field.bytes().await?.to_vec());
            }
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    let title = title.ok_or_else(|| AppError::MissingFormField("title".to_string()))?;
    let title = title.trim().to_string();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::InvalidInput(format!("title must be 1-{} characters", MAX_TITLE_CHARS)));
    }
    let image_data = image_data.ok_or_else(|| AppError::MissingFormField("image".to_string()))?;
    if image_data.is_empty() {
        return Err(AppError::InvalidInput("image data cannot be empty".to_string()));
    }
    let image_filename = image_filename.ok_or_else(|| AppError::InvalidInput("image filename is required".to_string()))?;

    // Prefer the declared type unless it is the generic fallback browsers send.
    let content_type = image_content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| mime_guess::from_path(&image_filename).first_raw().map(|s| s.to_string()))
        .ok_or_else(|| AppError::InvalidInput("could not determine image type".to_string()))?;
    if !SUPPORTED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::InvalidInput(format!("Unsupported file format: {}", content_type)));
    }

    let extension = image_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "img".to_string());
    let image_key = format!("{}.{}", meme_id, extension);

    state
        .file_storage
        .upload(&image_key, image_data, Some(content_type.clone()))
        .await?;

    let meme = Meme {
        meme_id,
        title,
        username: username.clone(),
        image_key,
        content_type,
        votes: 0,
        created_at: unix_timestamp(),
    };
    if let Err(e) = state.meme_repo.create(&meme).await {
        // Don't leave an unreferenced image behind.
        if let Err(cleanup) = state.file_storage.delete(&meme.image_key).await {
            tracing::warn!(image_key = %meme.image_key, error = ?cleanup, "Failed to remove image after metadata write failed");
        }
        return Err(e.into());
    }

    tracing::info!(%meme_id, %username, "Meme created successfully via handler");
    Ok((StatusCode::CREATED, Json(MemeCreatedResponse { meme_id })))
}

pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Query(page): Query<PageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let memes = state.feed.list(viewer.as_deref(), page).await?;
    Ok(Json(MemeListResponse { memes }))
}

/// Handler for GET /a/meme/{id}: serves the meme's image.
pub async fn get_meme_image(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Response, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    tracing::debug!(%meme_id, "Fetching meme image via handler");

    let meme = state
        .meme_repo
        .get_by_id(meme_id)
        .await?
        .ok_or(AppError::MemeNotFound(meme_id))?;
    let object = state.file_storage.download(&meme.image_key).await?;

    let content_type = object.content_type.unwrap_or(meme.content_type);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", meme.image_key))
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(Body::from(object.data))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build image response: {}", e)))
}

/// Deletes the meme metadata and its corresponding image file. Admin only.
pub async fn delete_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if username != state.config.admin_username {
        tracing::warn!(%username, "Non-admin attempted meme deletion");
        return Err(AppError::Forbidden("Only the administrator can delete memes".to_string()));
    }
    let meme_id = Uuid::parse_str(&id_str)?;
    tracing::debug!(%meme_id, "Deleting meme via handler");

    let meme_to_delete = state
        .meme_repo
        .get_by_id(meme_id)
        .await?
        .ok_or(AppError::MemeNotFound(meme_id))?;

    match state.file_storage.delete(&meme_to_delete.image_key).await {
        Ok(_) => {
            tracing::debug!(image_key = %meme_to_delete.image_key, "Deleted image from storage (or it was already gone).")
        }
        Err(StorageError::NotFound(_)) => {
            tracing::warn!(image_key = %meme_to_delete.image_key, "Image file not found in storage during delete, proceeding with metadata deletion.");
        }
        Err(e) => {
            tracing::error!(image_key = %meme_to_delete.image_key, error = ?e, "Failed to delete image file from storage.");
            return Err(e.into());
        }
    }

    if !state.meme_repo.delete(meme_id).await? {
        return Err(AppError::MemeNotFound(meme_id));
    }

    tracing::info!(%meme_id, "Meme deleted successfully via handler");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn vote_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(username): AuthUser,
    Path(id_str): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let direction = Direction::from_upvote(request.upvote);

    let outcome = state
        .aggregator
        .cast_vote(meme_id, direction, request.clicked, &username)
        .await?;

    let response = match outcome {
        VoteOutcome::Applied { decision, votes, user_vote } => VoteResponse {
            outcome: decision.label().to_string(),
            delta: decision.delta(),
            votes,
            user_vote,
        },
        // Repeated clicks succeed without changing anything.
        VoteOutcome::Rejected { votes, user_vote, .. } => VoteResponse {
            outcome: "rejected".to_string(),
            delta: 0,
            votes,
            user_vote,
        },
        VoteOutcome::ItemNotFound => return Err(AppError::MemeNotFound(meme_id)),
        VoteOutcome::ProfileNotFound => return Err(AppError::ProfileNotFound(username)),
    };
    Ok(Json(response))
}

pub async fn health() -> &'static str {
    "ok"
}
