// Chat routes - CRUD and paginated listing

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::ApiError;
use crate::models::{Chat, ChatCreate, ChatListResponse, ChatUpdate, ListChatsQuery};
use crate::AppState;

/// Build the chats router
pub fn chats_routes() -> Router<AppState> {
    Router::new()
        .route("/chats", post(create_chat).get(list_chats))
        .route(
            "/chats/:chat_id",
            get(get_chat).put(update_chat).delete(delete_chat),
        )
}

/// POST /chats - Create a new chat
async fn create_chat(
    State(state): State<AppState>,
    Json(data): Json<ChatCreate>,
) -> Result<(StatusCode, Json<Chat>), ApiError> {
    let chat = state.store.create_chat(&data).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

/// GET /chats - List chats with pagination
async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<ChatListResponse>, ApiError> {
    let page = state.store.list_chats(query.page, query.size).await?;
    Ok(Json(page))
}

/// GET /chats/:chat_id - Get chat metadata
async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state.store.get_chat(&chat_id).await?;
    Ok(Json(chat))
}

/// PUT /chats/:chat_id - Update chat metadata
async fn update_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(data): Json<ChatUpdate>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state.store.update_chat(&chat_id, &data).await?;
    Ok(Json(chat))
}

/// DELETE /chats/:chat_id - Delete a chat and its messages.
/// Destructive; gated to non-production environments.
async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.config.is_development() {
        return Err(ApiError::EnvironmentRestricted);
    }
    state.store.delete_chat(&chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
