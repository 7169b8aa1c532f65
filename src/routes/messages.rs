// Message routes - send, reply, listings, and SSE streaming

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::models::{
    ContextTurn, ListMessagesQuery, Message, MessageCreate, MessageReplyCreate, MessageWithReply,
    MessagesListResponse,
};
use crate::services::ContextAssembler;
use crate::streaming::{stream_reply_response, stream_send_response, StreamItem};
use crate::AppState;

/// Build the messages router
pub fn messages_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/chats/:chat_id/messages",
            post(send_message).get(get_chat_messages),
        )
        .route("/chats/:chat_id/messages/stream", post(send_message_stream))
        .route("/chats/:chat_id/messages/:message_id", get(get_message))
        .route(
            "/chats/:chat_id/messages/:message_id/reply",
            post(reply_to_message),
        )
        .route(
            "/chats/:chat_id/messages/:message_id/reply/stream",
            post(reply_to_message_stream),
        )
        .route(
            "/chats/:chat_id/messages/:message_id/reply-chain",
            get(get_reply_chain),
        )
}

/// POST /chats/:chat_id/messages - Send a new message to a chat
async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(data): Json<MessageCreate>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state.store.create_message(&chat_id, &data).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /chats/:chat_id/messages/stream - Send a message and stream the
/// AI response over Server-Sent Events
async fn send_message_stream(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(data): Json<MessageCreate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream_send_response(state.store.clone(), state.llm.clone(), chat_id, data);
    sse_response(stream)
}

/// POST /chats/:chat_id/messages/:message_id/reply - Reply to a message
/// quoting a range of its content
async fn reply_to_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(data): Json<MessageReplyCreate>,
) -> Result<(StatusCode, Json<MessageWithReply>), ApiError> {
    let message = state.store.create_reply(&chat_id, &message_id, &data).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /chats/:chat_id/messages/:message_id/reply/stream - Reply and
/// stream the AI response over Server-Sent Events
async fn reply_to_message_stream(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(data): Json<MessageReplyCreate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream_reply_response(
        state.store.clone(),
        state.llm.clone(),
        chat_id,
        message_id,
        data,
    );
    sse_response(stream)
}

/// GET /chats/:chat_id/messages - List messages with reply metadata
async fn get_chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessagesListResponse>, ApiError> {
    let limit = query.limit.clamp(1, 1000);
    let messages = state
        .store
        .list_messages(&chat_id, query.skip, limit, false)
        .await?;
    let total = state.store.count_messages(&chat_id).await?;
    Ok(Json(MessagesListResponse { messages, total }))
}

/// GET /chats/:chat_id/messages/:message_id - Get a specific message
async fn get_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> Result<Json<MessageWithReply>, ApiError> {
    let message = state.store.get_message_with_reply(&chat_id, &message_id).await?;
    Ok(Json(message))
}

/// GET /chats/:chat_id/messages/:message_id/reply-chain - Chronological
/// reply ancestry of a message, backfilled with older history
async fn get_reply_chain(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> Result<Json<Vec<ContextTurn>>, ApiError> {
    // Surface a 404 for a missing message rather than an empty chain
    state.store.get_message(&chat_id, &message_id).await?;

    let assembler = ContextAssembler::new(state.store.clone());
    let chain = assembler.reply_chain(&chat_id, &message_id).await?;
    Ok(Json(chain))
}

/// Adapt an engine stream to SSE frames. Opens with a comment to force
/// header flush, then serializes each chunk as `data: <json>`. Failures
/// become a terminal `{"error": ..., "is_final": true}` frame since
/// headers have already been sent.
fn sse_response(
    stream: ReceiverStream<StreamItem>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = async_stream::stream! {
        yield Ok::<Event, Infallible>(Event::default().comment("stream-start"));

        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => yield Ok(data_event(&chunk)),
                Err(e) => {
                    yield Ok(data_event(&json!({
                        "error": e.to_string(),
                        "is_final": true,
                    })));
                    break;
                }
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn data_event<T: serde::Serialize>(payload: &T) -> Event {
    match serde_json::to_string(payload) {
        Ok(body) => Event::default().data(body),
        Err(e) => Event::default().data(
            json!({ "error": e.to_string(), "is_final": true }).to_string(),
        ),
    }
}
