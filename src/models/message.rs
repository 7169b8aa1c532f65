// Message models for chat functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Message sender type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Ai,
}

/// A single message in a chat
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub sender: SenderType,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message with a generated id
    pub fn new(chat_id: String, content: String, sender: SenderType) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), chat_id, content, sender)
    }

    /// Create a message with a caller-provided id. Used for streaming AI
    /// responses, where the id is allocated before any content exists.
    pub fn with_id(id: String, chat_id: String, content: String, sender: SenderType) -> Self {
        Self {
            id,
            chat_id,
            content,
            sender,
            created_at: Utc::now(),
        }
    }
}

/// Association recording that a message replies to a sub-range of an
/// earlier message's content. Indices are 0-based character offsets into
/// the parent's content, end exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReplyMetadata {
    pub id: String,
    pub message_id: String,
    pub parent_id: String,
    pub start_index: i64,
    pub end_index: i64,
    pub created_at: DateTime<Utc>,
}

/// Request to create a message
#[derive(Debug, Clone, Deserialize)]
pub struct MessageCreate {
    pub content: String,
    pub sender: SenderType,
}

/// Reply range payload within a reply request
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyMetadataCreate {
    pub start_index: i64,
    pub end_index: i64,
    pub parent_id: String,
}

/// Request to reply to a message with a quoted range
#[derive(Debug, Clone, Deserialize)]
pub struct MessageReplyCreate {
    pub content: String,
    pub sender: SenderType,
    pub reply_metadata: ReplyMetadataCreate,
}

/// A message with its reply metadata inlined, as returned by listings
#[derive(Debug, Clone, Serialize)]
pub struct MessageWithReply {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub sender: SenderType,
    pub created_at: DateTime<Utc>,
    pub reply_metadata: Option<ReplyMetadata>,
}

/// Messages list response
#[derive(Debug, Serialize)]
pub struct MessagesListResponse {
    pub messages: Vec<MessageWithReply>,
    pub total: i64,
}

/// Query parameters for listing messages
#[derive(Debug, Clone, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// One chunk of a streaming AI response
#[derive(Debug, Clone, Serialize)]
pub struct StreamChunk {
    pub content: String,
    pub is_final: bool,
    pub message_id: Option<String>,
}

/// One (role, text, timestamp) unit assembled for the generation backend
#[derive(Debug, Clone, Serialize)]
pub struct ContextTurn {
    pub content: String,
    pub sender: SenderType,
    pub created_at: DateTime<Utc>,
}

/// Validate and normalize message content. Content is trimmed and must be
/// 1..=10_000 characters.
pub fn validate_content(content: &str) -> Result<String, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::InvalidInput(
            "Message content cannot be empty".to_string(),
        ));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Message content cannot exceed {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(content.to_string())
}

/// Validate a candidate reply range against the parent message's content.
/// Indices count characters, matching how clients select text. Fails when
/// `start >= end`, `start < 0`, or `end` exceeds the content length.
pub fn validate_reply_range(start: i64, end: i64, parent_content: &str) -> Result<(), ApiError> {
    if start >= end || start < 0 || end as usize > parent_content.chars().count() {
        return Err(ApiError::InvalidReplyRange { start, end });
    }
    Ok(())
}

/// Extract the quoted sub-range from message content. Out-of-range or
/// inverted indices yield an empty string rather than an error, since
/// extraction happens after the fact on already-persisted metadata.
pub fn extract_range(content: &str, start: i64, end: i64) -> String {
    if start < 0 || end <= start {
        return String::new();
    }
    content
        .chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect()
}
