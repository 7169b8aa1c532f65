// Chat models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const MAX_TITLE_LENGTH: usize = 255;

/// A conversation container grouping an ordered sequence of messages
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// Create a new chat with a generated id
    pub fn new(title: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            created_at: now,
            updated_at: Some(now),
        }
    }
}

/// Request to create a chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCreate {
    pub title: String,
}

/// Request to update chat metadata
#[derive(Debug, Clone, Deserialize)]
pub struct ChatUpdate {
    #[serde(default)]
    pub title: Option<String>,
}

/// Query parameters for listing chats
#[derive(Debug, Clone, Deserialize)]
pub struct ListChatsQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    20
}

/// Paginated chat listing
#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub items: Vec<Chat>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl ChatListResponse {
    /// Assemble the pagination envelope for one page of results
    pub fn new(items: Vec<Chat>, total: i64, page: i64, size: i64) -> Self {
        let pages = if size > 0 { (total + size - 1) / size } else { 0 };
        Self {
            items,
            total,
            page,
            size,
            pages,
            has_next: page < pages,
            has_previous: page > 1,
        }
    }
}

/// Validate and normalize a chat title. Titles are trimmed and must be
/// 1..=255 characters.
pub fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::InvalidInput(
            "Chat title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Chat title cannot exceed {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title_trims() {
        assert_eq!(validate_title("  My Chat  ").unwrap(), "My Chat");
    }

    #[test]
    fn test_validate_title_empty() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title("").is_err());
    }

    #[test]
    fn test_validate_title_too_long() {
        let long = "x".repeat(256);
        assert!(validate_title(&long).is_err());
        let ok = "x".repeat(255);
        assert_eq!(validate_title(&ok).unwrap(), ok);
    }

    #[test]
    fn test_pagination_envelope() {
        let resp = ChatListResponse::new(vec![], 45, 2, 20);
        assert_eq!(resp.pages, 3);
        assert!(resp.has_next);
        assert!(resp.has_previous);

        let resp = ChatListResponse::new(vec![], 0, 1, 20);
        assert_eq!(resp.pages, 0);
        assert!(!resp.has_next);
        assert!(!resp.has_previous);
    }
}
