// Chat storage service - SQLite via sqlx
// Typed create/read/update/delete plus ordered range queries over chats,
// messages, and reply metadata.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::ApiError;
use crate::models::{
    validate_content, validate_reply_range, validate_title, Chat, ChatCreate, ChatListResponse,
    ChatUpdate, Message, MessageCreate, MessageReplyCreate, MessageWithReply, ReplyMetadata,
    SenderType,
};

/// Flat row produced by the message + reply metadata join
#[derive(sqlx::FromRow)]
struct MessageReplyRow {
    id: String,
    chat_id: String,
    content: String,
    sender: SenderType,
    created_at: DateTime<Utc>,
    rm_id: Option<String>,
    rm_message_id: Option<String>,
    rm_parent_id: Option<String>,
    rm_start_index: Option<i64>,
    rm_end_index: Option<i64>,
    rm_created_at: Option<DateTime<Utc>>,
}

impl From<MessageReplyRow> for MessageWithReply {
    fn from(row: MessageReplyRow) -> Self {
        let reply_metadata = match (row.rm_id, row.rm_message_id) {
            (Some(id), Some(message_id)) => Some(ReplyMetadata {
                id,
                message_id,
                parent_id: row.rm_parent_id.unwrap_or_default(),
                start_index: row.rm_start_index.unwrap_or_default(),
                end_index: row.rm_end_index.unwrap_or_default(),
                created_at: row.rm_created_at.unwrap_or(row.created_at),
            }),
            _ => None,
        };
        MessageWithReply {
            id: row.id,
            chat_id: row.chat_id,
            content: row.content,
            sender: row.sender,
            created_at: row.created_at,
            reply_metadata,
        }
    }
}

const MESSAGE_WITH_REPLY_COLUMNS: &str = "m.id, m.chat_id, m.content, m.sender, m.created_at, \
     r.id AS rm_id, r.message_id AS rm_message_id, r.parent_id AS rm_parent_id, \
     r.start_index AS rm_start_index, r.end_index AS rm_end_index, r.created_at AS rm_created_at";

/// Storage gateway over chats, messages, and reply metadata
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Open the database at `database_url` and ensure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a fresh in-memory database. Each call gets its own schema.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        let store = Self { pool };
        store.init_schema().await.unwrap();
        store
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                sender TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS message_reply_metadata (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                parent_id TEXT NOT NULL,
                start_index INTEGER NOT NULL,
                end_index INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_created
             ON messages(chat_id, created_at, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Create a new chat
    pub async fn create_chat(&self, data: &ChatCreate) -> Result<Chat, ApiError> {
        let chat = Chat::new(validate_title(&data.title)?);

        sqlx::query("INSERT INTO chats (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&chat.id)
            .bind(&chat.title)
            .bind(chat.created_at)
            .bind(chat.updated_at)
            .execute(&self.pool)
            .await?;

        tracing::info!("Created chat {}", chat.id);
        Ok(chat)
    }

    /// Get a chat by id
    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat, ApiError> {
        sqlx::query_as::<_, Chat>("SELECT id, title, created_at, updated_at FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::ChatNotFound(chat_id.to_string()))
    }

    /// Update chat metadata. Only provided fields change; the updated_at
    /// timestamp is touched when anything does.
    pub async fn update_chat(&self, chat_id: &str, data: &ChatUpdate) -> Result<Chat, ApiError> {
        let chat = self.get_chat(chat_id).await?;

        let Some(title) = &data.title else {
            return Ok(chat);
        };
        let title = validate_title(title)?;
        let updated_at = Utc::now();

        sqlx::query("UPDATE chats SET title = ?, updated_at = ? WHERE id = ?")
            .bind(&title)
            .bind(updated_at)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(Chat {
            title,
            updated_at: Some(updated_at),
            ..chat
        })
    }

    /// Delete a chat. Messages and reply metadata cascade.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        self.get_chat(chat_id).await?;

        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Deleted chat {} and its messages", chat_id);
        Ok(())
    }

    /// List chats, newest first, with a pagination envelope
    pub async fn list_chats(&self, page: i64, size: i64) -> Result<ChatListResponse, ApiError> {
        let page = page.max(1);
        let size = size.clamp(1, 100);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, Chat>(
            "SELECT id, title, created_at, updated_at FROM chats
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind((page - 1) * size)
        .fetch_all(&self.pool)
        .await?;

        Ok(ChatListResponse::new(items, total, page, size))
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Create a new message in a chat
    pub async fn create_message(
        &self,
        chat_id: &str,
        data: &MessageCreate,
    ) -> Result<Message, ApiError> {
        self.get_chat(chat_id).await?;

        let content = validate_content(&data.content)?;
        let message = Message::new(chat_id.to_string(), content, data.sender);
        self.insert_message(&message).await?;

        Ok(message)
    }

    /// Insert an already-constructed message. Used directly by the
    /// streaming engine to persist the pre-allocated AI message.
    pub async fn insert_message(&self, message: &Message) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO messages (id, chat_id, content, sender, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.content)
        .bind(message.sender)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reply to a message. Validates the quoted range against the parent's
    /// content before any write, then persists the reply message and its
    /// metadata in a single transaction.
    pub async fn create_reply(
        &self,
        chat_id: &str,
        message_id: &str,
        data: &MessageReplyCreate,
    ) -> Result<MessageWithReply, ApiError> {
        self.get_chat(chat_id).await?;
        let parent = self.get_message(chat_id, message_id).await?;

        validate_reply_range(
            data.reply_metadata.start_index,
            data.reply_metadata.end_index,
            &parent.content,
        )?;
        let content = validate_content(&data.content)?;

        let message = Message::new(chat_id.to_string(), content, data.sender);
        let metadata = ReplyMetadata {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message.id.clone(),
            parent_id: parent.id.clone(),
            start_index: data.reply_metadata.start_index,
            end_index: data.reply_metadata.end_index,
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await.map_err(ApiError::from)?;

        sqlx::query(
            "INSERT INTO messages (id, chat_id, content, sender, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.content)
        .bind(message.sender)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO message_reply_metadata
                 (id, message_id, parent_id, start_index, end_index, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&metadata.id)
        .bind(&metadata.message_id)
        .bind(&metadata.parent_id)
        .bind(metadata.start_index)
        .bind(metadata.end_index)
        .bind(metadata.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(ApiError::from)?;

        Ok(MessageWithReply {
            id: message.id,
            chat_id: message.chat_id,
            content: message.content,
            sender: message.sender,
            created_at: message.created_at,
            reply_metadata: Some(metadata),
        })
    }

    /// Get a message by id within a chat
    pub async fn get_message(&self, chat_id: &str, message_id: &str) -> Result<Message, ApiError> {
        sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, content, sender, created_at FROM messages
             WHERE id = ? AND chat_id = ?",
        )
        .bind(message_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::MessageNotFound(message_id.to_string()))
    }

    /// Get a message with its reply metadata inlined
    pub async fn get_message_with_reply(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<MessageWithReply, ApiError> {
        let sql = format!(
            "SELECT {} FROM messages m
             LEFT JOIN message_reply_metadata r ON r.message_id = m.id
             WHERE m.id = ? AND m.chat_id = ?",
            MESSAGE_WITH_REPLY_COLUMNS
        );
        sqlx::query_as::<_, MessageReplyRow>(&sql)
            .bind(message_id)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?
            .map(MessageWithReply::from)
            .ok_or_else(|| ApiError::MessageNotFound(message_id.to_string()))
    }

    /// List messages in a chat with reply metadata inlined. Chronological
    /// order with an id tie-break keeps pagination deterministic even when
    /// timestamps collide.
    pub async fn list_messages(
        &self,
        chat_id: &str,
        skip: i64,
        limit: i64,
        newest_first: bool,
    ) -> Result<Vec<MessageWithReply>, ApiError> {
        self.get_chat(chat_id).await?;

        let order = if newest_first {
            "m.created_at DESC, m.id DESC"
        } else {
            "m.created_at ASC, m.id ASC"
        };
        let sql = format!(
            "SELECT {} FROM messages m
             LEFT JOIN message_reply_metadata r ON r.message_id = m.id
             WHERE m.chat_id = ?
             ORDER BY {} LIMIT ? OFFSET ?",
            MESSAGE_WITH_REPLY_COLUMNS, order
        );

        let rows = sqlx::query_as::<_, MessageReplyRow>(&sql)
            .bind(chat_id)
            .bind(limit)
            .bind(skip.max(0))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(MessageWithReply::from).collect())
    }

    /// Count messages in a chat
    pub async fn count_messages(&self, chat_id: &str) -> Result<i64, ApiError> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// The most recent `limit` messages in a chat, in chronological order
    pub async fn recent_messages(
        &self,
        chat_id: &str,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError> {
        let mut messages = sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, content, sender, created_at FROM messages
             WHERE chat_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        messages.reverse();
        Ok(messages)
    }

    /// Messages strictly older than `before`, newest first
    pub async fn messages_before(
        &self,
        chat_id: &str,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, content, sender, created_at FROM messages
             WHERE chat_id = ? AND created_at < ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(chat_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReplyMetadataCreate;

    fn chat_data(title: &str) -> ChatCreate {
        ChatCreate {
            title: title.to_string(),
        }
    }

    fn message_data(content: &str, sender: SenderType) -> MessageCreate {
        MessageCreate {
            content: content.to_string(),
            sender,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_chat() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("Test Chat")).await.unwrap();

        let fetched = store.get_chat(&chat.id).await.unwrap();
        assert_eq!(fetched.id, chat.id);
        assert_eq!(fetched.title, "Test Chat");
    }

    #[tokio::test]
    async fn test_get_missing_chat() {
        let store = ChatStore::in_memory().await;
        let err = store.get_chat("nonexistent-id").await.unwrap_err();
        assert!(matches!(err, ApiError::ChatNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_chat_title() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("Before")).await.unwrap();

        let updated = store
            .update_chat(
                &chat.id,
                &ChatUpdate {
                    title: Some("After".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "After");

        let fetched = store.get_chat(&chat.id).await.unwrap();
        assert_eq!(fetched.title, "After");
        assert!(fetched.updated_at.unwrap() >= fetched.created_at);
    }

    #[tokio::test]
    async fn test_message_ordering_and_pagination_partition() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("Ordering")).await.unwrap();

        for i in 0..7 {
            store
                .create_message(&chat.id, &message_data(&format!("msg {}", i), SenderType::User))
                .await
                .unwrap();
        }

        let all = store.list_messages(&chat.id, 0, 100, false).await.unwrap();
        assert_eq!(all.len(), 7);
        for pair in all.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }

        // Concatenating consecutive pages reproduces the full list
        let mut paged = Vec::new();
        for skip in (0..7).step_by(3) {
            paged.extend(store.list_messages(&chat.id, skip, 3, false).await.unwrap());
        }
        let ids: Vec<_> = all.iter().map(|m| m.id.clone()).collect();
        let paged_ids: Vec<_> = paged.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, paged_ids);

        // Descending listing reverses it exactly
        let desc = store.list_messages(&chat.id, 0, 100, true).await.unwrap();
        let mut desc_ids: Vec<_> = desc.iter().map(|m| m.id.clone()).collect();
        desc_ids.reverse();
        assert_eq!(ids, desc_ids);
    }

    #[tokio::test]
    async fn test_create_reply_persists_metadata() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("Replies")).await.unwrap();
        let original = store
            .create_message(&chat.id, &message_data("Original message", SenderType::User))
            .await
            .unwrap();

        let reply = store
            .create_reply(
                &chat.id,
                &original.id,
                &MessageReplyCreate {
                    content: "Reply message".to_string(),
                    sender: SenderType::Ai,
                    reply_metadata: ReplyMetadataCreate {
                        start_index: 0,
                        end_index: 8,
                        parent_id: original.id.clone(),
                    },
                },
            )
            .await
            .unwrap();

        let metadata = reply.reply_metadata.unwrap();
        assert_eq!(metadata.parent_id, original.id);
        assert_eq!(metadata.start_index, 0);
        assert_eq!(metadata.end_index, 8);

        let listed = store.list_messages(&chat.id, 0, 10, false).await.unwrap();
        assert!(listed[0].reply_metadata.is_none());
        assert!(listed[1].reply_metadata.is_some());
    }

    #[tokio::test]
    async fn test_invalid_reply_range_writes_nothing() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("Replies")).await.unwrap();
        let original = store
            .create_message(&chat.id, &message_data("Short", SenderType::User))
            .await
            .unwrap();

        let err = store
            .create_reply(
                &chat.id,
                &original.id,
                &MessageReplyCreate {
                    content: "Reply".to_string(),
                    sender: SenderType::Ai,
                    reply_metadata: ReplyMetadataCreate {
                        start_index: 0,
                        end_index: 100,
                        parent_id: original.id.clone(),
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidReplyRange { .. }));

        // Only the original message exists; no reply row was written
        assert_eq!(store.count_messages(&chat.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_chat_cascades() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("Doomed")).await.unwrap();
        let message = store
            .create_message(&chat.id, &message_data("Original", SenderType::User))
            .await
            .unwrap();
        store
            .create_reply(
                &chat.id,
                &message.id,
                &MessageReplyCreate {
                    content: "Reply".to_string(),
                    sender: SenderType::User,
                    reply_metadata: ReplyMetadataCreate {
                        start_index: 0,
                        end_index: 4,
                        parent_id: message.id.clone(),
                    },
                },
            )
            .await
            .unwrap();

        store.delete_chat(&chat.id).await.unwrap();

        assert!(matches!(
            store.get_chat(&chat.id).await.unwrap_err(),
            ApiError::ChatNotFound(_)
        ));
        let err = store.get_message(&chat.id, &message.id).await.unwrap_err();
        assert!(matches!(err, ApiError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn test_recent_messages_takes_newest() {
        let store = ChatStore::in_memory().await;
        let chat = store.create_chat(&chat_data("History")).await.unwrap();
        for i in 0..15 {
            store
                .create_message(&chat.id, &message_data(&format!("msg {}", i), SenderType::User))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&chat.id, 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg 5");
        assert_eq!(recent[9].content, "msg 14");
    }

    #[tokio::test]
    async fn test_list_chats_pagination() {
        let store = ChatStore::in_memory().await;
        for i in 0..5 {
            store.create_chat(&chat_data(&format!("Chat {}", i))).await.unwrap();
        }

        let page = store.list_chats(1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_next);
        assert!(!page.has_previous);

        let last = store.list_chats(3, 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_next);
        assert!(last.has_previous);
    }
}
