// Context assembly for AI generation
// Reconstructs a bounded conversational context either from recent chat
// history (linear mode) or by walking the reply ancestry of a message
// (reply-chain mode).

use chrono::Utc;

use crate::error::ApiError;
use crate::models::{extract_range, ContextTurn, MessageWithReply};
use crate::services::ChatStore;

/// Minimum number of turns handed to the generation backend when the chat
/// has that much history
pub const CONTEXT_WINDOW: i64 = 10;

/// Batch size for paging through chat messages during the ancestry walk
const PAGE_SIZE: i64 = 10;

/// Quoted text longer than this is shortened to head + "..." + tail
const QUOTE_LIMIT: usize = 100;

/// Assembles chronological context turns for the generation backend
#[derive(Clone)]
pub struct ContextAssembler {
    store: ChatStore,
}

impl ContextAssembler {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Linear mode: the most recent CONTEXT_WINDOW messages in the chat,
    /// oldest first, each contributing its full content.
    pub async fn linear_context(&self, chat_id: &str) -> Result<Vec<ContextTurn>, ApiError> {
        self.store.get_chat(chat_id).await?;

        let messages = self.store.recent_messages(chat_id, CONTEXT_WINDOW).await?;
        Ok(messages
            .into_iter()
            .map(|m| ContextTurn {
                content: m.content,
                sender: m.sender,
                created_at: m.created_at,
            })
            .collect())
    }

    /// Reply-chain mode: walk parent links backwards from `message_id`,
    /// paging through the chat newest-first rather than loading it whole.
    /// Messages carrying reply metadata contribute their quoted sub-range;
    /// a parent id that never appears in any page ends the walk. Chains
    /// shorter than CONTEXT_WINDOW are backfilled with older history.
    /// Returns turns in chronological order, oldest first.
    pub async fn reply_chain(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Vec<ContextTurn>, ApiError> {
        self.store.get_chat(chat_id).await?;

        let mut by_id: std::collections::HashMap<String, MessageWithReply> =
            std::collections::HashMap::new();
        // Built newest-first; reversed before returning
        let mut chain: Vec<ContextTurn> = Vec::new();

        let mut skip = 0;
        let mut current_id = Some(message_id.to_string());
        while let Some(target) = current_id.clone() {
            let page = self
                .store
                .list_messages(chat_id, skip, PAGE_SIZE, true)
                .await?;
            if page.is_empty() {
                break;
            }
            for message in page {
                by_id.insert(message.id.clone(), message);
            }

            if let Some(message) = by_id.get(&target) {
                let content = match &message.reply_metadata {
                    Some(md) => extract_range(&message.content, md.start_index, md.end_index),
                    None => message.content.clone(),
                };
                chain.push(ContextTurn {
                    content,
                    sender: message.sender,
                    created_at: message.created_at,
                });
                current_id = message
                    .reply_metadata
                    .as_ref()
                    .map(|md| md.parent_id.clone());
            }

            skip += PAGE_SIZE;
        }

        // Pad a short chain with messages strictly older than its oldest
        // known member
        if (chain.len() as i64) < CONTEXT_WINDOW {
            let oldest = chain.last().map(|t| t.created_at).unwrap_or_else(Utc::now);
            let needed = CONTEXT_WINDOW - chain.len() as i64;
            let backfill = self.store.messages_before(chat_id, oldest, needed).await?;
            chain.extend(backfill.into_iter().map(|m| ContextTurn {
                content: m.content,
                sender: m.sender,
                created_at: m.created_at,
            }));
        }

        chain.reverse();
        Ok(chain)
    }
}

/// Shorten quoted text to head + ellipsis + tail once it exceeds the quote
/// limit, keeping 50 characters from each end.
pub fn truncate_quote(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= QUOTE_LIMIT {
        return text.to_string();
    }
    let head: String = chars[..50].iter().collect();
    let tail: String = chars[chars.len() - 50..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Out-of-band guidance injected alongside the turn sequence when the user
/// replies to a quoted excerpt
pub fn reply_guidance(referenced_text: &str, reply_text: &str) -> String {
    format!(
        "The user replied specifically to this text: '{}'. Their reply content was: '{}'.",
        truncate_quote(referenced_text),
        truncate_quote(reply_text)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatCreate, MessageCreate, MessageReplyCreate, ReplyMetadataCreate, SenderType};

    async fn setup() -> (ChatStore, ContextAssembler, String) {
        let store = ChatStore::in_memory().await;
        let chat = store
            .create_chat(&ChatCreate {
                title: "Test Chat".to_string(),
            })
            .await
            .unwrap();
        (store.clone(), ContextAssembler::new(store), chat.id)
    }

    fn message(content: &str) -> MessageCreate {
        MessageCreate {
            content: content.to_string(),
            sender: SenderType::User,
        }
    }

    fn reply(content: &str, parent_id: &str, start: i64, end: i64) -> MessageReplyCreate {
        MessageReplyCreate {
            content: content.to_string(),
            sender: SenderType::User,
            reply_metadata: ReplyMetadataCreate {
                start_index: start,
                end_index: end,
                parent_id: parent_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_linear_context_empty_chat() {
        let (_, assembler, chat_id) = setup().await;
        let turns = assembler.linear_context(&chat_id).await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_linear_context_takes_most_recent_ascending() {
        let (store, assembler, chat_id) = setup().await;
        for i in 0..15 {
            store
                .create_message(&chat_id, &message(&format!("msg {}", i)))
                .await
                .unwrap();
        }

        let turns = assembler.linear_context(&chat_id).await.unwrap();
        assert_eq!(turns.len(), 10);
        assert_eq!(turns[0].content, "msg 5");
        assert_eq!(turns[9].content, "msg 14");
        for pair in turns.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_reply_chain_single_message() {
        let (store, assembler, chat_id) = setup().await;
        let msg = store
            .create_message(&chat_id, &message("only message"))
            .await
            .unwrap();

        let chain = assembler.reply_chain(&chat_id, &msg.id).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].content, "only message");
    }

    #[tokio::test]
    async fn test_reply_chain_follows_parents_and_crops() {
        let (store, assembler, chat_id) = setup().await;
        let root = store
            .create_message(&chat_id, &message("root content here"))
            .await
            .unwrap();
        let middle = store
            .create_reply(&chat_id, &root.id, &reply("middle reply text", &root.id, 0, 6))
            .await
            .unwrap();
        let leaf = store
            .create_reply(&chat_id, &middle.id, &reply("leaf reply body", &middle.id, 5, 10))
            .await
            .unwrap();

        let chain = assembler.reply_chain(&chat_id, &leaf.id).await.unwrap();
        // Chronological: root (full, end of walk), middle (cropped), leaf (cropped)
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].content, "root content here");
        assert_eq!(chain[1].content, "middle");
        assert_eq!(chain[2].content, "reply");
    }

    #[tokio::test]
    async fn test_reply_chain_backfills_older_history() {
        let (store, assembler, chat_id) = setup().await;
        for i in 0..12 {
            store
                .create_message(&chat_id, &message(&format!("old {}", i)))
                .await
                .unwrap();
        }
        let target = store
            .create_message(&chat_id, &message("target"))
            .await
            .unwrap();

        let chain = assembler.reply_chain(&chat_id, &target.id).await.unwrap();
        assert_eq!(chain.len(), 10);
        assert_eq!(chain.last().unwrap().content, "target");
        // Backfill is the most recent history before the target, in order
        assert_eq!(chain[0].content, "old 3");
        for pair in chain.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_reply_chain_walk_spans_pages() {
        let (store, assembler, chat_id) = setup().await;
        let root = store
            .create_message(&chat_id, &message("the very first message"))
            .await
            .unwrap();
        // Push the root more than one page away from the newest message
        for i in 0..12 {
            store
                .create_message(&chat_id, &message(&format!("filler {}", i)))
                .await
                .unwrap();
        }
        let leaf = store
            .create_reply(&chat_id, &root.id, &reply("replying to the root", &root.id, 4, 14))
            .await
            .unwrap();

        let chain = assembler.reply_chain(&chat_id, &leaf.id).await.unwrap();
        // The walk crossed a page boundary to reach the root
        assert_eq!(chain.last().unwrap().content, "ying to th");
        assert!(chain.iter().any(|t| t.content == "the very first message"));
        for pair in chain.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn test_truncate_quote_short_text_unchanged() {
        assert_eq!(truncate_quote("short"), "short");
        let exact = "x".repeat(100);
        assert_eq!(truncate_quote(&exact), exact);
    }

    #[test]
    fn test_truncate_quote_long_text() {
        let long: String = ('a'..='z').cycle().take(150).collect();
        let truncated = truncate_quote(&long);
        assert_eq!(truncated.chars().count(), 103);
        assert!(truncated.contains("..."));
        assert!(truncated.starts_with(&long.chars().take(50).collect::<String>()));
        assert!(truncated.ends_with(&long.chars().skip(100).collect::<String>()));
    }

    #[test]
    fn test_reply_guidance_format() {
        let note = reply_guidance("quoted", "my reply");
        assert_eq!(
            note,
            "The user replied specifically to this text: 'quoted'. Their reply content was: 'my reply'."
        );
    }
}
