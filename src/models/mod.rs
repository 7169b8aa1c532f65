// Models module

pub mod chat;
pub mod message;

pub use chat::{
    validate_title, Chat, ChatCreate, ChatListResponse, ChatUpdate, ListChatsQuery,
};
pub use message::{
    extract_range, validate_content, validate_reply_range, ContextTurn, ListMessagesQuery,
    Message, MessageCreate, MessageReplyCreate, MessageWithReply, MessagesListResponse,
    ReplyMetadata, ReplyMetadataCreate, SenderType, StreamChunk,
};
