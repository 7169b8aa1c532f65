// Streaming response engine
// Drives a generation backend call, forwards fragments to the consumer as
// they arrive, and persists the accumulated text exactly once no matter
// how the stream ends. The generation loop runs in a spawned task so the
// persistence step still executes if the consumer disconnects mid-stream.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::llm::{
    ChatMessageInput, CompletionBackend, LlmError, SYSTEM_PROMPT_REPLY, SYSTEM_PROMPT_SEND,
};
use crate::models::{
    extract_range, ContextTurn, Message, MessageCreate, MessageReplyCreate, SenderType, StreamChunk,
};
use crate::services::{reply_guidance, ChatStore, ContextAssembler};

/// Anything that can end a stream early. At the SSE boundary both variants
/// become a terminal error frame.
#[derive(Debug, thiserror::Error)]
pub enum StreamFailure {
    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Llm(#[from] LlmError),
}

pub type StreamItem = Result<StreamChunk, StreamFailure>;

const CHANNEL_CAPACITY: usize = 32;

/// Persist a user message, then stream an AI response built from recent
/// chat history.
pub fn stream_send_response(
    store: ChatStore,
    llm: Arc<dyn CompletionBackend>,
    chat_id: String,
    data: MessageCreate,
) -> ReceiverStream<StreamItem> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        if ok_or_send(store.create_message(&chat_id, &data).await, &tx)
            .await
            .is_none()
        {
            return;
        }

        let assembler = ContextAssembler::new(store.clone());
        let Some(turns) = ok_or_send(assembler.linear_context(&chat_id).await, &tx).await else {
            return;
        };

        let prompt = build_prompt(&turns, SYSTEM_PROMPT_SEND, None);
        run_generation(store, llm, chat_id, prompt, tx).await;
    });

    ReceiverStream::new(rx)
}

/// Persist a reply message, then stream an AI response built from the
/// reply ancestry chain.
pub fn stream_reply_response(
    store: ChatStore,
    llm: Arc<dyn CompletionBackend>,
    chat_id: String,
    message_id: String,
    data: MessageReplyCreate,
) -> ReceiverStream<StreamItem> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        if ok_or_send(store.create_reply(&chat_id, &message_id, &data).await, &tx)
            .await
            .is_none()
        {
            return;
        }

        let Some(original) = ok_or_send(store.get_message(&chat_id, &message_id).await, &tx).await
        else {
            return;
        };

        let assembler = ContextAssembler::new(store.clone());
        let Some(mut turns) =
            ok_or_send(assembler.reply_chain(&chat_id, &message_id).await, &tx).await
        else {
            return;
        };

        // Out-of-band note quoting the selected excerpt of the parent and
        // the reply text; the replied-to message itself then joins as the
        // newest turn
        let referenced = extract_range(
            &original.content,
            data.reply_metadata.start_index,
            data.reply_metadata.end_index,
        );
        let guidance = reply_guidance(&referenced, &data.content);

        turns.push(ContextTurn {
            content: original.content,
            sender: original.sender,
            created_at: original.created_at,
        });

        let prompt = build_prompt(&turns, SYSTEM_PROMPT_REPLY, Some(&guidance));
        run_generation(store, llm, chat_id, prompt, tx).await;
    });

    ReceiverStream::new(rx)
}

/// Convert context turns to the prompt shape the generation backend
/// expects, with system guidance prepended.
fn build_prompt(
    turns: &[ContextTurn],
    system_prompt: &str,
    extra_notes: Option<&str>,
) -> Vec<ChatMessageInput> {
    let mut messages = Vec::with_capacity(turns.len() + 1);

    let system = match extra_notes {
        Some(notes) => format!("{}\n\n{}", system_prompt, notes),
        None => system_prompt.to_string(),
    };
    messages.push(ChatMessageInput {
        role: "system".to_string(),
        content: system,
    });

    for turn in turns {
        messages.push(ChatMessageInput {
            role: match turn.sender {
                SenderType::User => "user".to_string(),
                SenderType::Ai => "assistant".to_string(),
            },
            content: turn.content.clone(),
        });
    }

    messages
}

/// Drive one generation call: emit each fragment as a chunk, accumulate,
/// then persist. The persistence step runs whether the source completed or
/// was interrupted; interruption and persistence failures surface as a
/// terminal error item instead of the final chunk.
async fn run_generation(
    store: ChatStore,
    llm: Arc<dyn CompletionBackend>,
    chat_id: String,
    prompt: Vec<ChatMessageInput>,
    tx: mpsc::Sender<StreamItem>,
) {
    // Allocated before any content exists so every chunk carries a stable id
    let message_id = uuid::Uuid::new_v4().to_string();
    let mut accumulated = String::new();
    let mut interruption: Option<LlmError> = None;

    match llm.stream_chat(prompt).await {
        Ok(mut fragments) => {
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(content) if !content.is_empty() => {
                        accumulated.push_str(&content);
                        // The consumer may be gone; keep accumulating so the
                        // persistence step still sees the full partial output
                        let _ = tx
                            .send(Ok(StreamChunk {
                                content,
                                is_final: false,
                                message_id: Some(message_id.clone()),
                            }))
                            .await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Generation stream interrupted: {}", e);
                        interruption = Some(e);
                        break;
                    }
                }
            }
        }
        Err(e) => interruption = Some(e),
    }

    let persisted = persist_accumulated(&store, &chat_id, &message_id, &accumulated).await;

    match (interruption, persisted) {
        (_, Err(e)) => {
            let _ = tx.send(Err(e.into())).await;
        }
        (Some(e), Ok(())) => {
            let _ = tx.send(Err(e.into())).await;
        }
        (None, Ok(())) => {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: String::new(),
                    is_final: true,
                    message_id: Some(message_id),
                }))
                .await;
        }
    }
}

/// Write the accumulated AI text as a single message, or nothing at all if
/// the stream produced no content.
async fn persist_accumulated(
    store: &ChatStore,
    chat_id: &str,
    message_id: &str,
    accumulated: &str,
) -> Result<(), ApiError> {
    let content = accumulated.trim();
    if content.is_empty() {
        return Ok(());
    }

    let message = Message::with_id(
        message_id.to_string(),
        chat_id.to_string(),
        content.to_string(),
        SenderType::Ai,
    );
    store.insert_message(&message).await?;
    tracing::info!("Persisted AI message {} ({} chars)", message_id, content.len());
    Ok(())
}

/// Forward an error to the consumer as a terminal item, keeping the happy
/// value for the caller
async fn ok_or_send<T>(result: Result<T, ApiError>, tx: &mpsc::Sender<StreamItem>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            let _ = tx.send(Err(e.into())).await;
            None
        }
    }
}
