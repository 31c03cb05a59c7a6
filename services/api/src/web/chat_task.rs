//! services/api/src/web/chat_task.rs
//!
//! Handles a single exchange with the director's assistant.

use crate::web::{
    protocol::{ChatMessageView, ServerMessage},
    state::AppState,
};
use std::time::Instant;
use storyboard_core::domain::ChatMessage;
use tracing::{error, info};

/// Appended when the assistant answers with nothing.
pub const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I couldn't process that.";
/// Appended in place of a reply when the gateway call fails.
pub const FAILED_REPLY: &str = "Error: Failed to get response from the assistant.";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Type a message before sending.")]
    BlankMessage,
    #[error("The assistant is still replying to the previous message.")]
    ReplyPending,
}

/// Sends `message` to the assistant.
///
/// The user's message is appended and pushed to clients before the gateway is
/// called. Exactly one assistant message always follows it: the reply, the
/// fallback for an empty reply, or a synthetic error. Returns that message.
pub async fn send_message(app_state: &AppState, message: String) -> Result<ChatMessage, ChatError> {
    if message.trim().is_empty() {
        return Err(ChatError::BlankMessage);
    }

    let history = {
        let mut session = app_state.session.lock().await;
        if session.awaiting_reply {
            return Err(ChatError::ReplyPending);
        }
        let history = session.transcript.messages().to_vec();
        let user_message = ChatMessage::user(message.clone());
        app_state.publish(ServerMessage::ChatAppended {
            message: ChatMessageView::from(&user_message),
        });
        session.transcript.push(user_message);
        session.awaiting_reply = true;
        history
    };

    let start = Instant::now();
    let reply = match app_state.chat_adapter.reply(&history, &message).await {
        Ok(text) if text.trim().is_empty() => ChatMessage::assistant(EMPTY_REPLY_FALLBACK),
        Ok(text) => ChatMessage::assistant(text),
        Err(e) => {
            error!("Assistant reply failed: {:?}", e);
            ChatMessage::assistant(FAILED_REPLY)
        }
    };
    info!("Assistant reply took {:?}", start.elapsed());

    let mut session = app_state.session.lock().await;
    session.transcript.push(reply.clone());
    session.awaiting_reply = false;
    app_state.publish(ServerMessage::ChatAppended {
        message: ChatMessageView::from(&reply),
    });
    app_state.publish(ServerMessage::ChatSettled);
    Ok(reply)
}
