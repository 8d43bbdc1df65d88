//! Telegram update handlers.
//!
//! Text messages go through the command surface in `cfb-core`; the reply is
//! sent back through the shared messenger.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use cfb_core::domain::ChatId;

use crate::router::AppState;

mod commands;

pub use commands::reply_for;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    // Stickers, photos and the like carry no command.
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let limit = state.messenger.capabilities().max_message_len;
    let reply = reply_for(&state.service, chat_id, text, limit).await;
    if let Err(e) = state.messenger.send_html(chat_id, &reply).await {
        tracing::warn!(chat_id = %chat_id, error = %e, "Failed to send command reply");
    }
    Ok(())
}
