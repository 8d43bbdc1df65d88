//! Telegram adapter (teloxide).
//!
//! This crate implements the `cfb-core` MessagingPort over the Telegram Bot API
//! and hosts the command handlers.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use cfb_core::{
    domain::ChatId,
    messaging::{
        port::MessagingPort,
        types::{DeliveryFailure, MessagingCapabilities},
    },
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, max_message_len: usize) -> Self {
        Self {
            bot,
            max_message_len,
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T, DeliveryFailure>
    where
        Fut: std::future::IntoFuture<Output = Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(classify_error(&other)),
            }
        }
    }
}

/// Map a Telegram error to a delivery failure.
///
/// Errors meaning the chat can never be reached again are permanent; anything
/// else (network, flood control, server errors) is transient.
pub fn classify_error(e: &RequestError) -> DeliveryFailure {
    let reason = format!("telegram error: {e}");
    match e {
        RequestError::Api(api) if is_unreachable_chat(api) => DeliveryFailure::permanent(reason),
        // The group was upgraded; the old id is dead.
        RequestError::MigrateToChatId(_) => DeliveryFailure::permanent(reason),
        _ => DeliveryFailure::transient(reason),
    }
}

fn is_unreachable_chat(e: &ApiError) -> bool {
    matches!(
        e,
        ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::CantInitiateConversation
    )
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_message_len,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<(), DeliveryFailure> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_missing_chats_are_permanent() {
        for api in [
            ApiError::BotBlocked,
            ApiError::ChatNotFound,
            ApiError::UserDeactivated,
            ApiError::BotKicked,
        ] {
            let f = classify_error(&RequestError::Api(api));
            assert!(f.permanent, "{}", f.reason);
            assert!(f.reason.starts_with("telegram error:"));
        }
    }

    #[test]
    fn migrated_chat_is_permanent() {
        let f = classify_error(&RequestError::MigrateToChatId(-100));
        assert!(f.permanent);
    }

    #[test]
    fn capabilities_report_configured_limit() {
        let messenger = TelegramMessenger::new(Bot::new("123:abc"), 1024);
        assert_eq!(messenger.capabilities().max_message_len, 1024);
    }

    #[test]
    fn other_api_errors_are_transient() {
        let f = classify_error(&RequestError::Api(ApiError::MessageTextIsEmpty));
        assert!(!f.permanent);
    }
}
