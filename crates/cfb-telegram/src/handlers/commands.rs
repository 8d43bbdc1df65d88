use cfb_core::{domain::ChatId, formatting::truncate_message, service::NewsAlertService};

/// Build the HTML reply for one inbound text, cut to `limit` bytes.
pub async fn reply_for(
    service: &NewsAlertService,
    chat_id: ChatId,
    text: &str,
    limit: usize,
) -> String {
    tracing::debug!(chat_id = %chat_id, "Handling inbound text");
    let reply = service.commands().handle(chat_id, text).await;
    truncate_message(&reply, limit)
}
