use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{DeliveryFailure, MessagingCapabilities},
};

/// Delivery channel port.
///
/// One call is one best-effort delivery attempt to one recipient. Failures are
/// reported as values so the fan-out can decide per recipient whether to prune.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<(), DeliveryFailure>;
}
