//! The long-lived service shared by the command handlers and the dispatch loop.

use std::sync::Arc;

use crate::{
    commands::{CommandSettings, CommandSurface},
    config::Config,
    dispatch::{DispatchLoop, DispatchSettings},
    feed::FeedSource,
    messaging::port::MessagingPort,
    registry::SubscriberRegistry,
};

/// Built once at startup and handed out by `Arc`.
pub struct NewsAlertService {
    cfg: Arc<Config>,
    registry: Arc<SubscriberRegistry>,
    feed: Arc<dyn FeedSource>,
    commands: CommandSurface,
}

impl NewsAlertService {
    pub fn new(
        cfg: Arc<Config>,
        registry: Arc<SubscriberRegistry>,
        feed: Arc<dyn FeedSource>,
    ) -> Self {
        let commands = CommandSurface::new(
            CommandSettings::from_config(&cfg),
            registry.clone(),
            feed.clone(),
        );
        Self {
            cfg,
            registry,
            feed,
            commands,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn commands(&self) -> &CommandSurface {
        &self.commands
    }

    /// Build the dispatch loop delivering through `messenger`.
    ///
    /// The loop owns its dedup cursor; call this once per process.
    pub fn dispatch_loop(&self, messenger: Arc<dyn MessagingPort>) -> DispatchLoop {
        DispatchLoop::new(
            DispatchSettings::from_config(&self.cfg),
            self.registry.clone(),
            self.feed.clone(),
            messenger,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_config,
        dispatch::TickOutcome,
        domain::{ChatId, Item},
        feed::FeedQuery,
        messaging::types::{DeliveryFailure, MessagingCapabilities},
        Result,
    };
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct CountingFeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedSource for CountingFeed {
        async fn fetch(&self, query: &FeedQuery) -> Result<Vec<Item>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..query.count)
                .map(|i| Item::from_url(format!("https://n/{n}/{i}"), "T", "S"))
                .collect())
        }
    }

    #[derive(Default)]
    struct SinkMessenger {
        sent: Mutex<Vec<ChatId>>,
    }

    #[async_trait]
    impl MessagingPort for SinkMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_message_len: 4096,
            }
        }

        async fn send_html(
            &self,
            chat_id: ChatId,
            _html: &str,
        ) -> std::result::Result<(), DeliveryFailure> {
            self.sent.lock().unwrap().push(chat_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn commands_and_loop_share_one_registry() {
        let service = NewsAlertService::new(
            Arc::new(test_config()),
            Arc::new(SubscriberRegistry::in_memory()),
            Arc::new(CountingFeed {
                calls: AtomicUsize::new(0),
            }),
        );
        let messenger = Arc::new(SinkMessenger::default());
        let mut lp = service.dispatch_loop(messenger.clone());

        service.commands().handle(ChatId(10), "/subscribe").await;
        assert!(matches!(lp.tick().await, TickOutcome::Seeded { .. }));

        // A "latest" query in between must not disturb the loop's cursor.
        service.commands().handle(ChatId(10), "/latest").await;
        assert!(matches!(lp.tick().await, TickOutcome::Dispatched(_)));
        assert_eq!(*messenger.sent.lock().unwrap(), vec![ChatId(10)]);
    }
}
