use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio_util::sync::CancellationToken;

use cfb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use cfb_core::{messaging::port::MessagingPort, service::NewsAlertService};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NewsAlertService>,
    pub messenger: Arc<dyn MessagingPort>,
}

/// Run the bot: the dispatch loop in the background, long polling in the foreground.
///
/// Returns after Ctrl-C once the dispatch loop has stopped.
pub async fn run_polling(service: Arc<NewsAlertService>) -> anyhow::Result<()> {
    let cfg = service.config();
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "Bot started"),
        Err(e) => tracing::warn!(error = %e, "Could not fetch bot identity"),
    }
    tracing::info!(
        topic = %cfg.news_topic,
        subscribers = service.registry().len().await,
        poll_interval_secs = cfg.poll_interval.as_secs(),
        "Starting news dispatch"
    );

    // Throttle on top of the adapter's own single RetryAfter retry to keep
    // large fan-outs under Telegram's flood limits.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(
        bot.clone(),
        cfg.telegram_message_limit,
    ));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let cancel = CancellationToken::new();
    let dispatch = service
        .dispatch_loop(messenger.clone())
        .spawn(cancel.clone());

    let state = Arc::new(AppState { service, messenger });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Shutting down dispatch loop");
    cancel.cancel();
    if let Err(e) = dispatch.await {
        tracing::error!(error = %e, "Dispatch loop task failed");
    }

    Ok(())
}
