use std::sync::Arc;

use cfb_newsapi::NewsApiClient;

use cfb_core::{config::Config, registry::SubscriberRegistry, service::NewsAlertService};

#[tokio::main]
async fn main() -> Result<(), cfb_core::Error> {
    cfb_core::logging::init("cfb")?;

    let cfg = Arc::new(Config::load()?);

    tracing::info!(
        topic = %cfg.news_topic,
        language = %cfg.news_language,
        subscribers_file = %cfg.subscribers_file.display(),
        "Configuration loaded"
    );

    let registry = Arc::new(SubscriberRegistry::load(&cfg.subscribers_file)?);

    let feed = Arc::new(NewsApiClient::new(
        cfg.newsapi_key.clone(),
        cfg.newsapi_base_url.clone(),
        cfg.feed_timeout,
    ));

    let service = Arc::new(NewsAlertService::new(cfg, registry, feed));

    cfb_telegram::router::run_polling(service)
        .await
        .map_err(|e| cfb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
