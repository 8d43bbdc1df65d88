//! Command surface: subscribe / unsubscribe / latest and friends.
//!
//! Handling is split in three steps so the decision logic stays testable
//! without a messenger:
//! - `parse_command` turns raw chat text into a `CommandEvent`
//! - `decide` maps each event to exactly one `Effect` (a plain table)
//! - `CommandSurface::apply` performs the effect against the registry or feed
//!   and yields a `View`, rendered once by `render_view`
//!
//! Feed queries issued here are stateless: they never consult or move the
//! dispatch loop's dedup cursor.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    config::Config,
    domain::{ChatId, Item},
    feed::{FeedQuery, FeedSource},
    formatting::{escape_html, render_item_list},
    registry::{AddOutcome, RemoveOutcome, SubscriberRegistry},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandEvent {
    Start,
    Help,
    Subscribe,
    Unsubscribe,
    Latest,
    Crosscheck { topic: String },
    Status,
    Unknown { name: String },
    /// Plain text that is not a command.
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedScope {
    /// Configured topic, `latest_count` items.
    Latest,
    /// User supplied topic, `crosscheck_count` items.
    Topic(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    AddSubscriber,
    RemoveSubscriber,
    QueryFeed(FeedScope),
    ReadStatus,
    Show(View),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View {
    Welcome,
    Help,
    Subscribed,
    AlreadySubscribed,
    Unsubscribed,
    NotSubscribed,
    Items { heading: String, items: Vec<Item> },
    NoItems { topic: String },
    FeedUnavailable,
    CrosscheckUsage,
    Status {
        subscribers: usize,
        subscribed: bool,
        poll_interval: Duration,
    },
    UnknownCommand { name: String },
    TextHint,
}

/// Parse chat text. Telegram may send `/cmd@botname arg1 ...`.
pub fn parse_command(text: &str) -> CommandEvent {
    let text = text.trim();
    if !text.starts_with('/') {
        return CommandEvent::Text;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim().to_string();

    let name = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match name.as_str() {
        "start" => CommandEvent::Start,
        "help" => CommandEvent::Help,
        "subscribe" => CommandEvent::Subscribe,
        "unsubscribe" | "stop" => CommandEvent::Unsubscribe,
        "latest" => CommandEvent::Latest,
        "crosscheck" => CommandEvent::Crosscheck { topic: args },
        "status" => CommandEvent::Status,
        _ => CommandEvent::Unknown { name },
    }
}

/// Decision table: one effect per event.
pub fn decide(event: &CommandEvent) -> Effect {
    match event {
        CommandEvent::Start => Effect::Show(View::Welcome),
        CommandEvent::Help => Effect::Show(View::Help),
        CommandEvent::Subscribe => Effect::AddSubscriber,
        CommandEvent::Unsubscribe => Effect::RemoveSubscriber,
        CommandEvent::Latest => Effect::QueryFeed(FeedScope::Latest),
        CommandEvent::Crosscheck { topic } if topic.trim().is_empty() => {
            Effect::Show(View::CrosscheckUsage)
        }
        CommandEvent::Crosscheck { topic } => {
            Effect::QueryFeed(FeedScope::Topic(topic.trim().to_string()))
        }
        CommandEvent::Status => Effect::ReadStatus,
        CommandEvent::Unknown { name } => Effect::Show(View::UnknownCommand { name: name.clone() }),
        CommandEvent::Text => Effect::Show(View::TextHint),
    }
}

const COMMAND_LIST: &str = "/subscribe - terima notifikasi berita baru\n\
/unsubscribe - berhenti menerima notifikasi\n\
/latest - berita terbaru\n\
/crosscheck &lt;topik&gt; - cek liputan media untuk sebuah topik\n\
/status - status langganan";

/// Render a view as Telegram HTML.
pub fn render_view(view: &View) -> String {
    match view {
        View::Welcome => format!(
            "👋 <b>Selamat datang di Bot Cek Fakta!</b>\n\n\
Saya mengirimkan notifikasi setiap ada berita cek fakta baru.\n\n{COMMAND_LIST}"
        ),
        View::Help => format!("<b>Perintah yang tersedia:</b>\n\n{COMMAND_LIST}"),
        View::Subscribed => {
            "✅ Anda berlangganan notifikasi berita. Kirim /unsubscribe untuk berhenti.".to_string()
        }
        View::AlreadySubscribed => "ℹ️ Anda sudah berlangganan.".to_string(),
        View::Unsubscribed => {
            "👋 Anda tidak lagi menerima notifikasi. Kirim /subscribe untuk berlangganan lagi."
                .to_string()
        }
        View::NotSubscribed => "ℹ️ Anda belum berlangganan.".to_string(),
        View::Items { heading, items } => render_item_list(heading, items),
        View::NoItems { topic } => format!(
            "📰 Tidak ditemukan berita untuk topik <b>{}</b>.",
            escape_html(topic)
        ),
        View::FeedUnavailable => "⚠️ Gagal menghubungi layanan berita. Coba lagi nanti.".to_string(),
        View::CrosscheckUsage => {
            "Silakan masukkan topik setelah perintah. Contoh: <code>/crosscheck kenaikan harga BBM</code>"
                .to_string()
        }
        View::Status {
            subscribers,
            subscribed,
            poll_interval,
        } => {
            let you = if *subscribed {
                "berlangganan"
            } else {
                "tidak berlangganan"
            };
            format!(
                "📊 <b>Status</b>\n\nAnda: {you}\nJumlah pelanggan: {subscribers}\nInterval cek berita: {}",
                format_interval(*poll_interval)
            )
        }
        View::UnknownCommand { name } => format!(
            "Perintah /{} tidak dikenali. Kirim /help untuk daftar perintah.",
            escape_html(name)
        ),
        View::TextHint => "Kirim /help untuk melihat perintah yang tersedia.".to_string(),
    }
}

fn format_interval(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    if hours > 0 && mins > 0 {
        return format!("{hours} jam {mins} menit");
    }
    if hours > 0 {
        return format!("{hours} jam");
    }
    if mins > 0 {
        return format!("{mins} menit");
    }
    format!("{secs} detik")
}

#[derive(Clone, Debug)]
pub struct CommandSettings {
    pub topic: String,
    pub language: String,
    pub latest_count: usize,
    pub crosscheck_count: usize,
    pub feed_timeout: Duration,
    pub poll_interval: Duration,
}

impl CommandSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            topic: cfg.news_topic.clone(),
            language: cfg.news_language.clone(),
            latest_count: cfg.latest_count,
            crosscheck_count: cfg.crosscheck_count,
            feed_timeout: cfg.feed_timeout,
            poll_interval: cfg.poll_interval,
        }
    }
}

pub struct CommandSurface {
    settings: CommandSettings,
    registry: Arc<SubscriberRegistry>,
    feed: Arc<dyn FeedSource>,
}

impl CommandSurface {
    pub fn new(
        settings: CommandSettings,
        registry: Arc<SubscriberRegistry>,
        feed: Arc<dyn FeedSource>,
    ) -> Self {
        Self {
            settings,
            registry,
            feed,
        }
    }

    /// Handle one inbound text from `chat_id` and return the HTML reply.
    pub async fn handle(&self, chat_id: ChatId, text: &str) -> String {
        let event = parse_command(text);
        let view = self.apply(chat_id, decide(&event)).await;
        render_view(&view)
    }

    pub async fn apply(&self, chat_id: ChatId, effect: Effect) -> View {
        match effect {
            Effect::Show(view) => view,
            Effect::AddSubscriber => match self.registry.add(chat_id).await {
                AddOutcome::Added => {
                    tracing::info!(chat_id = %chat_id, "Subscriber added");
                    View::Subscribed
                }
                AddOutcome::AlreadyPresent => View::AlreadySubscribed,
            },
            Effect::RemoveSubscriber => match self.registry.remove(chat_id).await {
                RemoveOutcome::Removed => {
                    tracing::info!(chat_id = %chat_id, "Subscriber removed");
                    View::Unsubscribed
                }
                RemoveOutcome::WasAbsent => View::NotSubscribed,
            },
            Effect::ReadStatus => View::Status {
                subscribers: self.registry.len().await,
                subscribed: self.registry.contains(chat_id).await,
                poll_interval: self.settings.poll_interval,
            },
            Effect::QueryFeed(scope) => self.query_feed(scope).await,
        }
    }

    async fn query_feed(&self, scope: FeedScope) -> View {
        let (topic, count, heading) = match scope {
            FeedScope::Latest => (
                self.settings.topic.clone(),
                self.settings.latest_count,
                "Berita terbaru".to_string(),
            ),
            FeedScope::Topic(topic) => {
                let heading = format!("Liputan media: {topic}");
                (topic, self.settings.crosscheck_count, heading)
            }
        };

        let query = FeedQuery::new(topic.clone(), self.settings.language.clone(), count);
        let res = timeout(self.settings.feed_timeout, self.feed.fetch(&query)).await;
        match res {
            Ok(Ok(items)) if items.is_empty() => View::NoItems { topic },
            Ok(Ok(mut items)) => {
                items.truncate(count);
                View::Items { heading, items }
            }
            Ok(Err(e)) => {
                tracing::warn!(topic = %topic, error = %e, "Feed query failed");
                View::FeedUnavailable
            }
            Err(_) => {
                tracing::warn!(topic = %topic, "Feed query timed out");
                View::FeedUnavailable
            }
        }
    }
}
