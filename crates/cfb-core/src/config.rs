use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Telegram's hard cap on a text message, in bytes of UTF-8.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;
const MIN_MESSAGE_LIMIT: usize = 256;

/// Typed configuration for the bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub telegram_bot_token: String,
    pub newsapi_key: String,

    // Feed
    pub news_topic: String,
    pub news_language: String,
    pub newsapi_base_url: String,
    pub latest_count: usize,
    pub crosscheck_count: usize,
    pub feed_timeout: Duration,

    // Dispatch loop
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub delivery_timeout: Duration,
    pub fan_out_concurrency: usize,
    /// Consecutive transient failures after which a recipient is pruned; 0 never prunes on them.
    pub prune_after_transient_failures: u32,
    pub dedup_history: usize,

    // Registry
    pub subscribers_file: PathBuf,

    // Telegram limits
    pub telegram_message_limit: usize,
}

impl Config {
    /// Load from the process environment, after applying `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("TELEGRAM_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let newsapi_key = get("NEWSAPI_KEY").ok_or_else(|| {
            Error::Config("NEWSAPI_KEY environment variable is required".to_string())
        })?;

        // Feed
        let news_topic = get("NEWS_TOPIC").unwrap_or_else(|| "hoaks".to_string());
        let news_language = get("NEWS_LANGUAGE").unwrap_or_else(|| "id".to_string());
        let newsapi_base_url = get("NEWSAPI_BASE_URL")
            .unwrap_or_else(|| "https://newsapi.org".to_string())
            .trim_end_matches('/')
            .to_string();
        let latest_count = parse_usize(get("LATEST_COUNT")).unwrap_or(5).clamp(1, 100);
        let crosscheck_count = parse_usize(get("CROSSCHECK_COUNT"))
            .unwrap_or(3)
            .clamp(1, 100);
        let feed_timeout = Duration::from_millis(parse_u64(get("FEED_TIMEOUT_MS")).unwrap_or(10_000));

        // Dispatch loop
        let poll_interval =
            Duration::from_secs(parse_u64(get("POLL_INTERVAL_SECS")).unwrap_or(4 * 60 * 60).max(1));
        let initial_delay = Duration::from_secs(parse_u64(get("INITIAL_DELAY_SECS")).unwrap_or(15));
        let delivery_timeout =
            Duration::from_millis(parse_u64(get("DELIVERY_TIMEOUT_MS")).unwrap_or(10_000));
        let fan_out_concurrency = parse_usize(get("FAN_OUT_CONCURRENCY")).unwrap_or(8).max(1);
        let prune_after_transient_failures =
            parse_u32(get("PRUNE_AFTER_TRANSIENT_FAILURES")).unwrap_or(0);
        let dedup_history = parse_usize(get("DEDUP_HISTORY")).unwrap_or(32).max(1);

        let subscribers_file =
            PathBuf::from(get("SUBSCRIBERS_FILE").unwrap_or_else(|| "subscribers.json".to_string()));

        let telegram_message_limit = parse_usize(get("TELEGRAM_MESSAGE_LIMIT"))
            .unwrap_or(TELEGRAM_MAX_MESSAGE_LEN)
            .clamp(MIN_MESSAGE_LIMIT, TELEGRAM_MAX_MESSAGE_LEN);

        Ok(Self {
            telegram_bot_token,
            newsapi_key,
            news_topic,
            news_language,
            newsapi_base_url,
            latest_count,
            crosscheck_count,
            feed_timeout,
            poll_interval,
            initial_delay,
            delivery_timeout,
            fan_out_concurrency,
            prune_after_transient_failures,
            dedup_history,
            subscribers_file,
            telegram_message_limit,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_u32(v: Option<String>) -> Option<u32> {
    v.and_then(|s| s.trim().parse::<u32>().ok())
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_usize(v: Option<String>) -> Option<usize> {
    v.and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
        "NEWSAPI_KEY" => Some("key".to_string()),
        "INITIAL_DELAY_SECS" => Some("15".to_string()),
        "POLL_INTERVAL_SECS" => Some("60".to_string()),
        _ => None,
    })
    .unwrap()
}
