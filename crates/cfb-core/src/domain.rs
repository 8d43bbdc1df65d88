use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram chat id (numeric). The recipient identifier for deliveries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One candidate feed entry.
///
/// Novelty is decided by `id` alone (the canonical article URL); title or
/// source drift between polls does not make an item new.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Item whose id is its URL.
    pub fn from_url(
        url: impl Into<String>,
        title: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            title: title.into(),
            url,
            source_name: source_name.into(),
            published_at: None,
        }
    }
}
