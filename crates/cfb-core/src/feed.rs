use async_trait::async_trait;

use crate::{domain::Item, Result};

/// Query sent to a feed source. Results are always sorted newest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedQuery {
    pub topic: String,
    pub language: String,
    pub count: usize,
}

impl FeedQuery {
    pub fn new(topic: impl Into<String>, language: impl Into<String>, count: usize) -> Self {
        Self {
            topic: topic.into(),
            language: language.into(),
            count,
        }
    }
}

/// Port for the externally polled news feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch up to `query.count` items, newest first.
    async fn fetch(&self, query: &FeedQuery) -> Result<Vec<Item>>;
}
