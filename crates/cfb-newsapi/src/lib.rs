//! NewsAPI adapter (feed source).
//!
//! Uses the NewsAPI `v2/everything` endpoint sorted by publish date, so the
//! first article is always the newest.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cfb_core::{
    domain::Item,
    errors::Error,
    feed::{FeedQuery, FeedSource},
    Result,
};

/// Placeholder NewsAPI returns for articles taken down by the publisher.
const REMOVED_PLACEHOLDER: &str = "[Removed]";

#[derive(Clone, Debug)]
pub struct NewsApiClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("cfb-rust/0.1")
            .build()
            .expect("reqwest client build");
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v2/everything", self.base_url)
    }
}

#[async_trait]
impl FeedSource for NewsApiClient {
    async fn fetch(&self, query: &FeedQuery) -> Result<Vec<Item>> {
        let page_size = query.count.clamp(1, 100).to_string();
        let resp = self
            .http
            .get(self.endpoint())
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.topic.as_str()),
                ("language", query.language.as_str()),
                ("sortBy", "publishedAt"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Feed(format!("newsapi request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Feed(format!("newsapi read error: {e}")))?;

        if !status.is_success() {
            return Err(Error::Feed(format!(
                "newsapi returned {status}: {}",
                api_message(&body).unwrap_or_else(|| body.chars().take(200).collect())
            )));
        }

        let items = parse_articles(&body, query.count)?;
        tracing::debug!(topic = %query.topic, count = items.len(), "Fetched news items");
        Ok(items)
    }
}

#[derive(Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    #[serde(default)]
    source: Option<ArticleSource>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct ArticleSource {
    #[serde(default)]
    name: Option<String>,
}

fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<EverythingResponse>(body)
        .ok()
        .and_then(|r| r.message)
}

/// Parse an `everything` response body into items, keeping feed order.
fn parse_articles(body: &str, limit: usize) -> Result<Vec<Item>> {
    let resp: EverythingResponse = serde_json::from_str(body)
        .map_err(|e| Error::Feed(format!("newsapi json error: {e}")))?;

    if resp.status != "ok" {
        return Err(Error::Feed(format!(
            "newsapi status {}: {}",
            resp.status,
            resp.message.unwrap_or_default()
        )));
    }

    let items = resp
        .articles
        .into_iter()
        .filter_map(article_to_item)
        .take(limit)
        .collect();
    Ok(items)
}

fn article_to_item(a: Article) -> Option<Item> {
    let url = a.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
    let title = a
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != REMOVED_PLACEHOLDER)?;
    let source_name = a
        .source
        .and_then(|s| s.name)
        .filter(|n| !n.trim().is_empty() && n != REMOVED_PLACEHOLDER)
        .unwrap_or_else(|| "Unknown".to_string());
    let published_at = a
        .published_at
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(Item {
        id: url.clone(),
        title,
        url,
        source_name,
        published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"{
      "status": "ok",
      "totalResults": 3,
      "articles": [
        {
          "source": {"id": null, "name": "Kompas.com"},
          "title": "Cek Fakta: Hoaks vaksin ",
          "url": "https://kompas.com/cekfakta/1",
          "publishedAt": "2024-03-01T08:30:00Z"
        },
        {
          "source": {"id": null, "name": "[Removed]"},
          "title": "[Removed]",
          "url": "https://removed.com",
          "publishedAt": "1970-01-01T00:00:00Z"
        },
        {
          "source": {"id": "x", "name": ""},
          "title": "Tanpa sumber",
          "url": "https://example.id/2",
          "publishedAt": "not a date"
        }
      ]
    }"#;

    #[test]
    fn parses_articles_in_feed_order_and_skips_removed() {
        let items = parse_articles(SAMPLE, 10).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].id, "https://kompas.com/cekfakta/1");
        assert_eq!(items[0].title, "Cek Fakta: Hoaks vaksin");
        assert_eq!(items[0].source_name, "Kompas.com");
        assert_eq!(
            items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );

        assert_eq!(items[1].source_name, "Unknown");
        assert_eq!(items[1].published_at, None);
    }

    #[test]
    fn respects_limit() {
        let items = parse_articles(SAMPLE, 1).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn error_status_is_a_feed_error() {
        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        let err = parse_articles(body, 1).unwrap_err();
        assert!(matches!(err, Error::Feed(m) if m.contains("API key is invalid")));
        assert_eq!(api_message(body).as_deref(), Some("Your API key is invalid."));
    }

    #[test]
    fn malformed_body_is_a_feed_error() {
        assert!(matches!(parse_articles("<html>", 1), Err(Error::Feed(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_feed_error() {
        let client = NewsApiClient::new("k", "http://127.0.0.1:9/", Duration::from_millis(500));
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/v2/everything");
        let err = client
            .fetch(&FeedQuery::new("hoaks", "id", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }
}
