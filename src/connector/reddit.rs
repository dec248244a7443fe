// src/connector/reddit.rs
//! Link-aggregator-poll connector: public subreddit JSON listings.
//!
//! Talks to the unauthenticated listing endpoint
//! `https://www.reddit.com/r/{sub}/{sort}.json`; no credentials, lower rate
//! limits. One connector instance per subreddit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::connector::{content_preview, cut_at_cursor, normalize_text, Connector, RawRecord};
use crate::error::{FetchError, MalformedRecord};
use crate::model::{NewsItem, SourceType};

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

/// Connector for one subreddit listing.
pub struct RedditConnector {
    connector_id: String,
    subreddit: String,
    source_name: String,
    source_url: String,
    mode: Mode,
}

impl RedditConnector {
    /// Poll the live listing endpoint.
    pub fn from_listing(
        subreddit: impl Into<String>,
        sort: &str,
        limit: usize,
        client: reqwest::Client,
    ) -> Self {
        let subreddit = subreddit.into();
        let url = format!(
            "https://www.reddit.com/r/{subreddit}/{}.json?limit={limit}",
            sort.to_ascii_lowercase()
        );
        Self {
            connector_id: format!("reddit:{subreddit}"),
            source_name: format!("r/{subreddit}"),
            source_url: format!("https://www.reddit.com/r/{subreddit}"),
            subreddit,
            mode: Mode::Http { url, client },
        }
    }

    /// Parse a fixed listing document instead of fetching; for tests.
    pub fn from_fixture(subreddit: impl Into<String>, listing_json: impl Into<String>) -> Self {
        let subreddit = subreddit.into();
        Self {
            connector_id: format!("reddit:{subreddit}"),
            source_name: format!("r/{subreddit}"),
            source_url: format!("https://www.reddit.com/r/{subreddit}"),
            subreddit,
            mode: Mode::Fixture(listing_json.into()),
        }
    }

    fn parse_records(&self, body: &str) -> Result<Vec<RawRecord>, FetchError> {
        let doc: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::Unreachable(format!("parsing reddit listing: {e}")))?;
        let children = doc["data"]["children"]
            .as_array()
            .ok_or_else(|| FetchError::Unreachable("reddit listing without data.children".into()))?;

        let records = children
            .iter()
            .map(|child| {
                let data = child["data"].clone();
                RawRecord {
                    external_id: data["id"].as_str().map(str::to_string),
                    payload: data,
                }
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl Connector for RedditConnector {
    fn connector_id(&self) -> &str {
        &self.connector_id
    }

    fn source_type(&self) -> SourceType {
        SourceType::Reddit
    }

    fn source_id(&self) -> &str {
        &self.subreddit
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn source_url(&self) -> &str {
        &self.source_url
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Vec<RawRecord>, FetchError> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Unreachable(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(FetchError::Unreachable(format!(
                        "unexpected status {} from {url}",
                        resp.status()
                    )));
                }
                resp.text()
                    .await
                    .map_err(|e| FetchError::Unreachable(e.to_string()))?
            }
        };
        Ok(cut_at_cursor(self.parse_records(&body)?, cursor))
    }

    fn normalize(&self, record: &RawRecord) -> Result<NewsItem, MalformedRecord> {
        let p = &record.payload;
        let title = p["title"]
            .as_str()
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MalformedRecord("reddit post without a title".into()))?;
        let permalink = p["permalink"]
            .as_str()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| MalformedRecord("reddit post without a permalink".into()))?;
        let published_at = p["created_utc"]
            .as_f64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
            .ok_or_else(|| {
                MalformedRecord(format!("reddit post '{permalink}' without created_utc"))
            })?;

        // Self posts carry their body; link posts carry only the target.
        let selftext = p["selftext"]
            .as_str()
            .map(normalize_text)
            .filter(|s| !s.is_empty());
        let content = match selftext {
            Some(body) => Some(body),
            None if !p["is_self"].as_bool().unwrap_or(false) => p["url"]
                .as_str()
                .map(|target| format!("External link: {target}")),
            None => None,
        };
        let preview = content.as_deref().map(content_preview);

        Ok(NewsItem {
            id: String::new(), // derived by the store from the natural key
            title,
            content,
            content_preview: preview,
            source_type: SourceType::Reddit,
            source_id: self.subreddit.clone(),
            source_name: self.source_name.clone(),
            source_url: self.source_url.clone(),
            url: format!("https://www.reddit.com{permalink}"),
            published_at,
            processed_at: Utc::now(),
        })
    }
}
