// src/connector/channel.rs
//! Channel-poll connector: messaging-channel message exports.
//!
//! Consumes a JSON export of channel messages, newest first:
//! `[{ "id": "...", "text": "...", "date": "<rfc3339>", "url": "..." }, ...]`.
//! Messages without their own link get one derived from the channel URL and
//! the message id, so the natural key stays stable across runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::connector::{content_preview, cut_at_cursor, normalize_text, Connector, RawRecord};
use crate::error::{FetchError, MalformedRecord};
use crate::model::{NewsItem, SourceType};

/// Channel message titles are the first line of the text, capped here.
const TITLE_CHARS: usize = 100;

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

/// Connector for one messaging channel.
pub struct ChannelConnector {
    connector_id: String,
    channel: String,
    source_name: String,
    source_url: String,
    mode: Mode,
}

impl ChannelConnector {
    /// Poll a live message-export endpoint.
    pub fn from_url(
        channel: impl Into<String>,
        channel_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        let channel = channel.into();
        let channel_url = channel_url.into();
        Self {
            connector_id: format!("channel:{channel}"),
            source_name: format!("@{channel}"),
            source_url: channel_url.clone(),
            channel,
            mode: Mode::Http {
                url: channel_url,
                client,
            },
        }
    }

    /// Parse a fixed message export instead of fetching; for tests.
    pub fn from_fixture(channel: impl Into<String>, messages_json: impl Into<String>) -> Self {
        let channel = channel.into();
        Self {
            connector_id: format!("channel:{channel}"),
            source_name: format!("@{channel}"),
            source_url: format!("https://channels.example/{channel}"),
            channel,
            mode: Mode::Fixture(messages_json.into()),
        }
    }

    fn parse_records(&self, body: &str) -> Result<Vec<RawRecord>, FetchError> {
        let doc: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::Unreachable(format!("parsing channel export: {e}")))?;
        let messages = doc
            .as_array()
            .ok_or_else(|| FetchError::Unreachable("channel export is not an array".into()))?;

        let records = messages
            .iter()
            .map(|msg| RawRecord {
                external_id: msg["id"].as_str().map(str::to_string),
                payload: msg.clone(),
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    fn connector_id(&self) -> &str {
        &self.connector_id
    }

    fn source_type(&self) -> SourceType {
        SourceType::Channel
    }

    fn source_id(&self) -> &str {
        &self.channel
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
        let msg_id = p["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MalformedRecord("channel message without an id".into()))?;
        let text = p["text"]
            .as_str()
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MalformedRecord(format!("channel message '{msg_id}' without text")))?;
        let published_at = p["date"]
            .as_str()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .ok_or_else(|| {
                MalformedRecord(format!("channel message '{msg_id}' without a valid date"))
            })?;

        let title = first_line_title(&text);
        let url = match p["url"].as_str().filter(|u| !u.is_empty()) {
            Some(u) => u.to_string(),
            None => format!("{}/{msg_id}", self.source_url.trim_end_matches('/')),
        };

        Ok(NewsItem {
            id: String::new(), // derived by the store from the natural key
            title,
            content_preview: Some(content_preview(&text)),
            content: Some(text),
            source_type: SourceType::Channel,
            source_id: self.channel.clone(),
            source_name: self.source_name.clone(),
            source_url: self.source_url.clone(),
            url,
            published_at,
            processed_at: Utc::now(),
        })
    }
}

/// Channel messages have no headline; use their first line, capped.
fn first_line_title(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= TITLE_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(TITLE_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn export() -> String {
        json!([
            {
                "id": "m42",
                "text": "Kernel 6.9 released\nFull changelog follows with many lines of detail.",
                "date": "2024-05-01T12:00:00Z",
                "url": "https://channels.example/technews/m42"
            },
            {
                "id": "m41",
                "text": "Short note",
                "date": "2024-05-01T11:00:00Z"
            },
            {
                "id": "m40",
                "text": "",
                "date": "2024-05-01T10:00:00Z"
            }
        ])
        .to_string()
    }

    #[tokio::test]
    async fn export_parses_and_titles_from_first_line() {
        let c = ChannelConnector::from_fixture("technews", export());
        let records = c.fetch(None).await.unwrap();
        assert_eq!(records.len(), 3);

        let item = c.normalize(&records[0]).unwrap();
        assert_eq!(item.title, "Kernel 6.9 released");
        assert_eq!(item.url, "https://channels.example/technews/m42");
        assert!(item.content.as_deref().unwrap().contains("changelog"));
    }

    #[tokio::test]
    async fn linkless_message_gets_derived_url() {
        let c = ChannelConnector::from_fixture("technews", export());
        let records = c.fetch(None).await.unwrap();
        let item = c.normalize(&records[1]).unwrap();
        assert_eq!(item.url, "https://channels.example/technews/m41");
    }

    #[tokio::test]
    async fn empty_message_is_malformed() {
        let c = ChannelConnector::from_fixture("technews", export());
        let records = c.fetch(None).await.unwrap();
        assert!(c.normalize(&records[2]).is_err());
    }

    #[tokio::test]
    async fn cursor_cuts_off_previously_seen_messages() {
        let c = ChannelConnector::from_fixture("technews", export());
        let records = c.fetch(Some("m41")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_id.as_deref(), Some("m42"));
    }

    #[test]
    fn long_first_lines_are_capped() {
        let text = "word ".repeat(60);
        let t = first_line_title(&text);
        assert!(t.chars().count() <= TITLE_CHARS + 3);
        assert!(t.ends_with("..."));
    }
}
