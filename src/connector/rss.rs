// src/connector/rss.rs
//! Feed-poll connector: RSS 2.0 over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::json;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::connector::{content_preview, cut_at_cursor, normalize_text, Connector, RawRecord};
use crate::error::{FetchError, MalformedRecord};
use crate::model::{NewsItem, SourceType};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let unix = OffsetDateTime::parse(ts, &Rfc2822)
        .ok()?
        .to_offset(UtcOffset::UTC)
        .unix_timestamp();
    DateTime::<Utc>::from_timestamp(unix, 0)
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

/// Connector for one RSS 2.0 feed.
pub struct RssConnector {
    connector_id: String,
    source_id: String,
    source_name: String,
    source_url: String,
    mode: Mode,
}

impl RssConnector {
    /// Poll a live feed over HTTP.
    pub fn from_url(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        feed_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        let source_id = source_id.into();
        let feed_url = feed_url.into();
        Self {
            connector_id: format!("rss:{source_id}"),
            source_id,
            source_name: source_name.into(),
            source_url: feed_url.clone(),
            mode: Mode::Http {
                url: feed_url,
                client,
            },
        }
    }

    /// Parse a fixed XML document instead of fetching; for tests.
    pub fn from_fixture(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        xml: impl Into<String>,
    ) -> Self {
        let source_id = source_id.into();
        Self {
            connector_id: format!("rss:{source_id}"),
            source_url: format!("https://{source_id}.example/rss"),
            source_id,
            source_name: source_name.into(),
            mode: Mode::Fixture(xml.into()),
        }
    }

    fn parse_records(&self, xml: &str) -> Result<Vec<RawRecord>, FetchError> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| FetchError::Unreachable(format!("parsing rss feed: {e}")))?;

        let records = rss
            .channel
            .item
            .into_iter()
            .map(|it| RawRecord {
                external_id: it.guid.clone().or_else(|| it.link.clone()),
                payload: json!({
                    "title": it.title,
                    "link": it.link,
                    "guid": it.guid,
                    "pubDate": it.pub_date,
                    "description": it.description,
                }),
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl Connector for RssConnector {
    fn connector_id(&self) -> &str {
        &self.connector_id
    }

    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn source_url(&self) -> &str {
        &self.source_url
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Vec<RawRecord>, FetchError> {
        let xml = match &self.mode {
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
        Ok(cut_at_cursor(self.parse_records(&xml)?, cursor))
    }

    fn normalize(&self, record: &RawRecord) -> Result<NewsItem, MalformedRecord> {
        let p = &record.payload;
        let title = p["title"]
            .as_str()
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MalformedRecord("rss item without a title".into()))?;
        let url = p["link"]
            .as_str()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| MalformedRecord("rss item without a link".into()))?
            .to_string();
        let published_at = p["pubDate"]
            .as_str()
            .and_then(parse_rfc2822)
            .ok_or_else(|| MalformedRecord(format!("rss item '{url}' without a valid pubDate")))?;

        let content = p["description"]
            .as_str()
            .map(normalize_text)
            .filter(|d| !d.is_empty());
        let preview = content.as_deref().map(content_preview);

        Ok(NewsItem {
            id: String::new(), // derived by the store from the natural key
            title,
            content,
            content_preview: preview,
            source_type: SourceType::Rss,
            source_id: self.source_id.clone(),
            source_name: self.source_name.clone(),
            source_url: self.source_url.clone(),
            url,
            published_at,
            processed_at: Utc::now(),
        })
    }
}

/// Feeds routinely embed HTML entities the XML parser rejects.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
