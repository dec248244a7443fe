// src/model.rs
//! Core data model: normalized news items, their dedup identity, and the
//! query/page value objects answered by the item store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Kind of external source a news item came from.
///
/// Closed set for now; adding a variant means adding a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Link-aggregator listings (subreddits).
    Reddit,
    /// Messaging-channel exports.
    Channel,
    /// RSS 2.0 feeds.
    Rss,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::Reddit => "reddit",
            SourceType::Channel => "channel",
            SourceType::Rss => "rss",
        };
        f.write_str(s)
    }
}

impl FromStr for SourceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reddit" => Ok(SourceType::Reddit),
            "channel" => Ok(SourceType::Channel),
            "rss" => Ok(SourceType::Rss),
            _ => Err(()),
        }
    }
}

/// The tuple identifying a logical item across repeated ingestions.
///
/// Re-ingesting a record with the same natural key must never create a
/// second row in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub source_type: SourceType,
    pub source_id: String,
    pub url: String,
}

impl NaturalKey {
    /// Derive the stable opaque item id: first 24 hex chars of the SHA-256
    /// digest over `"{source_type}:{source_id}:{url}"`. Deterministic, so
    /// re-fetching a record never forks its identity.
    pub fn item_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_type.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(self.source_id.as_bytes());
        hasher.update(b":");
        hasher.update(self.url.as_bytes());
        let digest = hasher.finalize();
        let mut id = String::with_capacity(24);
        for byte in digest.iter().take(12) {
            id.push_str(&format!("{byte:02x}"));
        }
        id
    }
}

/// A normalized news item as stored and served over the wire.
///
/// Identity (`id`, `source_type`, `source_id`, `url`) is immutable once
/// stored; display fields may refresh on re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    pub source_type: SourceType,
    pub source_id: String,
    pub source_name: String,
    pub source_url: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl NewsItem {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            source_type: self.source_type,
            source_id: self.source_id.clone(),
            url: self.url.clone(),
        }
    }
}

/// Filter + pagination parameters for a feed query.
///
/// Two values with equal fields are cache-equivalent for read clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub source_type: Option<SourceType>,
    pub source_id: Option<String>,
    /// Case-insensitive substring match over title and content.
    pub query: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

pub const DEFAULT_PAGE_SIZE: usize = 20;

impl Default for Query {
    fn default() -> Self {
        Self {
            source_type: None,
            source_id: None,
            query: None,
            from_date: None,
            to_date: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Pagination metadata computed from the true filtered totals.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// One page of a filtered, sorted feed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Page {
    pub items: Vec<NewsItem>,
    pub pagination: Pagination,
}
