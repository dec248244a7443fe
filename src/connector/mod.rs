// src/connector/mod.rs
pub mod channel;
pub mod reddit;
pub mod registry;
pub mod rss;

use async_trait::async_trait;

use crate::error::{FetchError, MalformedRecord};
use crate::model::{NewsItem, SourceType};

/// One raw record as fetched from a source, before normalization.
///
/// Connectors convert their own wire format (XML, JSON listing, message
/// export) into this envelope so the coordinator can drain every source the
/// same way.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Source-side identifier of the record, used for incremental cut-off.
    pub external_id: Option<String>,
    pub payload: serde_json::Value,
}

/// A unit capable of producing normalized items from one external source.
///
/// Connectors are pure producers: they fetch raw records and normalize them,
/// and never write to the item store. That keeps every variant testable in
/// isolation with injected fixture data.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registry key, e.g. `"rss:hackernews"`.
    fn connector_id(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Sub-source within the type, e.g. `"hackernews"` or `"rust"`.
    fn source_id(&self) -> &str;

    /// Human-readable source label, e.g. `"r/rust"`.
    fn source_name(&self) -> &str;

    /// Link to the source's own page.
    fn source_url(&self) -> &str;

    /// Fetch one finite batch of raw records, newest first.
    ///
    /// `cursor` is the external id of the newest record seen by the previous
    /// successful run; connectors that can cut their batch off at it should,
    /// the rest may ignore it (dedup on ingest absorbs the overlap).
    async fn fetch(&self, cursor: Option<&str>) -> Result<Vec<RawRecord>, FetchError>;

    /// Normalize one raw record into a news item.
    ///
    /// Must be deterministic: the same record yields the same natural key
    /// every time. Records missing identity or display essentials fail soft
    /// with `MalformedRecord`.
    fn normalize(&self, record: &RawRecord) -> Result<NewsItem, MalformedRecord>;
}

/// Cut a newest-first batch off at the previously seen external id.
pub(crate) fn cut_at_cursor(records: Vec<RawRecord>, cursor: Option<&str>) -> Vec<RawRecord> {
    let Some(cursor) = cursor else {
        return records;
    };
    let mut out = Vec::with_capacity(records.len());
    for rec in records {
        if rec.external_id.as_deref() == Some(cursor) {
            break;
        }
        out.push(rec);
    }
    out
}

/// Normalize text: decode HTML entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Preview length served in list views; full content stays on the item.
const PREVIEW_CHARS: usize = 150;

/// Truncate normalized content to a short preview.
pub fn content_preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let cut: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}
