// src/store.rs
//! In-memory item store and query engine.
//!
//! Holds normalized news items keyed by their natural key, answers filtered
//! and paginated queries with a stable ordering, and deduplicates on ingest.
//! Each `upsert` is atomic; unrelated writers only contend on the lock, not
//! on each other's keys. Items are never deleted by normal operation.
//!
//! The `generation` counter is the freshness token behind the read-side
//! cache contract: it moves on every insert or update, so a client holding
//! cached pages can treat an unchanged generation as proof that every one of
//! them is still exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use crate::error::StoreError;
use crate::model::{NaturalKey, NewsItem, Page, Pagination, Query};

/// Outcome of a single upsert, used by the coordinator to count progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The natural key was absent; a new row was created.
    Inserted,
    /// The natural key existed; mutable display fields were refreshed.
    Updated,
}

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<NaturalKey, NewsItem>,
    by_id: HashMap<String, NaturalKey>,
}

/// Thread-safe store of normalized news items.
#[derive(Debug, Default)]
pub struct ItemStore {
    inner: RwLock<Inner>,
    generation: AtomicU64,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh one item, idempotent on the natural key.
    ///
    /// On `Updated`, only `title`, `content`, `content_preview` and the
    /// store-stamped `processed_at` change; identity fields and the first
    /// observed `published_at` are kept. The item's `id` is always re-derived
    /// from the natural key, so a caller cannot fork identities.
    pub fn upsert(&self, mut item: NewsItem) -> Upsert {
        let key = item.natural_key();
        item.id = key.item_id();
        item.processed_at = Utc::now();

        let mut inner = self.inner.write().expect("item store lock poisoned");
        let outcome = match inner.items.get_mut(&key) {
            Some(existing) => {
                existing.title = item.title;
                existing.content = item.content;
                existing.content_preview = item.content_preview;
                existing.processed_at = item.processed_at;
                Upsert::Updated
            }
            None => {
                inner.by_id.insert(item.id.clone(), key.clone());
                inner.items.insert(key, item);
                Upsert::Inserted
            }
        };
        self.generation.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// Answer a filtered, paginated query with stable ordering.
    ///
    /// Filters apply in order: source type, sub-source, free text (case-
    /// insensitive substring over title and content), then the inclusive
    /// date range on `published_at`. Results sort newest first with the item
    /// id as a deterministic tie-break. An out-of-range page yields empty
    /// `items` with pagination still computed from the true totals.
    pub fn query(&self, q: &Query) -> Page {
        let inner = self.inner.read().expect("item store lock poisoned");

        let needle = q.query.as_deref().map(str::to_lowercase);
        let mut matched: Vec<NewsItem> = inner
            .items
            .values()
            .filter(|it| q.source_type.is_none_or(|t| it.source_type == t))
            .filter(|it| q.source_id.as_deref().is_none_or(|s| it.source_id == s))
            .filter(|it| match &needle {
                None => true,
                Some(n) => text_matches(it, n),
            })
            .filter(|it| q.from_date.is_none_or(|from| it.published_at >= from))
            .filter(|it| q.to_date.is_none_or(|to| it.published_at <= to))
            .cloned()
            .collect();
        drop(inner);

        matched.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let page_size = q.page_size.max(1);
        let page = q.page.max(1);
        let total_items = matched.len();
        let total_pages = total_items.div_ceil(page_size).max(1);

        let start = (page - 1).saturating_mul(page_size);
        let items = if start >= total_items {
            Vec::new()
        } else {
            matched[start..total_items.min(start + page_size)].to_vec()
        };

        Page {
            items,
            pagination: Pagination {
                page,
                page_size,
                total_pages,
                total_items,
            },
        }
    }

    /// Look up a single item by its opaque id.
    pub fn get(&self, id: &str) -> Result<NewsItem, StoreError> {
        let inner = self.inner.read().expect("item store lock poisoned");
        inner
            .by_id
            .get(id)
            .and_then(|key| inner.items.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Number of stored items across all sources.
    pub fn len(&self) -> usize {
        self.inner.read().expect("item store lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonic write counter; moves on every insert or update.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

/// Case-insensitive substring match over title and body fields.
fn text_matches(item: &NewsItem, needle_lower: &str) -> bool {
    if item.title.to_lowercase().contains(needle_lower) {
        return true;
    }
    item.content
        .as_deref()
        .is_some_and(|c| c.to_lowercase().contains(needle_lower))
        || item
            .content_preview
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(needle_lower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceType;
    use chrono::TimeZone;

    fn item(url: &str, title: &str, published_min: u32) -> NewsItem {
        let published_at = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, published_min, 0)
            .unwrap();
        NewsItem {
            id: String::new(),
            title: title.to_string(),
            content: None,
            content_preview: None,
            source_type: SourceType::Rss,
            source_id: "hackernews".into(),
            source_name: "Hacker News".into(),
            source_url: "https://news.ycombinator.com".into(),
            url: url.to_string(),
            published_at,
            processed_at: published_at,
        }
    }

    #[test]
    fn upsert_is_idempotent_on_natural_key() {
        let store = ItemStore::new();
        assert_eq!(store.upsert(item("https://e.com/a", "First", 0)), Upsert::Inserted);
        assert_eq!(store.upsert(item("https://e.com/a", "First, edited", 0)), Upsert::Updated);
        assert_eq!(store.len(), 1);

        let page = store.query(&Query::default());
        assert_eq!(page.items[0].title, "First, edited");
    }

    #[test]
    fn update_keeps_first_published_at() {
        let store = ItemStore::new();
        store.upsert(item("https://e.com/a", "t", 5));
        store.upsert(item("https://e.com/a", "t", 30));
        let got = store.query(&Query::default()).items.remove(0);
        assert_eq!(got.published_at.format("%M").to_string(), "05");
    }

    #[test]
    fn generation_moves_on_every_write() {
        let store = ItemStore::new();
        let g0 = store.generation();
        store.upsert(item("https://e.com/a", "t", 0));
        store.upsert(item("https://e.com/a", "t", 0));
        assert_eq!(store.generation(), g0 + 2);
    }

    #[test]
    fn free_text_filter_is_case_insensitive() {
        let store = ItemStore::new();
        store.upsert(item("https://e.com/a", "Rust 1.80 released", 0));
        store.upsert(item("https://e.com/b", "Go ships generics", 1));

        let q = Query {
            query: Some("RUST".into()),
            ..Query::default()
        };
        let page = store.query(&q);
        assert_eq!(page.pagination.total_items, 1);
        assert_eq!(page.items[0].url, "https://e.com/a");
    }

    #[test]
    fn empty_result_still_reports_one_page() {
        let store = ItemStore::new();
        let page = store.query(&Query::default());
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total_pages, 1);
        assert_eq!(page.pagination.total_items, 0);
    }

    #[test]
    fn out_of_range_page_is_empty_with_true_totals() {
        let store = ItemStore::new();
        for i in 0..3 {
            store.upsert(item(&format!("https://e.com/{i}"), "t", i));
        }
        let q = Query {
            page: 9,
            page_size: 2,
            ..Query::default()
        };
        let page = store.query(&q);
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total_items, 3);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn get_by_id_after_upsert() {
        let store = ItemStore::new();
        store.upsert(item("https://e.com/a", "t", 0));
        let id = store.query(&Query::default()).items[0].id.clone();
        assert_eq!(store.get(&id).unwrap().url, "https://e.com/a");
        assert!(matches!(store.get("feedbeef"), Err(StoreError::NotFound(_))));
    }
}
