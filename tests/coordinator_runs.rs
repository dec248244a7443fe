// tests/coordinator_runs.rs
//
// Run coordinator behavior against a scripted in-memory connector:
// - processed counts new inserts only, malformed records are skipped
// - unknown connector ids fail with NotFound
// - a second run request while one is in flight fails with AlreadyRunning
// - aborted runs (unreachable source, timeout) leave a terminal failed Run
// - run-all is a fan-out/fan-in barrier isolating per-connector failures

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use newswire::connector::{Connector, RawRecord};
use newswire::coordinator::{RunCoordinator, RunStatus};
use newswire::error::{FetchError, MalformedRecord, RunError};
use newswire::model::{NewsItem, Query, SourceType};
use newswire::store::ItemStore;
use newswire::ConnectorRegistry;

/// Scripted connector: replays a fixed batch, optionally failing the fetch
/// or blocking on a gate until the test releases it.
struct ScriptedConnector {
    connector_id: String,
    source_id: String,
    records: Vec<RawRecord>,
    fail_with: Option<String>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedConnector {
    fn new(source_id: &str, records: Vec<RawRecord>) -> Self {
        Self {
            connector_id: format!("rss:{source_id}"),
            source_id: source_id.to_string(),
            records,
            fail_with: None,
            gate: None,
        }
    }

    fn unreachable(source_id: &str, message: &str) -> Self {
        let mut c = Self::new(source_id, Vec::new());
        c.fail_with = Some(message.to_string());
        c
    }

    fn gated(source_id: &str, records: Vec<RawRecord>, gate: Arc<Notify>) -> Self {
        let mut c = Self::new(source_id, records);
        c.gate = Some(gate);
        c
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
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
        &self.source_id
    }

    fn source_url(&self) -> &str {
        "https://scripted.example"
    }

    async fn fetch(&self, _cursor: Option<&str>) -> Result<Vec<RawRecord>, FetchError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(msg) = &self.fail_with {
            return Err(FetchError::Unreachable(msg.clone()));
        }
        Ok(self.records.clone())
    }

    fn normalize(&self, record: &RawRecord) -> Result<NewsItem, MalformedRecord> {
        let p = &record.payload;
        let title = p["title"]
            .as_str()
            .ok_or_else(|| MalformedRecord("scripted record without title".into()))?;
        let url = p["url"]
            .as_str()
            .ok_or_else(|| MalformedRecord("scripted record without url".into()))?;
        let ts = p["ts"].as_i64().unwrap_or(1_714_560_000);
        Ok(NewsItem {
            id: String::new(),
            title: title.to_string(),
            content: p["content"].as_str().map(str::to_string),
            content_preview: None,
            source_type: SourceType::Rss,
            source_id: self.source_id.clone(),
            source_name: self.source_id.clone(),
            source_url: "https://scripted.example".to_string(),
            url: url.to_string(),
            published_at: chrono::DateTime::from_timestamp(ts, 0).unwrap(),
            processed_at: chrono::Utc::now(),
        })
    }
}

fn record(n: usize) -> RawRecord {
    RawRecord {
        external_id: Some(format!("r{n}")),
        payload: json!({
            "title": format!("Item {n}"),
            "url": format!("https://scripted.example/{n}"),
            "ts": 1_714_560_000 + n as i64,
        }),
    }
}

fn coordinator_with(
    connectors: Vec<ScriptedConnector>,
    store: Arc<ItemStore>,
    timeout: Duration,
) -> Arc<RunCoordinator> {
    let mut registry = ConnectorRegistry::new();
    for c in connectors {
        registry.register(Arc::new(c)).unwrap();
    }
    Arc::new(RunCoordinator::new(Arc::new(registry), store, timeout))
}

#[tokio::test]
async fn run_one_counts_new_inserts_only() {
    let store = Arc::new(ItemStore::new());
    let coord = coordinator_with(
        vec![ScriptedConnector::new("a", (1..=5).map(record).collect())],
        Arc::clone(&store),
        Duration::from_secs(5),
    );

    let run = coord.run_one("rss:a").await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.processed_count, 5);
    assert_eq!(run.skipped_count, 0);
    assert!(run.finished_at.is_some());
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn rerun_with_overlap_does_not_double_count() {
    let store = Arc::new(ItemStore::new());

    let first = coordinator_with(
        vec![ScriptedConnector::new("a", (1..=15).map(record).collect())],
        Arc::clone(&store),
        Duration::from_secs(5),
    );
    assert_eq!(first.run_one("rss:a").await.unwrap().processed_count, 15);

    // Second run observes 10 of the original records plus 2 new ones.
    let mut replay: Vec<RawRecord> = (16..=17).map(record).collect();
    replay.extend((1..=10).map(record));
    let second = coordinator_with(
        vec![ScriptedConnector::new("a", replay)],
        Arc::clone(&store),
        Duration::from_secs(5),
    );
    let run = second.run_one("rss:a").await.unwrap();

    assert_eq!(run.processed_count, 2);
    assert_eq!(store.len(), 17);
    let page = store.query(&Query::default());
    assert_eq!(page.pagination.total_items, 17);
}

#[tokio::test]
async fn malformed_records_are_skipped_not_fatal() {
    let store = Arc::new(ItemStore::new());
    let records = vec![
        record(1),
        RawRecord {
            external_id: Some("bad".into()),
            payload: json!({ "url": "https://scripted.example/bad" }),
        },
        record(2),
    ];
    let coord = coordinator_with(
        vec![ScriptedConnector::new("a", records)],
        Arc::clone(&store),
        Duration::from_secs(5),
    );

    let run = coord.run_one("rss:a").await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.processed_count, 2);
    assert_eq!(run.skipped_count, 1);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn unknown_connector_is_not_found() {
    let store = Arc::new(ItemStore::new());
    let coord = coordinator_with(vec![], store, Duration::from_secs(5));
    assert!(matches!(
        coord.run_one("rss:nope").await,
        Err(RunError::NotFound(id)) if id == "rss:nope"
    ));
}

#[tokio::test]
async fn second_run_while_in_flight_is_already_running() {
    let store = Arc::new(ItemStore::new());
    let gate = Arc::new(Notify::new());
    let coord = coordinator_with(
        vec![ScriptedConnector::gated(
            "a",
            vec![record(1)],
            Arc::clone(&gate),
        )],
        Arc::clone(&store),
        Duration::from_secs(30),
    );

    let background = Arc::clone(&coord);
    let handle = tokio::spawn(async move { background.run_one("rss:a").await });

    // Wait until the first run holds the running slot.
    loop {
        if coord
            .last_run("rss:a")
            .is_some_and(|r| r.status == RunStatus::Running)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(matches!(
        coord.run_one("rss:a").await,
        Err(RunError::AlreadyRunning(id)) if id == "rss:a"
    ));

    // Exactly one run performed upserts.
    gate.notify_one();
    let run = handle.await.unwrap().unwrap();
    assert_eq!(run.processed_count, 1);
    assert_eq!(store.len(), 1);

    // A terminal run frees the slot for the next request.
    assert!(coord.run_one("rss:a").await.is_ok());
}

#[tokio::test]
async fn unreachable_source_yields_terminal_failed_run() {
    let store = Arc::new(ItemStore::new());
    let coord = coordinator_with(
        vec![ScriptedConnector::unreachable("a", "connection refused")],
        Arc::clone(&store),
        Duration::from_secs(5),
    );

    let err = coord.run_one("rss:a").await.unwrap_err();
    assert!(matches!(err, RunError::Fetch(FetchError::Unreachable(_))));

    let run = coord.last_run("rss:a").unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("connection refused"));
    assert!(run.finished_at.is_some());
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn slow_fetch_is_aborted_by_the_deadline() {
    let store = Arc::new(ItemStore::new());
    // The gate is never released, so only the deadline can end this fetch.
    let coord = coordinator_with(
        vec![ScriptedConnector::gated(
            "a",
            vec![record(1)],
            Arc::new(Notify::new()),
        )],
        Arc::clone(&store),
        Duration::from_millis(50),
    );

    let err = coord.run_one("rss:a").await.unwrap_err();
    assert!(matches!(err, RunError::Fetch(FetchError::Timeout(_))));

    let run = coord.last_run("rss:a").unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn run_all_isolates_failures_per_connector() {
    let store = Arc::new(ItemStore::new());
    let coord = coordinator_with(
        vec![
            ScriptedConnector::new("a", (1..=3).map(record).collect()),
            ScriptedConnector::unreachable("b", "dns failure"),
            ScriptedConnector::new("c", (10..=11).map(record).collect()),
        ],
        Arc::clone(&store),
        Duration::from_secs(5),
    );

    let results = coord.run_all().await;
    assert_eq!(results.len(), 3);

    let failed: Vec<_> = results
        .values()
        .filter(|o| o.status == RunStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].message.as_deref().unwrap().contains("dns failure"));

    assert_eq!(results["rss:a"].status, RunStatus::Succeeded);
    assert_eq!(results["rss:a"].processed, Some(3));
    assert_eq!(results["rss:c"].processed, Some(2));

    // The failing connector did not stop the others from writing.
    assert_eq!(store.len(), 5);
}
