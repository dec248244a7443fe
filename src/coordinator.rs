// src/coordinator.rs
//! Run coordinator: executes connectors, tracks per-connector run status,
//! and enforces at-most-one-concurrent-run-per-connector.
//!
//! The coordinator owns all writes to the item store; connectors only yield
//! records. It also owns the per-source fetch cursors, advanced after each
//! successful run, so connectors stay free of side effects.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::connector::registry::ConnectorRegistry;
use crate::error::{FetchError, RunError};
use crate::store::{ItemStore, Upsert};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("connector_runs_total", "Completed connector runs.");
        describe_counter!(
            "connector_run_errors_total",
            "Connector runs aborted by fetch failure or timeout."
        );
        describe_counter!(
            "news_items_ingested_total",
            "Newly inserted items across all runs."
        );
        describe_counter!(
            "news_items_refreshed_total",
            "Re-ingested items that only refreshed display fields."
        );
        describe_counter!(
            "connector_records_malformed_total",
            "Raw records skipped during normalization."
        );
        describe_histogram!("connector_run_ms", "Wall-clock duration of one run.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when any connector last finished a run."
        );
    });
}

/// Lifecycle state of one connector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// One execution of a connector. Immutable once terminal.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Run {
    pub connector_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// New inserts only; re-confirmations of existing items don't count.
    pub processed_count: usize,
    /// Malformed records skipped without aborting the run.
    pub skipped_count: usize,
    /// Present iff `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    fn new(connector_id: &str) -> Self {
        Self {
            connector_id: connector_id.to_string(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            processed_count: 0,
            skipped_count: 0,
            error: None,
        }
    }
}

/// Per-connector entry in a run-all report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Executes connector runs and tracks their lifecycle.
pub struct RunCoordinator {
    registry: Arc<ConnectorRegistry>,
    store: Arc<ItemStore>,
    fetch_timeout: Duration,
    /// Run-state table; the lock is the per-connector exclusion region and
    /// is never held across an await point.
    runs: Mutex<HashMap<String, Run>>,
    /// Newest external id seen per connector, advanced on success only.
    cursors: Mutex<HashMap<String, String>>,
}

impl RunCoordinator {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        store: Arc<ItemStore>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            fetch_timeout,
            runs: Mutex::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    /// Execute one connector run to its terminal status.
    ///
    /// Fails fast with `NotFound` for an unknown id and `AlreadyRunning`
    /// when a run for the same connector is still in flight. A fetch
    /// failure or missed deadline yields `RunError::Fetch`; the terminal
    /// `Run` record carrying the same error stays queryable via
    /// [`last_run`](Self::last_run).
    pub async fn run_one(&self, connector_id: &str) -> Result<Run, RunError> {
        ensure_metrics_described();

        let connector = self
            .registry
            .get(connector_id)
            .ok_or_else(|| RunError::NotFound(connector_id.to_string()))?;

        {
            // Exclusion region: the pending→running transition happens under
            // the run-table lock, so a second caller observes AlreadyRunning.
            let mut runs = self.runs.lock().expect("run table lock poisoned");
            if runs
                .get(connector_id)
                .is_some_and(|r| !r.status.is_terminal())
            {
                return Err(RunError::AlreadyRunning(connector_id.to_string()));
            }
            let mut run = Run::new(connector_id);
            run.status = RunStatus::Running;
            runs.insert(connector_id.to_string(), run);
        }

        let cursor = {
            let cursors = self.cursors.lock().expect("cursor table lock poisoned");
            cursors.get(connector_id).cloned()
        };

        let started = std::time::Instant::now();
        let fetched = match tokio::time::timeout(
            self.fetch_timeout,
            connector.fetch(cursor.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout.as_secs())),
        };

        let records = match fetched {
            Ok(records) => records,
            Err(err) => {
                let run = self.finish_failed(connector_id, &err);
                tracing::warn!(
                    connector = connector_id,
                    error = %err,
                    "connector run aborted"
                );
                counter!("connector_run_errors_total").increment(1);
                debug_assert!(run.status.is_terminal());
                return Err(RunError::Fetch(err));
            }
        };

        let newest_external_id = records.first().and_then(|r| r.external_id.clone());
        let mut processed = 0usize;
        let mut skipped = 0usize;

        for record in &records {
            match connector.normalize(record) {
                Ok(item) => match self.store.upsert(item) {
                    Upsert::Inserted => {
                        processed += 1;
                        counter!("news_items_ingested_total").increment(1);
                    }
                    Upsert::Updated => {
                        counter!("news_items_refreshed_total").increment(1);
                    }
                },
                Err(err) => {
                    skipped += 1;
                    counter!("connector_records_malformed_total").increment(1);
                    tracing::warn!(
                        connector = connector_id,
                        error = %err,
                        "skipping malformed record"
                    );
                }
            }
        }

        if let Some(newest) = newest_external_id {
            let mut cursors = self.cursors.lock().expect("cursor table lock poisoned");
            cursors.insert(connector_id.to_string(), newest);
        }

        let run = self.finish_succeeded(connector_id, processed, skipped);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        histogram!("connector_run_ms").record(elapsed_ms);
        counter!("connector_runs_total").increment(1);
        gauge!("ingest_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        tracing::info!(
            connector = connector_id,
            processed,
            skipped,
            elapsed_ms,
            "connector run succeeded"
        );

        Ok(run)
    }

    /// Run every registered connector concurrently and report per-connector
    /// outcomes once all of them reach a terminal status.
    ///
    /// Fan-out/fan-in: constituents execute in parallel, each isolated from
    /// the others' failures, and the aggregate is observable only after the
    /// last one finishes. Tasks are spawned, so a caller that stops awaiting
    /// the barrier does not cancel in-flight runs.
    pub async fn run_all(self: &Arc<Self>) -> BTreeMap<String, RunOutcome> {
        let ids = self.registry.ids();
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let coordinator = Arc::clone(self);
            let task_id = id.clone();
            handles.push((
                id,
                tokio::spawn(async move { coordinator.run_one(&task_id).await }),
            ));
        }

        let mut results = BTreeMap::new();
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(run)) => RunOutcome {
                    status: RunStatus::Succeeded,
                    processed: Some(run.processed_count),
                    message: None,
                },
                Ok(Err(err)) => RunOutcome {
                    status: RunStatus::Failed,
                    processed: None,
                    message: Some(err.to_string()),
                },
                Err(join_err) => RunOutcome {
                    status: RunStatus::Failed,
                    processed: None,
                    message: Some(format!("run task failed: {join_err}")),
                },
            };
            results.insert(id, outcome);
        }
        results
    }

    /// Most recent run for a connector, if any.
    pub fn last_run(&self, connector_id: &str) -> Option<Run> {
        self.runs
            .lock()
            .expect("run table lock poisoned")
            .get(connector_id)
            .cloned()
    }

    /// Snapshot of the most recent run per connector.
    pub fn runs(&self) -> Vec<Run> {
        self.runs
            .lock()
            .expect("run table lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn finish_succeeded(&self, connector_id: &str, processed: usize, skipped: usize) -> Run {
        let mut runs = self.runs.lock().expect("run table lock poisoned");
        let run = runs
            .get_mut(connector_id)
            .expect("finishing a run that was never started");
        run.status = RunStatus::Succeeded;
        run.finished_at = Some(Utc::now());
        run.processed_count = processed;
        run.skipped_count = skipped;
        run.clone()
    }

    fn finish_failed(&self, connector_id: &str, err: &FetchError) -> Run {
        let mut runs = self.runs.lock().expect("run table lock poisoned");
        let run = runs
            .get_mut(connector_id)
            .expect("finishing a run that was never started");
        run.status = RunStatus::Failed;
        run.finished_at = Some(Utc::now());
        run.error = Some(err.to_string());
        run.clone()
    }
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("connectors", &self.registry.len())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}
