//! The per-query engine state machine.
//!
//! The engine task is the single reader and writer of the query's durable
//! state. Window tasks fetch, enrich, and deliver, then report back over a
//! channel; all list mutation and persistence happens here, in one place,
//! which is what keeps window bounds monotone without locking.
//!
//! Persistence ordering on completion is load-bearing: the last-completed
//! marker is written *before* the window is removed from the in-progress
//! set. A crash between the two leaves a replayable window whose output was
//! already delivered, which is exactly the at-least-once contract the sinks
//! are documented to tolerate.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ffs_puller_client::{is_recoverable, ClientError};
use ffs_puller_enrich::Enricher;
use ffs_puller_event_models::{FileEvent, SearchQuery};
use ffs_puller_output::Dispatcher;
use ffs_puller_state::{StateStore, Window};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant};

use crate::scheduler::{self, Advance};
use crate::EngineError;

/// Auth tokens expire after an hour; refresh with headroom.
const AUTH_REFRESH_INTERVAL: Duration = Duration::from_secs(55 * 60);

/// Recoverable fetch retries before the window is abandoned as fatal.
const MAX_RETRIES: u32 = 10;

/// Everything the engine needs to know about one configured query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Unique query name; prefixes state files and log lines.
    pub name: String,
    pub username: String,
    pub password: String,
    /// Window tick cadence, also the sleep between fetch retries.
    pub interval: Duration,
    /// Width of each fetch window.
    pub time_gap: chrono::Duration,
    /// The upstream query template whose window filters get rewritten.
    pub query: SearchQuery,
    /// Maximum windows in flight; `-1` means unbounded.
    pub max_concurrent: i64,
}

/// One query's ingestion engine.
pub struct QueryEngine {
    spec: QuerySpec,
    auth_uri: String,
    ffs_uri: String,
    http: reqwest::Client,
    store: StateStore,
    enricher: Arc<Enricher>,
    dispatcher: Arc<Dispatcher>,
    recoverable_patterns: Arc<Vec<String>>,
}

/// What a finished window task reports back.
enum Outcome {
    Completed(CompletedWindow),
    Failed(EngineError),
}

struct CompletedWindow {
    window: Window,
    events: usize,
    fetch: Duration,
    enrich: Duration,
    output: Duration,
    total: Duration,
}

impl QueryEngine {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: QuerySpec,
        auth_uri: String,
        ffs_uri: String,
        http: reqwest::Client,
        store: StateStore,
        enricher: Arc<Enricher>,
        dispatcher: Arc<Dispatcher>,
        recoverable_patterns: Arc<Vec<String>>,
    ) -> Self {
        Self {
            spec,
            auth_uri,
            ffs_uri,
            http,
            store,
            enricher,
            dispatcher,
            recoverable_patterns,
        }
    }

    /// Runs the engine until its configured end time or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on authentication failure, a non-recoverable
    /// upstream error, exhausted retries, sink failure, or state I/O
    /// failure. Returns `Ok(())` only after a graceful terminal: the
    /// scheduler hit the configured end time and every in-flight window
    /// completed.
    pub async fn run(self) -> Result<(), EngineError> {
        let name = self.spec.name.clone();
        let template_err = |source| EngineError::Template {
            name: name.clone(),
            source,
        };
        // Read once at startup; the template's ON_OR_BEFORE is the absolute
        // end of ingestion for this query.
        let config_after = self.spec.query.on_or_after().map_err(template_err)?;
        let max_time = self.spec.query.on_or_before().map_err(template_err)?;

        let mut in_progress = self.store.read_in_progress().await?;
        let mut last_completed = self.store.read_last_completed().await?;

        let token = Arc::new(RwLock::new(self.fetch_token().await?));

        if let Dispatcher::Elastic(elastic) = self.dispatcher.as_ref() {
            elastic.ping().await.map_err(|source| EngineError::Output {
                name: name.clone(),
                source,
            })?;
        }

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Outcome>(64);
        let mut tasks_in_flight: usize = 0;

        // Windows that never completed before the last shutdown are replayed
        // with their stored bounds, without advancing the scheduler.
        if !in_progress.is_empty() {
            log::info!(
                "{name}: replaying {} in-progress window(s) from previous run",
                in_progress.len()
            );
            for window in &in_progress {
                ffs_puller_metrics::increase_in_progress_queries();
                self.spawn_window(*window, &outcome_tx, &token);
                tasks_in_flight += 1;
            }
        }

        let mut auth_ticker = interval_at(
            Instant::now() + AUTH_REFRESH_INTERVAL,
            AUTH_REFRESH_INTERVAL,
        );
        let mut window_ticker =
            interval_at(Instant::now() + self.spec.interval, self.spec.interval);

        let mut terminal = false;
        loop {
            if terminal && tasks_in_flight == 0 {
                log::info!("{name}: all windows completed, shutting down");
                return Ok(());
            }

            tokio::select! {
                _ = auth_ticker.tick(), if !terminal => {
                    *token.write().await = self.fetch_token().await?;
                }

                _ = window_ticker.tick(), if !terminal => {
                    let capacity = self.spec.max_concurrent;
                    if capacity != -1 && in_progress.len() as i64 > capacity {
                        log::info!("Rate limiting query: {name}");
                        continue;
                    }

                    let safe_now = Utc::now() - scheduler::safety_gap();
                    match scheduler::advance(
                        &in_progress,
                        last_completed,
                        config_after,
                        self.spec.time_gap,
                        max_time,
                        safe_now,
                    ) {
                        Advance::Done => {
                            log::info!(
                                "{name}: reached configured end time, waiting for \
                                 {tasks_in_flight} in-flight window(s)"
                            );
                            terminal = true;
                        }
                        Advance::Window(window) => {
                            ffs_puller_metrics::increase_in_progress_queries();
                            in_progress.push(window);
                            self.store.write_in_progress(&in_progress).await?;
                            self.spawn_window(window, &outcome_tx, &token);
                            tasks_in_flight += 1;
                        }
                    }
                }

                Some(outcome) = outcome_rx.recv() => {
                    tasks_in_flight -= 1;
                    match outcome {
                        Outcome::Completed(done) => {
                            self.complete_window(done, &mut in_progress, &mut last_completed)
                                .await?;
                        }
                        Outcome::Failed(err) => {
                            ffs_puller_metrics::decrease_in_progress_queries();
                            ffs_puller_metrics::increment_failed_queries();
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn fetch_token(&self) -> Result<String, EngineError> {
        ffs_puller_client::get_auth_token(
            &self.http,
            &self.auth_uri,
            &self.spec.username,
            &self.spec.password,
        )
        .await
        .map_err(|source| EngineError::Auth {
            name: self.spec.name.clone(),
            source,
        })
    }

    fn spawn_window(
        &self,
        window: Window,
        outcome_tx: &mpsc::Sender<Outcome>,
        token: &Arc<RwLock<String>>,
    ) {
        let task = WindowTask {
            name: self.spec.name.clone(),
            ffs_uri: self.ffs_uri.clone(),
            http: self.http.clone(),
            query: self.spec.query.clone(),
            interval: self.spec.interval,
            patterns: Arc::clone(&self.recoverable_patterns),
            enricher: Arc::clone(&self.enricher),
            dispatcher: Arc::clone(&self.dispatcher),
        };
        let outcome_tx = outcome_tx.clone();
        let token = Arc::clone(token);

        tokio::spawn(async move {
            let outcome = task.run(window, token).await;
            // The engine only drops the receiver on its way out of a fatal
            // error, at which point the outcome no longer matters.
            let _ = outcome_tx.send(outcome).await;
        });
    }

    async fn complete_window(
        &self,
        done: CompletedWindow,
        in_progress: &mut Vec<Window>,
        last_completed: &mut Option<Window>,
    ) -> Result<(), EngineError> {
        let window = done.window;

        // Persist the marker before shrinking the in-progress set: a crash
        // in between replays a delivered window instead of losing one.
        let extends_frontier =
            last_completed.is_none_or(|marker| window.on_or_after >= marker.on_or_before);
        if extends_frontier {
            *last_completed = Some(window);
            self.store.write_last_completed(Some(window)).await?;
        }

        in_progress.retain(|candidate| candidate != &window);
        self.store.write_in_progress(in_progress).await?;

        ffs_puller_metrics::increment_events_processed(done.events);
        ffs_puller_metrics::decrease_in_progress_queries();
        ffs_puller_metrics::increment_successful_queries();

        log::info!(
            "Number of events for query: {} - {} - Get File Events Duration: {:?} - \
             Enrichment Duration: {:?} - Output Duration: {:?} - Duration: {:?}",
            self.spec.name,
            done.events,
            done.fetch,
            done.enrich,
            done.output,
            done.total,
        );
        Ok(())
    }
}

/// The work of one window, run as its own task.
struct WindowTask {
    name: String,
    ffs_uri: String,
    http: reqwest::Client,
    query: SearchQuery,
    interval: Duration,
    patterns: Arc<Vec<String>>,
    enricher: Arc<Enricher>,
    dispatcher: Arc<Dispatcher>,
}

impl WindowTask {
    async fn run(self, window: Window, token: Arc<RwLock<String>>) -> Outcome {
        let started = Instant::now();

        let mut query = self.query.clone();
        query.set_window(window.on_or_after, window.on_or_before);

        let fetch_started = Instant::now();
        let fetched = fetch_with_retry(&self.name, self.interval, &self.patterns, || {
            let http = self.http.clone();
            let ffs_uri = self.ffs_uri.clone();
            let query = query.clone();
            let token = Arc::clone(&token);
            async move {
                let token = token.read().await.clone();
                ffs_puller_client::get_events(&http, &token, &ffs_uri, &query).await
            }
        })
        .await;
        let events = match fetched {
            Ok(events) => events,
            Err(err) => return Outcome::Failed(err),
        };
        let fetch = fetch_started.elapsed();

        let enrich_started = Instant::now();
        let count = events.len();
        let batch = if count > 0 {
            self.enricher.enrich(events).await
        } else {
            Vec::new()
        };
        let enrich = enrich_started.elapsed();

        let output_started = Instant::now();
        if !batch.is_empty() {
            if let Err(source) = self
                .dispatcher
                .write_batch(&self.name, &window, &batch)
                .await
            {
                return Outcome::Failed(EngineError::Output {
                    name: self.name,
                    source,
                });
            }
        }
        let output = output_started.elapsed();

        Outcome::Completed(CompletedWindow {
            window,
            events: count,
            fetch,
            enrich,
            output,
            total: started.elapsed(),
        })
    }
}

/// Runs a fetch with the bounded retry policy: recoverable errors sleep one
/// tick interval and try again, up to [`MAX_RETRIES`] extra attempts; the
/// next recoverable failure, or any fatal one, stops the engine.
async fn fetch_with_retry<F, Fut>(
    name: &str,
    interval: Duration,
    patterns: &[String],
    mut fetch: F,
) -> Result<Vec<FileEvent>, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<FileEvent>, ClientError>>,
{
    let mut retry_count: u32 = 0;
    loop {
        match fetch().await {
            Ok(events) => return Ok(events),
            Err(source) if is_recoverable(&source, patterns) => {
                log::warn!(
                    "Attempting to recover from error: {source}. Retry number: {retry_count}"
                );
                if retry_count >= MAX_RETRIES {
                    return Err(EngineError::RetriesExhausted {
                        name: name.to_string(),
                    });
                }
                // Sleep a full tick to stay under the upstream per-minute
                // query budget.
                tokio::time::sleep(interval).await;
                retry_count += 1;
            }
            Err(source) => {
                log::error!("error getting file events for ffs query: {name}");
                return Err(EngineError::Fetch {
                    name: name.to_string(),
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn patterns() -> Vec<String> {
        ffs_puller_client::DEFAULT_RECOVERABLE_PATTERNS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn recoverable() -> ClientError {
        ClientError::EventsStatus {
            status: "500 Internal Server Error".to_string(),
        }
    }

    fn fatal() -> ClientError {
        ClientError::EventsStatus {
            status: "404 Not Found".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let events = fetch_with_retry("q", Duration::from_secs(10), &patterns(), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(recoverable())
                } else {
                    Ok(vec![FileEvent::default(); 3])
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_ten_extra_attempts() {
        let attempts = AtomicU32::new(0);
        let result = fetch_with_retry("q", Duration::from_secs(10), &patterns(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(recoverable()) }
        })
        .await;

        assert!(matches!(result, Err(EngineError::RetriesExhausted { .. })));
        // Initial attempt plus ten retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_do_not_retry() {
        let attempts = AtomicU32::new(0);
        let result = fetch_with_retry("q", Duration::from_secs(10), &patterns(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(fatal()) }
        })
        .await;

        assert!(matches!(result, Err(EngineError::Fetch { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_sleeps_nowhere() {
        let before = tokio::time::Instant::now();
        let events = fetch_with_retry("q", Duration::from_secs(600), &patterns(), || async {
            Ok(Vec::new())
        })
        .await
        .unwrap();

        assert!(events.is_empty());
        assert_eq!(tokio::time::Instant::now(), before);
    }
}
