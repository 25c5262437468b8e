//! Elasticsearch bulk sink.
//!
//! A thin typed client over the REST API: ping on startup, per-index
//! existence check and creation (with the bundled mapping unless the
//! deployment owns its own index template), and newline-delimited `_bulk`
//! indexing. Documents are routed to indices derived from one of four time
//! strategies; a batch can therefore span several indices, each of which is
//! ensured before anything is indexed into it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ffs_puller_enrich::OutputEvent;
use ffs_puller_state::Window;
use futures::StreamExt as _;
use rand::Rng as _;
use strum_macros::{Display, EnumString};

use crate::{mapping, OutputError};

/// Bulk requests in flight at once per batch.
const BULK_WORKERS: usize = 2;

/// Documents per bulk request.
const BULK_CHUNK: usize = 500;

/// Which timestamp an event's index name is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
pub enum IndexTimeGen {
    /// Wall-clock time at indexing.
    #[default]
    #[strum(serialize = "timeNow")]
    TimeNow,
    /// The window's upper bound: one index per batch.
    #[strum(serialize = "onOrBefore")]
    OnOrBefore,
    /// Each event's observation timestamp.
    #[strum(serialize = "eventTimestamp")]
    EventTimestamp,
    /// Each event's insertion timestamp.
    #[strum(serialize = "insertionTimestamp")]
    InsertionTimestamp,
}

/// Elasticsearch connection and index shaping options.
#[derive(Debug, Clone)]
pub struct ElasticSettings {
    /// Cluster node URLs; one is picked at random per request.
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Base index name; the time suffix is appended after a `-`.
    pub index_name: String,
    /// `chrono` strftime pattern for the index time suffix; `None` disables
    /// the suffix entirely.
    pub index_time_append: Option<String>,
    pub index_time_gen: IndexTimeGen,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub best_compression: bool,
    pub aliases: Vec<String>,
    /// When set, indices are created empty and the cluster's own template is
    /// expected to provide the mapping.
    pub use_custom_index_pattern: bool,
}

/// Bulk-indexing sink for one query.
pub struct ElasticSink {
    http: reqwest::Client,
    settings: ElasticSettings,
}

impl ElasticSink {
    #[must_use]
    pub fn new(http: reqwest::Client, settings: ElasticSettings) -> Self {
        Self { http, settings }
    }

    fn base_url(&self) -> String {
        let urls = &self.settings.urls;
        let url = if urls.len() == 1 {
            &urls[0]
        } else {
            &urls[rand::rng().random_range(0..urls.len())]
        };
        url.trim_end_matches('/').to_string()
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(user) = self.settings.username.as_deref() {
            builder = builder.basic_auth(user, self.settings.password.as_deref());
        }
        builder
    }

    /// Confirms the cluster is reachable, logging its version.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] if the cluster cannot be reached.
    pub async fn ping(&self) -> Result<(), OutputError> {
        let response = self
            .request(reqwest::Method::GET, format!("{}/", self.base_url()))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(OutputError::UnexpectedStatus {
                status: status.as_u16(),
                operation: "ping",
            });
        }

        let info: serde_json::Value = response.json().await?;
        log::info!(
            "Elasticsearch returned with code {} and version {}",
            status.as_u16(),
            info["version"]["number"].as_str().unwrap_or("unknown")
        );
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, OutputError> {
        let response = self
            .request(
                reqwest::Method::HEAD,
                format!("{}/{index}", self.base_url()),
            )
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(OutputError::UnexpectedStatus {
                status: status.as_u16(),
                operation: "index exists",
            }),
        }
    }

    async fn create_index(&self, index: &str) -> Result<(), OutputError> {
        let mut builder = self.request(
            reqwest::Method::PUT,
            format!("{}/{index}", self.base_url()),
        );
        if !self.settings.use_custom_index_pattern {
            builder = builder.json(&mapping::index_body(&self.settings));
        }

        let response = builder.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            log::error!("error creating elastic index: {index} ({status})");
            return Err(OutputError::UnexpectedStatus {
                status: status.as_u16(),
                operation: "index create",
            });
        }

        let body: serde_json::Value = response.json().await?;
        if body["acknowledged"].as_bool() != Some(true) {
            return Err(OutputError::CreateNotAcknowledged {
                index: index.to_string(),
            });
        }
        Ok(())
    }

    /// The index name an event is routed to.
    #[must_use]
    pub fn index_for(
        &self,
        event: &OutputEvent,
        window: &Window,
        now: DateTime<Utc>,
    ) -> String {
        let time = match self.settings.index_time_gen {
            IndexTimeGen::TimeNow => now,
            IndexTimeGen::OnOrBefore => window.on_or_before,
            IndexTimeGen::EventTimestamp => {
                event.event_timestamp().unwrap_or(window.on_or_before)
            }
            IndexTimeGen::InsertionTimestamp => {
                event.insertion_timestamp().unwrap_or(window.on_or_before)
            }
        };
        self.index_name_at(time)
    }

    /// Renders `{baseName}[-{suffix}]` for the given instant.
    #[must_use]
    pub fn index_name_at(&self, time: DateTime<Utc>) -> String {
        match self.settings.index_time_append.as_deref() {
            None | Some("") => self.settings.index_name.clone(),
            Some(pattern) => {
                format!("{}-{}", self.settings.index_name, time.format(pattern))
            }
        }
    }

    /// Ensures every target index exists, then bulk-indexes the batch.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] on any request failure, unacknowledged index
    /// creation, or per-document bulk rejection.
    pub async fn write_batch(
        &self,
        query_name: &str,
        window: &Window,
        events: &[OutputEvent],
    ) -> Result<(), OutputError> {
        let now = Utc::now();
        let mut routed: Vec<(String, Vec<u8>)> = Vec::with_capacity(events.len());
        for event in events {
            let index = self.index_for(event, window, now);
            routed.push((index, serde_json::to_vec(event)?));
        }

        let required: BTreeSet<&String> = routed.iter().map(|(index, _)| index).collect();
        for index in required {
            if !self.index_exists(index).await? {
                self.create_index(index).await?;
            }
        }

        let bodies: Vec<Vec<u8>> = routed
            .chunks(BULK_CHUNK)
            .map(|chunk| {
                let mut body = Vec::new();
                for (index, doc) in chunk {
                    body.extend_from_slice(
                        format!("{{\"index\":{{\"_index\":{}}}}}\n", serde_json::json!(index))
                            .as_bytes(),
                    );
                    body.extend_from_slice(doc);
                    body.push(b'\n');
                }
                body
            })
            .collect();

        let mut requests = futures::stream::iter(bodies.into_iter().enumerate().map(
            |(worker, body)| {
                let worker = worker % BULK_WORKERS;
                async move {
                    log::debug!("{query_name}BGWorker-{worker}: flushing bulk request");
                    self.send_bulk(body).await
                }
            },
        ))
        .buffer_unordered(BULK_WORKERS);

        while let Some(result) = requests.next().await {
            result?;
        }
        Ok(())
    }

    async fn send_bulk(&self, body: Vec<u8>) -> Result<(), OutputError> {
        let response = self
            .request(
                reqwest::Method::POST,
                format!("{}/_bulk", self.base_url()),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(OutputError::UnexpectedStatus {
                status: status.as_u16(),
                operation: "bulk",
            });
        }

        let result: serde_json::Value = response.json().await?;
        if result["errors"].as_bool() == Some(true) {
            let reason = result["items"]
                .as_array()
                .and_then(|items| {
                    items.iter().find_map(|item| {
                        item["index"]["error"]["reason"].as_str().map(String::from)
                    })
                })
                .unwrap_or_else(|| "unknown".to_string());
            return Err(OutputError::BulkRejected { reason });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use ffs_puller_enrich::raw;
    use ffs_puller_event_models::FileEvent;

    use super::*;

    fn settings(r#gen: IndexTimeGen, append: Option<&str>) -> ElasticSettings {
        ElasticSettings {
            urls: vec!["http://localhost:9200".to_string()],
            username: None,
            password: None,
            index_name: "file-events".to_string(),
            index_time_append: append.map(String::from),
            index_time_gen: r#gen,
            number_of_shards: 1,
            number_of_replicas: 0,
            best_compression: false,
            aliases: Vec::new(),
            use_custom_index_pattern: false,
        }
    }

    fn sink(r#gen: IndexTimeGen, append: Option<&str>) -> ElasticSink {
        ElasticSink::new(reqwest::Client::new(), settings(r#gen, append))
    }

    fn event_at(day: u32) -> OutputEvent {
        OutputEvent::Raw(raw::reshape(
            FileEvent {
                event_timestamp: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
                ..FileEvent::default()
            },
            None,
        ))
    }

    fn window() -> Window {
        Window::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 3, 23, 0, 0).unwrap(),
        )
    }

    #[test]
    fn index_time_gen_parses_config_values() {
        assert_eq!(
            "timeNow".parse::<IndexTimeGen>().unwrap(),
            IndexTimeGen::TimeNow
        );
        assert_eq!(
            "onOrBefore".parse::<IndexTimeGen>().unwrap(),
            IndexTimeGen::OnOrBefore
        );
        assert_eq!(
            "eventTimestamp".parse::<IndexTimeGen>().unwrap(),
            IndexTimeGen::EventTimestamp
        );
        assert_eq!(
            "insertionTimestamp".parse::<IndexTimeGen>().unwrap(),
            IndexTimeGen::InsertionTimestamp
        );
        assert!("tomorrow".parse::<IndexTimeGen>().is_err());
    }

    #[test]
    fn no_append_pattern_means_bare_index_name() {
        let sink = sink(IndexTimeGen::TimeNow, None);
        assert_eq!(sink.index_name_at(Utc::now()), "file-events");
    }

    #[test]
    fn on_or_before_routes_whole_batch_to_one_index() {
        let sink = sink(IndexTimeGen::OnOrBefore, Some("%Y-%m-%d"));
        let now = Utc::now();
        let names: BTreeSet<String> = (1..=3)
            .map(|day| sink.index_for(&event_at(day), &window(), now))
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names.contains("file-events-2024-03-03"));
    }

    #[test]
    fn event_timestamp_routes_per_event_day() {
        let sink = sink(IndexTimeGen::EventTimestamp, Some("%Y-%m-%d"));
        let now = Utc::now();
        let names: BTreeSet<String> = (1..=3)
            .map(|day| sink.index_for(&event_at(day), &window(), now))
            .collect();

        assert_eq!(
            names,
            BTreeSet::from([
                "file-events-2024-03-01".to_string(),
                "file-events-2024-03-02".to_string(),
                "file-events-2024-03-03".to_string(),
            ])
        );
    }

    #[test]
    fn missing_event_timestamp_falls_back_to_window_bound() {
        let sink = sink(IndexTimeGen::EventTimestamp, Some("%Y-%m-%d"));
        let event = OutputEvent::Raw(raw::reshape(FileEvent::default(), None));
        assert_eq!(
            sink.index_for(&event, &window(), Utc::now()),
            "file-events-2024-03-03"
        );
    }
}
