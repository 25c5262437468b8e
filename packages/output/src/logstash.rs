//! Logstash TCP sink.
//!
//! Plain newline-delimited JSON over a TCP connection. The endpoint is
//! picked at random from the configured list on every (re)connect, which
//! spreads load across a Logstash fleet without any coordination.

use std::time::Duration;

use ffs_puller_enrich::OutputEvent;
use rand::Rng as _;
use tokio::io::AsyncWriteExt as _;
use tokio::net::TcpStream;

use crate::OutputError;

/// How long a connection attempt may take before the batch fails.
const DIAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Newline-delimited JSON writer over TCP.
#[derive(Debug, Clone)]
pub struct LogstashSink {
    urls: Vec<String>,
}

impl LogstashSink {
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    fn pick_url(&self) -> &str {
        if self.urls.len() == 1 {
            &self.urls[0]
        } else {
            &self.urls[rand::rng().random_range(0..self.urls.len())]
        }
    }

    /// Connects, writes the batch as JSON lines, flushes, and closes.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] if the dial times out or any write fails;
    /// the whole batch is failed, there is no partial-delivery tracking.
    pub async fn write_batch(&self, events: &[OutputEvent]) -> Result<(), OutputError> {
        let url = self.pick_url().to_string();

        let stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&url))
            .await
            .map_err(|_| OutputError::ConnectTimeout { url: url.clone() })??;
        log::debug!("connected to logstash at {url}");

        let mut writer = tokio::io::BufWriter::new(stream);
        for event in events {
            let line = serde_json::to_vec(event)?;
            writer.write_all(&line).await?;
            writer.write_all(b"\n").await?;
        }

        writer.flush().await?;
        writer.get_mut().shutdown().await?;
        Ok(())
    }
}
