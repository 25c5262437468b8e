//! JSON-lines file sink.
//!
//! One file per completed window, named after the query and the window
//! bounds so replays overwrite their own earlier partial output instead of
//! appending to it.

use std::path::{Path, PathBuf};

use ffs_puller_enrich::OutputEvent;
use ffs_puller_state::Window;
use tokio::io::AsyncWriteExt as _;

use crate::OutputError;

/// Window-bound render used in event file names.
const FILE_TIME_FORMAT: &str = "%Y.%m.%d.%H.%M.%S.%3f";

/// Maximum basename length before the `.json` extension.
const MAX_BASENAME_LEN: usize = 248;

/// Writes each window to `{dir}/{name}A{after}B{before}.json`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes the batch as JSON lines, fsyncing before returning.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] if the file cannot be created, written,
    /// flushed, or synced.
    pub async fn write(
        &self,
        query_name: &str,
        window: &Window,
        events: &[OutputEvent],
    ) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(event_file_name(query_name, window));

        let file = tokio::fs::File::create(&path).await?;
        let mut writer = tokio::io::BufWriter::new(file);

        for event in events {
            let line = serde_json::to_vec(event)?;
            writer.write_all(&line).await?;
            writer.write_all(b"\n").await?;
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        Ok(path)
    }

    /// The directory this sink writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Builds the per-window file name:
/// `{name}A{after:%Y.%m.%d.%H.%M.%S.%3f}B{before:...}.json`, with the
/// basename truncated to 248 characters.
#[must_use]
pub fn event_file_name(query_name: &str, window: &Window) -> String {
    let mut base = format!(
        "{query_name}A{}B{}",
        window.on_or_after.format(FILE_TIME_FORMAT),
        window.on_or_before.format(FILE_TIME_FORMAT),
    );

    if base.len() > MAX_BASENAME_LEN {
        let mut cut = MAX_BASENAME_LEN;
        while !base.is_char_boundary(cut) {
            cut -= 1;
        }
        base.truncate(cut);
    }

    format!("{base}.json")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use chrono::Utc;
    use ffs_puller_enrich::raw;
    use ffs_puller_event_models::FileEvent;

    use super::*;

    fn window() -> Window {
        Window::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
                + chrono::Duration::milliseconds(1),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap()
                + chrono::Duration::milliseconds(1),
        )
    }

    #[test]
    fn file_name_matches_window_bounds() {
        assert_eq!(
            event_file_name("exfil", &window()),
            "exfilA2024.01.01.10.00.00.001B2024.01.01.10.05.00.001.json"
        );
    }

    #[test]
    fn long_names_truncate_to_248_before_extension() {
        let name = event_file_name(&"q".repeat(300), &window());
        assert_eq!(name.len(), 248 + ".json".len());
        assert!(name.ends_with(".json"));
    }

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let events: Vec<OutputEvent> = (0..3)
            .map(|i| {
                OutputEvent::Raw(raw::reshape(
                    FileEvent {
                        event_id: Some(format!("e{i}")),
                        ..FileEvent::default()
                    },
                    None,
                ))
            })
            .collect();

        let path = sink.write("exfil", &window(), &events).await.unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["eventId"], format!("e{i}"));
        }
    }

    #[tokio::test]
    async fn rewrite_replaces_previous_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let events = vec![OutputEvent::Raw(raw::reshape(
            FileEvent {
                event_id: Some("only".to_string()),
                ..FileEvent::default()
            },
            None,
        ))];

        sink.write("exfil", &window(), &events).await.unwrap();
        let path = sink.write("exfil", &window(), &events).await.unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
