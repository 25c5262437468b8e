#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Durable per-query progress state.
//!
//! Each query persists two artefacts in its output directory:
//!
//! - `{name}inProgressQueries.json` — the set of windows currently being
//!   processed. Survivors of a crash are replayed verbatim on restart.
//! - `{name}lastCompletedQuery.json` — the most advanced completed window.
//!
//! Both are rewritten whole on every transition, via a temp file and rename
//! so a crash mid-write never leaves a torn file. A missing file is not an
//! error: it is initialised empty and read back as empty.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A query window: the half-open time interval fetched as one unit.
///
/// Two windows are equal iff both bounds match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    #[serde(rename = "OnOrAfter")]
    pub on_or_after: DateTime<Utc>,
    #[serde(rename = "OnOrBefore")]
    pub on_or_before: DateTime<Utc>,
}

impl Window {
    #[must_use]
    pub const fn new(on_or_after: DateTime<Utc>, on_or_before: DateTime<Utc>) -> Self {
        Self {
            on_or_after,
            on_or_before,
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.on_or_after, self.on_or_before)
    }
}

/// Errors from reading or writing state files.
#[derive(Debug, Error)]
pub enum StateError {
    /// Filesystem read/write/rename failed.
    #[error("state I/O error on {path}: {source}")]
    Io {
        /// The state file involved.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored state did not parse.
    #[error("state parse error in {path}: {source}")]
    Parse {
        /// The state file involved.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reader/writer for one query's two state files.
///
/// Writes are serialised by the engine (single writer per query); this type
/// only guarantees that each individual write is atomic.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    name: String,
}

impl StateStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    fn in_progress_path(&self) -> PathBuf {
        self.dir.join(format!("{}inProgressQueries.json", self.name))
    }

    fn last_completed_path(&self) -> PathBuf {
        self.dir.join(format!("{}lastCompletedQuery.json", self.name))
    }

    /// Reads the persisted in-progress window set.
    ///
    /// A missing file is initialised to an empty array and read as empty; an
    /// empty or `null` file is also empty.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file cannot be read, initialised, or
    /// parsed.
    pub async fn read_in_progress(&self) -> Result<Vec<Window>, StateError> {
        let path = self.in_progress_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => parse_or_empty(&bytes, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.write_in_progress(&[]).await?;
                Ok(Vec::new())
            }
            Err(source) => Err(StateError::Io { path, source }),
        }
    }

    /// Rewrites the in-progress window set.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if serialisation or the write fails. Callers
    /// treat this as fatal: the engine cannot make progress it cannot record.
    pub async fn write_in_progress(&self, windows: &[Window]) -> Result<(), StateError> {
        write_atomic(&self.in_progress_path(), windows).await
    }

    /// Reads the last-completed window marker.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file cannot be read, initialised, or
    /// parsed.
    pub async fn read_last_completed(&self) -> Result<Option<Window>, StateError> {
        let path = self.last_completed_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => parse_or_empty(&bytes, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.write_last_completed(None).await?;
                Ok(None)
            }
            Err(source) => Err(StateError::Io { path, source }),
        }
    }

    /// Rewrites the last-completed window marker.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if serialisation or the write fails.
    pub async fn write_last_completed(&self, window: Option<Window>) -> Result<(), StateError> {
        write_atomic(&self.last_completed_path(), &window).await
    }
}

fn parse_or_empty<T>(bytes: &[u8], path: &Path) -> Result<T, StateError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|source| StateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_vec(value).map_err(|source| StateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn window(after_min: u32, before_min: u32) -> Window {
        Window::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, after_min, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, before_min, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_in_progress_initialises_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "q1");

        assert!(store.read_in_progress().await.unwrap().is_empty());
        // The file now exists and holds an empty array.
        let raw = std::fs::read_to_string(dir.path().join("q1inProgressQueries.json")).unwrap();
        assert_eq!(raw, "[]");
    }

    #[tokio::test]
    async fn missing_last_completed_initialises_null() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "q1");

        assert!(store.read_last_completed().await.unwrap().is_none());
        let raw = std::fs::read_to_string(dir.path().join("q1lastCompletedQuery.json")).unwrap();
        assert_eq!(raw, "null");
    }

    #[tokio::test]
    async fn in_progress_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "q1");
        let windows = vec![window(0, 5), window(5, 10)];

        store.write_in_progress(&windows).await.unwrap();
        assert_eq!(store.read_in_progress().await.unwrap(), windows);
    }

    #[tokio::test]
    async fn rewrite_shrinks_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "q1");

        store
            .write_in_progress(&[window(0, 5), window(5, 10)])
            .await
            .unwrap();
        store.write_in_progress(&[window(5, 10)]).await.unwrap();
        assert_eq!(store.read_in_progress().await.unwrap(), vec![window(5, 10)]);
    }

    #[tokio::test]
    async fn last_completed_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "q1");

        store
            .write_last_completed(Some(window(0, 5)))
            .await
            .unwrap();
        assert_eq!(
            store.read_last_completed().await.unwrap(),
            Some(window(0, 5))
        );
    }

    #[tokio::test]
    async fn empty_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("q1inProgressQueries.json"), "").unwrap();
        let store = StateStore::new(dir.path(), "q1");

        assert!(store.read_in_progress().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn windows_serialise_with_original_field_names() {
        let json = serde_json::to_string(&window(0, 5)).unwrap();
        assert!(json.contains("\"OnOrAfter\""));
        assert!(json.contains("\"OnOrBefore\""));
    }

    #[tokio::test]
    async fn millisecond_bounds_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "q1");
        let precise = Window::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
                + chrono::Duration::milliseconds(1),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap()
                + chrono::Duration::milliseconds(1),
        );

        store.write_in_progress(&[precise]).await.unwrap();
        assert_eq!(store.read_in_progress().await.unwrap(), vec![precise]);
    }
}
