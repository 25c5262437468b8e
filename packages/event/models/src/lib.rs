#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical file-activity event record and the event-search query body.
//!
//! Every upstream event is decoded into [`FileEvent`], the ~60-field record
//! the rest of the pipeline works with. [`SearchQuery`] models the JSON body
//! POSTed to the event-search API; the two timestamp filters it carries
//! (`ON_OR_AFTER` / `ON_OR_BEFORE`) are the knobs the window scheduler turns.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Filter operator marking the lower bound of a query window.
pub const ON_OR_AFTER: &str = "ON_OR_AFTER";
/// Filter operator marking the upper bound of a query window.
pub const ON_OR_BEFORE: &str = "ON_OR_BEFORE";

/// A file-activity event as returned by the event-search API.
///
/// Field names mirror the upstream camelCase wire format. Everything is
/// optional: the upstream omits fields that do not apply to an event type,
/// and empty CSV cells decode to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertion_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identified_extension_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_extension_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    /// One or more file owners; the upstream reports a comma-joined list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_owner: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip_addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_id: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_with: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharing_type_added: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_drive_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_source_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_capacity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_bus_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_media_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_volume_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removable_media_partition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_destination: Option<String>,
    #[serde(rename = "emailDLPPolicyNames", skip_serializing_if = "Option::is_none")]
    pub email_dlp_policy_names: Option<Vec<String>>,
    #[serde(rename = "emailDLPSubject", skip_serializing_if = "Option::is_none")]
    pub email_dlp_subject: Option<String>,
    #[serde(rename = "emailDLPSender", skip_serializing_if = "Option::is_none")]
    pub email_dlp_sender: Option<String>,
    #[serde(rename = "emailDLPFrom", skip_serializing_if = "Option::is_none")]
    pub email_dlp_from: Option<String>,
    #[serde(rename = "emailDLPRecipients", skip_serializing_if = "Option::is_none")]
    pub email_dlp_recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outside_active_hours: Option<bool>,
    #[serde(
        rename = "identifiedExtensionMimeType",
        skip_serializing_if = "Option::is_none"
    )]
    pub identified_extension_mime_type: Option<String>,
    #[serde(
        rename = "currentExtensionMimeType",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_extension_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspicious_file_type_mismatch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_files_backup_path: Option<String>,
}

/// Authentication response from the auth endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthData {
    pub data: AuthToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
}

/// The token carried in every event-search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthToken {
    pub v3_user_token: String,
}

/// The JSON body POSTed to the event-search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub groups: Vec<FilterGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_key: Option<String>,
}

/// One group of filters combined by `filterClause`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_clause: Option<String>,
}

/// A single `{operator, term, value}` filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub operator: String,
    pub term: String,
    pub value: String,
}

impl SearchQuery {
    /// Returns the parsed value of the first filter with the given operator.
    ///
    /// An absent filter or an empty value is `Ok(None)`; a present value that
    /// fails to parse as RFC 3339 is an error.
    ///
    /// # Errors
    ///
    /// Returns [`chrono::ParseError`] if the filter value is non-empty and
    /// not a valid RFC 3339 timestamp.
    pub fn bound(&self, operator: &str) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
        for group in &self.groups {
            for filter in &group.filters {
                if filter.operator == operator {
                    if filter.value.is_empty() {
                        return Ok(None);
                    }
                    return DateTime::parse_from_rfc3339(&filter.value)
                        .map(|t| Some(t.with_timezone(&Utc)));
                }
            }
        }
        Ok(None)
    }

    /// Returns the `ON_OR_AFTER` bound, if any.
    ///
    /// # Errors
    ///
    /// Returns [`chrono::ParseError`] if the stored value is unparseable.
    pub fn on_or_after(&self) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
        self.bound(ON_OR_AFTER)
    }

    /// Returns the `ON_OR_BEFORE` bound, if any.
    ///
    /// # Errors
    ///
    /// Returns [`chrono::ParseError`] if the stored value is unparseable.
    pub fn on_or_before(&self) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
        self.bound(ON_OR_BEFORE)
    }

    /// Overwrites the value of every filter with the given operator.
    ///
    /// Values are rendered with millisecond precision and a `Z` suffix, the
    /// format the upstream expects.
    pub fn set_bound(&mut self, operator: &str, timestamp: DateTime<Utc>) {
        let value = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        for group in &mut self.groups {
            for filter in &mut group.filters {
                if filter.operator == operator {
                    filter.value.clone_from(&value);
                }
            }
        }
    }

    /// Sets both window bounds in one call.
    pub fn set_window(&mut self, on_or_after: DateTime<Utc>, on_or_before: DateTime<Utc>) {
        self.set_bound(ON_OR_AFTER, on_or_after);
        self.set_bound(ON_OR_BEFORE, on_or_before);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn query_with_window(after: &str, before: &str) -> SearchQuery {
        SearchQuery {
            groups: vec![FilterGroup {
                filters: vec![
                    Filter {
                        operator: ON_OR_AFTER.to_string(),
                        term: "eventTimestamp".to_string(),
                        value: after.to_string(),
                    },
                    Filter {
                        operator: ON_OR_BEFORE.to_string(),
                        term: "eventTimestamp".to_string(),
                        value: before.to_string(),
                    },
                ],
                filter_clause: Some("AND".to_string()),
            }],
            ..SearchQuery::default()
        }
    }

    #[test]
    fn reads_window_bounds() {
        let query = query_with_window("2024-01-01T00:00:00Z", "2024-01-01T01:00:00Z");
        let after = query.on_or_after().unwrap().unwrap();
        let before = query.on_or_before().unwrap().unwrap();
        assert_eq!(after, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(before, Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn empty_bound_is_none() {
        let query = query_with_window("", "2024-01-01T01:00:00Z");
        assert!(query.on_or_after().unwrap().is_none());
    }

    #[test]
    fn garbage_bound_is_error() {
        let query = query_with_window("not-a-time", "");
        assert!(query.on_or_after().is_err());
    }

    #[test]
    fn set_window_renders_millisecond_precision() {
        let mut query = query_with_window("", "");
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let before = after + chrono::Duration::milliseconds(300_001);
        query.set_window(after, before);
        assert_eq!(
            query.groups[0].filters[0].value,
            "2024-01-01T00:00:00.000Z"
        );
        assert_eq!(
            query.groups[0].filters[1].value,
            "2024-01-01T00:05:00.001Z"
        );
    }

    #[test]
    fn event_round_trips_camel_case() {
        let raw = r#"{"eventId":"e1","eventType":"CREATED","publicIpAddress":"203.0.113.7","emailDLPSubject":"q"}"#;
        let event: FileEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_id.as_deref(), Some("e1"));
        assert_eq!(event.email_dlp_subject.as_deref(), Some("q"));
        let out = serde_json::to_string(&event).unwrap();
        assert!(out.contains("\"publicIpAddress\":\"203.0.113.7\""));
        assert!(out.contains("\"emailDLPSubject\":\"q\""));
        assert!(!out.contains("fileName"));
    }
}
