//! CSV decoding for event-search responses.
//!
//! The event-search endpoint streams results as CSV. The header row is the
//! schema contract: it must match [`CSV_HEADERS`] exactly, otherwise the
//! upstream changed shape underneath us and decoding anything would risk
//! silently mis-assigning columns.

use chrono::{DateTime, NaiveDateTime, Utc};
use ffs_puller_event_models::FileEvent;

use crate::ClientError;

/// The recognized response columns, in order.
pub const CSV_HEADERS: [&str; 59] = [
    "Event ID",
    "Event type",
    "Date Observed (UTC)",
    "Date Inserted (UTC)",
    "File path",
    "Filename",
    "File type",
    "File Category",
    "Identified Extension Category",
    "Current Extension Category",
    "File size (bytes)",
    "File Owner",
    "MD5 Hash",
    "SHA-256 Hash",
    "Create Date",
    "Modified Date",
    "Username",
    "Device ID",
    "User UID",
    "Hostname",
    "Fully Qualified Domain Name",
    "IP address (public)",
    "IP address (private)",
    "Actor",
    "Directory ID",
    "Source",
    "URL",
    "Shared",
    "Shared With",
    "File exposure changed to",
    "Cloud drive ID",
    "Detection Source Alias",
    "File Id",
    "Exposure Type",
    "Process Owner",
    "Process Name",
    "Tab/Window Title",
    "Tab URL",
    "Removable Media Vendor",
    "Removable Media Name",
    "Removable Media Serial Number",
    "Removable Media Capacity",
    "Removable Media Bus Type",
    "Removable Media Media Name",
    "Removable Media Volume Name",
    "Removable Media Partition Id",
    "Sync Destination",
    "Email DLP Policy Names",
    "Email DLP Subject",
    "Email DLP Sender",
    "Email DLP From",
    "Email DLP Recipients",
    "Outside Active Hours",
    "Identified Extension MIME Type",
    "Current Extension MIME Type",
    "Suspicious File Type Mismatch",
    "Print Job Name",
    "Printer Name",
    "Printed Files Backup Path",
];

/// Decodes a full CSV response body into file events.
///
/// # Errors
///
/// Returns [`ClientError::SchemaDrift`] when the header row differs from
/// [`CSV_HEADERS`], [`ClientError::Csv`] on malformed CSV, and
/// [`ClientError::Field`] when a cell fails to parse into its typed field.
pub fn decode_events(body: &[u8]) -> Result<Vec<FileEvent>, ClientError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(body);

    {
        let headers = reader.headers()?;
        if headers.iter().ne(CSV_HEADERS.iter().copied()) {
            return Err(ClientError::SchemaDrift {
                columns: headers.iter().collect::<Vec<_>>().join(","),
            });
        }
    }

    let mut events = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = index as u64 + 2;
        events.push(record_to_event(&record, line)?);
    }
    Ok(events)
}

fn record_to_event(record: &csv::StringRecord, line: u64) -> Result<FileEvent, ClientError> {
    let cell = |i: usize| record.get(i).unwrap_or_default();

    Ok(FileEvent {
        event_id: opt_string(cell(0)),
        event_type: opt_string(cell(1)),
        event_timestamp: opt_rfc3339(cell(2), line, "Date Observed (UTC)")?,
        insertion_timestamp: opt_rfc3339(cell(3), line, "Date Inserted (UTC)")?,
        file_path: opt_string(cell(4)),
        file_name: opt_string(cell(5)),
        file_type: opt_string(cell(6)),
        file_category: opt_string(cell(7)),
        identified_extension_category: opt_string(cell(8)),
        current_extension_category: opt_string(cell(9)),
        file_size: opt_int(cell(10), line, "File size (bytes)")?,
        file_owner: opt_list(cell(11)),
        md5_checksum: opt_string(cell(12)),
        sha256_checksum: opt_string(cell(13)),
        created_timestamp: opt_naive(cell(14), line, "Create Date")?,
        modify_timestamp: opt_naive(cell(15), line, "Modified Date")?,
        device_username: opt_string(cell(16)),
        device_uid: opt_string(cell(17)),
        user_uid: opt_string(cell(18)),
        os_hostname: opt_string(cell(19)),
        domain_name: opt_string(cell(20)),
        public_ip_address: opt_string(cell(21)),
        private_ip_addresses: opt_list(cell(22)),
        actor: opt_string(cell(23)),
        directory_id: opt_list(cell(24)),
        source: opt_string(cell(25)),
        url: opt_string(cell(26)),
        shared: opt_bool(cell(27), line, "Shared")?,
        shared_with: opt_list(cell(28)),
        sharing_type_added: opt_list(cell(29)),
        cloud_drive_id: opt_string(cell(30)),
        detection_source_alias: opt_string(cell(31)),
        file_id: opt_string(cell(32)),
        exposure: opt_list(cell(33)),
        process_owner: opt_string(cell(34)),
        process_name: opt_string(cell(35)),
        tab_window_title: opt_string(cell(36)),
        tab_url: opt_string(cell(37)),
        removable_media_vendor: opt_string(cell(38)),
        removable_media_name: opt_string(cell(39)),
        removable_media_serial_number: opt_string(cell(40)),
        removable_media_capacity: opt_int(cell(41), line, "Removable Media Capacity")?,
        removable_media_bus_type: opt_string(cell(42)),
        removable_media_media_name: opt_string(cell(43)),
        removable_media_volume_name: opt_string(cell(44)),
        removable_media_partition_id: opt_string(cell(45)),
        sync_destination: opt_string(cell(46)),
        email_dlp_policy_names: opt_list(cell(47)),
        email_dlp_subject: opt_string(cell(48)),
        email_dlp_sender: opt_string(cell(49)),
        email_dlp_from: opt_string(cell(50)),
        email_dlp_recipients: opt_list(cell(51)),
        outside_active_hours: opt_bool(cell(52), line, "Outside Active Hours")?,
        identified_extension_mime_type: opt_string(cell(53)),
        current_extension_mime_type: opt_string(cell(54)),
        suspicious_file_type_mismatch: opt_bool(cell(55), line, "Suspicious File Type Mismatch")?,
        print_job_name: opt_string(cell(56)),
        printer_name: opt_string(cell(57)),
        printed_files_backup_path: opt_string(cell(58)),
    })
}

fn opt_string(cell: &str) -> Option<String> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

fn opt_list(cell: &str) -> Option<Vec<String>> {
    if cell.is_empty() {
        None
    } else {
        Some(cell.split(',').map(ToString::to_string).collect())
    }
}

fn opt_rfc3339(
    cell: &str,
    line: u64,
    column: &str,
) -> Result<Option<DateTime<Utc>>, ClientError> {
    if cell.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(cell)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| ClientError::Field {
            line,
            message: format!("bad {column} timestamp {cell:?}: {e}"),
        })
}

fn opt_naive(cell: &str, line: u64, column: &str) -> Result<Option<DateTime<Utc>>, ClientError> {
    if cell.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S")
        .map(|t| Some(t.and_utc()))
        .map_err(|e| ClientError::Field {
            line,
            message: format!("bad {column} timestamp {cell:?}: {e}"),
        })
}

fn opt_int(cell: &str, line: u64, column: &str) -> Result<Option<i64>, ClientError> {
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<i64>()
        .map(Some)
        .map_err(|e| ClientError::Field {
            line,
            message: format!("bad {column} integer {cell:?}: {e}"),
        })
}

fn opt_bool(cell: &str, line: u64, column: &str) -> Result<Option<bool>, ClientError> {
    if cell.is_empty() {
        return Ok(None);
    }
    match cell {
        "true" | "TRUE" | "True" => Ok(Some(true)),
        "false" | "FALSE" | "False" => Ok(Some(false)),
        other => Err(ClientError::Field {
            line,
            message: format!("bad {column} boolean {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_line() -> String {
        CSV_HEADERS.join(",")
    }

    fn row(cells: &[(usize, &str)]) -> String {
        let mut fields = vec![String::new(); CSV_HEADERS.len()];
        for (index, value) in cells {
            fields[*index] = (*value).to_string();
        }
        fields
            .iter()
            .map(|f| {
                if f.contains(',') {
                    format!("\"{f}\"")
                } else {
                    f.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn decodes_a_typical_row() {
        let body = format!(
            "{}\n{}\n",
            header_line(),
            row(&[
                (0, "evt-1"),
                (1, "CREATED"),
                (2, "2024-01-01T10:00:00.123Z"),
                (3, "2024-01-01T10:01:00Z"),
                (5, "report.docx"),
                (10, "2048"),
                (11, "alice,bob"),
                (14, "2023-12-31 09:30:00"),
                (16, "alice@example.com"),
                (21, "203.0.113.7"),
                (22, "10.0.0.2%eth0,10.0.0.3"),
                (27, "TRUE"),
            ])
        );

        let events = decode_events(body.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_id.as_deref(), Some("evt-1"));
        assert_eq!(event.file_size, Some(2048));
        assert_eq!(
            event.file_owner.as_deref(),
            Some(&["alice".to_string(), "bob".to_string()][..])
        );
        assert_eq!(event.shared, Some(true));
        assert_eq!(
            event.private_ip_addresses.as_deref(),
            Some(&["10.0.0.2%eth0".to_string(), "10.0.0.3".to_string()][..])
        );
        assert_eq!(
            event.event_timestamp.unwrap().timestamp_millis(),
            1_704_103_200_123
        );
        assert!(event.created_timestamp.is_some());
        assert!(event.md5_checksum.is_none());
    }

    #[test]
    fn empty_cells_decode_to_none() {
        let body = format!("{}\n{}\n", header_line(), row(&[(0, "evt-2")]));
        let events = decode_events(body.as_bytes()).unwrap();
        assert!(events[0].event_timestamp.is_none());
        assert!(events[0].file_size.is_none());
        assert!(events[0].shared.is_none());
        assert!(events[0].exposure.is_none());
    }

    #[test]
    fn header_drift_is_rejected() {
        let mut headers: Vec<&str> = CSV_HEADERS.to_vec();
        headers.push("Brand New Column");
        let body = format!("{}\n", headers.join(","));

        let err = decode_events(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ClientError::SchemaDrift { .. }));
        assert!(err.to_string().contains("Brand New Column"));
    }

    #[test]
    fn reordered_headers_are_rejected() {
        let mut headers: Vec<&str> = CSV_HEADERS.to_vec();
        headers.swap(0, 1);
        let body = format!("{}\n", headers.join(","));

        assert!(matches!(
            decode_events(body.as_bytes()),
            Err(ClientError::SchemaDrift { .. })
        ));
    }

    #[test]
    fn bad_timestamp_names_the_line() {
        let body = format!(
            "{}\n{}\n",
            header_line(),
            row(&[(2, "yesterday-ish")])
        );
        let err = decode_events(body.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("record on line 2"));
    }

    #[test]
    fn header_only_body_is_empty() {
        let body = format!("{}\n", header_line());
        assert!(decode_events(body.as_bytes()).unwrap().is_empty());
    }
}
