//! Legacy flat output shape.
//!
//! The upstream record copied into a flat snake_cased document, with the
//! geolocation attached as a `geo` sibling object. Predates the ECS shape and
//! is kept for existing index templates.

use chrono::{DateTime, Utc};
use ffs_puller_event_models::FileEvent;
use ffs_puller_geo_models::{GeoPoint, Location};
use serde::Serialize;

/// Flat snake_cased rendition of the upstream record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlatFileEvent {
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_dlp_policy_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_dlp_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_dlp_sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_dlp_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_dlp_recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outside_active_hours: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identified_extension_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
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

/// Geolocation sibling in the flat shape.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlatGeo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub as_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Coordinate pair, only when both coordinates are non-zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// The flat document: snake_cased record plus `geo`.
#[derive(Debug, Clone, Serialize)]
pub struct FlatEvent {
    #[serde(flatten)]
    pub file_event: FlatFileEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<FlatGeo>,
}

/// Builds the flat shape. The `geo` sibling is attached only when the
/// location carries a status (a statusless record has nothing to say).
#[must_use]
pub fn reshape(event: FileEvent, location: Option<Location>) -> FlatEvent {
    let geo = location
        .filter(|l| l.status.as_deref().is_some_and(|s| !s.is_empty()))
        .map(flat_geo);

    FlatEvent {
        file_event: flatten_event(event),
        geo,
    }
}

fn flatten_event(event: FileEvent) -> FlatFileEvent {
    FlatFileEvent {
        event_id: event.event_id,
        event_type: event.event_type,
        event_timestamp: event.event_timestamp,
        insertion_timestamp: event.insertion_timestamp,
        file_path: event.file_path,
        file_name: event.file_name,
        file_type: event.file_type,
        file_category: event.file_category,
        identified_extension_category: event.identified_extension_category,
        current_extension_category: event.current_extension_category,
        file_size: event.file_size,
        file_owner: event.file_owner,
        md5_checksum: event.md5_checksum,
        sha256_checksum: event.sha256_checksum,
        created_timestamp: event.created_timestamp,
        modify_timestamp: event.modify_timestamp,
        device_username: event.device_username,
        device_uid: event.device_uid,
        user_uid: event.user_uid,
        os_hostname: event.os_hostname,
        domain_name: event.domain_name,
        public_ip_address: event.public_ip_address,
        private_ip_addresses: event.private_ip_addresses,
        actor: event.actor,
        directory_id: event.directory_id,
        source: event.source,
        url: event.url,
        shared: event.shared,
        shared_with: event.shared_with,
        sharing_type_added: event.sharing_type_added,
        cloud_drive_id: event.cloud_drive_id,
        detection_source_alias: event.detection_source_alias,
        file_id: event.file_id,
        exposure: event.exposure,
        process_owner: event.process_owner,
        process_name: event.process_name,
        tab_window_title: event.tab_window_title,
        tab_url: event.tab_url,
        removable_media_vendor: event.removable_media_vendor,
        removable_media_name: event.removable_media_name,
        removable_media_serial_number: event.removable_media_serial_number,
        removable_media_capacity: event.removable_media_capacity,
        removable_media_bus_type: event.removable_media_bus_type,
        removable_media_media_name: event.removable_media_media_name,
        removable_media_volume_name: event.removable_media_volume_name,
        removable_media_partition_id: event.removable_media_partition_id,
        sync_destination: event.sync_destination,
        email_dlp_policy_names: event.email_dlp_policy_names,
        email_dlp_subject: event.email_dlp_subject,
        email_dlp_sender: event.email_dlp_sender,
        email_dlp_from: event.email_dlp_from,
        email_dlp_recipients: event.email_dlp_recipients,
        outside_active_hours: event.outside_active_hours,
        identified_extension_mime_type: event.identified_extension_mime_type,
        current_extension_mime_type: event.current_extension_mime_type,
        suspicious_file_type_mismatch: event.suspicious_file_type_mismatch,
        print_job_name: event.print_job_name,
        printer_name: event.printer_name,
        printed_files_backup_path: event.printed_files_backup_path,
    }
}

fn flat_geo(location: Location) -> FlatGeo {
    let point = location.geo_point();
    FlatGeo {
        status: location.status,
        message: location.message,
        continent: location.continent,
        continent_code: location.continent_code,
        country: location.country,
        country_code: location.country_code,
        region: location.region,
        region_name: location.region_name,
        city: location.city,
        district: location.district,
        zip: location.zip,
        lat: location.lat,
        lon: location.lon,
        timezone: location.timezone,
        currency: location.currency,
        isp: location.isp,
        org: location.org,
        as_number: location.as_number,
        asname: location.as_name,
        reverse: location.reverse,
        mobile: location.mobile,
        proxy: location.proxy,
        hosting: location.hosting,
        query: location.query,
        location: point,
    }
}
