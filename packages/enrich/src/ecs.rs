//! ECS-nested output shape.
//!
//! Maps the upstream record onto Elastic Common Schema groups (`event`,
//! `file`, `user`, `host`) and keeps every field with no ECS home under the
//! vendor-namespaced `code_42` block, so the reshape is lossless.

use chrono::{DateTime, Utc};
use ffs_puller_event_models::FileEvent;
use ffs_puller_geo_models::{GeoPoint, Location};
use serde::Serialize;

/// Username sentinel the upstream reports when the device owner is unknown.
const NAME_NOT_AVAILABLE: &str = "NAME_NOT_AVAILABLE";

/// The ECS document.
#[derive(Debug, Clone, Serialize)]
pub struct EcsEvent {
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostBlock>,
    pub code_42: Code42,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// ECS categorisation derived from the upstream event type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// The upstream event type verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HashBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Private addresses plus the public address, deduplicated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoBlock>,
}

/// ECS `geo` field set, populated from the cached location.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_iso_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_iso_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Upstream fields with no ECS mapping, preserved verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Code42 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identified_extension_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_extension_category: Option<String>,
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
    pub public_ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip_addresses: Option<Vec<String>>,
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
    pub sync_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
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
    #[serde(
        rename = "emailDLPPolicyNames",
        skip_serializing_if = "Option::is_none"
    )]
    pub email_dlp_policy_names: Option<Vec<String>>,
    #[serde(rename = "emailDLPSubject", skip_serializing_if = "Option::is_none")]
    pub email_dlp_subject: Option<String>,
    #[serde(rename = "emailDLPSender", skip_serializing_if = "Option::is_none")]
    pub email_dlp_sender: Option<String>,
    #[serde(rename = "emailDLPFrom", skip_serializing_if = "Option::is_none")]
    pub email_dlp_from: Option<String>,
    #[serde(
        rename = "emailDLPRecipients",
        skip_serializing_if = "Option::is_none"
    )]
    pub email_dlp_recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outside_active_hours: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_files_backup_path: Option<String>,
}

/// ECS `event.type` value for an upstream event type.
#[must_use]
pub fn event_type_for(upstream: &str) -> &'static str {
    match upstream.to_ascii_lowercase().as_str() {
        "created" => "creation",
        "modified" => "change",
        "deleted" => "deletion",
        _ => "info",
    }
}

/// ECS `file.type` value for an upstream file type.
#[must_use]
pub fn file_type_for(upstream: &str) -> &'static str {
    match upstream.to_ascii_lowercase().as_str() {
        "file" | "win_nds" | "mac_rsrc" | "fifo" | "bundle" => "file",
        "dir" | "block_device" | "char_device" => "dir",
        "symlink" => "symlink",
        _ => "unknown",
    }
}

/// The extension of a file name, if it has one.
#[must_use]
pub fn extension_for(file_name: &str) -> Option<String> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_string()),
        _ => None,
    }
}

/// Builds the ECS shape.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn reshape(event: FileEvent, location: Option<Location>) -> EcsEvent {
    let event_block = EventBlock {
        id: event.event_id,
        event_type: event.event_type.as_deref().map(|t| event_type_for(t).to_string()),
        action: event.event_type,
        created: event.event_timestamp,
        ingested: event.insertion_timestamp,
        module: event.source,
        dataset: event.exposure,
    };

    let hash = non_empty(HashBlock {
        md5: event.md5_checksum,
        sha256: event.sha256_checksum,
    });

    let file_block = FileBlock {
        path: event.file_path,
        extension: event.file_name.as_deref().and_then(extension_for),
        name: event.file_name,
        file_type: event.file_type.as_deref().map(|t| file_type_for(t).to_string()),
        size: event.file_size,
        owner: event.file_owner,
        hash,
        created: event.created_timestamp,
        mtime: event.modify_timestamp,
        directory: event.directory_id,
    };

    let user_block = user_block(
        event.device_username.as_deref(),
        event.actor.as_deref(),
        event.user_uid.clone(),
    );

    let host_ips = host_ips(
        event.private_ip_addresses.as_deref(),
        event.public_ip_address.as_deref(),
    );
    let host_block = HostBlock {
        id: event.device_uid,
        name: event.os_hostname,
        domain: event.domain_name,
        ip: host_ips,
        geo: location.as_ref().and_then(geo_block),
    };

    let code_42 = Code42 {
        actor: event.actor,
        file_category: event.file_category,
        identified_extension_category: event.identified_extension_category,
        current_extension_category: event.current_extension_category,
        identified_extension_mime_type: event.identified_extension_mime_type,
        current_extension_mime_type: event.current_extension_mime_type,
        suspicious_file_type_mismatch: event.suspicious_file_type_mismatch,
        public_ip_address: event.public_ip_address,
        private_ip_addresses: event.private_ip_addresses,
        url: event.url,
        shared: event.shared,
        shared_with: event.shared_with,
        sharing_type_added: event.sharing_type_added,
        cloud_drive_id: event.cloud_drive_id,
        detection_source_alias: event.detection_source_alias,
        sync_destination: event.sync_destination,
        file_id: event.file_id,
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
        email_dlp_policy_names: event.email_dlp_policy_names,
        email_dlp_subject: event.email_dlp_subject,
        email_dlp_sender: event.email_dlp_sender,
        email_dlp_from: event.email_dlp_from,
        email_dlp_recipients: event.email_dlp_recipients,
        outside_active_hours: event.outside_active_hours,
        print_job_name: event.print_job_name,
        printer_name: event.printer_name,
        printed_files_backup_path: event.printed_files_backup_path,
    };

    EcsEvent {
        timestamp: event.event_timestamp,
        event: non_empty(event_block),
        file: non_empty(file_block),
        user: user_block,
        host: non_empty(host_block),
        code_42,
    }
}

fn user_block(
    device_username: Option<&str>,
    actor: Option<&str>,
    user_uid: Option<String>,
) -> Option<UserBlock> {
    let identity = match device_username {
        Some(NAME_NOT_AVAILABLE) | None => actor,
        Some(name) => Some(name),
    };

    let (name, domain) = match identity {
        Some(identity) => match identity.split_once('@') {
            Some((name, domain)) => (Some(name.to_string()), Some(domain.to_string())),
            None => (Some(identity.to_string()), None),
        },
        None => (None, None),
    };

    non_empty(UserBlock {
        name,
        domain,
        email: identity.map(ToString::to_string),
        id: user_uid,
    })
}

fn host_ips(private: Option<&[String]>, public: Option<&str>) -> Option<Vec<String>> {
    let mut ips: Vec<String> = private.map(<[String]>::to_vec).unwrap_or_default();
    if let Some(public) = public {
        if !public.is_empty() && !ips.iter().any(|ip| ip == public) {
            ips.push(public.to_string());
        }
    }
    if ips.is_empty() {
        None
    } else {
        Some(ips)
    }
}

fn geo_block(location: &Location) -> Option<GeoBlock> {
    non_empty(GeoBlock {
        country_name: location.country.clone(),
        country_iso_code: location.country_code.clone(),
        region_name: location.region_name.clone(),
        region_iso_code: location.region.clone(),
        city_name: location.city.clone(),
        postal_code: location.zip.clone(),
        timezone: location.timezone.clone(),
        location: location.geo_point(),
    })
}

fn non_empty<T: Default + PartialEq>(block: T) -> Option<T> {
    if block == T::default() {
        None
    } else {
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> FileEvent {
        FileEvent {
            event_id: Some("e1".to_string()),
            event_type: Some("MODIFIED".to_string()),
            file_type: Some("SYMLINK".to_string()),
            file_name: Some("report.docx".to_string()),
            device_username: Some("alice@example.com".to_string()),
            user_uid: Some("u-9".to_string()),
            public_ip_address: Some("203.0.113.7".to_string()),
            private_ip_addresses: Some(vec!["10.0.0.2".to_string()]),
            tab_url: Some("https://drive.example.com".to_string()),
            ..FileEvent::default()
        }
    }

    #[test]
    fn derives_ecs_event_and_file_fields() {
        let ecs = reshape(sample_event(), None);

        let event = ecs.event.unwrap();
        assert_eq!(event.event_type.as_deref(), Some("change"));
        assert_eq!(event.action.as_deref(), Some("MODIFIED"));

        let file = ecs.file.unwrap();
        assert_eq!(file.file_type.as_deref(), Some("symlink"));
        assert_eq!(file.extension.as_deref(), Some("docx"));
        assert_eq!(file.name.as_deref(), Some("report.docx"));
    }

    #[test]
    fn splits_username_into_name_and_domain() {
        let ecs = reshape(sample_event(), None);
        let user = ecs.user.unwrap();
        assert_eq!(user.name.as_deref(), Some("alice"));
        assert_eq!(user.domain.as_deref(), Some("example.com"));
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
        assert_eq!(user.id.as_deref(), Some("u-9"));
    }

    #[test]
    fn falls_back_to_actor_when_username_unavailable() {
        let mut event = sample_event();
        event.device_username = Some("NAME_NOT_AVAILABLE".to_string());
        event.actor = Some("bob@corp.example".to_string());

        let user = reshape(event, None).user.unwrap();
        assert_eq!(user.name.as_deref(), Some("bob"));
        assert_eq!(user.domain.as_deref(), Some("corp.example"));
    }

    #[test]
    fn host_ip_is_private_union_public() {
        let ecs = reshape(sample_event(), None);
        let host = ecs.host.unwrap();
        assert_eq!(
            host.ip.as_deref(),
            Some(&["10.0.0.2".to_string(), "203.0.113.7".to_string()][..])
        );
    }

    #[test]
    fn host_geo_comes_from_the_location() {
        let location = Location {
            status: Some("success".to_string()),
            country: Some("Netherlands".to_string()),
            country_code: Some("NL".to_string()),
            city: Some("Amsterdam".to_string()),
            lat: Some(52.37),
            lon: Some(4.89),
            ..Location::default()
        };
        let geo = reshape(sample_event(), Some(location))
            .host
            .unwrap()
            .geo
            .unwrap();
        assert_eq!(geo.country_name.as_deref(), Some("Netherlands"));
        assert_eq!(geo.country_iso_code.as_deref(), Some("NL"));
        assert_eq!(geo.city_name.as_deref(), Some("Amsterdam"));
        assert!(geo.location.is_some());
    }

    #[test]
    fn unmapped_fields_survive_under_code_42() {
        let value = serde_json::to_value(reshape(sample_event(), None)).unwrap();
        assert_eq!(value["code_42"]["tabUrl"], "https://drive.example.com");
        assert_eq!(value["code_42"]["publicIpAddress"], "203.0.113.7");
        assert_eq!(value["event"]["type"], "change");
    }

    #[test]
    fn file_type_mapping_table() {
        for (upstream, expected) in [
            ("FILE", "file"),
            ("WIN_NDS", "file"),
            ("MAC_RSRC", "file"),
            ("FIFO", "file"),
            ("BUNDLE", "file"),
            ("DIR", "dir"),
            ("BLOCK_DEVICE", "dir"),
            ("CHAR_DEVICE", "dir"),
            ("SYMLINK", "symlink"),
            ("SOCKET", "unknown"),
        ] {
            assert_eq!(file_type_for(upstream), expected, "{upstream}");
        }
    }

    #[test]
    fn event_type_mapping_table() {
        for (upstream, expected) in [
            ("CREATED", "creation"),
            ("MODIFIED", "change"),
            ("DELETED", "deletion"),
            ("READ_BY_APP", "info"),
        ] {
            assert_eq!(event_type_for(upstream), expected, "{upstream}");
        }
    }

    #[test]
    fn extension_edge_cases() {
        assert_eq!(extension_for("report.docx").as_deref(), Some("docx"));
        assert_eq!(extension_for("archive.tar.gz").as_deref(), Some("gz"));
        assert!(extension_for("Makefile").is_none());
        assert!(extension_for(".bashrc").is_none());
        assert!(extension_for("trailing.").is_none());
    }

    #[test]
    fn empty_event_collapses_blocks() {
        let ecs = reshape(FileEvent::default(), None);
        assert!(ecs.event.is_none());
        assert!(ecs.file.is_none());
        assert!(ecs.user.is_none());
        assert!(ecs.host.is_none());
        assert!(ecs.timestamp.is_none());
    }
}
