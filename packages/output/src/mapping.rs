//! Index settings and mapping for engine-owned Elasticsearch indices.
//!
//! The mapping covers the flat document fields plus the geolocation
//! enrichment, including the `geoPoint` pair used for map visualisations.
//! Deployments that manage their own index templates bypass this entirely
//! via `useCustomIndexPattern`.

use serde_json::{json, Map, Value};

use crate::elastic::ElasticSettings;

/// Builds the index-creation body for the given settings.
#[must_use]
pub fn index_body(settings: &ElasticSettings) -> Value {
    let mut index = Map::new();
    if settings.best_compression {
        index.insert("codec".to_string(), json!("best_compression"));
    }
    index.insert(
        "number_of_shards".to_string(),
        json!(settings.number_of_shards),
    );
    index.insert(
        "number_of_replicas".to_string(),
        json!(settings.number_of_replicas),
    );

    let aliases: Map<String, Value> = settings
        .aliases
        .iter()
        .map(|alias| (alias.clone(), json!({})))
        .collect();

    json!({
        "settings": { "index": Value::Object(index) },
        "mappings": {
            "_source": { "enabled": true },
            "properties": properties(),
        },
        "aliases": Value::Object(aliases),
    })
}

fn properties() -> Value {
    json!({
        "eventId": { "type": "keyword" },
        "eventType": { "type": "keyword" },
        "eventTimestamp": { "type": "date" },
        "insertionTimestamp": { "type": "date" },
        "filePath": { "type": "keyword" },
        "fileName": { "type": "keyword" },
        "fileType": { "type": "keyword" },
        "fileCategory": { "type": "keyword" },
        "fileSize": { "type": "long" },
        "fileOwner": { "type": "keyword" },
        "md5Checksum": { "type": "keyword" },
        "sha256Checksum": { "type": "keyword" },
        "createdTimestamp": { "type": "date" },
        "modifyTimestamp": { "type": "date" },
        "deviceUsername": { "type": "keyword" },
        "deviceUid": { "type": "keyword" },
        "userUid": { "type": "keyword" },
        "osHostname": { "type": "keyword" },
        "domainName": { "type": "keyword" },
        "publicIpAddress": { "type": "keyword" },
        "privateIpAddresses": { "type": "keyword" },
        "actor": { "type": "keyword" },
        "directoryId": { "type": "keyword" },
        "source": { "type": "keyword" },
        "url": { "type": "keyword" },
        "shared": { "type": "keyword" },
        "sharedWith": { "type": "keyword" },
        "sharingTypeAdded": { "type": "keyword" },
        "cloudDriveId": { "type": "keyword" },
        "detectionSourceAlias": { "type": "keyword" },
        "fileId": { "type": "keyword" },
        "exposure": { "type": "keyword" },
        "processOwner": { "type": "keyword" },
        "processName": { "type": "keyword" },
        "removableMediaVendor": { "type": "keyword" },
        "removableMediaName": { "type": "keyword" },
        "removableMediaSerialNumber": { "type": "keyword" },
        "removableMediaCapacity": { "type": "long" },
        "removableMediaBusType": { "type": "keyword" },
        "syncDestination": { "type": "keyword" },
        "status": { "type": "keyword" },
        "message": { "type": "keyword" },
        "continent": { "type": "keyword" },
        "continentCode": { "type": "keyword" },
        "country": { "type": "keyword" },
        "countryCode": { "type": "keyword" },
        "region": { "type": "keyword" },
        "regionName": { "type": "keyword" },
        "city": { "type": "keyword" },
        "district": { "type": "keyword" },
        "zip": { "type": "keyword" },
        "lat": { "type": "float" },
        "lon": { "type": "float" },
        "timezone": { "type": "keyword" },
        "currency": { "type": "keyword" },
        "isp": { "type": "keyword" },
        "org": { "type": "keyword" },
        "as": { "type": "keyword" },
        "asname": { "type": "keyword" },
        "reverse": { "type": "keyword" },
        "mobile": { "type": "boolean" },
        "proxy": { "type": "boolean" },
        "query": { "type": "keyword" },
        "geoPoint": { "type": "geo_point" },
    })
}
