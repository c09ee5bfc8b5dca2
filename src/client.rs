//! NetApp ONTAP API client and volume inventory types.
//!
//! The collector only depends on the [`StorageClient`] trait; [`NetAppClient`]
//! is the implementation that talks to the ONTAP REST API.

use crate::config::FilerConfig;
use crate::error::{ExporterError, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const VOLUME_FIELDS: &str = "name,state,svm.name,space";
const SHARE_PREFIX: &str = "share_";

/// Source of volume inventories for one filer.
///
/// Calls block until the whole inventory has been fetched. Pagination,
/// authentication and transport timeouts are the implementation's concern.
pub trait StorageClient: Send + Sync {
    fn list_volumes(&self) -> Result<Vec<Volume>>;
}

/// Volume state as reported by the filer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum VolumeState {
    #[default]
    Unknown = 0,
    Online = 1,
    Restricted = 2,
    Offline = 3,
    Quiesced = 4,
}

impl VolumeState {
    pub fn from_api(state: &str) -> Self {
        match state {
            "online" => Self::Online,
            "restricted" => Self::Restricted,
            "offline" => Self::Offline,
            "quiesced" => Self::Quiesced,
            _ => Self::Unknown,
        }
    }

    pub fn value(self) -> f64 {
        self as u8 as f64
    }
}

/// Snapshot of one volume at fetch time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    pub vserver: String,
    pub volume: String,
    pub project_id: String,
    pub share_id: String,
    pub share_name: String,
    pub share_type: String,
    pub state: VolumeState,
    pub size_total: u64,
    pub size_used: u64,
    pub size_available: u64,
    pub size_used_by_snapshots: u64,
    pub size_available_for_snapshots: u64,
    pub snapshot_reserve_size: u64,
    pub percentage_size_used: f64,
    pub percentage_total_space_saved: f64,
    pub percentage_compression_space_saved: f64,
    pub percentage_deduplication_space_saved: f64,
}

impl Volume {
    /// Label values in the order `vserver, volume, project_id, share_id,
    /// share_name, share_type`.
    pub fn label_values(&self) -> [&str; 6] {
        [
            self.vserver.as_str(),
            self.volume.as_str(),
            self.project_id.as_str(),
            self.share_id.as_str(),
            self.share_name.as_str(),
            self.share_type.as_str(),
        ]
    }
}

/// Recovers a share id from a volume provisioned by the share service.
///
/// Such volumes are named `share_<uuid>` with the dashes of the uuid turned
/// into underscores. Any other name yields `None`.
pub fn share_id_from_volume_name(name: &str) -> Option<String> {
    let raw = name.strip_prefix(SHARE_PREFIX)?;
    let id = raw.replace('_', "-");

    let groups: Vec<&str> = id.split('-').collect();
    let well_formed = groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()));

    well_formed.then_some(id)
}

/// Blocking ONTAP REST API client for one filer.
///
/// Must be constructed and dropped outside of an async runtime.
pub struct NetAppClient {
    client: Client,
    config: FilerConfig,
}

impl NetAppClient {
    /// Create a new client for a filer.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use netapp_exporter::client::NetAppClient;
    /// use netapp_exporter::config::FilerConfig;
    ///
    /// let config = FilerConfig {
    ///     name: "filer-a".to_string(),
    ///     host: "https://filer-a.example.com".to_string(),
    ///     username: "monitor".to_string(),
    ///     password: "secret".to_string(),
    ///     verify_tls: true,
    ///     timeout_seconds: 30,
    ///     max_records: 500,
    ///     retention_seconds: None,
    /// };
    /// let client = NetAppClient::new(config).unwrap();
    /// ```
    pub fn new(config: FilerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn base_url(&self) -> &str {
        self.config.host.trim_end_matches('/')
    }

    fn get_page(&self, url: &str) -> Result<VolumeCollection> {
        debug!("Fetching volumes from: {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            warn!("Failed to list volumes on {}: {}", self.config.name, status);
            return Err(ExporterError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            ExporterError::Parse(format!(
                "Failed to parse volume listing: {}. Body preview: {}...",
                e,
                body.chars().take(200).collect::<String>()
            ))
        })
    }
}

impl StorageClient for NetAppClient {
    fn list_volumes(&self) -> Result<Vec<Volume>> {
        let mut url = format!(
            "{}/api/storage/volumes?fields={}&max_records={}",
            self.base_url(),
            VOLUME_FIELDS,
            self.config.max_records
        );
        let mut volumes = Vec::new();
        let mut visited = HashSet::new();

        loop {
            let page = self.get_page(&url)?;
            volumes.extend(page.records.into_iter().map(Volume::from));
            visited.insert(url);

            let Some(next) = page.links.and_then(|l| l.next) else {
                break;
            };
            url = format!("{}{}", self.base_url(), next.href);
            if visited.contains(&url) {
                warn!("Filer {} links back to page {}", self.config.name, next.href);
                return Err(ExporterError::Parse(format!(
                    "pagination cycle at {}",
                    next.href
                )));
            }
        }

        Ok(volumes)
    }
}

/// One page of `GET /api/storage/volumes`.
#[derive(Debug, Deserialize)]
struct VolumeCollection {
    #[serde(default)]
    records: Vec<VolumeRecord>,
    #[serde(rename = "_links", default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct VolumeRecord {
    name: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    svm: Option<SvmRef>,
    #[serde(default)]
    space: Space,
}

#[derive(Debug, Deserialize)]
struct SvmRef {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Space {
    size: u64,
    used: u64,
    available: u64,
    percent_used: f64,
    total_space_saved_percent: f64,
    compression_space_saved_percent: f64,
    dedupe_space_saved_percent: f64,
    snapshot: SnapshotSpace,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotSpace {
    used: u64,
    reserve_available: u64,
    reserve_size: u64,
}

impl From<VolumeRecord> for Volume {
    fn from(record: VolumeRecord) -> Self {
        let share_id = share_id_from_volume_name(&record.name).unwrap_or_default();
        let space = record.space;

        Volume {
            vserver: record.svm.map(|s| s.name).unwrap_or_default(),
            share_id,
            state: record
                .state
                .as_deref()
                .map(VolumeState::from_api)
                .unwrap_or_default(),
            size_total: space.size,
            size_used: space.used,
            size_available: space.available,
            size_used_by_snapshots: space.snapshot.used,
            size_available_for_snapshots: space.snapshot.reserve_available,
            snapshot_reserve_size: space.snapshot.reserve_size,
            percentage_size_used: space.percent_used,
            percentage_total_space_saved: space.total_space_saved_percent,
            percentage_compression_space_saved: space.compression_space_saved_percent,
            percentage_deduplication_space_saved: space.dedupe_space_saved_percent,
            volume: record.name,
            ..Default::default()
        }
    }
}
