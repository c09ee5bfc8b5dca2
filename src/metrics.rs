//! Prometheus metrics definitions and collection logic.
//!
//! Every volume of a filer is exported as the same fixed set of gauges, all
//! sharing one label schema. [`VolumeCollector`] implements the registry's
//! [`Collector`] contract: `desc()` lists the gauges, `collect()` serves the
//! cached volume inventory and fetches a fresh one when the cache is empty.
//!
//! # Caching
//!
//! A successful fetch that returned at least one volume is kept for the
//! retention period. A one-shot timer thread then clears it, whether or not
//! any scrape happens in between. A fetch that returned no volumes is not
//! retained: the next collect fetches again. A failed fetch leaves the cache
//! empty and exports nothing for that cycle.
//!
//! One mutex per collector guards the cache and the fetch decision, so
//! concurrent scrapes of the same filer wait for a fetch already in flight
//! instead of starting their own.

use crate::client::{StorageClient, Volume};
use crate::error::{ExporterError, Result};
use crate::health::FetchFailure;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, warn};

/// Variable labels shared by every volume metric.
pub const VOLUME_LABELS: [&str; 6] = [
    "vserver",
    "volume",
    "project_id",
    "share_id",
    "share_name",
    "share_type",
];

/// Constant label carrying the filer a collector belongs to.
pub const FILER_LABEL: &str = "filer";

/// One entry of the volume metric table.
pub struct VolumeMetric {
    pub name: &'static str,
    pub help: &'static str,
    pub extract: fn(&Volume) -> f64,
}

/// Gauges exported per volume, in export order.
pub static VOLUME_METRICS: [VolumeMetric; 11] = [
    VolumeMetric {
        name: "netapp_volume_state",
        help: "Netapp Volume Metrics: state (1: online; 2: restricted; 3: offline; 4: quiesced)",
        extract: |v| v.state.value(),
    },
    VolumeMetric {
        name: "netapp_volume_total_bytes",
        help: "Netapp Volume Metrics: total size",
        extract: |v| v.size_total as f64,
    },
    VolumeMetric {
        name: "netapp_volume_used_bytes",
        help: "Netapp Volume Metrics: used size",
        extract: |v| v.size_used as f64,
    },
    VolumeMetric {
        name: "netapp_volume_available_bytes",
        help: "Netapp Volume Metrics: available size",
        extract: |v| v.size_available as f64,
    },
    VolumeMetric {
        name: "netapp_volume_snapshot_used_bytes",
        help: "Netapp Volume Metrics: size used by snapshots",
        extract: |v| v.size_used_by_snapshots as f64,
    },
    VolumeMetric {
        name: "netapp_volume_snapshot_available_bytes",
        help: "Netapp Volume Metrics: size available for snapshots",
        extract: |v| v.size_available_for_snapshots as f64,
    },
    VolumeMetric {
        name: "netapp_volume_snapshot_reserved_bytes",
        help: "Netapp Volume Metrics: size reserved for snapshots",
        extract: |v| v.snapshot_reserve_size as f64,
    },
    VolumeMetric {
        name: "netapp_volume_used_percentage",
        help: "Netapp Volume Metrics: used percentage",
        extract: |v| v.percentage_size_used,
    },
    VolumeMetric {
        name: "netapp_volume_saved_total_percentage",
        help: "Netapp Volume Metrics: percentage of space compression and deduplication saved",
        extract: |v| v.percentage_total_space_saved,
    },
    VolumeMetric {
        name: "netapp_volume_saved_compression_percentage",
        help: "Netapp Volume Metrics: percentage of space compression saved",
        extract: |v| v.percentage_compression_space_saved,
    },
    VolumeMetric {
        name: "netapp_volume_saved_deduplication_percentage",
        help: "Netapp Volume Metrics: percentage of space deduplication saved",
        extract: |v| v.percentage_deduplication_space_saved,
    },
];

/// `None` until fetched and again after invalidation.
type Cache = Option<Vec<Volume>>;

struct VolumeGauge {
    gauge: GaugeVec,
    extract: fn(&Volume) -> f64,
}

/// Volume metrics collector for a single filer.
pub struct VolumeCollector {
    filer_name: String,
    client: Arc<dyn StorageClient>,
    retention_period: Duration,
    error_tx: Option<Sender<FetchFailure>>,
    gauges: Vec<VolumeGauge>,
    cache: Arc<Mutex<Cache>>,
}

impl VolumeCollector {
    /// Create a collector for one filer.
    ///
    /// `error_tx` receives a [`FetchFailure`] for every failed fetch; reports
    /// are dropped when the channel is full or closed.
    pub fn new(
        filer_name: impl Into<String>,
        client: Arc<dyn StorageClient>,
        retention_period: Duration,
        error_tx: Option<Sender<FetchFailure>>,
    ) -> Result<Self> {
        let filer_name = filer_name.into();

        let gauges = VOLUME_METRICS
            .iter()
            .map(|m| {
                let opts = Opts::new(m.name, m.help).const_label(FILER_LABEL, filer_name.as_str());
                GaugeVec::new(opts, &VOLUME_LABELS)
                    .map(|gauge| VolumeGauge {
                        gauge,
                        extract: m.extract,
                    })
                    .map_err(|e| ExporterError::Metrics(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            filer_name,
            client,
            retention_period,
            error_tx,
            gauges,
            cache: Arc::new(Mutex::new(None)),
        })
    }

    fn fetch(&self) -> Option<Vec<Volume>> {
        debug!("VolumeCollector[{}] starts fetching volumes", self.filer_name);

        match self.client.list_volumes() {
            Ok(volumes) => {
                debug!(
                    "VolumeCollector[{}] fetched {} volumes",
                    self.filer_name,
                    volumes.len()
                );
                Some(volumes)
            }
            Err(e) => {
                error!("VolumeCollector[{}] failed to fetch volumes: {}", self.filer_name, e);
                self.report(&e);
                None
            }
        }
    }

    fn report(&self, err: &ExporterError) {
        let Some(tx) = &self.error_tx else {
            return;
        };

        let failure = FetchFailure {
            filer: self.filer_name.clone(),
            message: err.to_string(),
            at: Instant::now(),
        };
        if let Err(e) = tx.try_send(failure) {
            debug!("VolumeCollector[{}] dropped failure report: {}", self.filer_name, e);
        }
    }

    /// Clears the cache once the retention period has passed.
    ///
    /// The timer only holds a weak reference to the cache; a collector that
    /// is dropped first is not kept alive by it.
    fn schedule_invalidation(&self) -> bool {
        let cache = Arc::downgrade(&self.cache);
        let filer_name = self.filer_name.clone();
        let retention_period = self.retention_period;

        let spawned = thread::Builder::new()
            .name(format!("invalidate-{}", self.filer_name))
            .spawn(move || {
                thread::sleep(retention_period);
                if let Some(cache) = cache.upgrade() {
                    *lock(&cache) = None;
                    debug!("VolumeCollector[{}] cached volumes cleared", filer_name);
                }
            });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "VolumeCollector[{}] could not schedule cache invalidation: {}",
                    self.filer_name, e
                );
                false
            }
        }
    }

    /// A label tuple can only carry one sample per metric; volumes repeating
    /// an earlier tuple are skipped with a warning.
    fn export(&self, volumes: &[Volume]) -> Vec<MetricFamily> {
        let mut seen = HashSet::with_capacity(volumes.len());
        let unique: Vec<&Volume> = volumes
            .iter()
            .filter(|volume| {
                let fresh = seen.insert(volume.label_values());
                if !fresh {
                    warn!(
                        "VolumeCollector[{}] skipping volume with repeated labels {:?}",
                        self.filer_name,
                        volume.label_values()
                    );
                }
                fresh
            })
            .collect();

        debug!(
            "VolumeCollector[{}] exporting {} volumes",
            self.filer_name,
            unique.len()
        );

        let mut families = Vec::with_capacity(self.gauges.len());
        for m in &self.gauges {
            m.gauge.reset();
            for &volume in &unique {
                let labels = volume.label_values();
                m.gauge
                    .with_label_values(&labels[..])
                    .set((m.extract)(volume));
            }
            families.extend(m.gauge.collect());
        }
        families
    }
}

impl Collector for VolumeCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges.iter().flat_map(|m| m.gauge.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut cache = lock(&self.cache);

        let mut expire_now = false;
        if cache.as_ref().map_or(true, |volumes| volumes.is_empty()) {
            *cache = self.fetch();
            if cache.as_ref().is_some_and(|volumes| !volumes.is_empty()) {
                expire_now = !self.schedule_invalidation();
            }
        }

        let families = self.export(cache.as_deref().unwrap_or_default());
        if expire_now {
            *cache = None;
        }
        families
    }
}

/// A poisoned lock still holds a valid cache state.
fn lock(cache: &Mutex<Cache>) -> MutexGuard<'_, Cache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Encode everything registered in `registry` in the Prometheus text format.
pub fn encode(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    thread_local! {
        static BUFFER: std::cell::RefCell<Vec<u8>> = std::cell::RefCell::new(Vec::with_capacity(8192));
    }

    BUFFER.with(|buf| {
        let mut buffer = buf.borrow_mut();
        buffer.clear();

        encoder
            .encode(&metric_families, &mut *buffer)
            .map_err(|e| ExporterError::Metrics(e.to_string()))?;

        String::from_utf8(buffer.clone()).map_err(|e| ExporterError::Metrics(e.to_string()))
    })
}
