//! Telemetry reports posted to the remote collector.
//!
//! Both reports are opt-in through the `sendTelemetry` store flag. Delivery
//! is fire-and-forget: one POST with a short timeout, no retry, and a
//! failed POST is only logged.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::chain::ValidatorCore;
use crate::error::Result;
use crate::host::{self, CpuInfo, DbStats, MemoryUsage, Uname, ValidatorProcess};
use crate::stats::statistic_or_null;
use crate::store::{Store, keys};

pub const DEFAULT_TELEMETRY_URL: &str = "https://telemetry.toncenter.com/report_status";
pub const DEFAULT_OVERLAY_TELEMETRY_URL: &str = "https://telemetry.toncenter.com/report_overlays";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Node status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    pub adnl_addr: String,
    pub validator_status: Value,
    pub cpu_number: usize,
    pub cpu_load: Option<[f64; 3]>,
    pub net_load: Value,
    pub tps: Value,
    pub disks_load: Value,
    pub disks_load_percent: Value,
    pub iops: Value,
    pub pps: Value,
    pub db_usage: Value,
    pub vprocess: Option<ValidatorProcess>,
    pub db_stats: DbStats,
    pub validator_disk_name: Option<String>,
    pub memory: Option<MemoryUsage>,
    pub swap: Option<MemoryUsage>,
    pub uname: Option<Uname>,
    pub cpu_info: CpuInfo,
    pub stake: Value,
    #[serde(rename = "fullnode_adnl")]
    pub fullnode_adnl: Option<String>,
    pub git_hashes: Value,
    pub node_args: Value,
    pub pings: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayReport {
    pub adnl_addr: String,
    pub overlays_stats: Value,
}

/// Core facts a report can go without.
fn optional(field: &str, value: Result<Value>) -> Value {
    value.unwrap_or_else(|e| {
        log::debug!("telemetry field {field} unavailable: {e}");
        Value::Null
    })
}

/// Assemble a status report from the core, the published statistics and
/// the host. `work_dir` is the validator's working directory.
pub fn build_report(core: &dyn ValidatorCore, store: &Store, work_dir: &Path) -> Result<TelemetryReport> {
    let (memory, swap) = host::memory_usage();
    Ok(TelemetryReport {
        adnl_addr: core.adnl_addr()?,
        validator_status: core.validator_status()?,
        cpu_number: host::cpu_count(),
        cpu_load: host::load_average(),
        net_load: statistic_or_null(store, keys::NET_LOAD_AVG),
        tps: statistic_or_null(store, keys::TPS_AVG),
        disks_load: statistic_or_null(store, keys::DISKS_LOAD_AVG),
        disks_load_percent: statistic_or_null(store, keys::DISKS_LOAD_PERCENT_AVG),
        iops: statistic_or_null(store, keys::IOPS_AVG),
        pps: statistic_or_null(store, keys::PPS_AVG),
        db_usage: core.db_usage()?,
        vprocess: host::validator_process(),
        db_stats: host::db_stats(work_dir),
        validator_disk_name: host::validator_disk_name(work_dir),
        memory,
        swap,
        uname: host::uname(),
        cpu_info: host::cpu_info(),
        stake: store.get(keys::STAKE).unwrap_or(Value::Null),
        fullnode_adnl: core.fullnode_adnl()?,
        git_hashes: optional("gitHashes", core.git_hashes()),
        node_args: optional("nodeArgs", core.node_args()),
        pings: optional("pings", core.pings()),
    })
}

pub fn build_overlay_report(core: &dyn ValidatorCore) -> Result<OverlayReport> {
    Ok(OverlayReport {
        adnl_addr: core.adnl_addr()?,
        overlays_stats: core.overlays_stats()?,
    })
}

/// Destination for report bodies.
pub trait ReportSink: Send + Sync {
    fn post(&self, url: &str, body: &Value) -> Result<()>;
}

/// HTTP sink backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct Reporter {
    client: reqwest::blocking::Client,
}

impl Reporter {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("valops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl ReportSink for Reporter {
    fn post(&self, url: &str, body: &Value) -> Result<()> {
        let response = self.client.post(url).json(body).send()?;
        let status = response.status();
        if status.is_success() {
            log::trace!("collector {url} answered {status}");
        } else {
            // The collector's verdict does not change what we do next.
            log::warn!("collector {url} returned non-success status {status}");
        }
        Ok(())
    }
}

fn deliver(sink: &dyn ReportSink, url: &str, body: &Value) -> bool {
    match sink.post(url, body) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("failed to send telemetry to {url}: {e}");
            false
        }
    }
}

/// One telemetry tick. Returns whether a report was handed to the sink
/// successfully; `false` when telemetry is off or the POST failed.
pub fn telemetry_tick(core: &dyn ValidatorCore, store: &Store, sink: &dyn ReportSink) -> Result<bool> {
    if !store.flag(keys::SEND_TELEMETRY) {
        return Ok(false);
    }
    let report = build_report(core, store, Path::new(host::DEFAULT_WORK_DIR))?;
    let body = serde_json::to_value(report)?;
    let url = store
        .string(keys::TELEMETRY_URL)
        .unwrap_or_else(|| DEFAULT_TELEMETRY_URL.to_string());
    Ok(deliver(sink, &url, &body))
}

/// One overlay telemetry tick, gated on the same flag.
pub fn overlay_telemetry_tick(
    core: &dyn ValidatorCore,
    store: &Store,
    sink: &dyn ReportSink,
) -> Result<bool> {
    if !store.flag(keys::SEND_TELEMETRY) {
        return Ok(false);
    }
    let body = serde_json::to_value(build_overlay_report(core)?)?;
    let url = store
        .string(keys::OVERLAY_TELEMETRY_URL)
        .unwrap_or_else(|| DEFAULT_OVERLAY_TELEMETRY_URL.to_string());
    Ok(deliver(sink, &url, &body))
}
