//! Window averages derived from a [`HistoryRing`] of counter snapshots.
//!
//! Every metric is reported as `[short, medium, long]`. A window whose
//! comparison sample is missing, or whose time difference is zero, is `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::counters::{DiskCounters, DiskSnapshot, NetworkSnapshot};
use crate::history::HistoryRing;

/// One value per window: 1, 5 and 15 minutes.
pub type WindowRates = [Option<f64>; 3];

const BYTES_PER_MB: f64 = 1_000_000.0;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn elapsed(newer: u64, older: u64) -> Option<f64> {
    let dt = newer as f64 - older as f64;
    (dt != 0.0).then_some(dt)
}

fn delta(newer: u64, older: u64) -> f64 {
    newer as f64 - older as f64
}

/// Network load and packet rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAverages {
    /// Megabits per second, both directions.
    pub net_load: WindowRates,
    /// Packets per second, both directions.
    pub pps: WindowRates,
}

/// Per-disk load, busy percentage and IOPS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskAverages {
    /// Megabytes per second read plus written.
    pub load: BTreeMap<String, WindowRates>,
    /// Percent of wall time the device was busy.
    pub load_percent: BTreeMap<String, WindowRates>,
    pub iops: BTreeMap<String, WindowRates>,
}

fn network_rate(zero: &NetworkSnapshot, base: &NetworkSnapshot) -> Option<(f64, f64)> {
    let dt = elapsed(zero.timestamp, base.timestamp)?;
    let bits = (delta(zero.bytes_recv, base.bytes_recv) + delta(zero.bytes_sent, base.bytes_sent))
        * 8.0;
    let packets =
        delta(zero.packets_recv, base.packets_recv) + delta(zero.packets_sent, base.packets_sent);
    Some((round2(bits / dt / BYTES_PER_MB), round2(packets / dt)))
}

/// Compute network averages for all three windows.
pub fn network_averages(ring: &HistoryRing<NetworkSnapshot>) -> NetworkAverages {
    let mut out = NetworkAverages::default();
    let Some(zero) = ring.latest() else {
        return out;
    };
    for (i, base) in ring.baselines().into_iter().enumerate() {
        if let Some((load, pps)) = base.and_then(|b| network_rate(zero, b)) {
            out.net_load[i] = Some(load);
            out.pps[i] = Some(pps);
        }
    }
    out
}

/// Load (MB/s), busy percent and IOPS of one disk between two samples.
fn disk_rate(zero: &DiskCounters, base: &DiskCounters, dt: f64) -> (f64, f64, f64) {
    let bytes = delta(zero.read_bytes, base.read_bytes) + delta(zero.write_bytes, base.write_bytes);
    let ios = delta(zero.read_count, base.read_count) + delta(zero.write_count, base.write_count);
    let busy_ms = delta(zero.busy_time, base.busy_time);
    (
        round2(bytes / dt / BYTES_PER_MB),
        round2(busy_ms / 1000.0 / dt * 100.0),
        round2(ios / dt),
    )
}

/// A disk counts as idle when its busy time is zero or has not moved since
/// the oldest comparison sample.
fn is_idle(name: &str, zero: &DiskCounters, baselines: &[Option<&DiskSnapshot>; 3]) -> bool {
    if zero.busy_time == 0 {
        return true;
    }
    baselines
        .iter()
        .rev()
        .find_map(|b| b.and_then(|s| s.disks.get(name)))
        .is_some_and(|oldest| oldest.busy_time == zero.busy_time)
}

/// Compute per-disk averages for all three windows. Idle disks are omitted.
pub fn disk_averages(ring: &HistoryRing<DiskSnapshot>) -> DiskAverages {
    let mut out = DiskAverages::default();
    let Some(zero) = ring.latest() else {
        return out;
    };
    let baselines = ring.baselines();

    for (name, counters) in &zero.disks {
        if is_idle(name, counters, &baselines) {
            continue;
        }
        let mut load = [None; 3];
        let mut percent = [None; 3];
        let mut iops = [None; 3];
        for (i, base) in baselines.iter().enumerate() {
            let Some(base) = base else {
                continue;
            };
            let Some(dt) = elapsed(zero.timestamp, base.timestamp) else {
                continue;
            };
            let Some(prev) = base.disks.get(name) else {
                continue;
            };
            let (l, p, n) = disk_rate(counters, prev, dt);
            load[i] = Some(l);
            percent[i] = Some(p);
            iops[i] = Some(n);
        }
        out.load.insert(name.clone(), load);
        out.load_percent.insert(name.clone(), percent);
        out.iops.insert(name.clone(), iops);
    }
    out
}
