//! Raw monotonic host counters, read once per statistics tick.
//!
//! Values are taken straight from procfs/sysfs without any derivation:
//! rates are computed later from two snapshots in [`crate::averager`].
//! Unlike the best-effort host facts in [`crate::host`], a failed read here
//! is an error, because a tick cannot proceed without a baseline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sector size used by `/proc/diskstats`, independent of the device.
const SECTOR_BYTES: u64 = 512;

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Counters of the internet-facing network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub timestamp: u64,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    pub packets_recv: u64,
    pub packets_sent: u64,
}

/// Counters of a single block device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    /// Milliseconds spent doing I/O.
    pub busy_time: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_count: u64,
    pub write_count: u64,
}

/// Per-disk counters captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub timestamp: u64,
    pub disks: BTreeMap<String, DiskCounters>,
}

/// Anything that can produce host counter snapshots.
pub trait CounterSource: Send + Sync {
    /// Read network counters, stamping them with `timestamp`.
    fn network(&self, timestamp: u64) -> Result<NetworkSnapshot>;

    /// Read per-disk counters, stamping them with `timestamp`.
    fn disks(&self, timestamp: u64) -> Result<DiskSnapshot>;
}

/// Linux counter source backed by procfs and sysfs.
///
/// All paths are resolved under `root`, which is `/` on a real host.
#[derive(Debug, Clone)]
pub struct ProcfsCounters {
    root: PathBuf,
}

impl Default for ProcfsCounters {
    fn default() -> Self {
        Self::new("/")
    }
}

impl ProcfsCounters {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn read(&self, rel: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.path(rel))?)
    }

    /// Interface carrying the default route, or the busiest non-loopback one.
    fn internet_interface(&self, net_dev: &str) -> Option<String> {
        if let Ok(route) = self.read("proc/net/route")
            && let Some(iface) = parse_default_route(&route)
        {
            return Some(iface);
        }
        parse_net_dev(net_dev)
            .into_iter()
            .filter(|(name, _)| name != "lo")
            .max_by_key(|(_, c)| c.bytes_recv + c.bytes_sent)
            .map(|(name, _)| name)
    }

    /// Block devices from `/sys/block`, minus loop devices, sorted by name.
    pub fn disk_names(&self) -> Result<Vec<String>> {
        list_disks(&self.path("sys/block"))
    }
}

impl CounterSource for ProcfsCounters {
    fn network(&self, timestamp: u64) -> Result<NetworkSnapshot> {
        let raw = self.read("proc/net/dev")?;
        let iface = self
            .internet_interface(&raw)
            .ok_or_else(|| Error::Parse("no usable network interface".to_string()))?;
        let counters = parse_net_dev(&raw)
            .into_iter()
            .find(|(name, _)| *name == iface)
            .map(|(_, c)| c)
            .ok_or_else(|| Error::Parse(format!("interface {iface} not in /proc/net/dev")))?;
        Ok(NetworkSnapshot {
            timestamp,
            ..counters
        })
    }

    fn disks(&self, timestamp: u64) -> Result<DiskSnapshot> {
        let names = self.disk_names()?;
        let raw = self.read("proc/diskstats")?;
        let mut all = parse_diskstats(&raw);
        let mut disks = BTreeMap::new();
        for name in names {
            match all.remove(&name) {
                Some(counters) => {
                    disks.insert(name, counters);
                }
                None => log::debug!("disk {name} listed in sysfs but absent from diskstats"),
            }
        }
        Ok(DiskSnapshot { timestamp, disks })
    }
}

fn list_disks(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !name.contains("loop"))
        .collect();
    names.sort();
    Ok(names)
}

/// Name of the interface whose destination is `0.0.0.0`.
pub fn parse_default_route(raw: &str) -> Option<String> {
    raw.lines().skip(1).find_map(|line| {
        let mut parts = line.split_whitespace();
        let iface = parts.next()?;
        let destination = parts.next()?;
        (destination == "00000000").then(|| iface.to_string())
    })
}

/// Parse `/proc/net/dev` into `(interface, counters)` pairs with a zero timestamp.
pub fn parse_net_dev(raw: &str) -> Vec<(String, NetworkSnapshot)> {
    let mut out = Vec::new();
    for line in raw.lines().skip(2) {
        let Some((iface_raw, stats_raw)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = stats_raw
            .split_whitespace()
            .filter_map(|s| s.parse::<u64>().ok())
            .collect();
        if fields.len() < 16 {
            continue;
        }
        out.push((
            iface_raw.trim().to_string(),
            NetworkSnapshot {
                timestamp: 0,
                bytes_recv: fields[0],
                packets_recv: fields[1],
                bytes_sent: fields[8],
                packets_sent: fields[9],
            },
        ));
    }
    out
}

/// Parse `/proc/diskstats` into per-device counters.
pub fn parse_diskstats(raw: &str) -> BTreeMap<String, DiskCounters> {
    let mut out = BTreeMap::new();
    for line in raw.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }
        let parsed: Vec<u64> = parts[3..14]
            .iter()
            .filter_map(|v| v.parse::<u64>().ok())
            .collect();
        if parsed.len() < 11 {
            continue;
        }
        out.insert(
            parts[2].to_string(),
            DiskCounters {
                read_count: parsed[0],
                read_bytes: parsed[2] * SECTOR_BYTES,
                write_count: parsed[4],
                write_bytes: parsed[6] * SECTOR_BYTES,
                busy_time: parsed[9],
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0
  eth0: 5000000   4000    0    0    0     0          0         0  2000000    3000    0    0    0     0       0          0
  eth1:  700000    500    0    0    0     0          0         0   100000     100    0    0    0     0       0          0
";

    const ROUTE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth1\t0000A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
eth1\t00000000\t0100A8C0\t0003\t0\t0\t0\t00000000\t0\t0\t0
";

    const DISKSTATS: &str = "\
   7       0 loop0 10 0 20 0 0 0 0 0 0 5 0 0 0 0 0
 259       0 nvme0n1 1000 10 2000 300 500 20 4000 600 0 7000 900 0 0 0 0
 259       1 nvme0n1p1 900 10 1800 250 400 20 3000 500 0 6000 800 0 0 0 0
";

    #[test]
    fn net_dev_parses_each_interface() {
        let rows = parse_net_dev(NET_DEV);
        assert_eq!(rows.len(), 3);
        let (name, eth0) = &rows[1];
        assert_eq!(name, "eth0");
        assert_eq!(eth0.bytes_recv, 5_000_000);
        assert_eq!(eth0.packets_recv, 4000);
        assert_eq!(eth0.bytes_sent, 2_000_000);
        assert_eq!(eth0.packets_sent, 3000);
    }

    #[test]
    fn default_route_wins_over_traffic() {
        assert_eq!(parse_default_route(ROUTE).as_deref(), Some("eth1"));
    }

    #[test]
    fn diskstats_converts_sectors_to_bytes() {
        let disks = parse_diskstats(DISKSTATS);
        let d = disks["nvme0n1"];
        assert_eq!(d.read_count, 1000);
        assert_eq!(d.read_bytes, 2000 * 512);
        assert_eq!(d.write_count, 500);
        assert_eq!(d.write_bytes, 4000 * 512);
        assert_eq!(d.busy_time, 7000);
    }

    fn fake_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("proc/net")).unwrap();
        std::fs::create_dir_all(root.join("sys/block/nvme0n1")).unwrap();
        std::fs::create_dir_all(root.join("sys/block/loop0")).unwrap();
        std::fs::write(root.join("proc/net/dev"), NET_DEV).unwrap();
        std::fs::write(root.join("proc/diskstats"), DISKSTATS).unwrap();
        dir
    }

    #[test]
    fn procfs_falls_back_to_busiest_interface() {
        let dir = fake_root();
        let counters = ProcfsCounters::new(dir.path());
        let snap = counters.network(42).unwrap();
        assert_eq!(snap.timestamp, 42);
        assert_eq!(snap.bytes_recv, 5_000_000);
    }

    #[test]
    fn procfs_uses_default_route_interface() {
        let dir = fake_root();
        std::fs::write(dir.path().join("proc/net/route"), ROUTE).unwrap();
        let snap = ProcfsCounters::new(dir.path()).network(1).unwrap();
        assert_eq!(snap.bytes_recv, 700_000);
    }

    #[test]
    fn procfs_skips_loop_devices() {
        let dir = fake_root();
        let snap = ProcfsCounters::new(dir.path()).disks(7).unwrap();
        assert_eq!(snap.timestamp, 7);
        assert_eq!(snap.disks.keys().collect::<Vec<_>>(), vec!["nvme0n1"]);
    }

    #[test]
    fn missing_procfs_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let counters = ProcfsCounters::new(dir.path());
        assert!(counters.network(0).is_err());
        assert!(counters.disks(0).is_err());
    }
}
