//! Best-effort host facts attached to telemetry reports.
//!
//! Anything that cannot be read is left absent rather than guessed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::averager::round2;

const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Working directory of the validator node (databases, keys, logs).
pub const DEFAULT_WORK_DIR: &str = "/var/ton-work";

/// Process name of the validator engine.
const VALIDATOR_PROCESS: &str = "validator-engine";
/// The kernel truncates process names to this many bytes.
const COMM_LEN: usize = 15;

/// Memory or swap usage in decimal gigabytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub total: f64,
    pub usage: f64,
    pub usage_percent: f64,
}

impl MemoryUsage {
    fn from_bytes(total: f64, used: f64) -> Self {
        let usage_percent = if total > 0.0 {
            round2(used / total * 100.0)
        } else {
            0.0
        };
        Self {
            total: round2(total / BYTES_PER_GB),
            usage: round2(used / BYTES_PER_GB),
            usage_percent,
        }
    }
}

/// `uname` fields, without the node name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uname {
    pub sysname: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    #[serde(rename = "virtual")]
    pub is_virtual: Option<bool>,
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub cpu_name: Option<String>,
    #[serde(rename = "virtual")]
    pub virtual_host: VirtualHost,
}

/// Parse `/proc/meminfo` into `(memory, swap)`.
pub fn parse_meminfo(raw: &str) -> (Option<MemoryUsage>, Option<MemoryUsage>) {
    let mut total = None;
    let mut available = None;
    let mut swap_total = None;
    let mut swap_free = None;
    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
        else {
            continue;
        };
        let bytes = kib * 1024.0;
        match key {
            "MemTotal" => total = Some(bytes),
            "MemAvailable" => available = Some(bytes),
            "SwapTotal" => swap_total = Some(bytes),
            "SwapFree" => swap_free = Some(bytes),
            _ => {}
        }
    }
    let memory = total
        .zip(available)
        .map(|(t, a)| MemoryUsage::from_bytes(t, t - a));
    let swap = swap_total
        .zip(swap_free)
        .map(|(t, f)| MemoryUsage::from_bytes(t, t - f));
    (memory, swap)
}

/// Memory and swap usage from `/proc/meminfo`.
pub fn memory_usage() -> (Option<MemoryUsage>, Option<MemoryUsage>) {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(raw) => parse_meminfo(&raw),
        Err(_) => (None, None),
    }
}

/// 1, 5 and 15 minute load averages.
pub fn load_average() -> Option<[f64; 3]> {
    #[cfg(unix)]
    {
        let mut values = [0.0_f64; 3];
        // SAFETY: `getloadavg` writes at most 3 doubles into a 3-element buffer.
        let n = unsafe { libc::getloadavg(values.as_mut_ptr(), 3) };
        (n == 3).then(|| values.map(round2))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(unix)]
fn c_field(raw: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn uname() -> Option<Uname> {
    #[cfg(unix)]
    {
        // SAFETY: `utsname` is plain old data; all-zero is a valid value.
        let mut info: libc::utsname = unsafe { std::mem::zeroed() };
        // SAFETY: `uname` fills the struct we own and has no other side effects.
        if unsafe { libc::uname(&mut info) } != 0 {
            return None;
        }
        Some(Uname {
            sysname: c_field(&info.sysname),
            release: c_field(&info.release),
            version: c_field(&info.version),
            machine: c_field(&info.machine),
        })
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// CPU model name from `/proc/cpuinfo` contents.
pub fn parse_cpu_name(raw: &str) -> Option<String> {
    raw.lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Classify a DMI product name as virtual or physical.
pub fn classify_product(product_name: &str) -> VirtualHost {
    let name = product_name.trim().to_lowercase();
    let is_virtual = ["virtual", "kvm", "qemu", "vmware"]
        .iter()
        .any(|marker| name.contains(marker));
    VirtualHost {
        is_virtual: Some(is_virtual),
        product_name: Some(name),
    }
}

pub fn cpu_info() -> CpuInfo {
    let cpu_name = std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|raw| parse_cpu_name(&raw));
    let virtual_host = match std::fs::read_to_string(Path::new("/sys/class/dmi/id/product_name")) {
        Ok(raw) => classify_product(&raw),
        Err(_) => VirtualHost {
            is_virtual: None,
            product_name: None,
        },
    };
    CpuInfo {
        cpu_name,
        virtual_host,
    }
}

/// Memory of one process in bytes, as laid out in `/proc/<pid>/statm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMemory {
    pub rss: u64,
    pub vms: u64,
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dirty: u64,
}

/// The running validator engine process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorProcess {
    pub pid: u32,
    /// CPU use averaged over the process lifetime.
    pub cpu_percent: Option<f64>,
    pub memory: ProcessMemory,
}

/// Parse `/proc/<pid>/statm` (sizes in pages).
pub fn parse_statm(raw: &str, page_size: u64) -> Option<ProcessMemory> {
    let pages: Vec<u64> = raw
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let [size, resident, shared, text, lib, data, dirty]: [u64; 7] =
        pages.get(..7)?.try_into().ok()?;
    Some(ProcessMemory {
        rss: resident * page_size,
        vms: size * page_size,
        shared: shared * page_size,
        text: text * page_size,
        lib: lib * page_size,
        data: data * page_size,
        dirty: dirty * page_size,
    })
}

/// `Name:` field of `/proc/<pid>/status`.
pub fn parse_process_name(status: &str) -> Option<&str> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("Name:"))
        .map(str::trim)
}

fn is_validator_name(name: &str) -> bool {
    name == VALIDATOR_PROCESS || name == &VALIDATOR_PROCESS[..COMM_LEN]
}

/// Lifetime CPU percentage from `/proc/<pid>/stat` and `/proc/uptime`.
pub fn parse_cpu_percent(stat: &str, uptime: &str, ticks_per_sec: f64) -> Option<f64> {
    // The command name may contain spaces; fields resume after its `)`.
    let (_, rest) = stat.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: f64 = fields.get(11)?.parse().ok()?;
    let stime: f64 = fields.get(12)?.parse().ok()?;
    let started: f64 = fields.get(19)?.parse().ok()?;
    let uptime: f64 = uptime.split_whitespace().next()?.parse().ok()?;
    let elapsed = uptime - started / ticks_per_sec;
    (elapsed > 0.0).then(|| round2((utime + stime) / ticks_per_sec / elapsed * 100.0))
}

#[cfg(unix)]
fn sysconf(name: libc::c_int, fallback: u64) -> u64 {
    // SAFETY: `sysconf` only reads a configuration value.
    let v = unsafe { libc::sysconf(name) };
    if v > 0 { v as u64 } else { fallback }
}

/// Find the validator engine under a procfs root.
pub fn validator_process_in(proc_root: &Path, page_size: u64, ticks_per_sec: f64) -> Option<ValidatorProcess> {
    let entries = std::fs::read_dir(proc_root).ok()?;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let dir = entry.path();
        let Ok(status) = std::fs::read_to_string(dir.join("status")) else {
            continue;
        };
        if !parse_process_name(&status).is_some_and(is_validator_name) {
            continue;
        }
        let memory = std::fs::read_to_string(dir.join("statm"))
            .ok()
            .and_then(|raw| parse_statm(&raw, page_size))?;
        let cpu_percent = std::fs::read_to_string(dir.join("stat"))
            .ok()
            .zip(std::fs::read_to_string(proc_root.join("uptime")).ok())
            .and_then(|(stat, uptime)| parse_cpu_percent(&stat, &uptime, ticks_per_sec));
        return Some(ValidatorProcess {
            pid,
            cpu_percent,
            memory,
        });
    }
    None
}

pub fn validator_process() -> Option<ValidatorProcess> {
    #[cfg(unix)]
    {
        validator_process_in(
            Path::new("/proc"),
            sysconf(libc::_SC_PAGESIZE, 4096),
            sysconf(libc::_SC_CLK_TCK, 100) as f64,
        )
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// One RocksDB statistics dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbStatsFile {
    pub ok: bool,
    pub message: String,
    pub data: Map<String, Value>,
}

/// Statistics dumps of the block database and the cell database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbStats {
    pub rocksdb: DbStatsFile,
    pub celldb: DbStatsFile,
}

/// Parse a RocksDB statistics dump.
///
/// Lines look like `rocksdb.block.cache.miss COUNT : 12` or
/// `rocksdb.db.get.micros P50 : 1.5 P99 : 9.0 COUNT : 3 SUM : 8`. Each
/// ticker becomes an object of its numeric fields; other lines are skipped.
pub fn parse_db_stats(raw: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for line in raw.lines() {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let rest: Vec<&str> = tokens.collect();
        let mut fields = Map::new();
        for triple in rest.chunks(3) {
            if let [key, ":", value] = triple
                && let Ok(n) = value.parse::<f64>()
            {
                fields.insert((*key).to_string(), Value::from(n));
            }
        }
        if !fields.is_empty() {
            out.insert(name.to_string(), Value::Object(fields));
        }
    }
    out
}

fn db_stats_file(path: &Path) -> DbStatsFile {
    match std::fs::read_to_string(path) {
        Ok(raw) => DbStatsFile {
            ok: true,
            message: String::new(),
            data: parse_db_stats(&raw),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DbStatsFile {
            ok: false,
            message: "db stats file does not exist".to_string(),
            data: Map::new(),
        },
        Err(e) => DbStatsFile {
            ok: false,
            message: format!("failed to read db stats: {e}"),
            data: Map::new(),
        },
    }
}

pub fn db_stats(work_dir: &Path) -> DbStats {
    DbStats {
        rocksdb: db_stats_file(&work_dir.join("db/db_stats.txt")),
        celldb: db_stats_file(&work_dir.join("db/celldb/db_stats.txt")),
    }
}

/// Device backing `path`, from `/proc/mounts` contents.
///
/// The mount point with the most components that contains `path` wins.
pub fn parse_mount_device(mounts: &str, path: &Path) -> Option<String> {
    mounts
        .lines()
        .filter_map(|l| {
            let mut fields = l.split_whitespace();
            Some((fields.next()?, Path::new(fields.next()?)))
        })
        .filter(|(_, mount_point)| path.starts_with(mount_point))
        .max_by_key(|(_, mount_point)| mount_point.components().count())
        .map(|(device, _)| device.to_string())
}

/// Device holding the validator working directory.
pub fn validator_disk_name(work_dir: &Path) -> Option<String> {
    let mounts = std::fs::read_to_string("/proc/mounts").ok()?;
    parse_mount_device(&mounts, work_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meminfo_in_decimal_gigabytes() {
        let raw = "\
MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    2000000 kB
SwapTotal:       1000000 kB
SwapFree:        1000000 kB
";
        let (mem, swap) = parse_meminfo(raw);
        let mem = mem.unwrap();
        assert_eq!(mem.total, 8.19);
        assert_eq!(mem.usage, 6.14);
        assert_eq!(mem.usage_percent, 75.0);
        let swap = swap.unwrap();
        assert_eq!(swap.usage, 0.0);
        assert_eq!(swap.usage_percent, 0.0);
    }

    #[test]
    fn meminfo_missing_fields() {
        assert_eq!(parse_meminfo("MemTotal: 10 kB\n"), (None, None));
    }

    #[test]
    fn cpu_name_from_cpuinfo() {
        let raw = "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Xeon(R) CPU @ 2.20GHz\n";
        assert_eq!(
            parse_cpu_name(raw).as_deref(),
            Some("Intel(R) Xeon(R) CPU @ 2.20GHz")
        );
        assert_eq!(parse_cpu_name("processor : 0\n"), None);
    }

    #[test]
    fn product_classification() {
        assert_eq!(classify_product("KVM\n").is_virtual, Some(true));
        assert_eq!(
            classify_product("VMware Virtual Platform").is_virtual,
            Some(true)
        );
        let metal = classify_product("PowerEdge R640");
        assert_eq!(metal.is_virtual, Some(false));
        assert_eq!(metal.product_name.as_deref(), Some("poweredge r640"));
    }

    #[test]
    fn cpu_info_serializes_like_collector_expects() {
        let info = CpuInfo {
            cpu_name: Some("x".to_string()),
            virtual_host: classify_product("qemu"),
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["cpuName"], "x");
        assert_eq!(v["virtual"]["virtual"], true);
        assert_eq!(v["virtual"]["product_name"], "qemu");
    }

    #[test]
    fn cpu_count_is_positive() {
        assert!(cpu_count() >= 1);
    }

    #[test]
    fn statm_pages_become_bytes() {
        let mem = parse_statm("1000 200 50 10 0 300 0\n", 4096).unwrap();
        assert_eq!(mem.rss, 200 * 4096);
        assert_eq!(mem.vms, 1000 * 4096);
        assert_eq!(mem.data, 300 * 4096);
        assert_eq!(parse_statm("1 2 3", 4096), None);
    }

    #[test]
    fn cpu_percent_over_process_lifetime() {
        // utime 300 + stime 100 ticks over 40 s of life at 100 ticks/s
        let stat = "42 (validator engine) S 1 42 42 0 -1 0 0 0 0 0 300 100 0 0 20 0 8 0 1000 0 0";
        assert_eq!(parse_cpu_percent(stat, "50.00 90.00\n", 100.0), Some(10.0));
        assert_eq!(parse_cpu_percent("garbage", "50.0", 100.0), None);
    }

    #[test]
    fn validator_found_by_truncated_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("uptime"), "50.00 90.00\n").unwrap();
        for (pid, name) in [("1", "systemd"), ("self", "valops"), ("77", "validator-engin")] {
            std::fs::create_dir(root.join(pid)).unwrap();
            std::fs::write(root.join(pid).join("status"), format!("Name:\t{name}\nState:\tS\n")).unwrap();
            std::fs::write(root.join(pid).join("statm"), "10 2 1 1 0 3 0\n").unwrap();
        }
        let proc = validator_process_in(root, 4096, 100.0).unwrap();
        assert_eq!(proc.pid, 77);
        assert_eq!(proc.memory.rss, 8192);
        assert_eq!(proc.cpu_percent, None);

        let v = serde_json::to_value(&proc).unwrap();
        assert_eq!(v["memory"]["vms"], 40960);
        assert!(v.get("cpuPercent").is_some());
    }

    #[test]
    fn no_validator_process() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(validator_process_in(dir.path(), 4096, 100.0), None);
    }

    #[test]
    fn db_stats_tickers_and_histograms() {
        let raw = "\
** DB Stats **
rocksdb.block.cache.miss COUNT : 12
rocksdb.db.get.micros P50 : 1.5 P99 : 9.0 COUNT : 3 SUM : 8
";
        let data = parse_db_stats(raw);
        assert_eq!(data.len(), 2);
        assert_eq!(data["rocksdb.block.cache.miss"]["COUNT"], 12.0);
        assert_eq!(data["rocksdb.db.get.micros"]["P99"], 9.0);
        assert_eq!(data["rocksdb.db.get.micros"]["SUM"], 8.0);
    }

    #[test]
    fn db_stats_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("db")).unwrap();
        std::fs::write(dir.path().join("db/db_stats.txt"), "rocksdb.x COUNT : 1\n").unwrap();
        let stats = db_stats(dir.path());
        assert!(stats.rocksdb.ok);
        assert_eq!(stats.rocksdb.data["rocksdb.x"]["COUNT"], 1.0);
        assert!(!stats.celldb.ok);
        assert_eq!(stats.celldb.message, "db stats file does not exist");
    }

    #[test]
    fn deepest_mount_holds_the_work_dir() {
        let mounts = "\
/dev/sda1 / ext4 rw 0 0
/dev/nvme0n1p1 /var ext4 rw 0 0
/dev/nvme1n1 /var/ton-work xfs rw 0 0
/dev/sdb1 /var/ton ext4 rw 0 0
";
        assert_eq!(
            parse_mount_device(mounts, Path::new("/var/ton-work")).as_deref(),
            Some("/dev/nvme1n1")
        );
        assert_eq!(
            parse_mount_device(mounts, Path::new("/var/ton-workers")).as_deref(),
            Some("/dev/nvme0n1p1")
        );
        assert_eq!(parse_mount_device("", Path::new("/")), None);
    }
}
