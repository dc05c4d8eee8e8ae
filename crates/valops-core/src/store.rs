//! Process-wide persisted key-value store.
//!
//! The store is a single JSON object. Every writer goes through
//! [`Store::update`], which applies a closure to the current state, persists
//! the merged result, and only then publishes it. Keys the closure does not
//! touch are carried over unchanged.
//!
//! A file-backed store may be edited by another process (an operator
//! toggling `isSlashing`, say). `update` therefore re-reads the file under
//! the lock before applying its closure, and reads pick up the file again
//! whenever it changes on disk. File-backed stores are rewritten
//! atomically: the new contents go to a temporary file in the same
//! directory, which is then renamed over the old one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use serde_json::{Map, Value};

use crate::error::Result;

/// The whole store contents.
pub type Db = Map<String, Value>;

/// Store keys read or written by the daemon.
pub mod keys {
    pub const STATISTICS: &str = "statistics";
    pub const SEND_TELEMETRY: &str = "sendTelemetry";
    pub const IS_SLASHING: &str = "isSlashing";
    pub const SAVE_OFFERS: &str = "saveOffers";
    pub const EPOCH_MARKERS: &str = "epochMarkers";
    pub const TELEMETRY_URL: &str = "telemetryLiteUrl";
    pub const OVERLAY_TELEMETRY_URL: &str = "overlayTelemetryUrl";
    pub const STAKE: &str = "stake";

    pub const NET_LOAD_AVG: &str = "netLoadAvg";
    pub const PPS_AVG: &str = "ppsAvg";
    pub const DISKS_LOAD_AVG: &str = "disksLoadAvg";
    pub const DISKS_LOAD_PERCENT_AVG: &str = "disksLoadPercentAvg";
    pub const IOPS_AVG: &str = "iopsAvg";
    pub const TPS_AVG: &str = "tpsAvg";
    pub const BPS_AVG: &str = "bpsAvg";
    pub const BLOCK_TIME_AVG: &str = "blockTimeAvg";
}

/// Identity of the backing file as last read. Atomic rewrites always
/// change the inode; in-place edits change size or mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

/// Cached contents plus the stamp of the file they were read from.
#[derive(Debug, Default)]
struct Cached {
    db: Db,
    stamp: Option<FileStamp>,
}

/// Shared key-value store, optionally backed by a JSON file.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    cache: Mutex<Cached>,
}

impl Store {
    /// Store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::from_db(Db::new())
    }

    /// In-memory store seeded with `db`.
    pub fn from_db(db: Db) -> Self {
        Self {
            path: None,
            cache: Mutex::new(Cached { db, stamp: None }),
        }
    }

    /// Open a file-backed store. A missing file starts out empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stamp = file_stamp(&path);
        let db = read_db(&path)?;
        Ok(Self {
            path: Some(path),
            cache: Mutex::new(Cached { db, stamp }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Cached> {
        // A panic inside `update` never leaves a half-applied Db behind, so
        // the data under a poisoned lock is still consistent.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the cache, re-reading the backing file first if it changed.
    ///
    /// An unreadable file keeps the last good contents.
    fn lock_fresh(&self) -> MutexGuard<'_, Cached> {
        let mut guard = self.lock();
        if let Some(path) = &self.path {
            let stamp = file_stamp(path);
            if stamp != guard.stamp {
                match read_db(path) {
                    Ok(db) => {
                        guard.db = db;
                        guard.stamp = stamp;
                    }
                    Err(e) => log::warn!("keeping cached store, {} unreadable: {e}", path.display()),
                }
            }
        }
        guard
    }

    /// Re-read the backing file unconditionally.
    pub fn reload(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let stamp = file_stamp(path);
            let db = read_db(path)?;
            let mut guard = self.lock();
            guard.db = db;
            guard.stamp = stamp;
        }
        Ok(())
    }

    /// A consistent copy of the whole store.
    pub fn snapshot(&self) -> Db {
        self.lock_fresh().db.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock_fresh().db.get(key).cloned()
    }

    /// True only when `key` holds the JSON boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.lock_fresh().db.get(key), Some(Value::Bool(true)))
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.lock_fresh()
            .db
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Apply `f` to the current contents, persist them, then publish them.
    ///
    /// For a file-backed store the current contents are read from disk, so
    /// keys written by another process since the last read survive. If
    /// reading or persisting fails the in-memory state is left untouched.
    pub fn update<R>(&self, f: impl FnOnce(&mut Db) -> R) -> Result<R> {
        let mut guard = self.lock();
        let mut next = match &self.path {
            Some(path) => read_db(path)?,
            None => guard.db.clone(),
        };
        let out = f(&mut next);
        if let Some(path) = &self.path {
            write_db(path, &next)?;
            guard.stamp = file_stamp(path);
        }
        guard.db = next;
        Ok(out)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|db| {
            db.insert(key.to_string(), value);
        })
    }

    /// The `statistics` map, empty if absent.
    pub fn statistics(&self) -> Map<String, Value> {
        match self.lock_fresh().db.get(keys::STATISTICS) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn statistic(&self, name: &str) -> Option<Value> {
        self.statistics().get(name).cloned()
    }

    /// Replace the given statistics families, leaving the others alone.
    pub fn merge_statistics(&self, families: Vec<(&str, Value)>) -> Result<()> {
        self.update(|db| {
            let stats = db
                .entry(keys::STATISTICS)
                .or_insert_with(|| Value::Object(Map::new()));
            if !stats.is_object() {
                *stats = Value::Object(Map::new());
            }
            if let Value::Object(map) = stats {
                for (name, value) in families {
                    map.insert(name.to_string(), value);
                }
            }
        })
    }
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = std::fs::metadata(path).ok()?;
    #[cfg(unix)]
    let inode = std::os::unix::fs::MetadataExt::ino(&meta);
    #[cfg(not(unix))]
    let inode = 0;
    Some(FileStamp {
        modified: meta.modified().ok(),
        len: meta.len(),
        inode,
    })
}

fn read_db(path: &Path) -> Result<Db> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(Db::new()),
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Db::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_db(path: &Path, db: &Db) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, db)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
