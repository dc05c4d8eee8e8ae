//! # valops-core
//!
//! Core of a validator operations daemon.
//!
//! The daemon samples host network and disk counters every few seconds and
//! keeps short, medium and long window averages of them in a persisted
//! key-value store. Alongside it runs the validator housekeeping that must
//! not repeat itself: a slashing check that fires at most once per
//! validation round, and offer voting that never votes twice for the same
//! offer, even against vote history written by older daemons.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use valops_core::{Daemon, DaemonConfig, Scheduler};
//!
//! let config = DaemonConfig {
//!     store_path: Some("/var/lib/valops/db.json".into()),
//!     ..DaemonConfig::default()
//! };
//! let daemon = Arc::new(Daemon::from_config(config).unwrap());
//! let scheduler = Scheduler::spawn_all(daemon).unwrap();
//! scheduler.stop();
//! scheduler.join();
//! ```
//!
//! ## Architecture
//!
//! Counters → [`HistoryRing`] → window averages → [`Store`] `statistics`
//!
//! Chain access goes through the [`ValidatorCore`] trait; the daemon never
//! speaks the chain protocol itself.

pub mod averager;
pub mod chain;
pub mod counters;
pub mod daemon;
pub mod epoch;
pub mod error;
pub mod history;
pub mod host;
pub mod lifecycle;
pub mod offers;
pub mod series;
pub mod stats;
pub mod store;
pub mod telemetry;

pub use averager::{DiskAverages, NetworkAverages, WindowRates, disk_averages, network_averages};
pub use chain::{
    ChainActivity, Complaint, Detached, Offer, StakingParams, ValidatorCore, ValidatorRound,
};
pub use counters::{
    CounterSource, DiskCounters, DiskSnapshot, NetworkSnapshot, ProcfsCounters, unix_now,
};
pub use daemon::{Daemon, DaemonConfig, Scheduler, Task};
pub use epoch::{ActionOutcome, EpochGate, EpochWindow, GateOutcome, GateState, slashing_tick};
pub use error::{Error, Result};
pub use history::{HistoryRing, Window};
pub use lifecycle::{complaints_tick, elections_tick};
pub use offers::{OfferPlan, StoredVote, VoteHistory, VoteRecord, offers_tick, plan_offers};
pub use series::TimeSeries;
pub use stats::StatsCollector;
pub use store::{Db, Store};
pub use telemetry::{
    OverlayReport, ReportSink, Reporter, TelemetryReport, overlay_telemetry_tick, telemetry_tick,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
