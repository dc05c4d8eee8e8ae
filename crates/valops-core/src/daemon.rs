//! Daemon state and the periodic task scheduler.
//!
//! Every task runs on its own thread with its own period and shares one
//! [`Daemon`]. A tick that fails or panics is logged and forgotten; the
//! next tick runs on schedule.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::chain::{Detached, ValidatorCore};
use crate::counters::{CounterSource, ProcfsCounters, unix_now};
use crate::epoch::slashing_tick;
use crate::error::Result;
use crate::history::{DEFAULT_SAMPLES_PER_WINDOW, DEFAULT_WINDOW_COUNT};
use crate::lifecycle::{complaints_tick, elections_tick};
use crate::offers::offers_tick;
use crate::stats::StatsCollector;
use crate::store::Store;
use crate::telemetry::{DEFAULT_TIMEOUT, ReportSink, Reporter, overlay_telemetry_tick, telemetry_tick};

/// Complaint and slashing period on mainnet.
pub const MAINNET_CHECK_PERIOD: Duration = Duration::from_secs(600);
/// Complaint and slashing period on every other network.
pub const TESTNET_CHECK_PERIOD: Duration = Duration::from_secs(60);

const STOP_POLL: Duration = Duration::from_millis(100);

/// Configuration for a daemon run.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// JSON store file; `None` keeps the store in memory.
    pub store_path: Option<PathBuf>,
    pub window_count: usize,
    pub samples_per_window: usize,
    pub statistics_period: Duration,
    pub elections_period: Duration,
    pub offers_period: Duration,
    /// Overrides the network-dependent complaint and slashing period.
    pub check_period: Option<Duration>,
    pub telemetry_period: Duration,
    pub overlay_telemetry_period: Duration,
    pub telemetry_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            window_count: DEFAULT_WINDOW_COUNT,
            samples_per_window: DEFAULT_SAMPLES_PER_WINDOW,
            statistics_period: Duration::from_secs(10),
            elections_period: Duration::from_secs(600),
            offers_period: Duration::from_secs(600),
            check_period: None,
            telemetry_period: Duration::from_secs(60),
            overlay_telemetry_period: Duration::from_secs(7200),
            telemetry_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A periodic daemon task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Statistics,
    Elections,
    Offers,
    Complaints,
    Slashing,
    Telemetry,
    OverlayTelemetry,
}

impl Task {
    pub const ALL: [Task; 7] = [
        Task::Statistics,
        Task::Elections,
        Task::Offers,
        Task::Complaints,
        Task::Slashing,
        Task::Telemetry,
        Task::OverlayTelemetry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Task::Statistics => "statistics",
            Task::Elections => "elections",
            Task::Offers => "offers",
            Task::Complaints => "complaints",
            Task::Slashing => "slashing",
            Task::Telemetry => "telemetry",
            Task::OverlayTelemetry => "overlay-telemetry",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared daemon state.
pub struct Daemon {
    config: DaemonConfig,
    store: Arc<Store>,
    stats: Mutex<StatsCollector>,
    core: Box<dyn ValidatorCore>,
    counters: Box<dyn CounterSource>,
    sink: Box<dyn ReportSink>,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        store: Arc<Store>,
        core: Box<dyn ValidatorCore>,
        counters: Box<dyn CounterSource>,
        sink: Box<dyn ReportSink>,
    ) -> Self {
        let stats = StatsCollector::new(config.window_count, config.samples_per_window);
        Self {
            config,
            store,
            stats: Mutex::new(stats),
            core,
            counters,
            sink,
        }
    }

    /// Daemon on this host's procfs counters with no validator core
    /// attached.
    pub fn from_config(config: DaemonConfig) -> Result<Self> {
        let store = match &config.store_path {
            Some(path) => Store::open(path)?,
            None => Store::in_memory(),
        };
        let sink = Reporter::new(config.telemetry_timeout)?;
        Ok(Self::new(
            config,
            Arc::new(store),
            Box::new(Detached),
            Box::new(ProcfsCounters::default()),
            Box::new(sink),
        ))
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Complaint and slashing period for the attached network. An unknown
    /// network gets the slower mainnet period.
    pub fn check_period(&self) -> Duration {
        if let Some(period) = self.config.check_period {
            return period;
        }
        match self.core.network_name() {
            Ok(name) if name == "mainnet" => MAINNET_CHECK_PERIOD,
            Ok(_) => TESTNET_CHECK_PERIOD,
            Err(e) => {
                log::debug!("network name unavailable ({e}), using mainnet check period");
                MAINNET_CHECK_PERIOD
            }
        }
    }

    pub fn period(&self, task: Task) -> Duration {
        match task {
            Task::Statistics => self.config.statistics_period,
            Task::Elections => self.config.elections_period,
            Task::Offers => self.config.offers_period,
            Task::Complaints | Task::Slashing => self.check_period(),
            Task::Telemetry => self.config.telemetry_period,
            Task::OverlayTelemetry => self.config.overlay_telemetry_period,
        }
    }

    /// Run one tick of `task` at wall-clock time `now`.
    pub fn run_task(&self, task: Task, now: u64) -> Result<()> {
        let core = self.core.as_ref();
        let store = self.store.as_ref();
        match task {
            Task::Statistics => {
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                match core.chain_activity() {
                    Ok(Some(activity)) => {
                        stats.record_chain_activity(now, activity.transactions, activity.blocks)
                    }
                    Ok(None) => {}
                    Err(e) => log::debug!("no chain activity this tick: {e}"),
                }
                stats.tick(self.counters.as_ref(), store, now)
            }
            Task::Elections => elections_tick(core),
            Task::Offers => offers_tick(core, store).map(drop),
            Task::Complaints => complaints_tick(core).map(drop),
            Task::Slashing => slashing_tick(core, store, now).map(|outcome| {
                log::debug!("slashing gate: {outcome:?}");
            }),
            Task::Telemetry => telemetry_tick(core, store, self.sink.as_ref()).map(drop),
            Task::OverlayTelemetry => {
                overlay_telemetry_tick(core, store, self.sink.as_ref()).map(drop)
            }
        }
    }

    /// Run one tick, logging any error or panic. Returns whether it
    /// completed cleanly.
    pub fn tick(&self, task: Task) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.run_task(task, unix_now()))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("{task} tick failed: {e}");
                false
            }
            Err(_) => {
                log::error!("{task} tick panicked");
                false
            }
        }
    }
}

/// Handle to the running task threads.
pub struct Scheduler {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start one thread per task in `tasks`.
    pub fn spawn(daemon: Arc<Daemon>, tasks: &[Task]) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(tasks.len());
        for &task in tasks {
            let daemon = Arc::clone(&daemon);
            let stop = Arc::clone(&stop);
            let handle = std::thread::Builder::new()
                .name(format!("valops-{task}"))
                .spawn(move || run_periodic(&daemon, task, &stop))?;
            handles.push(handle);
        }
        log::info!("scheduler started with {} tasks", handles.len());
        Ok(Self { stop, handles })
    }

    /// Start every task.
    pub fn spawn_all(daemon: Arc<Daemon>) -> Result<Self> {
        Self::spawn(daemon, &Task::ALL)
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for every task thread to observe the stop flag.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                log::error!("task thread exited abnormally");
            }
        }
    }
}

fn run_periodic(daemon: &Daemon, task: Task, stop: &AtomicBool) {
    let period = daemon.period(task);
    log::debug!("{task} task every {}s", period.as_secs());
    while !stop.load(Ordering::SeqCst) {
        daemon.tick(task);
        let deadline = Instant::now() + period;
        while Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
            std::thread::sleep(STOP_POLL.min(period));
        }
    }
}
