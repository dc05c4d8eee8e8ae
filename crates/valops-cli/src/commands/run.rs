use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use valops_core::{Daemon, DaemonConfig, Scheduler};
use valops_server::AppState;

pub struct RunCommandConfig<'a> {
    pub store_path: &'a str,
    pub stats_period: u64,
    pub samples_per_window: usize,
    pub check_period: Option<u64>,
    pub telemetry_timeout: u64,
    pub port: Option<u16>,
    pub host: &'a str,
}

impl RunCommandConfig<'_> {
    fn daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            store_path: Some(PathBuf::from(self.store_path)),
            samples_per_window: self.samples_per_window,
            statistics_period: Duration::from_secs(self.stats_period.max(1)),
            check_period: self.check_period.map(Duration::from_secs),
            telemetry_timeout: Duration::from_secs(self.telemetry_timeout),
            ..DaemonConfig::default()
        }
    }
}

pub fn run(cfg: RunCommandConfig<'_>) {
    let config = cfg.daemon_config();
    let daemon = match Daemon::from_config(config) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            eprintln!("Error starting daemon: {e}");
            std::process::exit(1);
        }
    };
    let store = Arc::clone(daemon.store());

    println!("valops v{}", valops_core::VERSION);
    println!("  Store:      {}", cfg.store_path);
    println!("  Statistics: every {}s", cfg.stats_period.max(1));
    if let Some(port) = cfg.port {
        println!("  Status API: http://{}:{port}", cfg.host);
    }
    println!("  Stop with Ctrl+C");
    println!();

    let stop = super::stop_on_ctrlc();
    let scheduler = match Scheduler::spawn_all(daemon) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error starting tasks: {e}");
            std::process::exit(1);
        }
    };

    if let Some(port) = cfg.port {
        let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
        let state = AppState::new(store, false);
        if let Err(e) = rt.block_on(valops_server::run_server(
            state,
            cfg.host,
            port,
            super::wait_for(Arc::clone(&stop)),
        )) {
            eprintln!("Status API stopped: {e}");
        }
    }

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("stopping");
    scheduler.stop();
    scheduler.join();
}
