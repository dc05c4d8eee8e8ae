use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use valops_core::{ProcfsCounters, StatsCollector, Store, unix_now};

pub fn run(samples: usize, interval: u64, samples_per_window: usize, output_path: Option<&str>) {
    let counters = ProcfsCounters::default();
    let store = Store::in_memory();
    let mut stats = StatsCollector::new(valops_core::history::DEFAULT_WINDOW_COUNT, samples_per_window);
    let stop = super::stop_on_ctrlc();
    let interval = Duration::from_secs(interval.max(1));

    println!(
        "Sampling {samples} times, {}s apart (Ctrl+C to stop early)",
        interval.as_secs()
    );
    for i in 0..samples {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = stats.tick(&counters, &store, unix_now()) {
            eprintln!("Sample {} failed: {e}", i + 1);
        }
        if i + 1 < samples {
            let deadline = Instant::now() + interval;
            while Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
    println!();

    let published = store.statistics();
    super::print_statistics(&published);

    if let Some(path) = output_path {
        let json = match serde_json::to_string_pretty(&published) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };
        if let Err(e) = std::fs::write(path, json) {
            eprintln!("Error writing {path}: {e}");
            std::process::exit(1);
        }
        println!();
        println!("Statistics written to {path}");
    }
}
