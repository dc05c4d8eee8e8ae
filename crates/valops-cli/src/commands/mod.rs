pub mod run;
pub mod set;
pub mod serve;
pub mod stats;
pub mod status;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use valops_core::Store;

/// Open a store file or exit with an error.
pub fn open_store(path: &str) -> Store {
    match Store::open(path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening store {path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Flag that turns true on Ctrl+C.
pub fn stop_on_ctrlc() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        s.store(true, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
    stop
}

/// Resolves once `stop` is set.
pub fn wait_for(stop: Arc<AtomicBool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        while !stop.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

/// Format a `[short, medium, long]` statistics value for a table cell.
pub fn format_windows(value: &serde_json::Value) -> String {
    match value.as_array() {
        Some(items) => items
            .iter()
            .map(|v| match v.as_f64() {
                Some(x) => format!("{x:>9.2}"),
                None => format!("{:>9}", "-"),
            })
            .collect::<Vec<_>>()
            .join(" "),
        None => "-".to_string(),
    }
}

/// Print the statistics map as an aligned table.
pub fn print_statistics(stats: &serde_json::Map<String, serde_json::Value>) {
    println!("{:<26} {:>9} {:>9} {:>9}", "Family", "1m", "5m", "15m");
    println!("{}", "-".repeat(56));
    for (family, value) in stats {
        match value {
            serde_json::Value::Object(per_disk) => {
                for (disk, windows) in per_disk {
                    let label = format!("{family}[{disk}]");
                    println!("{label:<26} {}", format_windows(windows));
                }
            }
            other => println!("{family:<26} {}", format_windows(other)),
        }
    }
}
