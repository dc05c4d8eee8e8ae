use std::sync::Arc;

use valops_server::AppState;

pub fn run(store_path: &str, host: &str, port: u16) {
    let store = Arc::new(super::open_store(store_path));

    let base = format!("http://{host}:{port}");
    println!("valops status API v{}", valops_core::VERSION);
    println!("   {base}  (following {store_path})");
    println!();
    println!("   Endpoints:");
    println!("     GET /                 API index");
    println!("     GET /health           Health check");
    println!("     GET /statistics       Window averages, optionally ?name=<family>");
    println!("     GET /epoch            Epoch markers and runtime toggles");
    println!();

    let stop = super::stop_on_ctrlc();
    let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    let state = AppState::new(store, true);
    if let Err(e) = rt.block_on(valops_server::run_server(
        state,
        host,
        port,
        super::wait_for(stop),
    )) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
