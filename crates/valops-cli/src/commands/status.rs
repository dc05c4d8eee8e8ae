use valops_core::store::keys;

pub fn run(store_path: &str, json: bool) {
    let store = super::open_store(store_path);
    let stats = store.statistics();
    let markers = store
        .get(keys::EPOCH_MARKERS)
        .unwrap_or_else(|| serde_json::json!({}));

    if json {
        let out = serde_json::json!({
            "statistics": stats,
            "epochMarkers": markers,
            "isSlashing": store.flag(keys::IS_SLASHING),
            "sendTelemetry": store.flag(keys::SEND_TELEMETRY),
        });
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Store: {store_path}");
    println!(
        "  Slashing:  {}",
        if store.flag(keys::IS_SLASHING) { "enabled" } else { "disabled" }
    );
    println!(
        "  Telemetry: {}",
        if store.flag(keys::SEND_TELEMETRY) { "enabled" } else { "disabled" }
    );
    if let Some(map) = markers.as_object() {
        for (action, round) in map {
            println!("  Last {action} round: {round}");
        }
    }
    println!();
    if stats.is_empty() {
        println!("No statistics published yet.");
    } else {
        super::print_statistics(&stats);
    }
}
