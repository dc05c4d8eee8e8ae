use serde_json::Value;

/// Parse a value given on the command line. Anything that is not JSON is
/// stored as a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn run(store_path: &str, key: &str, raw: &str) {
    let store = super::open_store(store_path);
    let value = parse_value(raw);
    if let Err(e) = store.set(key, value.clone()) {
        eprintln!("Error writing {store_path}: {e}");
        std::process::exit(1);
    }
    println!("{key} = {value}");
}
