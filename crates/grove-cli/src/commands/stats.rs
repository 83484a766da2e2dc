use std::sync::{Arc, Mutex};

use grove_core::{CounterStore, Database, KvCounterStore};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let store = KvCounterStore::new(Arc::new(Mutex::new(db)));
    let completed_count = store.load()?;
    let stats = serde_json::json!({ "completed_count": completed_count });
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
