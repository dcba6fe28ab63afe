// demos/src/bin/persisted_journal.rs
//
// Builds a file-backed journal from a JSON configuration, writes to it,
// drops the writer, and reopens the store to verify and read it back,
// as a restarted process would.
//
// Run this demo with:
//   cargo run --bin persisted_journal --features mmap
//   (from the demos directory)

use pagejournal_rs::prelude::*;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let root = std::env::temp_dir().join(format!("pagejournal-demo-{}", std::process::id()));
    let json = serde_json::json!({
        "backend": "mmap",
        "root": root,
        "page_size": 64 * 1024,
    })
    .to_string();
    let config = JournalConfig::from_json_str(&json)?;
    info!("config: {:?}", config);

    let location = Location::new(Mode::Data, Category::System, "demo", "heartbeats");

    {
        let factory = config.build_factory()?;
        let writer = Writer::new(factory.as_ref(), location.clone(), Arc::new(NoopPublisher))?;
        for beat in 0..1_000i64 {
            writer.append(0, 1, beat * 1_000_000, &beat.to_le_bytes())?;
        }
        info!("wrote 1000 heartbeats under {}", root.display());
    }

    let factory = config.build_factory()?;
    let mut reader = SingleReader::new(factory);
    reader.subscribe(location, 500 * 1_000_000)?;
    reader.verify_integrity()?;

    let mut count = 0;
    while reader.data_available() {
        count += 1;
        reader.seek_next()?;
    }
    info!("read {} heartbeats from t=500ms onward", count);
    for session in reader.sessions()? {
        info!("session {:?}", session);
    }

    std::fs::remove_dir_all(&root)?;
    Ok(())
}
