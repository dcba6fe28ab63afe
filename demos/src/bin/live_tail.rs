//! Live tailing: producer threads append to one journal while an async task
//! wakes on `WatchPublisher` notifications and drains new frames.
//!
//! Run with:
//!   cargo run --bin live_tail
//!   (from the demos directory)

use pagejournal_rs::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const PRODUCERS: i16 = 3;
const FRAMES_PER_PRODUCER: i64 = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let factory = Arc::new(MemoryPageProviderFactory::with_page_size(16 * 1024));
    let location = Location::new(Mode::Live, Category::Td, "paper", "orders");
    let publisher = Arc::new(WatchPublisher::new());
    let mut changes = publisher.subscribe(&location);

    let writer = Arc::new(Writer::new(
        factory.as_ref(),
        location.clone(),
        publisher.clone(),
    )?);

    let mut reader = SingleReader::new(factory.clone());
    reader.subscribe(location, 0)?;

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|source| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for k in 0..FRAMES_PER_PRODUCER {
                    let body = format!("order {k} from producer {source}");
                    if let Err(e) = writer.append(source, 1, now_in_nanos(), body.as_bytes()) {
                        warn!("append failed: {}", e);
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();

    let expected = i64::from(PRODUCERS) * FRAMES_PER_PRODUCER;
    let mut received = 0i64;
    while received < expected {
        if changes.changed().await.is_err() {
            break;
        }
        reader.refresh()?;
        while let Some(frame) = reader.current_frame() {
            received += 1;
            info!(
                "#{:<3} source={} {}",
                received,
                frame.source(),
                String::from_utf8_lossy(frame.data())
            );
            reader.seek_next()?;
        }
    }

    for handle in handles {
        if handle.join().is_err() {
            warn!("producer thread panicked");
        }
    }
    info!(
        "received {} frames, {} notifications published",
        received,
        publisher.publish_count()
    );
    Ok(())
}
