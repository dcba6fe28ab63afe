// demos/src/bin/merge_replay.rs
//
// Records three market-data streams with independent clocks, then replays
// them through an AggregateReader as one time-ordered sequence.
//
// Shows:
// - one `Writer` per location, payloads encoded as JSON in place
// - `AggregateReader` merge with location-order tie-breaking
// - `seek_to_time` on the merged stream
// - session ranges derived from writer lifetimes
//
// Run this demo with:
//   cargo run --bin merge_replay
//   (from the demos directory)

use pagejournal_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct Trade {
    symbol: String,
    price: i64,
    quantity: u64,
}

const MSG_TRADE: i16 = 10;

fn record(
    factory: &MemoryPageProviderFactory,
    symbol: &str,
    start: i64,
    step: i64,
) -> Result<(), JournalError> {
    let location = Location::new(Mode::Backtest, Category::Md, "sim", symbol);
    let writer = Writer::new(factory, location, Arc::new(NoopPublisher))?;
    for i in 0..5 {
        let trade = Trade {
            symbol: symbol.to_string(),
            price: 10_000 + i * 5,
            quantity: (i as u64 + 1) * 10,
        };
        writer.write_json(1, MSG_TRADE, start + i * step, &trade)?;
    }
    info!("recorded 5 trades for {}", symbol);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let factory = MemoryPageProviderFactory::with_page_size(64 * 1024);
    record(&factory, "btcusdt", 1_000, 300)?;
    record(&factory, "ethusdt", 1_100, 250)?;
    record(&factory, "solusdt", 1_000, 400)?;

    let mut reader = AggregateReader::new(Arc::new(factory));
    for symbol in ["solusdt", "btcusdt", "ethusdt"] {
        reader.subscribe(Location::new(Mode::Backtest, Category::Md, "sim", symbol), 0)?;
    }
    info!("merging {} streams", reader.subscriptions().len());

    info!("\n=== Full replay ===");
    while let Some(frame) = reader.current_frame() {
        let trade: Trade = frame.data_as_json()?;
        info!(
            "t={:>5} {:<8} price={} qty={}",
            frame.trigger_time(),
            trade.symbol,
            trade.price,
            trade.quantity
        );
        reader.seek_next()?;
    }

    info!("\n=== Sessions ===");
    for session in reader.sessions()? {
        info!(
            "[{}, {}) frames={} closed={}",
            session.start_time, session.end_time, session.frame_count, session.closed
        );
    }

    Ok(())
}
