//! Integration tests for single-location writing and reading.

use pagejournal_rs::journal::{
    Category, JournalConfig, JournalError, Location, MemoryPageProviderFactory, Mode,
    NoopPublisher, PageProviderFactory, Reader, SingleReader, WatchPublisher, Writer,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn location() -> Location {
    Location::new(Mode::Live, Category::Md, "binance", "btcusdt")
}

fn factory(page_size: usize) -> Arc<MemoryPageProviderFactory> {
    Arc::new(MemoryPageProviderFactory::with_page_size(page_size))
}

fn open_writer(factory: &MemoryPageProviderFactory) -> Writer {
    Writer::new(factory, location(), Arc::new(NoopPublisher)).expect("open writer")
}

fn subscribe(factory: &Arc<MemoryPageProviderFactory>, from_time: i64) -> SingleReader {
    let mut reader = SingleReader::new(factory.clone());
    reader.subscribe(location(), from_time).expect("subscribe");
    reader
}

fn trigger_times(reader: &mut SingleReader) -> Vec<i64> {
    let mut out = Vec::new();
    while let Some(frame) = reader.current_frame() {
        out.push(frame.trigger_time());
        reader.seek_next().expect("seek next");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Quote {
    symbol: String,
    bid: i64,
    ask: i64,
}

// ---------------------------------------------------------------------------
// Write / read
// ---------------------------------------------------------------------------

#[test]
fn frames_are_read_back_in_write_order() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    for t in 1..=5 {
        writer
            .append(7, 100, t * 10, format!("tick-{t}").as_bytes())
            .expect("append");
    }

    let mut reader = subscribe(&factory, 0);
    let mut payloads = Vec::new();
    while let Some(frame) = reader.current_frame() {
        assert_eq!(frame.source(), 7);
        assert_eq!(frame.msg_type(), 100);
        payloads.push(String::from_utf8(frame.data().to_vec()).expect("utf8"));
        reader.seek_next().expect("seek next");
    }
    assert_eq!(payloads, ["tick-1", "tick-2", "tick-3", "tick-4", "tick-5"]);
}

#[test]
fn page_boundaries_are_invisible_to_readers() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    let payload = vec![0xAB; 300];
    for t in 0..200 {
        writer.append(0, 1, t, &payload).expect("append");
    }
    assert!(factory.locations().contains(&location()));

    let mut reader = subscribe(&factory, 0);
    assert_eq!(trigger_times(&mut reader), (0..200).collect::<Vec<_>>());
}

#[test]
fn subscribe_from_time_skips_earlier_frames() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    for t in (0..1_000).step_by(10) {
        writer.append(0, 1, t, b"x").expect("append");
    }
    let mut reader = subscribe(&factory, 995);
    assert!(trigger_times(&mut reader).is_empty());

    let mut reader = subscribe(&factory, 985);
    assert_eq!(trigger_times(&mut reader), vec![990]);
}

#[test]
fn seek_to_time_is_idempotent_and_monotonic() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    for t in [10, 20, 30, 40] {
        writer.append(0, 1, t, b"x").expect("append");
    }
    let mut reader = subscribe(&factory, 0);

    reader.seek_to_time(25).expect("seek");
    assert_eq!(reader.current_frame().map(|f| f.trigger_time()), Some(30));
    reader.seek_to_time(25).expect("seek again");
    assert_eq!(reader.current_frame().map(|f| f.trigger_time()), Some(30));
    reader.seek_to_time(0).expect("seek back");
    assert_eq!(reader.current_frame().map(|f| f.trigger_time()), Some(30));
}

#[test]
fn json_payloads_round_trip() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    let quote = Quote {
        symbol: "BTC-USDT".to_string(),
        bid: 6_400_000,
        ask: 6_400_100,
    };
    writer.write_json(1, 2, 1, &quote).expect("write json");

    let reader = subscribe(&factory, 0);
    let frame = reader.current_frame().expect("frame");
    assert_eq!(frame.data_as_json::<Quote>().expect("decode"), quote);
    assert!(frame.verify().is_ok());
}

#[test]
fn live_reader_catches_up_after_refresh() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    let mut reader = subscribe(&factory, 0);
    assert!(!reader.data_available());

    writer.append(0, 1, 1, b"first").expect("append");
    assert!(!reader.data_available());
    reader.refresh().expect("refresh");
    assert_eq!(trigger_times(&mut reader), vec![1]);

    for t in 2..100 {
        writer.append(0, 1, t, &[0u8; 64]).expect("append");
    }
    reader.refresh().expect("refresh");
    assert_eq!(trigger_times(&mut reader), (2..100).collect::<Vec<_>>());
}

#[test]
fn watch_publisher_reports_each_commit() {
    let factory = factory(4096);
    let publisher = Arc::new(WatchPublisher::new());
    let mut rx = publisher.subscribe(&location());
    let writer = Writer::new(factory.as_ref(), location(), publisher.clone()).expect("writer");

    let descriptor = writer.append(3, 9, 77, b"n").expect("append");
    assert!(rx.has_changed().expect("sender alive"));
    assert_eq!(*rx.borrow_and_update(), Some(descriptor));
    assert_eq!(descriptor.trigger_time, 77);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[test]
fn sessions_track_writer_lifetimes() {
    let factory = factory(4096);
    {
        let writer = open_writer(&factory);
        writer.append(0, 1, 1_000, b"a").expect("append");
        writer.append(0, 1, 2_000, b"b").expect("append");
    }
    let writer = open_writer(&factory);
    writer.append(0, 1, 5_000, b"c").expect("append");

    let reader = subscribe(&factory, 0);
    let sessions = reader.sessions().expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert_eq!((sessions[0].start_time, sessions[0].end_time), (1_000, 2_001));
    assert!(sessions[0].closed);
    assert_eq!(sessions[0].frame_count, 2);
    assert!(sessions[0].contains(1_500));
    assert_eq!((sessions[1].start_time, sessions[1].end_time), (5_000, 5_001));
    assert!(!sessions[1].closed);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn reader_on_unknown_location_is_not_found() {
    let factory = factory(4096);
    let mut reader = SingleReader::new(factory);
    let err = reader.subscribe(location(), 0).expect_err("no data yet");
    assert!(matches!(err, JournalError::NotFound { .. }));
    assert!(err.to_string().contains("live/md/binance/btcusdt"));
}

#[test]
fn second_writer_is_rejected_until_first_drops() {
    let factory = factory(4096);
    let first = open_writer(&factory);
    assert!(matches!(
        Writer::new(factory.as_ref(), location(), Arc::new(NoopPublisher)),
        Err(JournalError::WriterBusy { .. })
    ));
    drop(first);
    assert!(Writer::new(factory.as_ref(), location(), Arc::new(NoopPublisher)).is_ok());
}

#[test]
fn subscribing_twice_is_misuse() {
    let factory = factory(4096);
    let _writer = open_writer(&factory);
    let mut reader = subscribe(&factory, 0);
    assert!(matches!(
        reader.subscribe(location(), 0),
        Err(JournalError::AlreadySubscribed { .. })
    ));
}

#[test]
fn oversized_frame_is_rejected() {
    let factory = factory(4096);
    let writer = open_writer(&factory);
    let err = writer
        .append(0, 1, 1, &vec![0u8; 8_000])
        .expect_err("cannot fit");
    assert!(matches!(err, JournalError::FrameTooLarge { frame_bytes: 8_032, .. }));
}

#[test]
fn exhausted_store_is_reported() {
    let factory = Arc::new(MemoryPageProviderFactory::with_page_size(4096).with_max_pages(2));
    let writer = open_writer(&factory);
    let payload = vec![1u8; 2_000];
    let err = (0..10)
        .map(|t| writer.append(0, 1, t, &payload))
        .find_map(Result::err)
        .expect("store runs out");
    assert!(matches!(err, JournalError::ResourceExhausted { page_id: 3, .. }));
    assert!(writer.verify_integrity().is_ok());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn factory_built_from_json_config() {
    let config =
        JournalConfig::from_json_str(r#"{ "backend": "memory", "page_size": 8192 }"#)
            .expect("valid config");
    let factory: Arc<dyn PageProviderFactory> = config.build_factory().expect("factory");

    let writer = Writer::new(factory.as_ref(), location(), Arc::new(NoopPublisher))
        .expect("writer");
    writer.append(0, 1, 42, b"configured").expect("append");

    let mut reader = SingleReader::new(Arc::clone(&factory));
    reader.subscribe(location(), 0).expect("subscribe");
    assert_eq!(
        reader.current_frame().map(|f| f.data()),
        Some(&b"configured"[..])
    );
}

#[test]
fn invalid_config_is_rejected() {
    assert!(matches!(
        JournalConfig::from_json_str(r#"{ "page_size": 100 }"#),
        Err(JournalError::InvalidConfig { .. })
    ));
    assert!(matches!(
        JournalConfig::from_json_str("not json"),
        Err(JournalError::InvalidConfig { .. })
    ));
}
