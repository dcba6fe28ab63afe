//! Concurrent producers and live readers.

use crossbeam::utils::Backoff;
use pagejournal_rs::journal::{
    AggregateReader, Category, Location, MemoryPageProviderFactory, Mode, NoopPublisher, Reader,
    SingleReader, Writer, poll_next,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn location(name: &str) -> Location {
    Location::new(Mode::Live, Category::Md, "venue", name)
}

#[test]
fn producers_never_interleave_frames() {
    let factory = MemoryPageProviderFactory::with_page_size(16 * 1024);
    let writer = Arc::new(
        Writer::new(&factory, location("shared"), Arc::new(NoopPublisher)).expect("writer"),
    );
    let producers = 6;
    let per_producer = 500u32;

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                for seq in 0..per_producer {
                    // Variable payload sizes so frames straddle page ends.
                    let mut payload = seq.to_le_bytes().to_vec();
                    payload.resize(4 + (seq as usize % 97), p as u8);
                    writer.append(p, 1, 0, &payload).expect("append");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer");
    }

    let mut reader = SingleReader::new(Arc::new(factory));
    reader.subscribe(location("shared"), 0).expect("subscribe");
    let mut next_seq: HashMap<i16, u32> = HashMap::new();
    while let Some(frame) = reader.current_frame() {
        frame.verify().expect("checksum");
        let data = frame.data();
        let seq = u32::from_le_bytes(data[..4].try_into().expect("seq prefix"));
        assert!(data[4..].iter().all(|&b| b == frame.source() as u8));
        // Each producer's frames appear in its own program order.
        let expected = next_seq.entry(frame.source()).or_insert(0);
        assert_eq!(seq, *expected);
        *expected += 1;
        reader.seek_next().expect("seek next");
    }
    assert_eq!(next_seq.len(), producers as usize);
    assert!(next_seq.values().all(|&n| n == per_producer));
}

#[test]
fn live_reader_sees_every_frame_while_writer_runs() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    let writer = Writer::new(&factory, location("live"), Arc::new(NoopPublisher)).expect("writer");
    let total = 2_000i64;

    let mut reader = SingleReader::new(Arc::new(factory));
    reader.subscribe(location("live"), 0).expect("subscribe");

    let producer = thread::spawn(move || {
        for t in 0..total {
            writer.append(0, 1, t, &t.to_le_bytes()).expect("append");
        }
    });

    let backoff = Backoff::new();
    let mut seen = 0i64;
    while seen < total {
        if !poll_next(&mut reader, &backoff).expect("poll") {
            backoff.reset();
            continue;
        }
        let frame = reader.current_frame().expect("frame after poll");
        frame.verify().expect("checksum");
        assert_eq!(frame.trigger_time(), seen);
        assert_eq!(frame.data(), &seen.to_le_bytes()[..]);
        seen += 1;
        backoff.reset();
        reader.seek_next().expect("seek next");
    }
    producer.join().expect("producer");
}

#[test]
fn aggregate_reader_follows_live_writers() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    let names = ["a", "b", "c"];
    let writers: Vec<Writer> = names
        .iter()
        .map(|n| Writer::new(&factory, location(n), Arc::new(NoopPublisher)).expect("writer"))
        .collect();

    let mut reader = AggregateReader::new(Arc::new(factory));
    for n in names {
        reader.subscribe(location(n), 0).expect("subscribe");
    }

    let per_writer = 300i64;
    let handles: Vec<_> = writers
        .into_iter()
        .enumerate()
        .map(|(i, writer)| {
            thread::spawn(move || {
                for k in 0..per_writer {
                    writer.append(0, 1, k * 3 + i as i64, b"x").expect("append");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer");
    }

    reader.refresh().expect("refresh");
    let mut times = Vec::new();
    while let Some(frame) = reader.current_frame() {
        times.push(frame.trigger_time());
        reader.seek_next().expect("seek next");
    }
    assert_eq!(times, (0..per_writer * 3).collect::<Vec<_>>());
}
