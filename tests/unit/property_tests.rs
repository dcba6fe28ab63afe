//! Property tests for payload fidelity and merge order.

use pagejournal_rs::journal::{
    AggregateReader, Category, Location, MemoryPageProviderFactory, Mode, NoopPublisher, Reader,
    SingleReader, Writer,
};
use proptest::prelude::*;
use std::sync::Arc;

fn stream(index: usize) -> Location {
    Location::new(Mode::Replay, Category::Md, "prop", format!("s{index}"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn payloads_survive_any_page_size(
        page_kib in 4usize..16,
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..2048), 1..64),
    ) {
        let factory = MemoryPageProviderFactory::with_page_size(page_kib * 1024);
        let writer = Writer::new(&factory, stream(0), Arc::new(NoopPublisher))
            .expect("writer");
        for (t, payload) in payloads.iter().enumerate() {
            writer.append(1, 2, t as i64, payload).expect("append");
        }

        let mut reader = SingleReader::new(Arc::new(factory));
        reader.subscribe(stream(0), 0).expect("subscribe");
        let mut read = Vec::new();
        while let Some(frame) = reader.current_frame() {
            prop_assert!(frame.verify().is_ok());
            read.push(frame.data().to_vec());
            reader.seek_next().expect("seek next");
        }
        prop_assert_eq!(read, payloads);
    }

    #[test]
    fn merge_is_sorted_with_location_tie_break(
        streams in prop::collection::vec(prop::collection::vec(0i64..200, 0..40), 1..5),
    ) {
        let factory = MemoryPageProviderFactory::with_page_size(4096);
        let mut expected = Vec::new();
        for (index, times) in streams.iter().enumerate() {
            let mut times = times.clone();
            times.sort_unstable();
            let writer = Writer::new(&factory, stream(index), Arc::new(NoopPublisher))
                .expect("writer");
            for (seq, &t) in times.iter().enumerate() {
                writer
                    .append(index as i16, 1, t, &(seq as u32).to_le_bytes())
                    .expect("append");
                expected.push((t, index as i16, seq as u32));
            }
        }
        // Stable sort keeps each stream's own order for equal times.
        expected.sort_by_key(|&(t, index, _)| (t, index));

        let mut reader = AggregateReader::new(Arc::new(factory));
        for index in (0..streams.len()).rev() {
            reader.subscribe(stream(index), 0).expect("subscribe");
        }
        let mut merged = Vec::new();
        while let Some(frame) = reader.current_frame() {
            let seq = u32::from_le_bytes(frame.data().try_into().expect("seq payload"));
            merged.push((frame.trigger_time(), frame.source(), seq));
            reader.seek_next().expect("seek next");
        }
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn seek_to_time_lands_on_first_frame_at_or_after(
        mut times in prop::collection::vec(0i64..1_000, 1..100),
        target in 0i64..1_100,
    ) {
        times.sort_unstable();
        let factory = MemoryPageProviderFactory::with_page_size(4096);
        let writer = Writer::new(&factory, stream(0), Arc::new(NoopPublisher))
            .expect("writer");
        for &t in &times {
            writer.append(0, 1, t, &[0u8; 100]).expect("append");
        }

        let mut reader = SingleReader::new(Arc::new(factory));
        reader.subscribe(stream(0), target).expect("subscribe");
        let expected = times.iter().copied().find(|&t| t >= target);
        prop_assert_eq!(reader.current_frame().map(|f| f.trigger_time()), expected);
    }
}
