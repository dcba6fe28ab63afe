//! Integration tests for the time-ordered multi-location merge.

use pagejournal_rs::journal::{
    AggregateReader, Category, JournalError, Location, MemoryPageProviderFactory, Mode,
    NoopPublisher, Reader, Writer,
};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn md(name: &str) -> Location {
    Location::new(Mode::Backtest, Category::Md, "sim", name)
}

fn write_all(factory: &MemoryPageProviderFactory, location: &Location, times: &[i64]) {
    let writer =
        Writer::new(factory, location.clone(), Arc::new(NoopPublisher)).expect("writer");
    for &t in times {
        writer
            .append(0, 1, t, location.name.as_bytes())
            .expect("append");
    }
}

fn drain(reader: &mut AggregateReader) -> Vec<(i64, String)> {
    let mut out = Vec::new();
    while let Some(frame) = reader.current_frame() {
        let name = String::from_utf8(frame.data().to_vec()).expect("utf8");
        out.push((frame.trigger_time(), name));
        reader.seek_next().expect("seek next");
    }
    out
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn two_streams_merge_into_one_ordered_sequence() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    write_all(&factory, &md("a"), &[1, 3, 5]);
    write_all(&factory, &md("b"), &[2, 4, 6]);

    let mut reader = AggregateReader::new(Arc::new(factory));
    reader.subscribe(md("a"), 0).expect("subscribe");
    reader.subscribe(md("b"), 0).expect("subscribe");

    let merged = drain(&mut reader);
    let times: Vec<i64> = merged.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![1, 2, 3, 4, 5, 6]);
    let names: Vec<&str> = merged.iter().map(|(_, n)| n.as_str()).collect();
    assert_eq!(names, ["a", "b", "a", "b", "a", "b"]);
}

#[test]
fn equal_times_follow_location_order() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    let td = Location::new(Mode::Backtest, Category::Td, "sim", "a");
    write_all(&factory, &td, &[10]);
    write_all(&factory, &md("z"), &[10]);
    write_all(&factory, &md("m"), &[10]);

    let factory = Arc::new(factory);
    let orders = [
        vec![td.clone(), md("z"), md("m")],
        vec![md("m"), td.clone(), md("z")],
        vec![md("z"), md("m"), td.clone()],
    ];
    for order in orders {
        let mut reader = AggregateReader::new(factory.clone());
        for location in order {
            reader.subscribe(location, 0).expect("subscribe");
        }
        // Md sorts before Td; within Md, names sort lexicographically.
        let names: Vec<String> = drain(&mut reader).into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, ["m", "z", "a"]);
    }
}

#[test]
fn many_streams_with_pages_rolling() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    let streams = 6;
    for s in 0..streams {
        let times: Vec<i64> = (0..300).map(|i| i * streams + s).collect();
        write_all(&factory, &md(&format!("s{s}")), &times);
    }

    let mut reader = AggregateReader::new(Arc::new(factory));
    for s in 0..streams {
        reader.subscribe(md(&format!("s{s}")), 0).expect("subscribe");
    }
    let times: Vec<i64> = drain(&mut reader).into_iter().map(|(t, _)| t).collect();
    assert_eq!(times, (0..300 * streams).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Seeking and live data
// ---------------------------------------------------------------------------

#[test]
fn seek_to_time_repositions_the_merge() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    write_all(&factory, &md("a"), &[100, 300, 500]);
    write_all(&factory, &md("b"), &[200, 400, 600]);

    let mut reader = AggregateReader::new(Arc::new(factory));
    reader.subscribe(md("a"), 0).expect("subscribe");
    reader.subscribe(md("b"), 250).expect("subscribe");
    assert_eq!(reader.current_frame().map(|f| f.trigger_time()), Some(100));

    reader.seek_to_time(350).expect("seek");
    assert_eq!(reader.current_location(), Some(&md("b")));
    let times: Vec<i64> = drain(&mut reader).into_iter().map(|(t, _)| t).collect();
    assert_eq!(times, vec![400, 500, 600]);
}

#[test]
fn idle_streams_rejoin_after_new_commits() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    let a = Writer::new(&factory, md("a"), Arc::new(NoopPublisher)).expect("writer");
    let b = Writer::new(&factory, md("b"), Arc::new(NoopPublisher)).expect("writer");
    a.append(0, 1, 1, b"a").expect("append");

    let mut reader = AggregateReader::new(Arc::new(factory));
    reader.subscribe(md("a"), 0).expect("subscribe");
    reader.subscribe(md("b"), 0).expect("subscribe");
    assert_eq!(drain(&mut reader), vec![(1, "a".to_string())]);
    assert!(!reader.data_available());

    b.append(0, 1, 2, b"b").expect("append");
    a.append(0, 1, 3, b"a").expect("append");
    reader.refresh().expect("refresh");
    assert_eq!(
        drain(&mut reader),
        vec![(2, "b".to_string()), (3, "a".to_string())]
    );
}

#[test]
fn subscriptions_are_listed_in_tie_break_order() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    for name in ["c", "a", "b"] {
        write_all(&factory, &md(name), &[]);
    }
    let mut reader = AggregateReader::new(Arc::new(factory));
    for name in ["c", "a", "b", "a"] {
        reader.subscribe(md(name), 0).expect("subscribe");
    }
    let names: Vec<&str> = reader
        .subscriptions()
        .into_iter()
        .map(|l| l.name.as_str())
        .collect();
    assert_eq!(names, ["a", "b", "c"]);
    assert!(reader.current_location().is_none());
}

#[test]
fn unknown_location_does_not_join_the_merge() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    write_all(&factory, &md("a"), &[1]);
    let mut reader = AggregateReader::new(Arc::new(factory));
    reader.subscribe(md("a"), 0).expect("subscribe");
    assert!(matches!(
        reader.subscribe(md("ghost"), 0),
        Err(JournalError::NotFound { .. })
    ));
    assert_eq!(reader.subscriptions().len(), 1);
    assert_eq!(drain(&mut reader).len(), 1);
}

#[test]
fn sessions_union_is_sorted_without_coalescing() {
    let factory = MemoryPageProviderFactory::with_page_size(4096);
    write_all(&factory, &md("a"), &[10, 20]);
    write_all(&factory, &md("b"), &[15, 30]);
    write_all(&factory, &md("a"), &[40]);

    let mut reader = AggregateReader::new(Arc::new(factory));
    reader.subscribe(md("b"), 0).expect("subscribe");
    reader.subscribe(md("a"), 0).expect("subscribe");
    let ranges: Vec<(i64, i64)> = reader
        .sessions()
        .expect("sessions")
        .iter()
        .map(|s| (s.start_time, s.end_time))
        .collect();
    assert_eq!(ranges, vec![(10, 21), (15, 31), (40, 41)]);
}
