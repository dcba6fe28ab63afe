//! File-backed journals: persistence, resume, locking and corruption.

use pagejournal_rs::journal::{
    Category, FRAME_HEADER_SIZE, JournalError, Location, MmapPageProviderFactory, Mode,
    NoopPublisher, PAGE_HEADER_SIZE, Reader, SingleReader, Writer, align_frame,
};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PAGE_SIZE: usize = 8 * 1024;

fn location() -> Location {
    Location::new(Mode::Data, Category::Md, "okx", "ethusdt")
}

fn factory(dir: &tempfile::TempDir) -> MmapPageProviderFactory {
    MmapPageProviderFactory::with_page_size(dir.path(), PAGE_SIZE)
}

fn read_all(factory: MmapPageProviderFactory) -> Vec<(i64, Vec<u8>)> {
    let mut reader = SingleReader::new(Arc::new(factory));
    reader.subscribe(location(), 0).expect("subscribe");
    let mut out = Vec::new();
    while let Some(frame) = reader.current_frame() {
        out.push((frame.trigger_time(), frame.data().to_vec()));
        reader.seek_next().expect("seek next");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn frames_persist_across_factories() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let writer = Writer::new(&factory(&dir), location(), Arc::new(NoopPublisher))
            .expect("writer");
        for t in 0..500 {
            writer
                .append(0, 1, t, format!("frame {t}").as_bytes())
                .expect("append");
        }
    }

    let frames = read_all(factory(&dir));
    assert_eq!(frames.len(), 500);
    assert_eq!(frames[499], (499, b"frame 499".to_vec()));

    let pages = std::fs::read_dir(factory(&dir).location_dir(&location()))
        .expect("location dir")
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".journal"))
        .count();
    assert!(pages > 1);
}

#[test]
fn writer_resumes_at_the_tail() {
    let dir = tempfile::tempdir().expect("tempdir");
    for run in 0..3i64 {
        let writer = Writer::new(&factory(&dir), location(), Arc::new(NoopPublisher))
            .expect("writer");
        for k in 0..100 {
            writer.append(0, 1, run * 100 + k, &[run as u8; 40]).expect("append");
        }
    }
    let times: Vec<i64> = read_all(factory(&dir)).into_iter().map(|(t, _)| t).collect();
    assert_eq!(times, (0..300).collect::<Vec<_>>());

    let mut reader = SingleReader::new(Arc::new(factory(&dir)));
    reader.subscribe(location(), 0).expect("subscribe");
    let sessions = reader.sessions().expect("sessions");
    assert_eq!(sessions.len(), 3);
    assert!(sessions.iter().all(|s| s.closed && s.frame_count == 100));
}

#[test]
fn lock_file_excludes_a_second_writer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = Writer::new(&factory(&dir), location(), Arc::new(NoopPublisher)).expect("writer");
    let lock = factory(&dir).location_dir(&location()).join("writer.lock");
    assert!(lock.exists());

    assert!(matches!(
        Writer::new(&factory(&dir), location(), Arc::new(NoopPublisher)),
        Err(JournalError::WriterBusy { .. })
    ));
    drop(first);
    assert!(!lock.exists());
}

#[test]
fn reader_of_missing_location_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut reader = SingleReader::new(Arc::new(factory(&dir)));
    assert!(matches!(
        reader.subscribe(location(), 0),
        Err(JournalError::NotFound { .. })
    ));
}

#[test]
fn flipped_payload_byte_fails_verification() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let writer = Writer::new(&factory(&dir), location(), Arc::new(NoopPublisher))
            .expect("writer");
        writer.append(0, 1, 1, b"precious bytes").expect("append");
    }

    let page = factory(&dir)
        .location_dir(&location())
        .join("page-0000000001.journal");
    let mut bytes = std::fs::read(&page).expect("read page");
    // Session start frame first, then the data frame.
    let payload_at = PAGE_HEADER_SIZE + align_frame(FRAME_HEADER_SIZE) + FRAME_HEADER_SIZE;
    assert_eq!(&bytes[payload_at..payload_at + 8], b"precious");
    bytes[payload_at] ^= 0xFF;
    std::fs::write(&page, &bytes).expect("write page");

    let mut reader = SingleReader::new(Arc::new(factory(&dir)));
    reader.subscribe(location(), 0).expect("subscribe");
    assert!(reader.current_frame().is_some_and(|f| f.verify().is_err()));
    assert!(matches!(
        reader.verify_integrity(),
        Err(JournalError::CorruptFrame { page_id: 1, .. })
    ));
}
