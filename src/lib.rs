//! # Paged Event Journal for Trading Runtimes
//!
//! A paged, append-only event journal written in Rust. Producers append
//! timestamped frames to a named stream; readers follow one stream, or merge
//! many streams into a single deterministic, globally time-ordered replay.
//! The journal is the backbone of record-and-replay for market data, order
//! flow and strategy signals.
//!
//! ## Key Features
//!
//! - **Atomic Commit Visibility**: A frame becomes visible through a single
//!   `Release` store of its length word. Readers never take a lock and can
//!   never observe a half-written frame.
//!
//! - **Multi-Producer Writer**: Any number of threads share one `Writer`;
//!   appends are serialized and each frame is stamped with a non-decreasing
//!   generation time.
//!
//! - **Zero-Copy Encoding**: JSON, bincode (feature `bincode`) and
//!   plain-old-data (feature `wire`) payloads are encoded straight into page
//!   memory.
//!
//! - **Deterministic Merge**: `AggregateReader` yields frames from many
//!   locations ordered by trigger time, breaking ties by location order, so
//!   a backtest replays identically every time.
//!
//! - **Pluggable Storage**: Heap pages for tests and in-process pipelines,
//!   memory-mapped files (feature `mmap`) for persistence and cross-process
//!   readers.
//!
//! - **Integrity Checks**: Every payload carries a CRC32 that
//!   `verify_integrity` recomputes on demand.
//!
//! ## Data Model
//!
//! A **location** `(mode, category, group, name)` names one stream. Each
//! stream is a chain of fixed-size **pages** identified by increasing ids
//! starting at 1. A page holds 8-byte aligned **frames**:
//!
//! ```text
//! [length u32][crc32 u32][gen_time i64][trigger_time i64]
//! [source i16][msg_type i16][reserved u32][payload ...]
//! ```
//!
//! Negative message types are reserved for journal control frames. Each
//! writer opens and closes a **session** with control frames, and readers
//! derive the time ranges of available data from them.
//!
//! ## Example
//!
//! ```rust
//! use pagejournal_rs::prelude::*;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), JournalError> {
//! let factory = Arc::new(MemoryPageProviderFactory::with_page_size(64 * 1024));
//! let location = Location::new(Mode::Backtest, Category::Md, "sim", "btcusdt");
//!
//! let writer = Writer::new(factory.as_ref(), location.clone(), Arc::new(NoopPublisher))?;
//! writer.append(1, 101, 1_000, b"bid 100")?;
//! writer.append(1, 101, 2_000, b"bid 101")?;
//!
//! let mut reader = SingleReader::new(factory);
//! reader.subscribe(location, 1_500)?;
//! assert_eq!(reader.current_frame().map(|f| f.data()), Some(&b"bid 101"[..]));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Enables                                              |
//! |-----------|------------------------------------------------------|
//! | `mmap`    | `MmapPageProviderFactory`, file-per-page storage     |
//! | `bincode` | `Writer::write_bincode`, `Frame::data_as_bincode`    |
//! | `wire`    | `Writer::write_value`, `Frame::data_as` (zerocopy)   |
//! | `nats`    | `NatsFramePublisher`, JetStream commit notifications |
//! | `metrics` | frame and byte counters per location                 |
//!
//! ## Logging
//!
//! The crate emits `tracing` events (`debug!` for lifecycle, `trace!` for
//! page transitions, `warn!`/`error!` for failures) and never installs a
//! subscriber.

pub mod journal;

pub mod prelude;
mod utils;

#[cfg(feature = "mmap")]
pub use journal::MmapPageProviderFactory;
#[cfg(feature = "nats")]
pub use journal::NatsFramePublisher;
pub use journal::{
    AggregateReader, Category, Frame, FrameDescriptor, FrameHeader, Journal, JournalConfig,
    JournalError, Location, MemoryPageProviderFactory, Mode, NoopPublisher, PageProvider,
    PageProviderFactory, Publisher, Reader, Session, SingleReader, WatchPublisher, Writer,
};
pub use utils::now_in_nanos;
