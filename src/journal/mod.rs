//! # Paged Journal
//!
//! Append-only, page-structured event storage shared between one writer per
//! location and any number of lock-free readers.
//!
//! ## Layers
//!
//! - [`Page`] / [`Frame`] — byte layout and the atomic commit word;
//! - [`PageProvider`] / [`PageProviderFactory`] — page lifecycle, backed by
//!   the heap ([`MemoryPageProviderFactory`]) or by memory-mapped files
//!   (`MmapPageProviderFactory`, feature `mmap`);
//! - [`Journal`] — a cursor over the page chain of one [`Location`];
//! - [`Writer`] — serialized multi-producer appends;
//! - [`Reader`] — [`SingleReader`] for one location, [`AggregateReader`]
//!   for a deterministic time-ordered merge of many;
//! - [`Publisher`] — post-commit notifications ([`WatchPublisher`],
//!   `NatsFramePublisher` with feature `nats`);
//! - [`JournalConfig`] — backing selection and page sizing.

pub mod aggregate;
pub mod config;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod memory;
#[cfg(feature = "mmap")]
pub mod mmap;
#[cfg(feature = "nats")]
pub mod nats;
pub mod page;
pub mod provider;
pub mod publisher;
pub mod reader;
pub mod types;
pub mod writer;

pub use aggregate::AggregateReader;
pub use config::{Backend, DEFAULT_PAGE_SIZE, JournalConfig, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
pub use cursor::Journal;
pub use error::JournalError;
pub use frame::{
    FRAME_ALIGN, FRAME_HEADER_SIZE, Frame, FrameDescriptor, FrameHeader, MSG_SESSION_END,
    MSG_SESSION_START, align_frame,
};
pub use memory::{DEFAULT_MEMORY_PAGE_SIZE, MemoryPageProvider, MemoryPageProviderFactory};
#[cfg(feature = "mmap")]
pub use mmap::{DEFAULT_MMAP_PAGE_SIZE, MmapPageProvider, MmapPageProviderFactory};
#[cfg(feature = "nats")]
pub use nats::{FrameNotice, NatsFramePublisher};
pub use page::{PAGE_END_MARKER, PAGE_HEADER_SIZE, PAGE_MAGIC, PAGE_VERSION, Page, PageFrames};
pub use provider::{PageProvider, PageProviderFactory};
pub use publisher::{NoopPublisher, Publisher, WatchPublisher};
pub use reader::{Reader, SingleReader, poll_next};
pub use types::{Category, FIRST_PAGE_ID, Location, Mode, PageId, Session};
pub use writer::Writer;
