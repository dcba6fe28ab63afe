/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! ```rust
//! use pagejournal_rs::prelude::*;
//! ```
//!
//! brings in everything needed to write, read and merge journals.

// Locations and sessions
pub use crate::journal::{Category, Location, Mode, PageId, Session};

// Frames
pub use crate::journal::{Frame, FrameDescriptor, FrameHeader};

// Write and read sides
pub use crate::journal::{AggregateReader, Journal, Reader, SingleReader, Writer, poll_next};

// Storage
pub use crate::journal::{
    Backend, JournalConfig, MemoryPageProviderFactory, PageProvider, PageProviderFactory,
};
#[cfg(feature = "mmap")]
pub use crate::journal::MmapPageProviderFactory;

// Notifications
pub use crate::journal::{NoopPublisher, Publisher, WatchPublisher};
#[cfg(feature = "nats")]
pub use crate::journal::NatsFramePublisher;

// Errors
pub use crate::journal::JournalError;

// Utility functions
pub use crate::utils::now_in_nanos;
