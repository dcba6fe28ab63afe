//! Error types for the journal subsystem.
//!
//! [`JournalError`] covers every failure mode of the paged journal: page
//! allocation, location resolution, reader misuse, framing and integrity
//! problems, configuration and I/O.
//!
//! Running out of frames is *not* an error. Seeks that find nothing leave
//! the cursor in its terminal state and callers check
//! [`current_frame`](crate::journal::Reader::current_frame) instead.

use super::types::PageId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur within the journal subsystem.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    /// The page provider could not allocate the next page (storage
    /// exhausted). No partial frame is left visible.
    #[error("cannot allocate page {page_id} for {location}")]
    ResourceExhausted {
        /// Display form of the location being written.
        location: String,
        /// The page that could not be allocated.
        page_id: PageId,
    },

    /// A reader asked for a location that has no existing data.
    #[error("no journal data found for {location}")]
    NotFound {
        /// Display form of the requested location.
        location: String,
    },

    /// A single reader was subscribed twice.
    #[error("reader is already subscribed to {location}")]
    AlreadySubscribed {
        /// Display form of the location the reader already follows.
        location: String,
    },

    /// Another writer already holds this location.
    #[error("location {location} already has an active writer")]
    WriterBusy {
        /// Display form of the contended location.
        location: String,
    },

    /// The frame can never fit, even into an empty page.
    #[error(
        "journal frame too large: {frame_bytes} bytes exceeds page capacity {page_capacity} bytes"
    )]
    FrameTooLarge {
        /// Bytes needed by the frame (header and payload).
        frame_bytes: usize,
        /// Bytes available for frames in an empty page.
        page_capacity: usize,
    },

    /// Negative message types are reserved for journal control frames.
    #[error("message type {msg_type} is reserved for journal control frames")]
    InvalidMsgType {
        /// The rejected message type.
        msg_type: i16,
    },

    /// A committed frame failed CRC32 verification.
    #[error(
        "corrupt frame in page {page_id} at offset {offset}: \
         expected CRC {expected_crc:#010x}, got {actual_crc:#010x}"
    )]
    CorruptFrame {
        /// Page holding the frame.
        page_id: PageId,
        /// Byte offset of the frame within the page.
        offset: usize,
        /// Checksum stored in the frame header.
        expected_crc: u32,
        /// Checksum recomputed from the payload.
        actual_crc: u32,
    },

    /// A page has an invalid header or an impossible frame layout.
    #[error("corrupt page {page_id}: {message}")]
    CorruptPage {
        /// The page that failed validation.
        page_id: PageId,
        /// Description of the problem.
        message: String,
    },

    /// The journal configuration is invalid.
    #[error("invalid journal configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A payload could not be serialized into a frame.
    #[error("journal serialization error: {message}")]
    Serialization {
        /// The underlying serialization error message.
        message: String,
    },

    /// An I/O error occurred while touching backing storage.
    #[error("journal I/O error{}: {message}", display_path(.path))]
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// An internal mutex was poisoned (another thread panicked while
    /// holding the lock).
    #[error("journal internal mutex poisoned")]
    MutexPoisoned,
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" at {}", p.display()),
        None => String::new(),
    }
}

impl JournalError {
    /// Build an [`JournalError::Io`] carrying the path that failed.
    #[cold]
    pub(crate) fn io_at(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        JournalError::Io {
            message: err.to_string(),
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for JournalError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        JournalError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for JournalError {
    #[cold]
    fn from(_: std::sync::PoisonError<T>) -> Self {
        JournalError::MutexPoisoned
    }
}
