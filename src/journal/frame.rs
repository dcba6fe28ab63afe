//! Frame layout, committed-frame views and descriptors.
//!
//! # Frame Format (little-endian, 8-byte aligned)
//!
//! ```text
//! [4 bytes: length][4 bytes: crc32][8 bytes: gen_time][8 bytes: trigger_time]
//! [2 bytes: source][2 bytes: msg_type][4 bytes: reserved]
//! [N bytes: payload][padding to 8]
//! ```
//!
//! - `length` — header plus payload bytes (`32 + N`); doubles as the commit
//!   word, see [`page`](super::page).
//! - `crc32` covers the payload only.
//! - `gen_time` is stamped by the writer, `trigger_time` by the producer.
//! - negative `msg_type` values are journal control frames and are never
//!   surfaced by readers.

use super::error::JournalError;
use super::page::Page;
use super::types::PageId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 32;

/// Alignment of every frame within a page.
pub const FRAME_ALIGN: usize = 8;

/// Control frame opening a writer session.
pub const MSG_SESSION_START: i16 = -1;

/// Control frame closing a writer session.
pub const MSG_SESSION_END: i16 = -2;

pub(crate) const OFFSET_CHECKSUM: usize = 4;
pub(crate) const OFFSET_GEN_TIME: usize = 8;
pub(crate) const OFFSET_TRIGGER_TIME: usize = 16;
pub(crate) const OFFSET_SOURCE: usize = 24;
pub(crate) const OFFSET_MSG_TYPE: usize = 26;

/// Round a frame length up to the next frame boundary.
#[must_use]
#[inline]
pub const fn align_frame(length: usize) -> usize {
    (length + FRAME_ALIGN - 1) & !(FRAME_ALIGN - 1)
}

/// Producer-supplied part of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Identifier of the producing component.
    pub source: i16,
    /// Application-defined message type. Must be non-negative.
    pub msg_type: i16,
    /// Event time in nanoseconds.
    pub trigger_time: i64,
}

impl FrameHeader {
    /// Build a header.
    #[must_use]
    pub fn new(source: i16, msg_type: i16, trigger_time: i64) -> Self {
        Self {
            source,
            msg_type,
            trigger_time,
        }
    }

    /// Encode header bytes `8..32` (everything after length and checksum).
    pub(crate) fn encode_tail(&self, gen_time: i64) -> [u8; FRAME_HEADER_SIZE - 8] {
        let mut out = [0u8; FRAME_HEADER_SIZE - 8];
        out[0..8].copy_from_slice(&gen_time.to_le_bytes());
        out[8..16].copy_from_slice(&self.trigger_time.to_le_bytes());
        out[16..18].copy_from_slice(&self.source.to_le_bytes());
        out[18..20].copy_from_slice(&self.msg_type.to_le_bytes());
        out
    }
}

/// Where a committed frame lives and what it says, without its payload.
///
/// Returned by every successful write and handed to the
/// [`Publisher`](super::publisher::Publisher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// Page holding the frame.
    pub page_id: PageId,
    /// Byte offset of the frame within its page.
    pub offset: usize,
    /// Producing component.
    pub source: i16,
    /// Message type.
    pub msg_type: i16,
    /// Writer stamp in nanoseconds.
    pub gen_time: i64,
    /// Event time in nanoseconds.
    pub trigger_time: i64,
    /// Payload length in bytes.
    pub data_length: usize,
}

/// A read-only view of one committed frame.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    page: &'a Page,
    offset: usize,
    length: usize,
}

impl<'a> Frame<'a> {
    /// `length` must come from a committed slot at `offset`.
    pub(crate) fn new(page: &'a Page, offset: usize, length: usize) -> Self {
        Self {
            page,
            offset,
            length,
        }
    }

    /// Page holding the frame.
    #[must_use]
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page.id()
    }

    /// Byte offset of the frame within its page.
    #[must_use]
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Header plus payload bytes.
    #[must_use]
    #[inline]
    pub fn frame_length(&self) -> usize {
        self.length
    }

    /// Payload bytes.
    #[must_use]
    #[inline]
    pub fn data_length(&self) -> usize {
        self.length - FRAME_HEADER_SIZE
    }

    #[must_use]
    #[inline]
    pub fn source(&self) -> i16 {
        i16::from_le_bytes(self.page.read_array::<2>(self.offset + OFFSET_SOURCE))
    }

    #[must_use]
    #[inline]
    pub fn msg_type(&self) -> i16 {
        i16::from_le_bytes(self.page.read_array::<2>(self.offset + OFFSET_MSG_TYPE))
    }

    /// Producer event time in nanoseconds.
    #[must_use]
    #[inline]
    pub fn trigger_time(&self) -> i64 {
        i64::from_le_bytes(self.page.read_array::<8>(self.offset + OFFSET_TRIGGER_TIME))
    }

    /// Writer stamp in nanoseconds.
    #[must_use]
    #[inline]
    pub fn gen_time(&self) -> i64 {
        i64::from_le_bytes(self.page.read_array::<8>(self.offset + OFFSET_GEN_TIME))
    }

    /// CRC32 stored in the header.
    #[must_use]
    #[inline]
    pub fn checksum(&self) -> u32 {
        self.page.read_u32(self.offset + OFFSET_CHECKSUM)
    }

    /// Whether this is a journal control frame.
    #[must_use]
    #[inline]
    pub fn is_control(&self) -> bool {
        self.msg_type() < 0
    }

    /// The payload bytes.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        // SAFETY: the frame was built from a committed slot, so every byte
        // up to `offset + length` has been published and is immutable.
        unsafe {
            self.page
                .bytes(self.offset + FRAME_HEADER_SIZE, self.data_length())
        }
    }

    /// Recompute the payload CRC32 and compare it with the header.
    pub fn verify(&self) -> Result<(), JournalError> {
        let actual_crc = crc32fast::hash(self.data());
        let expected_crc = self.checksum();
        if actual_crc != expected_crc {
            return Err(JournalError::CorruptFrame {
                page_id: self.page_id(),
                offset: self.offset,
                expected_crc,
                actual_crc,
            });
        }
        Ok(())
    }

    /// Decode a JSON payload written with
    /// [`Writer::write_json`](super::Writer::write_json).
    pub fn data_as_json<T: DeserializeOwned>(&self) -> Result<T, JournalError> {
        serde_json::from_slice(self.data()).map_err(|e| JournalError::Serialization {
            message: e.to_string(),
        })
    }

    /// Decode a bincode payload written with
    /// [`Writer::write_bincode`](super::Writer::write_bincode).
    #[cfg(feature = "bincode")]
    pub fn data_as_bincode<T: DeserializeOwned>(&self) -> Result<T, JournalError> {
        bincode::serde::decode_from_slice(self.data(), bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| JournalError::Serialization {
                message: e.to_string(),
            })
    }

    /// Copy a plain-old-data payload written with
    /// [`Writer::write_value`](super::Writer::write_value).
    ///
    /// Returns `None` if the payload size does not match `T`.
    #[cfg(feature = "wire")]
    #[must_use]
    pub fn data_as<T: zerocopy::FromBytes>(&self) -> Option<T> {
        T::read_from_bytes(self.data()).ok()
    }

    /// Descriptor of this frame.
    #[must_use]
    pub fn descriptor(&self) -> FrameDescriptor {
        FrameDescriptor {
            page_id: self.page_id(),
            offset: self.offset,
            source: self.source(),
            msg_type: self.msg_type(),
            gen_time: self.gen_time(),
            trigger_time: self.trigger_time(),
            data_length: self.data_length(),
        }
    }

    /// Offset of the slot following this frame.
    #[inline]
    pub(crate) fn next_offset(&self) -> usize {
        self.offset + align_frame(self.length)
    }
}

impl std::fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("page_id", &self.page_id())
            .field("offset", &self.offset)
            .field("source", &self.source())
            .field("msg_type", &self.msg_type())
            .field("trigger_time", &self.trigger_time())
            .field("data_length", &self.data_length())
            .finish()
    }
}
