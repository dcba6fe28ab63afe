//! Serialized, multi-producer appends into one journal.
//!
//! A [`Writer`] owns one writing [`Journal`] behind a mutex. Every public
//! write method performs the whole open → fill → close sequence under that
//! lock, so producer threads never interleave and readers never observe a
//! partially written frame:
//!
//! 1. **open** — reserve room in the current page (rolling to the next page
//!    if needed) and write the header, leaving the length word at zero;
//! 2. **fill** — copy or encode the payload straight into page memory;
//! 3. **close** — checksum the payload, then publish the length word with
//!    `Release` ordering and notify the [`Publisher`].
//!
//! Encoders ([`write_json`](Writer::write_json), `write_bincode`,
//! [`write_with`](Writer::write_with)) serialize directly into the mapped
//! page, so no intermediate buffer is allocated on the hot path.

use super::cursor::Journal;
use super::error::JournalError;
use super::frame::{
    FRAME_HEADER_SIZE, FrameDescriptor, FrameHeader, MSG_SESSION_END, MSG_SESSION_START,
    OFFSET_CHECKSUM, OFFSET_GEN_TIME, align_frame,
};
use super::page::{PAGE_HEADER_SIZE, Page};
use super::provider::PageProviderFactory;
use super::publisher::Publisher;
use super::types::Location;
use crate::utils::now_in_nanos;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// A frame reserved by `open_frame` and not yet committed.
struct OpenFrame {
    page: Arc<Page>,
    offset: usize,
    capacity: usize,
    gen_time: i64,
    header: FrameHeader,
}

/// Why an in-place encoder gave up.
enum EncodeFailure {
    /// The reserved body was too small.
    NoRoom,
    /// The value could not be encoded at all.
    Failed(String),
}

/// Everything guarded by the writer's lock.
struct WriterState {
    journal: Journal,
    last_gen_time: i64,
}

impl WriterState {
    /// Reserve a frame with room for `capacity` payload bytes.
    fn open_frame(
        &mut self,
        header: FrameHeader,
        capacity: usize,
    ) -> Result<OpenFrame, JournalError> {
        let frame_bytes = FRAME_HEADER_SIZE.saturating_add(capacity);
        let needed = align_frame(frame_bytes);

        let page = self.current_page()?;
        let page_capacity = page.capacity();
        if needed > page_capacity || frame_bytes >= u32::MAX as usize {
            return Err(JournalError::FrameTooLarge {
                frame_bytes,
                page_capacity,
            });
        }
        if self.journal.offset() + needed > page.len() {
            self.journal.roll_page()?;
        }

        let page = self.current_page()?;
        let offset = self.journal.offset();
        let gen_time = now_in_nanos().max(self.last_gen_time);
        self.last_gen_time = gen_time;

        // SAFETY: the slot at `offset` is uncommitted (its length word is
        // zero) and only the lock holder writes to it.
        unsafe { page.write_bytes(offset + OFFSET_GEN_TIME, &header.encode_tail(gen_time)) };

        Ok(OpenFrame {
            page,
            offset,
            capacity,
            gen_time,
            header,
        })
    }

    /// Commit `length` payload bytes of `open` and advance the cursor.
    fn close_frame(&mut self, open: OpenFrame, length: usize) -> FrameDescriptor {
        assert!(
            length <= open.capacity,
            "frame payload of {length} bytes overruns the {} bytes reserved at open",
            open.capacity
        );

        let page = &open.page;
        let body_offset = open.offset + FRAME_HEADER_SIZE;
        // SAFETY: the body was filled by the lock holder and nothing else
        // borrows it any more.
        let checksum = crc32fast::hash(unsafe { page.bytes(body_offset, length) });
        // SAFETY: still inside the uncommitted slot.
        unsafe { page.write_bytes(open.offset + OFFSET_CHECKSUM, &checksum.to_le_bytes()) };

        let frame_length = FRAME_HEADER_SIZE + length;
        let next = open.offset + align_frame(frame_length);
        // The next slot may hold leftovers of an abandoned encode; readers
        // must see it empty once this frame is visible.
        page.clear_slot(next);
        page.commit(open.offset, frame_length as u32);
        self.journal.set_offset(next);

        FrameDescriptor {
            page_id: page.id(),
            offset: open.offset,
            source: open.header.source,
            msg_type: open.header.msg_type,
            gen_time: open.gen_time,
            trigger_time: open.header.trigger_time,
            data_length: length,
        }
    }

    /// Payload bytes that fit into the rest of the current page.
    fn remaining_payload(&self) -> Result<usize, JournalError> {
        let page = self.current_page()?;
        Ok(page
            .len()
            .saturating_sub(self.journal.offset())
            .saturating_sub(FRAME_HEADER_SIZE))
    }

    fn current_page(&self) -> Result<Arc<Page>, JournalError> {
        self.journal
            .page()
            .cloned()
            .ok_or_else(|| JournalError::ResourceExhausted {
                location: self.journal.location().to_string(),
                page_id: 0,
            })
    }

    /// Append an empty control frame.
    fn write_control(&mut self, msg_type: i16) -> Result<FrameDescriptor, JournalError> {
        let time = now_in_nanos().max(self.last_gen_time);
        let open = self.open_frame(FrameHeader::new(0, msg_type, time), 0)?;
        Ok(self.close_frame(open, 0))
    }
}

/// Serializes any number of producers into one journal.
///
/// `Writer` is `Send + Sync`; share it across producer threads with an
/// `Arc`.
///
/// # Example
///
/// ```rust
/// use pagejournal_rs::journal::{
///     Category, Location, MemoryPageProviderFactory, Mode, NoopPublisher, Writer,
/// };
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), pagejournal_rs::journal::JournalError> {
/// let factory = MemoryPageProviderFactory::new();
/// let location = Location::new(Mode::Live, Category::Md, "binance", "btcusdt");
/// let writer = Writer::new(&factory, location, Arc::new(NoopPublisher))?;
/// let descriptor = writer.append(1, 101, 1_700_000_000_000_000_000, b"tick")?;
/// assert_eq!(descriptor.data_length, 4);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct Writer {
    location: Location,
    state: Mutex<WriterState>,
    publisher: Arc<dyn Publisher>,
}

impl Writer {
    /// Open a writer on `location`, resuming after any existing data, and
    /// start a new session.
    ///
    /// # Errors
    ///
    /// - [`JournalError::WriterBusy`] if the location already has a writer;
    /// - [`JournalError::ResourceExhausted`] if no page can be allocated;
    /// - I/O or corruption errors from the backing store.
    pub fn new(
        factory: &dyn PageProviderFactory,
        location: Location,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, JournalError> {
        let provider = factory.make_page_provider(&location, true)?;
        let mut journal = Journal::new(provider);
        journal.seek_to_end()?;

        let mut state = WriterState {
            journal,
            last_gen_time: 0,
        };
        let start = state.write_control(MSG_SESSION_START)?;
        publisher.publish(&location, &start);
        debug!(
            %location,
            page_id = start.page_id,
            offset = start.offset,
            "writer session started"
        );

        Ok(Self {
            location,
            state: Mutex::new(state),
            publisher,
        })
    }

    /// The location this writer appends to.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The shared publisher notified after every commit.
    #[must_use]
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Append a frame holding a copy of `payload`.
    ///
    /// # Errors
    ///
    /// - [`JournalError::InvalidMsgType`] for negative message types;
    /// - [`JournalError::FrameTooLarge`] if the frame cannot fit in a page;
    /// - [`JournalError::ResourceExhausted`] if the next page cannot be
    ///   allocated. No partial frame is left visible.
    pub fn append(
        &self,
        source: i16,
        msg_type: i16,
        trigger_time: i64,
        payload: &[u8],
    ) -> Result<FrameDescriptor, JournalError> {
        self.write_with(source, msg_type, trigger_time, payload.len(), |body| {
            body.copy_from_slice(payload);
            payload.len()
        })
    }

    /// Append a frame whose payload is produced in place by `encode`.
    ///
    /// `encode` receives exactly `capacity` bytes of page memory and returns
    /// how many of them it used.
    ///
    /// # Panics
    ///
    /// Panics if `encode` reports more than `capacity` bytes: the frame's
    /// room is fixed when it is opened.
    ///
    /// # Errors
    ///
    /// Same as [`append`](Self::append).
    pub fn write_with<F>(
        &self,
        source: i16,
        msg_type: i16,
        trigger_time: i64,
        capacity: usize,
        encode: F,
    ) -> Result<FrameDescriptor, JournalError>
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        check_msg_type(msg_type)?;
        let header = FrameHeader::new(source, msg_type, trigger_time);

        let mut state = self.state.lock()?;
        let open = state.open_frame(header, capacity)?;
        // SAFETY: the body belongs to the uncommitted slot reserved above and
        // the borrow ends before `close_frame`.
        let body = unsafe {
            open.page
                .bytes_mut(open.offset + FRAME_HEADER_SIZE, open.capacity)
        };
        let length = encode(body);
        let descriptor = state.close_frame(open, length);
        self.notify(&descriptor);
        Ok(descriptor)
    }

    /// Append `value` serialized as JSON directly into page memory.
    ///
    /// # Errors
    ///
    /// [`JournalError::Serialization`] if `value` cannot be serialized, plus
    /// the errors of [`append`](Self::append).
    pub fn write_json<T>(
        &self,
        source: i16,
        msg_type: i16,
        trigger_time: i64,
        value: &T,
    ) -> Result<FrameDescriptor, JournalError>
    where
        T: Serialize + ?Sized,
    {
        self.write_encoded(
            FrameHeader::new(source, msg_type, trigger_time),
            |mut body: &mut [u8]| {
                let room = body.len();
                match serde_json::to_writer(&mut body, value) {
                    Ok(()) => Ok(room - body.len()),
                    Err(e) if e.is_io() => Err(EncodeFailure::NoRoom),
                    Err(e) => Err(EncodeFailure::Failed(e.to_string())),
                }
            },
            || serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0),
        )
    }

    /// Append `value` encoded with bincode directly into page memory.
    ///
    /// # Errors
    ///
    /// Same as [`write_json`](Self::write_json).
    #[cfg(feature = "bincode")]
    pub fn write_bincode<T>(
        &self,
        source: i16,
        msg_type: i16,
        trigger_time: i64,
        value: &T,
    ) -> Result<FrameDescriptor, JournalError>
    where
        T: Serialize + ?Sized,
    {
        let config = bincode::config::standard();
        self.write_encoded(
            FrameHeader::new(source, msg_type, trigger_time),
            |body: &mut [u8]| match bincode::serde::encode_into_slice(value, body, config) {
                Ok(written) => Ok(written),
                Err(bincode::error::EncodeError::UnexpectedEnd) => Err(EncodeFailure::NoRoom),
                Err(e) => Err(EncodeFailure::Failed(e.to_string())),
            },
            || {
                bincode::serde::encode_to_vec(value, config)
                    .map(|v| v.len())
                    .unwrap_or(0)
            },
        )
    }

    /// Append the raw bytes of a plain-old-data value.
    ///
    /// # Errors
    ///
    /// Same as [`append`](Self::append).
    #[cfg(feature = "wire")]
    pub fn write_value<T>(
        &self,
        source: i16,
        msg_type: i16,
        trigger_time: i64,
        value: &T,
    ) -> Result<FrameDescriptor, JournalError>
    where
        T: zerocopy::IntoBytes + zerocopy::Immutable,
    {
        self.append(source, msg_type, trigger_time, value.as_bytes())
    }

    /// Check every committed frame of this location.
    ///
    /// # Errors
    ///
    /// See [`Journal::verify_integrity`].
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        self.state.lock()?.journal.verify_integrity()
    }

    /// Encode into whatever is left of the current page; if that is not
    /// enough, retry once on a fresh page.
    fn write_encoded<E, M>(
        &self,
        header: FrameHeader,
        mut encode: E,
        measure: M,
    ) -> Result<FrameDescriptor, JournalError>
    where
        E: FnMut(&mut [u8]) -> Result<usize, EncodeFailure>,
        M: FnOnce() -> usize,
    {
        check_msg_type(header.msg_type)?;
        let mut state = self.state.lock()?;

        loop {
            if state.remaining_payload()? == 0 {
                state.journal.roll_page()?;
            }
            let room = state.remaining_payload()?;
            let open = state.open_frame(header, room)?;
            let fresh_page = open.offset == PAGE_HEADER_SIZE;
            // SAFETY: see `write_with`.
            let body = unsafe {
                open.page
                    .bytes_mut(open.offset + FRAME_HEADER_SIZE, open.capacity)
            };
            match encode(body) {
                Ok(length) => {
                    let descriptor = state.close_frame(open, length);
                    self.notify(&descriptor);
                    return Ok(descriptor);
                }
                Err(EncodeFailure::NoRoom) if !fresh_page => {
                    trace!(location = %self.location, "encoded frame did not fit, rolling page");
                    state.journal.roll_page()?;
                }
                Err(EncodeFailure::NoRoom) => {
                    return Err(JournalError::FrameTooLarge {
                        frame_bytes: FRAME_HEADER_SIZE + measure(),
                        page_capacity: open.page.capacity(),
                    });
                }
                Err(EncodeFailure::Failed(message)) => {
                    return Err(JournalError::Serialization { message });
                }
            }
        }
    }

    fn notify(&self, descriptor: &FrameDescriptor) {
        self.publisher.publish(&self.location, descriptor);

        #[cfg(feature = "metrics")]
        {
            let location = self.location.to_string();
            metrics::counter!("journal_frames_written_total", "location" => location.clone())
                .increment(1);
            metrics::counter!("journal_bytes_written_total", "location" => location)
                .increment(descriptor.data_length as u64);
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        match state.write_control(MSG_SESSION_END) {
            Ok(end) => {
                self.publisher.publish(&self.location, &end);
                debug!(location = %self.location, "writer session ended");
            }
            Err(e) => warn!(location = %self.location, error = %e, "failed to close writer session"),
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("location", &self.location)
            .finish()
    }
}

#[inline]
fn check_msg_type(msg_type: i16) -> Result<(), JournalError> {
    if msg_type < 0 {
        return Err(JournalError::InvalidMsgType { msg_type });
    }
    Ok(())
}
