//! Bounded, append-only page of frames.
//!
//! A [`Page`] is a fixed-size byte region, either heap allocated or
//! memory-mapped, shared between one writer and any number of readers.
//! All cross-thread coordination happens through the 4-byte length word at
//! the start of each frame slot:
//!
//! - `0` — the slot is empty (nothing committed yet);
//! - [`PAGE_END_MARKER`] — the writer rolled over to the next page;
//! - anything else — a committed frame of that many bytes (header + payload).
//!
//! The writer fills header and payload bytes with plain stores and then
//! publishes the length word with `Release` ordering. Readers load the word
//! with `Acquire` before touching any other byte of the frame, so a reader
//! can never observe a valid length alongside stale payload bytes.
//!
//! # Page Layout (little-endian)
//!
//! ```text
//! [4 bytes: magic "PJNL"][2 bytes: version][2 bytes: header_len]
//! [4 bytes: page_id][4 bytes: reserved]
//! [frame][frame]...            (each frame 8-byte aligned)
//! ```

use super::error::JournalError;
use super::frame::{FRAME_HEADER_SIZE, Frame, align_frame};
use super::types::PageId;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// Magic number stored in the first four bytes of every page.
pub const PAGE_MAGIC: u32 = u32::from_le_bytes(*b"PJNL");

/// Layout version written into the page header.
pub const PAGE_VERSION: u16 = 1;

/// Size of the page header in bytes. Frames start right after it.
pub const PAGE_HEADER_SIZE: usize = 16;

/// Length word value marking that the writer moved on to the next page.
pub const PAGE_END_MARKER: u32 = u32::MAX;

/// What the length word at a frame slot currently says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Nothing committed at this offset yet.
    Empty,
    /// No further frames in this page.
    End,
    /// A committed frame of the given total length.
    Committed(usize),
}

/// Owner of the memory behind a page.
enum Backing {
    Heap(Layout),
    #[cfg(feature = "mmap")]
    MappedMut(#[allow(dead_code)] memmap2::MmapMut),
    #[cfg(feature = "mmap")]
    Mapped(#[allow(dead_code)] memmap2::Mmap),
}

/// A bounded, append-only container of frames.
pub struct Page {
    id: PageId,
    base: NonNull<u8>,
    len: usize,
    writable: bool,
    backing: Backing,
}

// SAFETY: the writer mutates only slots that no reader can observe until the
// Release store of their length word, and readers only dereference bytes of
// committed frames. Memory lifetime is tied to `Backing`, which moves with
// the page without relocating the underlying region.
unsafe impl Send for Page {}
// SAFETY: see `Send` above; all shared mutation goes through atomics or
// through regions exclusively owned by the (mutex-guarded) writer.
unsafe impl Sync for Page {}

impl Page {
    /// Allocate a zeroed heap page of `len` bytes.
    ///
    /// Returns `None` when the allocator cannot satisfy the request.
    pub(crate) fn heap(id: PageId, len: usize) -> Option<Self> {
        debug_assert!(len >= PAGE_HEADER_SIZE + FRAME_HEADER_SIZE);
        debug_assert_eq!(len % 8, 0);
        let layout = Layout::from_size_align(len, 8).ok()?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw)?;
        Some(Self {
            id,
            base,
            len,
            writable: true,
            backing: Backing::Heap(layout),
        })
    }

    /// Wrap a writable memory map.
    #[cfg(feature = "mmap")]
    pub(crate) fn mapped_mut(id: PageId, mut mmap: memmap2::MmapMut) -> Self {
        let len = mmap.len();
        let base = NonNull::new(mmap.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            id,
            base,
            len,
            writable: true,
            backing: Backing::MappedMut(mmap),
        }
    }

    /// Wrap a read-only memory map.
    #[cfg(feature = "mmap")]
    pub(crate) fn mapped(id: PageId, mmap: memmap2::Mmap) -> Self {
        let len = mmap.len();
        let base = NonNull::new(mmap.as_ptr().cast_mut()).unwrap_or(NonNull::dangling());
        Self {
            id,
            base,
            len,
            writable: false,
            backing: Backing::Mapped(mmap),
        }
    }

    /// The page identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Total size of the page in bytes, header included.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: a page is at least one header long.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes available for frames.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.len.saturating_sub(PAGE_HEADER_SIZE)
    }

    /// Whether the page was mapped for writing.
    #[must_use]
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Iterate over every committed frame, control frames included.
    pub fn frames(&self) -> PageFrames<'_> {
        PageFrames {
            page: self,
            offset: PAGE_HEADER_SIZE,
            done: false,
        }
    }

    /// Write the page header. Must happen before the page is shared.
    pub(crate) fn init_header(&self) {
        debug_assert!(self.writable);
        let mut header = [0u8; PAGE_HEADER_SIZE];
        header[0..4].copy_from_slice(&PAGE_MAGIC.to_le_bytes());
        header[4..6].copy_from_slice(&PAGE_VERSION.to_le_bytes());
        header[6..8].copy_from_slice(&(PAGE_HEADER_SIZE as u16).to_le_bytes());
        header[8..12].copy_from_slice(&self.id.to_le_bytes());
        // SAFETY: the page is not yet visible to any reader and the header
        // lies inside the region.
        unsafe { self.write_bytes(0, &header) };
    }

    /// Check the page header.
    ///
    /// Returns `Ok(false)` when the header has not been written yet (a
    /// writer is still setting the page up). Page ids start at 1, so a
    /// zero id next to a valid magic means the header is half written.
    pub(crate) fn validate_header(&self) -> Result<bool, JournalError> {
        let magic = self.read_u32(0);
        if magic == 0 {
            return Ok(false);
        }
        if magic != PAGE_MAGIC {
            return Err(JournalError::CorruptPage {
                page_id: self.id,
                message: format!("bad magic {magic:#010x}"),
            });
        }
        let version = u16::from_le_bytes(self.read_array::<2>(4));
        if version != PAGE_VERSION {
            return Err(JournalError::CorruptPage {
                page_id: self.id,
                message: format!("unsupported page version {version}"),
            });
        }
        let stored_id = self.read_u32(8);
        if stored_id == 0 {
            return Ok(false);
        }
        if stored_id != self.id {
            return Err(JournalError::CorruptPage {
                page_id: self.id,
                message: format!("header names page {stored_id}"),
            });
        }
        Ok(true)
    }

    /// Inspect the slot at `offset`.
    pub(crate) fn slot(&self, offset: usize) -> Result<Slot, JournalError> {
        if offset.saturating_add(FRAME_HEADER_SIZE) > self.len {
            return Ok(Slot::End);
        }
        match self.length_word(offset).load(Ordering::Acquire) {
            0 => Ok(Slot::Empty),
            PAGE_END_MARKER => Ok(Slot::End),
            word => {
                let length = word as usize;
                if length < FRAME_HEADER_SIZE || offset.saturating_add(length) > self.len {
                    return Err(JournalError::CorruptPage {
                        page_id: self.id,
                        message: format!("frame at offset {offset} claims {length} bytes"),
                    });
                }
                Ok(Slot::Committed(length))
            }
        }
    }

    /// Publish a frame: every byte of it must already be written.
    #[inline]
    pub(crate) fn commit(&self, offset: usize, length: u32) {
        debug_assert!(self.writable);
        self.length_word(offset).store(length, Ordering::Release);
    }

    /// Tell readers the writer continues on the next page.
    pub(crate) fn mark_end(&self, offset: usize) {
        debug_assert!(self.writable);
        if offset.saturating_add(4) <= self.len {
            self.length_word(offset).store(PAGE_END_MARKER, Ordering::Release);
        }
    }

    /// Reset a slot's length word to empty.
    ///
    /// Ordered before the commit of the preceding frame by that commit's
    /// `Release` store.
    pub(crate) fn clear_slot(&self, offset: usize) {
        debug_assert!(self.writable);
        if offset.saturating_add(4) <= self.len {
            self.length_word(offset).store(0, Ordering::Relaxed);
        }
    }

    /// Walk committed frames from the start of the page and return the
    /// offset of the first free slot, plus whether the page was closed with
    /// an end marker (or has no room for another header).
    pub(crate) fn scan_end(&self) -> Result<(usize, bool), JournalError> {
        let mut offset = PAGE_HEADER_SIZE;
        loop {
            match self.slot(offset)? {
                Slot::Empty => return Ok((offset, false)),
                Slot::End => return Ok((offset, true)),
                Slot::Committed(length) => offset = offset.saturating_add(align_frame(length)),
            }
        }
    }

    /// Copy `bytes` into the page at `offset`.
    ///
    /// # Safety
    ///
    /// The range must lie inside the page, the page must be writable and no
    /// reader may be able to observe the range (it belongs to an
    /// uncommitted slot owned by the caller).
    pub(crate) unsafe fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        debug_assert!(self.writable);
        debug_assert!(offset + bytes.len() <= self.len);
        // SAFETY: upheld by the caller.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.base.as_ptr().add(offset),
                bytes.len(),
            );
        }
    }

    /// Borrow an uncommitted range mutably.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_bytes`](Self::write_bytes); in addition the
    /// caller must not create overlapping borrows.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(self.writable);
        debug_assert!(offset + len <= self.len);
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
    }

    /// Borrow a committed range.
    ///
    /// # Safety
    ///
    /// The range must lie inside a frame whose length word was observed as
    /// committed (or inside the page header).
    pub(crate) unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset + len <= self.len);
        // SAFETY: upheld by the caller; committed bytes are never written again.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    pub(crate) fn read_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        assert!(offset + N <= self.len, "read past end of page {}", self.id);
        let mut out = [0u8; N];
        // SAFETY: bounds checked above; callers only read header bytes or
        // bytes of committed frames.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), out.as_mut_ptr(), N);
        }
        out
    }

    #[inline]
    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.read_array::<4>(offset))
    }

    fn length_word(&self, offset: usize) -> &AtomicU32 {
        assert!(offset % 4 == 0 && offset + 4 <= self.len);
        // SAFETY: the base is at least 8-aligned (heap layout or page-aligned
        // map), the offset is 4-aligned and in bounds, and every access to
        // this word goes through the atomic.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU32>() }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let Backing::Heap(layout) = self.backing {
            // SAFETY: allocated in `Page::heap` with exactly this layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("writable", &self.writable)
            .finish()
    }
}

/// Iterator over the committed frames of one page.
///
/// Stops at the first empty slot or the end marker; yields one error and
/// stops when the layout is corrupt.
pub struct PageFrames<'a> {
    page: &'a Page,
    offset: usize,
    done: bool,
}

impl<'a> Iterator for PageFrames<'a> {
    type Item = Result<Frame<'a>, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.page.slot(self.offset) {
            Ok(Slot::Committed(length)) => {
                let frame = Frame::new(self.page, self.offset, length);
                self.offset = frame.next_offset();
                Some(Ok(frame))
            }
            Ok(Slot::Empty | Slot::End) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
