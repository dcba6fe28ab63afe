//! Single cursor over the chain of pages of one location.
//!
//! [`Journal`] is shared by both sides of the protocol: readers use the
//! public seek operations, the [`Writer`](super::Writer) uses the
//! crate-private positioning helpers to append at the tail.
//!
//! Journal control frames (negative `msg_type`) are skipped by every seek,
//! so a cursor at rest always addresses a data frame or a slot that is not
//! committed yet.

use super::error::JournalError;
use super::frame::{Frame, MSG_SESSION_END, MSG_SESSION_START};
use super::page::{PAGE_HEADER_SIZE, Page, Slot};
use super::provider::PageProvider;
use super::types::{FIRST_PAGE_ID, Location, PageId, Session};
use std::sync::Arc;
use tracing::trace;

/// Cursor over the pages of one location.
pub struct Journal {
    provider: Arc<dyn PageProvider>,
    page: Option<Arc<Page>>,
    offset: usize,
}

impl Journal {
    /// Create a cursor positioned before the first page.
    pub fn new(provider: Arc<dyn PageProvider>) -> Self {
        Self {
            provider,
            page: None,
            offset: PAGE_HEADER_SIZE,
        }
    }

    /// The location this journal follows.
    #[must_use]
    pub fn location(&self) -> &Location {
        self.provider.location()
    }

    /// The provider backing this journal.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn PageProvider> {
        &self.provider
    }

    /// Id of the loaded page, if any.
    #[must_use]
    pub fn page_id(&self) -> Option<PageId> {
        self.page.as_ref().map(|page| page.id())
    }

    /// Byte offset of the cursor within the loaded page.
    #[must_use]
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The data frame under the cursor, if one is committed there.
    #[must_use]
    pub fn current_frame(&self) -> Option<Frame<'_>> {
        let page = self.page.as_deref()?;
        match page.slot(self.offset) {
            Ok(Slot::Committed(length)) => {
                let frame = Frame::new(page, self.offset, length);
                (!frame.is_control()).then_some(frame)
            }
            _ => None,
        }
    }

    /// Step past the current frame and settle on the next data frame,
    /// crossing page boundaries as needed.
    ///
    /// If the cursor sits on a slot that is not committed yet it does not
    /// move, so a later call picks up frames written in the meantime.
    ///
    /// Returns whether a data frame is now available.
    ///
    /// # Errors
    ///
    /// Propagates provider and page-layout errors.
    pub fn seek_next_frame(&mut self) -> Result<bool, JournalError> {
        if let Some(page) = self.page.as_deref()
            && let Slot::Committed(length) = page.slot(self.offset)?
        {
            self.offset = Frame::new(page, self.offset, length).next_offset();
        }
        self.settle()
    }

    /// Scan forward to the first data frame with `trigger_time >= time`.
    ///
    /// Never moves backward: if the cursor already sits on a later frame it
    /// stays there.
    ///
    /// # Errors
    ///
    /// Propagates provider and page-layout errors.
    pub fn seek_to_time(&mut self, time: i64) -> Result<bool, JournalError> {
        if self.page.is_none() && !self.load_next_page()? {
            return Ok(false);
        }
        self.skip_pages_before(time)?;
        loop {
            if !self.settle()? {
                return Ok(false);
            }
            let next = match self.current_frame() {
                Some(frame) if frame.trigger_time() >= time => return Ok(true),
                Some(frame) => frame.next_offset(),
                None => return Ok(false),
            };
            self.offset = next;
        }
    }

    /// Re-examine the cursor without stepping past anything.
    ///
    /// Picks up a frame committed at the cursor since the last call, or the
    /// next page once the current one has been closed by the writer.
    ///
    /// # Errors
    ///
    /// Propagates provider and page-layout errors.
    pub fn refresh(&mut self) -> Result<bool, JournalError> {
        self.settle()
    }

    /// Load the page after the current one (or the first existing page when
    /// none is loaded). The previous page is released by the provider as
    /// part of the transition.
    ///
    /// Returns `false` when that page does not exist yet.
    ///
    /// # Errors
    ///
    /// Propagates provider errors.
    pub fn load_next_page(&mut self) -> Result<bool, JournalError> {
        let (new_id, old_id) = match self.page.as_deref() {
            Some(page) => (page.id().saturating_add(1), Some(page.id())),
            None => (self.first_page_id()?, None),
        };
        match self.provider.get_page(new_id, old_id)? {
            Some(page) => {
                trace!(location = %self.location(), page_id = new_id, "page loaded");
                self.page = Some(page);
                self.offset = PAGE_HEADER_SIZE;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ordered time ranges of available data for this location.
    ///
    /// Sessions are delimited by the writer's session control frames; a
    /// session spans its data frames' trigger times and sessions without
    /// data frames are omitted.
    ///
    /// # Errors
    ///
    /// Propagates provider and page-layout errors.
    pub fn sessions(&self) -> Result<Vec<Session>, JournalError> {
        let mut scan = SessionScan::default();
        self.for_each_page(|page| {
            for frame in page.frames() {
                scan.observe(&frame?);
            }
            Ok(())
        })?;
        Ok(scan.finish())
    }

    /// Recompute the CRC32 of every committed frame.
    ///
    /// # Errors
    ///
    /// Returns the first [`JournalError::CorruptFrame`] found, or a
    /// provider / layout error.
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        self.for_each_page(|page| {
            for frame in page.frames() {
                frame?.verify()?;
            }
            Ok(())
        })
    }

    // ─── Writer-side positioning ────────────────────────────────────────

    /// The loaded page.
    pub(crate) fn page(&self) -> Option<&Arc<Page>> {
        self.page.as_ref()
    }

    /// Move the cursor to `offset` within the loaded page.
    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Position a writing journal at the first free slot of the last page.
    pub(crate) fn seek_to_end(&mut self) -> Result<(), JournalError> {
        let last = self
            .provider
            .page_ids()?
            .last()
            .copied()
            .unwrap_or(FIRST_PAGE_ID);
        let page = self
            .provider
            .get_page(last, None)?
            .ok_or_else(|| self.exhausted(last))?;
        let (offset, ended) = page.scan_end()?;
        self.page = Some(page);
        self.offset = offset;
        if ended {
            self.roll_page()?;
        }
        Ok(())
    }

    /// Close the loaded page with an end marker and continue on the next.
    ///
    /// The next page is acquired first, so a failed allocation leaves the
    /// current page untouched.
    pub(crate) fn roll_page(&mut self) -> Result<(), JournalError> {
        let Some(current) = self.page.clone() else {
            return self.seek_to_end();
        };
        let next_id = current.id().saturating_add(1);
        let next = self
            .provider
            .get_page(next_id, Some(current.id()))?
            .ok_or_else(|| self.exhausted(next_id))?;
        current.mark_end(self.offset);
        trace!(location = %self.location(), page_id = next_id, "writer rolled to next page");
        self.page = Some(next);
        self.offset = PAGE_HEADER_SIZE;
        Ok(())
    }

    // ─── Internals ──────────────────────────────────────────────────────

    /// Move onto the next data frame without stepping past one.
    fn settle(&mut self) -> Result<bool, JournalError> {
        if self.page.is_none() && !self.load_next_page()? {
            return Ok(false);
        }
        loop {
            let Some(page) = self.page.as_deref() else {
                return Ok(false);
            };
            match page.slot(self.offset)? {
                Slot::Empty => return Ok(false),
                Slot::End => {
                    if !self.load_next_page()? {
                        return Ok(false);
                    }
                }
                Slot::Committed(length) => {
                    let frame = Frame::new(page, self.offset, length);
                    if !frame.is_control() {
                        return Ok(true);
                    }
                    self.offset = frame.next_offset();
                }
            }
        }
    }

    /// Jump over whole pages whose successor starts strictly before `time`:
    /// every frame they hold is earlier still.
    fn skip_pages_before(&mut self, time: i64) -> Result<(), JournalError> {
        while let Some(current) = self.page.clone() {
            let next_id = current.id().saturating_add(1);
            let Some(next) = self.provider.get_page(next_id, None)? else {
                return Ok(());
            };
            match first_data_time(&next)? {
                Some(first) if first < time => {
                    trace!(
                        location = %self.location(),
                        page_id = current.id(),
                        "page skipped by seek_to_time"
                    );
                    self.provider.release_page(current.id());
                    self.page = Some(next);
                    self.offset = PAGE_HEADER_SIZE;
                }
                _ => {
                    self.provider.release_page(next_id);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Visit every existing page without disturbing the cursor.
    fn for_each_page<F>(&self, mut visit: F) -> Result<(), JournalError>
    where
        F: FnMut(&Page) -> Result<(), JournalError>,
    {
        let current = self.page_id();
        for page_id in self.provider.page_ids()? {
            let Some(page) = self.provider.get_page(page_id, None)? else {
                continue;
            };
            let result = visit(&page);
            if current != Some(page_id) {
                self.provider.release_page(page_id);
            }
            result?;
        }
        Ok(())
    }

    fn first_page_id(&self) -> Result<PageId, JournalError> {
        Ok(self
            .provider
            .page_ids()?
            .first()
            .copied()
            .unwrap_or(FIRST_PAGE_ID))
    }

    fn exhausted(&self, page_id: PageId) -> JournalError {
        JournalError::ResourceExhausted {
            location: self.location().to_string(),
            page_id,
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.page = None;
        self.provider.release_all();
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("location", self.location())
            .field("page_id", &self.page_id())
            .field("offset", &self.offset)
            .finish()
    }
}

/// Trigger time of the first data frame in `page`.
fn first_data_time(page: &Page) -> Result<Option<i64>, JournalError> {
    for frame in page.frames() {
        let frame = frame?;
        if !frame.is_control() {
            return Ok(Some(frame.trigger_time()));
        }
    }
    Ok(None)
}

/// Folds a frame stream into sessions.
#[derive(Default)]
struct SessionScan {
    sessions: Vec<Session>,
    open: Option<OpenSession>,
}

#[derive(Default)]
struct OpenSession {
    start: Option<i64>,
    last: i64,
    count: u64,
}

impl SessionScan {
    fn observe(&mut self, frame: &Frame<'_>) {
        match frame.msg_type() {
            MSG_SESSION_START => {
                self.close(false);
                self.open = Some(OpenSession::default());
            }
            MSG_SESSION_END => self.close(true),
            msg_type if msg_type < 0 => {}
            _ => {
                let open = self.open.get_or_insert_with(OpenSession::default);
                let time = frame.trigger_time();
                open.start.get_or_insert(time);
                open.last = open.last.max(time);
                open.count += 1;
            }
        }
    }

    fn close(&mut self, closed: bool) {
        if let Some(open) = self.open.take()
            && let Some(start) = open.start
        {
            self.sessions.push(Session {
                start_time: start,
                end_time: open.last.saturating_add(1),
                frame_count: open.count,
                closed,
            });
        }
    }

    fn finish(mut self) -> Vec<Session> {
        self.close(false);
        self.sessions.sort();
        self.sessions
    }
}
