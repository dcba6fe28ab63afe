//! Read side: the [`Reader`] trait and the single-location reader.

use super::cursor::Journal;
use super::error::JournalError;
use super::frame::Frame;
use super::provider::PageProviderFactory;
use super::types::{Location, Session};
use crossbeam::utils::Backoff;
use std::sync::Arc;
use tracing::debug;

/// Consumer-facing cursor over one or more journals.
///
/// Reaching the end of the available data is not an error: seeks return
/// `Ok(())` and [`current_frame`](Reader::current_frame) yields `None`
/// until more frames are committed and [`refresh`](Reader::refresh) (or
/// another seek) picks them up.
pub trait Reader {
    /// Start following `location` from the first data frame with
    /// `trigger_time >= from_time`.
    fn subscribe(&mut self, location: Location, from_time: i64) -> Result<(), JournalError>;

    /// The frame under the cursor, if any.
    fn current_frame(&self) -> Option<Frame<'_>>;

    /// Move forward to the first data frame with `trigger_time >= time`.
    fn seek_to_time(&mut self, time: i64) -> Result<(), JournalError>;

    /// Step past the current frame.
    fn seek_next(&mut self) -> Result<(), JournalError>;

    /// Pick up frames committed since the cursor last ran dry, without
    /// stepping past the current one.
    fn refresh(&mut self) -> Result<(), JournalError>;

    /// Ordered time ranges of available data.
    fn sessions(&self) -> Result<Vec<Session>, JournalError>;

    /// Whether [`current_frame`](Reader::current_frame) would return a frame.
    fn data_available(&self) -> bool {
        self.current_frame().is_some()
    }
}

/// Reader over exactly one location.
///
/// Created unsubscribed; every seek is a no-op until [`subscribe`](Reader::subscribe)
/// succeeds, and subscribing a second time is an error.
pub struct SingleReader {
    factory: Arc<dyn PageProviderFactory>,
    journal: Option<Journal>,
}

impl SingleReader {
    /// Create an unsubscribed reader that will open its journal through
    /// `factory`.
    pub fn new(factory: Arc<dyn PageProviderFactory>) -> Self {
        Self {
            factory,
            journal: None,
        }
    }

    /// The subscribed location, if any.
    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.journal.as_ref().map(Journal::location)
    }

    /// The underlying journal cursor, if subscribed.
    #[must_use]
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    /// Check every committed frame of the subscribed location.
    ///
    /// # Errors
    ///
    /// See [`Journal::verify_integrity`]. An unsubscribed reader has nothing
    /// to verify and returns `Ok(())`.
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        match &self.journal {
            Some(journal) => journal.verify_integrity(),
            None => Ok(()),
        }
    }
}

impl Reader for SingleReader {
    fn subscribe(&mut self, location: Location, from_time: i64) -> Result<(), JournalError> {
        if let Some(journal) = &self.journal {
            return Err(JournalError::AlreadySubscribed {
                location: journal.location().to_string(),
            });
        }
        let provider = self.factory.make_page_provider(&location, false)?;
        let mut journal = Journal::new(provider);
        journal.seek_to_time(from_time)?;
        debug!(%location, from_time, "reader subscribed");
        self.journal = Some(journal);
        Ok(())
    }

    fn current_frame(&self) -> Option<Frame<'_>> {
        self.journal.as_ref()?.current_frame()
    }

    fn seek_to_time(&mut self, time: i64) -> Result<(), JournalError> {
        if let Some(journal) = &mut self.journal {
            journal.seek_to_time(time)?;
        }
        Ok(())
    }

    fn seek_next(&mut self) -> Result<(), JournalError> {
        if let Some(journal) = &mut self.journal {
            journal.seek_next_frame()?;
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), JournalError> {
        if let Some(journal) = &mut self.journal {
            journal.refresh()?;
        }
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<Session>, JournalError> {
        match &self.journal {
            Some(journal) => journal.sessions(),
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for SingleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleReader")
            .field("journal", &self.journal)
            .finish()
    }
}

/// Wait for data on `reader`, refreshing between spins.
///
/// Spins, then yields, following `backoff`, and gives up once the backoff
/// reports completion. Returns whether a frame became available. Reset the
/// backoff between waits.
///
/// # Errors
///
/// Propagates errors from [`Reader::refresh`].
pub fn poll_next<R>(reader: &mut R, backoff: &Backoff) -> Result<bool, JournalError>
where
    R: Reader + ?Sized,
{
    loop {
        reader.refresh()?;
        if reader.data_available() {
            return Ok(true);
        }
        if backoff.is_completed() {
            return Ok(false);
        }
        backoff.snooze();
    }
}
