//! Page lifecycle contracts.
//!
//! The journal, writer and readers only ever talk to storage through these
//! two traits. A [`PageProviderFactory`] is chosen once at construction and
//! resolves each [`Location`] to a [`PageProvider`], which hands out
//! reference-counted [`Page`]s.
//!
//! Because pages are `Arc`-held, releasing a page only drops the provider's
//! hold on it: memory a journal cursor still points into stays alive until
//! the cursor moves on.

use super::error::JournalError;
use super::page::Page;
use super::types::{Location, PageId};
use std::sync::Arc;

/// Owns the page lifecycle for one location.
///
/// Implementations must be `Send + Sync`: a writer's provider is reached
/// from every producer thread (serialized by the writer's lock), and
/// readers may be moved between threads.
pub trait PageProvider: Send + Sync {
    /// The location this provider serves.
    fn location(&self) -> &Location;

    /// Whether pages are handed out for writing.
    fn is_writing(&self) -> bool;

    /// Map (readers) or map-or-create (writers) page `new_id`.
    ///
    /// If `old_id` names a held page distinct from `new_id`, it is released
    /// as part of the call.
    ///
    /// Returns `Ok(None)` when a reader asks for a page that does not exist
    /// yet.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::ResourceExhausted`] when a writer's page
    /// cannot be allocated, or an I/O / corruption error from the backing
    /// store.
    fn get_page(
        &self,
        new_id: PageId,
        old_id: Option<PageId>,
    ) -> Result<Option<Arc<Page>>, JournalError>;

    /// Drop the provider's hold on one page. A no-op if it is not held.
    fn release_page(&self, page_id: PageId);

    /// Drop every held page.
    fn release_all(&self);

    /// Ascending ids of the pages that exist for this location.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be listed.
    fn page_ids(&self) -> Result<Vec<PageId>, JournalError>;
}

/// Resolves a location to a concrete [`PageProvider`].
pub trait PageProviderFactory: Send + Sync {
    /// Create backing storage for a writer, or locate existing storage for a
    /// reader.
    ///
    /// # Errors
    ///
    /// - [`JournalError::NotFound`] when a reader targets a location with no
    ///   existing data;
    /// - [`JournalError::WriterBusy`] when the location already has a live
    ///   writer.
    fn make_page_provider(
        &self,
        location: &Location,
        is_writing: bool,
    ) -> Result<Arc<dyn PageProvider>, JournalError>;
}
