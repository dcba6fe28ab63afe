//! In-process heap backing.
//!
//! [`MemoryPageProviderFactory`] keeps every page of every location in a
//! shared store for the lifetime of the factory, so writers and readers
//! created from the same factory (or its clones) see the same pages. It is
//! the backing used by tests and by single-process replay pipelines.

use super::error::JournalError;
use super::page::Page;
use super::provider::{PageProvider, PageProviderFactory};
use super::types::{Location, PageId};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Default page size for heap pages (1 MB).
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 1024 * 1024;

/// Every page ever written for one location.
#[derive(Default)]
struct LocationPages {
    pages: Mutex<BTreeMap<PageId, Arc<Page>>>,
    writer_active: AtomicBool,
}

/// Factory for heap-backed providers sharing one in-process store.
///
/// Cloning the factory shares the store.
#[derive(Clone)]
pub struct MemoryPageProviderFactory {
    store: Arc<DashMap<Location, Arc<LocationPages>>>,
    page_size: usize,
    max_pages: Option<usize>,
}

impl MemoryPageProviderFactory {
    /// Create a factory with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_MEMORY_PAGE_SIZE)
    }

    /// Create a factory producing pages of `page_size` bytes.
    ///
    /// The size is rounded up to a multiple of 8.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            page_size: page_size.next_multiple_of(8),
            max_pages: None,
        }
    }

    /// Cap the number of pages each location may allocate. Writers hitting
    /// the cap fail with [`JournalError::ResourceExhausted`].
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Page size in bytes.
    #[must_use]
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Locations that have at least one page.
    #[must_use]
    pub fn locations(&self) -> Vec<Location> {
        let mut out: Vec<Location> = self
            .store
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .pages
                    .lock()
                    .map(|pages| !pages.is_empty())
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        out
    }
}

impl Default for MemoryPageProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryPageProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPageProviderFactory")
            .field("locations", &self.store.len())
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl PageProviderFactory for MemoryPageProviderFactory {
    fn make_page_provider(
        &self,
        location: &Location,
        is_writing: bool,
    ) -> Result<Arc<dyn PageProvider>, JournalError> {
        let shared = if is_writing {
            let shared = Arc::clone(self.store.entry(location.clone()).or_default().value());
            if shared
                .writer_active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(JournalError::WriterBusy {
                    location: location.to_string(),
                });
            }
            shared
        } else {
            let shared = self
                .store
                .get(location)
                .map(|entry| Arc::clone(entry.value()))
                .ok_or_else(|| JournalError::NotFound {
                    location: location.to_string(),
                })?;
            if shared.pages.lock()?.is_empty() {
                return Err(JournalError::NotFound {
                    location: location.to_string(),
                });
            }
            shared
        };

        debug!(%location, is_writing, "memory page provider created");
        Ok(Arc::new(MemoryPageProvider {
            location: location.clone(),
            is_writing,
            page_size: self.page_size,
            max_pages: self.max_pages,
            shared,
            held: Mutex::new(BTreeMap::new()),
        }))
    }
}

/// Heap-backed provider for one location.
pub struct MemoryPageProvider {
    location: Location,
    is_writing: bool,
    page_size: usize,
    max_pages: Option<usize>,
    shared: Arc<LocationPages>,
    held: Mutex<BTreeMap<PageId, Arc<Page>>>,
}

impl MemoryPageProvider {
    /// Number of pages this provider currently holds.
    #[must_use]
    pub fn held_pages(&self) -> usize {
        self.held.lock().map(|held| held.len()).unwrap_or(0)
    }

    fn exhausted(&self, page_id: PageId) -> JournalError {
        JournalError::ResourceExhausted {
            location: self.location.to_string(),
            page_id,
        }
    }
}

impl PageProvider for MemoryPageProvider {
    fn location(&self) -> &Location {
        &self.location
    }

    fn is_writing(&self) -> bool {
        self.is_writing
    }

    fn get_page(
        &self,
        new_id: PageId,
        old_id: Option<PageId>,
    ) -> Result<Option<Arc<Page>>, JournalError> {
        let mut held = self.held.lock()?;
        let page = match held.get(&new_id).cloned() {
            Some(page) => page,
            None => {
                let mut pages = self.shared.pages.lock()?;
                let page = match pages.get(&new_id).cloned() {
                    Some(page) => page,
                    None if self.is_writing => {
                        if self.max_pages.is_some_and(|max| pages.len() >= max) {
                            return Err(self.exhausted(new_id));
                        }
                        let page = Page::heap(new_id, self.page_size)
                            .ok_or_else(|| self.exhausted(new_id))?;
                        page.init_header();
                        let page = Arc::new(page);
                        pages.insert(new_id, Arc::clone(&page));
                        trace!(location = %self.location, page_id = new_id, "heap page created");
                        page
                    }
                    None => return Ok(None),
                };
                held.insert(new_id, Arc::clone(&page));
                page
            }
        };

        if let Some(old_id) = old_id
            && old_id != new_id
        {
            held.remove(&old_id);
        }
        Ok(Some(page))
    }

    fn release_page(&self, page_id: PageId) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&page_id);
        }
    }

    fn release_all(&self) {
        if let Ok(mut held) = self.held.lock() {
            held.clear();
        }
    }

    fn page_ids(&self) -> Result<Vec<PageId>, JournalError> {
        Ok(self.shared.pages.lock()?.keys().copied().collect())
    }
}

impl Drop for MemoryPageProvider {
    fn drop(&mut self) {
        if self.is_writing {
            self.shared.writer_active.store(false, Ordering::Release);
        }
    }
}
