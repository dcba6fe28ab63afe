//! Memory-mapped file backing.
//!
//! [`MmapPageProviderFactory`] stores each page in its own pre-allocated
//! file and maps it into memory. Writers map pages read/write; readers map
//! them read-only, so a reader in another process observes commits through
//! the shared mapping without any system call on the read path.
//!
//! # Directory Layout
//!
//! ```text
//! {root}/{mode}/{category}/{group}/{name}/page-{page_id:010}.journal
//! {root}/{mode}/{category}/{group}/{name}/writer.lock
//! ```
//!
//! `writer.lock` exists while a writer holds the location and is removed
//! when its provider is dropped.
//!
//! # Feature Gate
//!
//! This module is only available when the `mmap` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! pagejournal-rs = { version = "0.1", features = ["mmap"] }
//! ```

use super::error::JournalError;
use super::frame::FRAME_HEADER_SIZE;
use super::page::{PAGE_HEADER_SIZE, Page};
use super::provider::{PageProvider, PageProviderFactory};
use super::types::{Location, PageId};
use memmap2::{Mmap, MmapMut};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Default page size for file-backed pages (128 MB).
pub const DEFAULT_MMAP_PAGE_SIZE: usize = 128 * 1024 * 1024;

const LOCK_FILE: &str = "writer.lock";

/// Factory for memory-mapped, file-per-page providers under one root
/// directory.
#[derive(Debug, Clone)]
pub struct MmapPageProviderFactory {
    root: PathBuf,
    page_size: usize,
}

impl MmapPageProviderFactory {
    /// Create a factory rooted at `root` with the default page size.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_page_size(root, DEFAULT_MMAP_PAGE_SIZE)
    }

    /// Create a factory rooted at `root` producing pages of `page_size`
    /// bytes (rounded up to a multiple of 8).
    pub fn with_page_size<P: AsRef<Path>>(root: P, page_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            page_size: page_size.next_multiple_of(8),
        }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the pages of `location`.
    #[must_use]
    pub fn location_dir(&self, location: &Location) -> PathBuf {
        self.root
            .join(location.mode.as_str())
            .join(location.category.as_str())
            .join(&location.group)
            .join(&location.name)
    }
}

impl PageProviderFactory for MmapPageProviderFactory {
    fn make_page_provider(
        &self,
        location: &Location,
        is_writing: bool,
    ) -> Result<Arc<dyn PageProvider>, JournalError> {
        let dir = self.location_dir(location);

        let lock_path = if is_writing {
            fs::create_dir_all(&dir).map_err(|e| JournalError::io_at(e, &dir))?;
            let lock_path = dir.join(LOCK_FILE);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => Some(lock_path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return Err(JournalError::WriterBusy {
                        location: location.to_string(),
                    });
                }
                Err(e) => return Err(JournalError::io_at(e, lock_path)),
            }
        } else {
            if !dir.is_dir() || list_pages(&dir)?.is_empty() {
                return Err(JournalError::NotFound {
                    location: location.to_string(),
                });
            }
            None
        };

        debug!(%location, is_writing, dir = %dir.display(), "mmap page provider created");
        Ok(Arc::new(MmapPageProvider {
            location: location.clone(),
            is_writing,
            dir,
            page_size: self.page_size,
            held: Mutex::new(BTreeMap::new()),
            lock_path,
        }))
    }
}

/// File-backed provider for one location.
pub struct MmapPageProvider {
    location: Location,
    is_writing: bool,
    dir: PathBuf,
    page_size: usize,
    held: Mutex<BTreeMap<PageId, Arc<Page>>>,
    lock_path: Option<PathBuf>,
}

impl MmapPageProvider {
    /// Map an existing page file, or create and pre-allocate it.
    fn map_for_write(&self, page_id: PageId) -> Result<Page, JournalError> {
        let path = page_path(&self.dir, page_id);
        let existed = path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| JournalError::io_at(e, &path))?;

        if !existed {
            file.set_len(self.page_size as u64)
                .map_err(|e| self.allocation_error(e, page_id, &path))?;
        }

        // SAFETY: page files are only ever appended to through this mapping;
        // they are never truncated while mapped.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| self.allocation_error(e, page_id, &path))?;

        if mmap.len() < PAGE_HEADER_SIZE + FRAME_HEADER_SIZE {
            return Err(JournalError::CorruptPage {
                page_id,
                message: format!("page file is only {} bytes", mmap.len()),
            });
        }

        let page = Page::mapped_mut(page_id, mmap);
        if !page.validate_header()? {
            page.init_header();
        }
        trace!(location = %self.location, page_id, existed, "page mapped for writing");
        Ok(page)
    }

    /// Map an existing page read-only. `None` if it is not ready yet.
    fn map_for_read(&self, page_id: PageId) -> Result<Option<Page>, JournalError> {
        let path = page_path(&self.dir, page_id);
        let file = match OpenOptions::new().read(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JournalError::io_at(e, path)),
        };

        let len = file
            .metadata()
            .map_err(|e| JournalError::io_at(e, &path))?
            .len() as usize;
        // The writer creates the file before sizing it.
        if len < PAGE_HEADER_SIZE + FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // SAFETY: the mapping is read-only and page files are never
        // truncated while a writer maps them.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| JournalError::io_at(e, &path))?;
        let page = Page::mapped(page_id, mmap);
        if !page.validate_header()? {
            return Ok(None);
        }
        trace!(location = %self.location, page_id, "page mapped for reading");
        Ok(Some(page))
    }

    #[cold]
    fn allocation_error(&self, err: std::io::Error, page_id: PageId, path: &Path) -> JournalError {
        if err.kind() == ErrorKind::StorageFull || err.kind() == ErrorKind::OutOfMemory {
            warn!(location = %self.location, page_id, error = %err, "page allocation failed");
            JournalError::ResourceExhausted {
                location: self.location.to_string(),
                page_id,
            }
        } else {
            JournalError::io_at(err, path)
        }
    }
}

impl PageProvider for MmapPageProvider {
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
                let page = if self.is_writing {
                    self.map_for_write(new_id)?
                } else {
                    match self.map_for_read(new_id)? {
                        Some(page) => page,
                        None => return Ok(None),
                    }
                };
                let page = Arc::new(page);
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
        list_pages(&self.dir)
    }
}

impl Drop for MmapPageProvider {
    fn drop(&mut self) {
        if let Some(lock_path) = self.lock_path.take()
            && let Err(e) = fs::remove_file(&lock_path)
        {
            warn!(path = %lock_path.display(), error = %e, "failed to remove writer lock");
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Build the path of a page file.
fn page_path(dir: &Path, page_id: PageId) -> PathBuf {
    dir.join(format!("page-{page_id:010}.journal"))
}

/// List the ids of all page files in `dir`, ascending.
fn list_pages(dir: &Path) -> Result<Vec<PageId>, JournalError> {
    let mut ids = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(JournalError::io_at(e, dir)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| JournalError::io_at(e, dir))?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if let Some(rest) = name_str.strip_prefix("page-")
            && let Some(id_str) = rest.strip_suffix(".journal")
            && let Ok(id) = id_str.parse::<PageId>()
        {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}
