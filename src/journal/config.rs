//! Backing selection and page sizing.
//!
//! A [`JournalConfig`] is plain data: deserialize it from JSON (or build it
//! in code), [`validate`](JournalConfig::validate) it and turn it into the
//! [`PageProviderFactory`] every writer and reader of the process shares.
//!
//! ```json
//! { "backend": "mmap", "root": "/var/lib/journal", "page_size": 1048576 }
//! ```

use super::error::JournalError;
use super::memory::MemoryPageProviderFactory;
use super::provider::PageProviderFactory;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Smallest accepted page size (4 KiB).
pub const MIN_PAGE_SIZE: usize = 4 * 1024;

/// Largest accepted page size (1 GiB).
pub const MAX_PAGE_SIZE: usize = 1024 * 1024 * 1024;

/// Default page size (1 MiB).
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;

/// Physical store behind the pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process heap pages shared through the factory.
    #[default]
    Memory,
    /// One memory-mapped file per page under `root`.
    Mmap,
}

/// Journal storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Physical store.
    pub backend: Backend,
    /// Root directory for file-backed journals.
    pub root: PathBuf,
    /// Size of every page in bytes, header included.
    pub page_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            root: PathBuf::from("journal"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl JournalConfig {
    /// In-memory configuration with the default page size.
    #[must_use]
    pub fn memory() -> Self {
        Self::default()
    }

    /// File-backed configuration rooted at `root`.
    #[must_use]
    pub fn mmap(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Mmap,
            root: root.into(),
            ..Self::default()
        }
    }

    /// Set the page size.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`JournalError::InvalidConfig`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, JournalError> {
        let config: Self = serde_json::from_str(json).map_err(|e| JournalError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the page size: a multiple of 8 between 4 KiB and 1 GiB.
    ///
    /// # Errors
    ///
    /// [`JournalError::InvalidConfig`] naming the offending value.
    pub fn validate(&self) -> Result<(), JournalError> {
        if self.page_size % 8 != 0 {
            return Err(JournalError::InvalidConfig {
                message: format!("page_size {} is not a multiple of 8", self.page_size),
            });
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(JournalError::InvalidConfig {
                message: format!(
                    "page_size {} outside [{MIN_PAGE_SIZE}, {MAX_PAGE_SIZE}]",
                    self.page_size
                ),
            });
        }
        Ok(())
    }

    /// Validate and build the provider factory for this configuration.
    ///
    /// # Errors
    ///
    /// [`JournalError::InvalidConfig`] for invalid values, or for the mmap
    /// backend when the crate was built without the `mmap` feature.
    pub fn build_factory(&self) -> Result<Arc<dyn PageProviderFactory>, JournalError> {
        self.validate()?;
        info!(backend = ?self.backend, page_size = self.page_size, "journal factory configured");
        match self.backend {
            Backend::Memory => Ok(Arc::new(MemoryPageProviderFactory::with_page_size(
                self.page_size,
            ))),
            #[cfg(feature = "mmap")]
            Backend::Mmap => Ok(Arc::new(
                super::mmap::MmapPageProviderFactory::with_page_size(&self.root, self.page_size),
            )),
            #[cfg(not(feature = "mmap"))]
            Backend::Mmap => Err(JournalError::InvalidConfig {
                message: "mmap backend requires the `mmap` feature".to_string(),
            }),
        }
    }
}
