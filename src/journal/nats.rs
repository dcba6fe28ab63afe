//! NATS JetStream frame notifications.
//!
//! [`NatsFramePublisher`] is a [`Publisher`] that forwards every committed
//! frame's descriptor to JetStream, so readers in other processes can wake
//! up on `{prefix}.{mode}.{category}.{group}.{name}` instead of polling the
//! journal files.
//!
//! The writer's critical section only pays for serializing a small JSON
//! notice; the actual publish is spawned onto a Tokio runtime and transient
//! failures are retried with exponential backoff.
//!
//! # Feature Gate
//!
//! ```toml
//! [dependencies]
//! pagejournal-rs = { version = "0.1", features = ["nats"] }
//! ```

use super::frame::FrameDescriptor;
use super::publisher::Publisher;
use super::types::Location;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, trace, warn};

/// Default maximum number of retry attempts for transient NATS publish failures.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay in milliseconds for exponential backoff between retries.
const BASE_RETRY_DELAY_MS: u64 = 10;

/// Message body published for each committed frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameNotice {
    /// Journal the frame was committed to.
    pub location: Location,
    /// Where the frame lives and what it says.
    pub frame: FrameDescriptor,
}

/// Publishes frame notices to NATS JetStream.
///
/// # Example
///
/// ```rust,no_run
/// use pagejournal_rs::journal::nats::NatsFramePublisher;
/// use pagejournal_rs::journal::{Category, Location, MemoryPageProviderFactory, Mode, Writer};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = async_nats::connect("nats://localhost:4222").await?;
/// let jetstream = async_nats::jetstream::new(client);
/// let handle = tokio::runtime::Handle::current();
///
/// let publisher = Arc::new(NatsFramePublisher::new(jetstream, "journal".to_string(), handle));
/// let factory = MemoryPageProviderFactory::new();
/// let location = Location::new(Mode::Live, Category::Md, "binance", "btcusdt");
/// let writer = Writer::new(&factory, location, publisher)?;
/// writer.append(0, 1, 0, b"tick")?;
/// # Ok(())
/// # }
/// ```
pub struct NatsFramePublisher {
    /// JetStream context for publishing messages.
    jetstream: async_nats::jetstream::Context,

    /// Subject prefix. Notices go to `{prefix}.{location subject}`.
    subject_prefix: String,

    /// Handle to the Tokio runtime used for spawning async publish tasks.
    runtime: tokio::runtime::Handle,

    /// Sequence number embedded in each published message as a NATS header.
    sequence: AtomicU64,

    /// Count of acknowledged notices.
    publish_count: Arc<AtomicU64>,

    /// Count of notices dropped after all retries (or that failed to
    /// serialize).
    error_count: Arc<AtomicU64>,

    /// Maximum number of retry attempts for transient failures.
    max_retries: u32,
}

impl NatsFramePublisher {
    /// Create a new publisher.
    ///
    /// # Arguments
    ///
    /// * `jetstream` — JetStream context obtained from an `async_nats` client
    /// * `subject_prefix` — prefix for NATS subjects (e.g. `"journal"`)
    /// * `runtime` — handle to the Tokio runtime for spawning publish tasks
    #[inline]
    pub fn new(
        jetstream: async_nats::jetstream::Context,
        subject_prefix: String,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            jetstream,
            subject_prefix,
            runtime,
            sequence: AtomicU64::new(0),
            publish_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the maximum number of retry attempts. Set to 0 to disable retries.
    #[must_use = "builders do nothing unless consumed"]
    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Number of acknowledged notices.
    #[must_use]
    #[inline]
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    /// Number of notices that were never delivered.
    #[must_use]
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Next sequence number to be assigned.
    #[must_use]
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Subject notices for `location` are published to.
    #[must_use]
    pub fn subject_for(&self, location: &Location) -> String {
        format!("{}.{}", self.subject_prefix, location.subject())
    }

    /// Publish one message with exponential backoff retry.
    async fn publish_with_retry(task: PublishTask) {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Sequence", task.seq.to_string().as_str());
        let max_attempts = task.max_retries.saturating_add(1);

        for attempt in 0..max_attempts {
            let publish_result = task
                .jetstream
                .publish_with_headers(task.subject.clone(), headers.clone(), task.payload.clone())
                .await;

            match publish_result {
                Ok(ack_future) => match ack_future.await {
                    Ok(_) => {
                        task.publish_count.fetch_add(1, Ordering::Relaxed);
                        trace!(seq = task.seq, subject = %task.subject, "frame notice published");
                        return;
                    }
                    Err(e) => {
                        warn!(
                            attempt = attempt + 1,
                            max = max_attempts,
                            subject = %task.subject,
                            error = %e,
                            "NATS ack failed, retrying"
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max = max_attempts,
                        subject = %task.subject,
                        error = %e,
                        "NATS publish failed, retrying"
                    );
                }
            }

            if attempt + 1 < max_attempts {
                tokio::time::sleep(retry_delay(attempt)).await;
            }
        }

        task.error_count.fetch_add(1, Ordering::Relaxed);
        error!(subject = %task.subject, "NATS publish failed after all retries");
    }
}

/// Everything a spawned publish needs, detached from the publisher.
struct PublishTask {
    jetstream: async_nats::jetstream::Context,
    subject: String,
    payload: bytes::Bytes,
    seq: u64,
    max_retries: u32,
    publish_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
}

/// Backoff before retry `attempt + 1`: 10ms, 20ms, 40ms, ...
fn retry_delay(attempt: u32) -> std::time::Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    std::time::Duration::from_millis(BASE_RETRY_DELAY_MS.saturating_mul(factor))
}

impl Publisher for NatsFramePublisher {
    fn publish(&self, location: &Location, frame: &FrameDescriptor) {
        let notice = FrameNotice {
            location: location.clone(),
            frame: *frame,
        };
        let payload = match serde_json::to_vec(&notice) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                error!(%location, error = %e, "failed to serialize frame notice for NATS");
                return;
            }
        };

        let task = PublishTask {
            jetstream: self.jetstream.clone(),
            subject: self.subject_for(location),
            payload: payload.into(),
            seq: self.sequence.fetch_add(1, Ordering::Relaxed),
            max_retries: self.max_retries,
            publish_count: Arc::clone(&self.publish_count),
            error_count: Arc::clone(&self.error_count),
        };
        self.runtime.spawn(Self::publish_with_retry(task));
    }
}

impl std::fmt::Debug for NatsFramePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsFramePublisher")
            .field("subject_prefix", &self.subject_prefix)
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .field("publish_count", &self.publish_count.load(Ordering::Relaxed))
            .field("error_count", &self.error_count.load(Ordering::Relaxed))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
