//! Out-of-band notification of committed frames.
//!
//! A [`Writer`](super::Writer) calls [`Publisher::publish`] after every
//! commit so idle readers can wake up instead of spinning. The publisher is
//! shared (`Arc<dyn Publisher>`) across writers and never owned by readers,
//! so writer and reader lifetimes stay fully decoupled.
//!
//! Implementations:
//!
//! - [`NoopPublisher`] — no notification; readers poll.
//! - [`WatchPublisher`] — one `tokio::sync::watch` channel per location.
//! - `NatsFramePublisher` — JetStream subjects (requires the `nats` feature).

use super::frame::FrameDescriptor;
use super::types::Location;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Notification sink for committed frames.
///
/// `publish` runs inside the writer's critical section, so it must not
/// block: hand work off to another thread or runtime if it is expensive.
pub trait Publisher: Send + Sync {
    /// A frame was committed to `location`.
    fn publish(&self, location: &Location, frame: &FrameDescriptor);
}

/// Publisher that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    #[inline]
    fn publish(&self, _location: &Location, _frame: &FrameDescriptor) {}
}

/// Per-location wake-up channels built on `tokio::sync::watch`.
///
/// Each location gets a channel holding the descriptor of its most recently
/// committed frame. Receivers can `await` [`watch::Receiver::changed`] in
/// async code or check [`watch::Receiver::has_changed`] from a polling
/// loop.
///
/// # Example
///
/// ```rust
/// use pagejournal_rs::journal::{Category, Location, Mode, WatchPublisher};
///
/// let publisher = WatchPublisher::new();
/// let location = Location::new(Mode::Live, Category::Md, "sim", "btc");
/// let rx = publisher.subscribe(&location);
/// assert!(rx.borrow().is_none());
/// ```
#[derive(Debug, Default)]
pub struct WatchPublisher {
    channels: DashMap<Location, watch::Sender<Option<FrameDescriptor>>>,
    publish_count: AtomicU64,
}

impl WatchPublisher {
    /// Create a publisher with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver for commits to `location`, created on first use.
    #[must_use]
    pub fn subscribe(&self, location: &Location) -> watch::Receiver<Option<FrameDescriptor>> {
        self.channels
            .entry(location.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Number of notifications sent so far.
    #[must_use]
    #[inline]
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }
}

impl Publisher for WatchPublisher {
    fn publish(&self, location: &Location, frame: &FrameDescriptor) {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        if let Some(sender) = self.channels.get(location) {
            // `send_replace` succeeds even with no live receivers.
            sender.send_replace(Some(*frame));
        }
    }
}
