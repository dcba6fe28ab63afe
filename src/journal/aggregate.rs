//! Time-ordered merge of many journals.
//!
//! [`AggregateReader`] fans in any number of [`SingleReader`]s and always
//! exposes the pending frame with the smallest `trigger_time`. Equal times
//! are broken by [`Location`] order (mode, category, group, name), so a
//! replay over the same data is reproducible run after run regardless of
//! subscription order.
//!
//! Readers holding a frame sit in a min-heap keyed by
//! `(trigger_time, location, slot)`; readers that ran dry sit in an idle set.
//! Idle readers are re-polled on [`Reader::refresh`] and on
//! [`Reader::subscribe`], and by [`Reader::seek_next`] only once the heap has
//! drained, so a step over pending data stays `O(log N)` while frames
//! committed later by live writers still re-enter the merge.

use super::error::JournalError;
use super::frame::Frame;
use super::provider::PageProviderFactory;
use super::reader::{Reader, SingleReader};
use super::types::{Location, Session};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One subscribed stream.
struct Subscription {
    location: Arc<Location>,
    reader: SingleReader,
}

/// Heap key of a reader holding a frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    trigger_time: i64,
    location: Arc<Location>,
    slot: usize,
}

/// Merges the frames of many locations into one time-ordered stream.
///
/// # Example
///
/// ```rust
/// use pagejournal_rs::journal::{
///     AggregateReader, Category, Location, MemoryPageProviderFactory, Mode, NoopPublisher,
///     Reader, Writer,
/// };
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), pagejournal_rs::journal::JournalError> {
/// let factory = MemoryPageProviderFactory::with_page_size(4096);
/// let btc = Location::new(Mode::Backtest, Category::Md, "sim", "btc");
/// let eth = Location::new(Mode::Backtest, Category::Md, "sim", "eth");
/// let w_btc = Writer::new(&factory, btc.clone(), Arc::new(NoopPublisher))?;
/// let w_eth = Writer::new(&factory, eth.clone(), Arc::new(NoopPublisher))?;
/// w_btc.append(0, 1, 20, b"btc")?;
/// w_eth.append(0, 1, 10, b"eth")?;
///
/// let mut reader = AggregateReader::new(Arc::new(factory));
/// reader.subscribe(btc, 0)?;
/// reader.subscribe(eth, 0)?;
/// assert_eq!(reader.current_frame().map(|f| f.data()), Some(&b"eth"[..]));
/// reader.seek_next()?;
/// assert_eq!(reader.current_frame().map(|f| f.data()), Some(&b"btc"[..]));
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct AggregateReader {
    factory: Arc<dyn PageProviderFactory>,
    slots: Vec<Subscription>,
    index: HashMap<Location, usize>,
    pending: BinaryHeap<Reverse<Pending>>,
    idle: BTreeSet<usize>,
}

impl AggregateReader {
    /// Create a reader with no subscriptions.
    pub fn new(factory: Arc<dyn PageProviderFactory>) -> Self {
        Self {
            factory,
            slots: Vec::new(),
            index: HashMap::new(),
            pending: BinaryHeap::new(),
            idle: BTreeSet::new(),
        }
    }

    /// Subscribed locations in tie-break order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<&Location> {
        let mut out: Vec<&Location> = self.slots.iter().map(|s| s.location.as_ref()).collect();
        out.sort();
        out
    }

    /// Location of the stream that produced the current frame.
    #[must_use]
    pub fn current_location(&self) -> Option<&Location> {
        let Reverse(top) = self.pending.peek()?;
        Some(self.slots[top.slot].location.as_ref())
    }

    /// Number of streams currently waiting for data.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Heap key for `slot` if its reader holds a frame.
    fn pending_for(&self, slot: usize) -> Option<Pending> {
        let subscription = &self.slots[slot];
        subscription.reader.current_frame().map(|frame| Pending {
            trigger_time: frame.trigger_time(),
            location: Arc::clone(&subscription.location),
            slot,
        })
    }

    /// File `slot` under the heap or the idle set.
    fn classify(&mut self, slot: usize) {
        match self.pending_for(slot) {
            Some(entry) => {
                self.idle.remove(&slot);
                self.pending.push(Reverse(entry));
            }
            None => {
                self.idle.insert(slot);
            }
        }
    }

    /// Re-poll idle readers and move those with new data into the heap.
    fn select(&mut self) -> Result<(), JournalError> {
        let mut woke = Vec::new();
        let mut result = Ok(());
        for &slot in &self.idle {
            let reader = &mut self.slots[slot].reader;
            if let Err(e) = reader.refresh() {
                result = Err(e);
                break;
            }
            if reader.data_available() {
                woke.push(slot);
            }
        }
        for slot in woke {
            trace!(location = %self.slots[slot].location, "idle stream has data again");
            self.classify(slot);
        }
        result
    }

    /// Put every reader back into the heap or the idle set.
    fn rebuild(&mut self) {
        self.pending.clear();
        self.idle.clear();
        for slot in 0..self.slots.len() {
            self.classify(slot);
        }
    }
}

impl Reader for AggregateReader {
    /// Add `location` to the merge. Subscribing an already merged location
    /// is a no-op.
    fn subscribe(&mut self, location: Location, from_time: i64) -> Result<(), JournalError> {
        if self.index.contains_key(&location) {
            trace!(%location, "already merged, subscribe ignored");
            return Ok(());
        }
        let mut reader = SingleReader::new(Arc::clone(&self.factory));
        reader.subscribe(location.clone(), from_time)?;

        let slot = self.slots.len();
        self.slots.push(Subscription {
            location: Arc::new(location.clone()),
            reader,
        });
        self.index.insert(location.clone(), slot);
        self.classify(slot);
        debug!(%location, slot, streams = self.slots.len(), "stream added to merge");
        self.select()
    }

    fn current_frame(&self) -> Option<Frame<'_>> {
        let Reverse(top) = self.pending.peek()?;
        self.slots[top.slot].reader.current_frame()
    }

    /// Seek every stream to `time` and rebuild the merge.
    ///
    /// A stream that fails to seek does not stop the others; the merge is
    /// rebuilt either way and the first error is returned afterwards.
    fn seek_to_time(&mut self, time: i64) -> Result<(), JournalError> {
        let mut first_error = None;
        for subscription in &mut self.slots {
            if let Err(e) = subscription.reader.seek_to_time(time) {
                warn!(location = %subscription.location, error = %e, "stream failed to seek");
                first_error.get_or_insert(e);
            }
        }
        self.rebuild();
        first_error.map_or(Ok(()), Err)
    }

    fn seek_next(&mut self) -> Result<(), JournalError> {
        if let Some(Reverse(top)) = self.pending.pop() {
            let result = self.slots[top.slot].reader.seek_next();
            self.classify(top.slot);
            result?;
        }
        if self.pending.is_empty() {
            self.select()?;
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), JournalError> {
        self.select()
    }

    /// Union of every stream's sessions ordered by `(start, end)`; ranges
    /// are not coalesced.
    fn sessions(&self) -> Result<Vec<Session>, JournalError> {
        let mut out = Vec::new();
        for subscription in &self.slots {
            out.extend(subscription.reader.sessions()?);
        }
        out.sort_by_key(|s| (s.start_time, s.end_time));
        Ok(out)
    }
}

impl std::fmt::Debug for AggregateReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateReader")
            .field("streams", &self.slots.len())
            .field("pending", &self.pending.len())
            .field("idle", &self.idle.len())
            .finish()
    }
}
