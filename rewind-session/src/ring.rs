//! Bounded recording ring buffer.
//!
//! Holds encoded event buffers under a byte ceiling. `push` is O(1) and
//! never evicts; crossing the ceiling only flags an eviction, which the
//! owning recorder executes from its maintenance slot so producer
//! callbacks stay non-blocking. Eviction removes from the head until the
//! total is back under the ceiling and hands the evicted batch to
//! subscribers.

use log::{debug, trace};
use std::collections::VecDeque;
use tokio::sync::broadcast;

use rewind_core::codec::EventView;
use rewind_core::error::CodecError;
use rewind_core::event::SourceEvent;

/// Default byte ceiling: 32 MB of encoded events.
pub const DEFAULT_BYTE_CEILING: usize = 32 * 1024 * 1024;

/// One encoded event held by the ring.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedEvent {
    bytes: Vec<u8>,
}

impl EncodedEvent {
    pub fn new(bytes: Vec<u8>) -> Self {
        EncodedEvent { bytes }
    }

    pub fn from_event(event: &SourceEvent) -> Self {
        EncodedEvent {
            bytes: event.encode(),
        }
    }

    /// Exact encoded length; this is what eviction accounting sums.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn view(&self) -> Result<EventView<'_>, CodecError> {
        EventView::new(&self.bytes)
    }

    pub fn decode(&self) -> Result<SourceEvent, CodecError> {
        SourceEvent::decode(&self.bytes)
    }
}

/// Bounded FIFO of encoded events with deferred head eviction.
#[derive(Debug)]
pub struct EventRing {
    entries: VecDeque<EncodedEvent>,
    total_bytes: usize,
    ceiling: usize,
    /// Set by `push` when the ceiling is crossed, consumed by `maintain`
    eviction_due: bool,
    /// Re-entrant guard: only one eviction pass at a time
    evicting: bool,
    evict_tx: broadcast::Sender<Vec<EncodedEvent>>,
}

impl EventRing {
    pub fn new(ceiling: usize) -> Self {
        let (evict_tx, _) = broadcast::channel(16);
        EventRing {
            entries: VecDeque::new(),
            total_bytes: 0,
            ceiling,
            eviction_due: false,
            evicting: false,
            evict_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn eviction_due(&self) -> bool {
        self.eviction_due
    }

    /// Append one event. Never evicts; at most sets the eviction flag.
    pub fn push(&mut self, event: EncodedEvent) {
        self.total_bytes += event.len();
        self.entries.push_back(event);
        if self.total_bytes > self.ceiling {
            self.eviction_due = true;
        }
    }

    /// Run one eviction pass if due, returning the evicted batch (oldest
    /// first). Called from the owner's maintenance slot, never from
    /// `push`. Subscribers receive a copy of the batch.
    pub fn maintain(&mut self) -> Vec<EncodedEvent> {
        if !self.eviction_due || self.evicting {
            return Vec::new();
        }
        self.evicting = true;
        let mut evicted = Vec::new();
        while self.total_bytes > self.ceiling {
            match self.entries.pop_front() {
                Some(entry) => {
                    self.total_bytes -= entry.len();
                    evicted.push(entry);
                }
                None => break,
            }
        }
        self.eviction_due = false;
        self.evicting = false;
        if !evicted.is_empty() {
            debug!(
                "Evicted {} events ({} bytes buffered, ceiling {})",
                evicted.len(),
                self.total_bytes,
                self.ceiling
            );
            if let Err(e) = self.evict_tx.send(evicted.clone()) {
                trace!("No subscribers for evicted batch: {}", e);
            }
        }
        evicted
    }

    /// Point-in-time copy of the buffered events, independent of later
    /// pushes and evictions.
    pub fn copy(&self) -> Vec<EncodedEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Oldest buffered event, if any.
    pub fn peek(&self) -> Option<&EncodedEvent> {
        self.entries.front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
        self.eviction_due = false;
    }

    /// Subscribe to evicted batches.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<EncodedEvent>> {
        self.evict_tx.subscribe()
    }
}

impl Default for EventRing {
    fn default() -> Self {
        EventRing::new(DEFAULT_BYTE_CEILING)
    }
}
