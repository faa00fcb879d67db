//! Zero-copy view over one encoded event.
//!
//! The playback engine reads `kind`/`time` across millions of buffers while
//! indexing and partitioning; decoding every payload for that would dominate
//! seek cost. [`EventView`] reads the envelope header, and the handful of
//! continuous-interaction fields partitioning needs, at hardcoded offsets
//! instead.

use crate::error::CodecError;
use crate::event::{interaction_tag, EventKind};
use crate::node::NODE_ID_LEN;

/// Envelope header: `[type:u8][time:u32]`
pub const EVENT_HEADER_LEN: usize = 5;

/// Encoded `Point`: two `i32` coordinates
const POINT_LEN: usize = 8;

/// Read-only accessor over one encoded event buffer.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    buf: &'a [u8],
}

impl<'a> EventView<'a> {
    /// Wrap an encoded event. Only the envelope length is checked; payload
    /// bytes are trusted to match the codec version that wrote them.
    pub fn new(buf: &'a [u8]) -> Result<Self, CodecError> {
        if buf.len() < EVENT_HEADER_LEN {
            return Err(CodecError::TooShort {
                needed: EVENT_HEADER_LEN - buf.len(),
                offset: buf.len(),
            });
        }
        Ok(EventView { buf })
    }

    /// Raw wire tag byte
    pub fn kind_tag(&self) -> u8 {
        self.buf[0]
    }

    pub fn kind(&self) -> Result<EventKind, CodecError> {
        EventKind::from_tag(self.buf[0])
    }

    /// Recording-relative timestamp in milliseconds
    pub fn time(&self) -> u32 {
        u32::from_le_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buf[EVENT_HEADER_LEN..]
    }

    pub fn is_snapshot(&self) -> bool {
        self.buf[0] == EventKind::Snapshot as u8
    }

    /// For continuous interaction events (viewport resize, scroll, pointer
    /// move) the payload carries a `Sample` whose `duration` sits at a
    /// fixed offset per variant. Returns `time + duration` for those,
    /// `None` for everything else.
    pub fn sample_end_time(&self) -> Option<u32> {
        if self.kind_tag() != EventKind::Interaction as u8 {
            return None;
        }
        let payload = self.payload();
        let inner_tag = *payload.first()?;
        // [inner tag][(target?)][from:Point][to:Point][duration:u32]
        let duration_offset = match inner_tag {
            interaction_tag::VIEWPORT_RESIZE | interaction_tag::POINTER_MOVE => 1 + 2 * POINT_LEN,
            interaction_tag::SCROLL => 1 + NODE_ID_LEN + 2 * POINT_LEN,
            _ => return None,
        };
        let b = payload.get(duration_offset..duration_offset + 4)?;
        let duration = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        Some(self.time().saturating_add(duration))
    }
}

/// Rewrite the envelope timestamp in place. Used when `slice()` rebases a
/// copied timeline to start at 0.
pub fn write_time(buf: &mut [u8], time: u32) {
    debug_assert!(buf.len() >= EVENT_HEADER_LEN);
    buf[1..EVENT_HEADER_LEN].copy_from_slice(&time.to_le_bytes());
}
