//! Binary codec primitives.
//!
//! Layout rules shared by every event variant:
//! - integers are fixed-width little-endian,
//! - strings/buffers/vectors are length-prefixed with a per-field
//!   8/16/32-bit width,
//! - unions are `[tag:u8][variant body]`,
//! - nullable fields are `[presence:u8][value?]`.
//!
//! Encoding trusts caller-supplied shapes by default; opt-in validation
//! lives on the event types themselves (see `SourceEvent::validate`).
//! Decoding never validates beyond what the layout forces - callers
//! guarantee buffer provenance, there is no checksum.

pub mod reader;
pub mod view;
pub mod writer;

pub use reader::ByteReader;
pub use view::{write_time, EventView, EVENT_HEADER_LEN};
pub use writer::ByteWriter;
