//! Error types for the event codec and timeline model

use thiserror::Error;

/// Errors that can occur when encoding or decoding event buffers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Buffer ended before the field being read
    #[error("Buffer too short: needed {needed} more bytes at offset {offset}")]
    TooShort { needed: usize, offset: usize },

    /// Invalid UTF-8 in a string field
    #[error("Invalid string encoding at offset {0}")]
    InvalidString(usize),

    /// A union tag byte that no variant claims
    #[error("Unknown {what} tag: {tag:#04X}")]
    UnknownTag { what: &'static str, tag: u8 },

    /// A presence byte that is neither 0 nor 1
    #[error("Invalid presence byte {value:#04X} at offset {offset}")]
    InvalidPresence { value: u8, offset: usize },

    /// A value that violates its declared layout (wrong fixed length,
    /// string longer than its length prefix can express, ...)
    #[error("Field {field}: {reason}")]
    FieldViolation { field: String, reason: String },

    /// Container written by a newer codec
    #[error("Unsupported codec version: {0}")]
    UnsupportedVersion(u32),
}

impl CodecError {
    /// Shorthand for a [`CodecError::FieldViolation`]
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::FieldViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors signalling a broken timeline invariant during playback
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// No Snapshot event exists at or before the seek target. The first
    /// materialized event of a timeline must always be a Snapshot, so this
    /// is fatal rather than recoverable.
    #[error("No leading snapshot resolvable at or before {target_ms}ms")]
    NoLeadingSnapshot { target_ms: u32 },

    /// Seek to an ordinal index outside the event list
    #[error("Event index {index} out of range ({len} events)")]
    EventOutOfRange { index: usize, len: usize },

    /// A buffer in the authoritative log failed to decode
    #[error(transparent)]
    Codec(#[from] CodecError),
}
