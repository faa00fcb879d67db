//! Whole-recording container.
//!
//! Layout: `[codecVersion:u32][id:16 chars][mode:u8][duration:u32]`
//! followed by a length-prefixed vector of length-prefixed event buffers.
//! The version field is the only piece of schema evolution the format
//! carries; readers reject anything newer than they know.

use std::fmt;

use crate::codec::{ByteReader, ByteWriter, EventView};
use crate::error::CodecError;

/// Version written by this codec.
pub const CODEC_VERSION: u32 = 1;

/// Fixed encoded length of a recording id.
pub const RECORDING_ID_LEN: usize = 16;

/// Fixed-length recording identifier (printable ASCII).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId([u8; RECORDING_ID_LEN]);

impl RecordingId {
    pub fn parse(value: &str) -> Result<Self, CodecError> {
        let bytes = value.as_bytes();
        if bytes.len() != RECORDING_ID_LEN {
            return Err(CodecError::field(
                "recordingId",
                format!("expected {} chars, got {}", RECORDING_ID_LEN, bytes.len()),
            ));
        }
        if !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(CodecError::field("recordingId", "non-printable character"));
        }
        let mut id = [0u8; RECORDING_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(RecordingId(id))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid>")
    }
}

impl fmt::Debug for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordingId({})", self.as_str())
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for RecordingId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How the recording was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordingMode {
    /// Every event since recording start is present
    Full = 0,
    /// The ring buffer evicted old events; the first event is a
    /// synthesized leading snapshot
    Windowed = 1,
}

impl RecordingMode {
    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(RecordingMode::Full),
            1 => Ok(RecordingMode::Windowed),
            tag => Err(CodecError::UnknownTag { what: "mode", tag }),
        }
    }
}

impl fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingMode::Full => write!(f, "full"),
            RecordingMode::Windowed => write!(f, "windowed"),
        }
    }
}

/// One complete recording: header plus its ordered encoded events.
///
/// Events stay encoded; consumers use [`EventView`] for header access and
/// decode payloads on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub id: RecordingId,
    pub mode: RecordingMode,
    /// Timeline length in milliseconds
    pub duration: u32,
    pub events: Vec<Vec<u8>>,
}

impl Recording {
    pub fn encode(&self) -> Vec<u8> {
        let payload: usize = self.events.iter().map(|e| e.len() + 4).sum();
        let mut w = ByteWriter::with_capacity(4 + RECORDING_ID_LEN + 1 + 4 + 4 + payload);
        w.put_u32(CODEC_VERSION);
        w.put_bytes(&self.id.0);
        w.put_u8(self.mode as u8);
        w.put_u32(self.duration);
        w.put_u32(self.events.len() as u32);
        for event in &self.events {
            w.put_buf32(event);
        }
        w.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(buf);
        let version = r.get_u32()?;
        if version > CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let mut id = [0u8; RECORDING_ID_LEN];
        id.copy_from_slice(r.get_bytes(RECORDING_ID_LEN)?);
        let mode = RecordingMode::from_tag(r.get_u8()?)?;
        let duration = r.get_u32()?;
        let count = r.get_u32()? as usize;
        let mut events = Vec::with_capacity(count.min(65_536));
        for _ in 0..count {
            events.push(r.get_buf32()?);
        }
        Ok(Recording {
            id: RecordingId(id),
            mode,
            duration,
            events,
        })
    }

    /// Header views over every event, in log order.
    pub fn views(&self) -> impl Iterator<Item = Result<EventView<'_>, CodecError>> {
        self.events.iter().map(|buf| EventView::new(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, SourceEvent};
    use crate::testutil::{rid, simple_snapshot};

    fn recording() -> Recording {
        let events = vec![
            SourceEvent::new(0, EventPayload::Snapshot(simple_snapshot())).encode(),
            SourceEvent::new(1000, EventPayload::CloseRecording).encode(),
        ];
        Recording {
            id: rid("rec-0001"),
            mode: RecordingMode::Full,
            duration: 1000,
            events,
        }
    }

    #[test]
    fn test_roundtrip() {
        let rec = recording();
        let decoded = Recording::decode(&rec.encode()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn test_rejects_newer_version() {
        let mut bytes = recording().encode();
        bytes[0..4].copy_from_slice(&(CODEC_VERSION + 1).to_le_bytes());
        assert_eq!(
            Recording::decode(&bytes).unwrap_err(),
            CodecError::UnsupportedVersion(CODEC_VERSION + 1)
        );
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let mut bytes = recording().encode();
        bytes[4 + RECORDING_ID_LEN] = 9;
        assert_eq!(
            Recording::decode(&bytes).unwrap_err(),
            CodecError::UnknownTag { what: "mode", tag: 9 }
        );
    }

    #[test]
    fn test_truncated() {
        let bytes = recording().encode();
        let err = Recording::decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, CodecError::TooShort { .. }));
    }

    #[test]
    fn test_views() {
        let rec = recording();
        let times: Vec<u32> = rec.views().map(|v| v.unwrap().time()).collect();
        assert_eq!(times, vec![0, 1000]);
    }

    #[test]
    fn test_recording_id_fixed_length() {
        assert!(RecordingId::parse("short").is_err());
        assert!(RecordingId::parse("exactly-16-chars").is_ok());
    }
}
