//! Recording container files on disk.
//!
//! One recording per file, extension `.rwd`, containing exactly the
//! whole-recording container encoding. These helpers back the `rewind`
//! CLI and tests; a remote storage service is out of scope.

use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use rewind_core::container::Recording;
use rewind_core::error::CodecError;

/// Recording file extension (without the dot)
pub const EXTENSION: &str = "rwd";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container error: {0}")]
    Codec(#[from] CodecError),
}

/// Information about a recording file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    /// Filename (without path)
    pub filename: String,
    /// Full path to the file
    #[serde(skip_serializing)]
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Recording id from the container header
    pub id: String,
    /// "full" or "windowed"
    pub mode: String,
    /// Recording duration in milliseconds
    pub duration_ms: u32,
    /// Number of events
    pub event_count: usize,
    /// File modification time (Unix timestamp ms)
    pub modified_ms: u64,
}

/// Write a recording container to `path`, creating parent directories.
pub fn write_recording(path: &Path, recording: &Recording) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = recording.encode();
    fs::write(path, &bytes)?;
    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Read and decode a recording container from `path`.
pub fn read_recording(path: &Path) -> Result<Recording, StorageError> {
    let bytes = fs::read(path)?;
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(Recording::decode(&bytes)?)
}

/// Read `path` and summarize it without keeping the events around.
pub fn recording_info(path: &Path) -> Result<RecordingInfo, StorageError> {
    let metadata = fs::metadata(path)?;
    let modified_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let recording = read_recording(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(RecordingInfo {
        filename,
        path: path.to_path_buf(),
        size: metadata.len(),
        id: recording.id.to_string(),
        mode: recording.mode.to_string(),
        duration_ms: recording.duration,
        event_count: recording.events.len(),
        modified_ms,
    })
}

/// List all recording files in `dir`, newest first. Unreadable entries
/// are skipped with a log line.
pub fn list_recordings(dir: &Path) -> Vec<RecordingInfo> {
    let mut recordings = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().map(|e| e != EXTENSION).unwrap_or(true) {
                continue;
            }
            match recording_info(&path) {
                Ok(info) => recordings.push(info),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
    }
    recordings.sort_by(|a, b| b.modified_ms.cmp(&a.modified_ms));
    recordings
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::container::{RecordingId, RecordingMode};
    use rewind_core::event::{EventPayload, SourceEvent};
    use tempfile::TempDir;

    fn sample_recording(id: &str) -> Recording {
        let mut id = id.to_string();
        while id.len() < 16 {
            id.push('0');
        }
        Recording {
            id: RecordingId::parse(&id).unwrap(),
            mode: RecordingMode::Full,
            duration: 1000,
            events: vec![SourceEvent::new(1000, EventPayload::CloseRecording).encode()],
        }
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub").join("one.rwd");
        let recording = sample_recording("rec-1");
        write_recording(&path, &recording).unwrap();
        assert_eq!(read_recording(&path).unwrap(), recording);
    }

    #[test]
    fn test_recording_info() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("one.rwd");
        write_recording(&path, &sample_recording("rec-1")).unwrap();
        let info = recording_info(&path).unwrap();
        assert_eq!(info.filename, "one.rwd");
        assert_eq!(info.id, "rec-100000000000");
        assert_eq!(info.mode, "full");
        assert_eq!(info.duration_ms, 1000);
        assert_eq!(info.event_count, 1);
        assert!(info.size > 0);
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let temp = TempDir::new().unwrap();
        write_recording(&temp.path().join("a.rwd"), &sample_recording("rec-a")).unwrap();
        write_recording(&temp.path().join("b.rwd"), &sample_recording("rec-b")).unwrap();
        fs::write(temp.path().join("notes.txt"), b"not a recording").unwrap();
        fs::write(temp.path().join("bad.rwd"), b"garbage").unwrap();
        let listed = list_recordings(temp.path());
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_read_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.rwd");
        fs::write(&path, b"xx").unwrap();
        assert!(matches!(
            read_recording(&path),
            Err(StorageError::Codec(_))
        ));
    }
}
