//! Rewind session runtime - recording and playback over one timeline.
//!
//! This crate pairs the pure data model of `rewind-core` with a tokio
//! runtime. The recording side accepts encoded events from producers into
//! a bounded ring buffer and folds whatever the ring evicts into a leading
//! snapshot, so a bounded buffer still yields a lossless timeline. The
//! playback side indexes Snapshot events and materializes any instant by
//! replaying from the nearest snapshot.
//!
//! ```text
//! producers ──> Recorder ──> EventRing ──(evictions)──> leading snapshot
//!                  │
//!                  └─ slice() ──> Recording ──> Player ──> consumers
//! ```
//!
//! ## Example: record, package, replay
//!
//! ```rust,no_run
//! use rewind_core::container::RecordingId;
//! use rewind_session::{Player, Recorder, RecorderConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let recorder = Recorder::new(RecorderConfig::default());
//!     recorder.start();
//!     // observers push events here
//!     recorder.stop();
//!
//!     let id = RecordingId::parse("rec-000000000001").unwrap();
//!     let recording = recorder.to_recording(id);
//!     let player = Player::from_recording(&recording);
//!     player.seek_to_time(0).unwrap();
//! }
//! ```
//!
//! The `rewind` binary in this crate inspects recording files; see
//! `rewind --help`.

pub mod player;
pub mod recorder;
pub mod ring;
pub mod storage;

pub use player::{ControlFrame, PlaybackState, Player, PlayerStatus, SharedEvents};
pub use recorder::{Recorder, RecorderConfig, RecorderStatus};
pub use ring::{EncodedEvent, EventRing, DEFAULT_BYTE_CEILING};
pub use storage::{StorageError, EXTENSION};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
