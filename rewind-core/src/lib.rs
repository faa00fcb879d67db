//! # Rewind Core
//!
//! Platform-independent event codec and timeline model for Rewind session
//! recordings.
//!
//! This crate contains pure encoding and timeline logic with **zero I/O
//! dependencies**; everything that needs a runtime (the bounded ring
//! buffer, the recorder, the playback engine) lives in `rewind-session`.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  rewind-core (platform-independent, no tokio/async deps)   │
//! │  ├── codec/      (byte reader/writer, zero-copy view)      │
//! │  ├── node        (NodeId, VNode, VTree)                    │
//! │  ├── patch       (incremental mutations)                   │
//! │  ├── event       (tagged event envelope)                   │
//! │  ├── reducer     (apply-event-to-snapshot)                 │
//! │  └── container   (whole-recording format)                  │
//! └────────────────────────────────────────────────────────────┘
//!                            ▲
//!               ┌────────────┴────────────┐
//!               │  rewind-session         │
//!               │  (ring buffer, recorder,│
//!               │   playback engine, CLI) │
//!               └─────────────────────────┘
//! ```
//!
//! ## Wire format
//!
//! One encoded event is `[type:u8][time:u32][payload]`; integers are
//! little-endian, variable-length data is length-prefixed, unions carry a
//! leading tag byte equal to the in-memory discriminant, nullable fields a
//! presence byte. See [`codec`] for the layout rules and [`event`] for the
//! envelope.
//!
//! ## Example: encode and inspect an event
//!
//! ```rust
//! use rewind_core::codec::EventView;
//! use rewind_core::event::{EventKind, EventPayload, SourceEvent};
//!
//! let event = SourceEvent::new(500, EventPayload::CloseRecording);
//! let bytes = event.encode();
//!
//! // header access without decoding the payload
//! let view = EventView::new(&bytes).unwrap();
//! assert_eq!(view.kind().unwrap(), EventKind::CloseRecording);
//! assert_eq!(view.time(), 500);
//!
//! assert_eq!(SourceEvent::decode(&bytes).unwrap(), event);
//! ```

pub mod codec;
pub mod container;
pub mod error;
pub mod event;
pub mod node;
pub mod patch;
pub mod reducer;
pub mod sample;

// Re-export commonly used types
pub use container::{Recording, RecordingId, RecordingMode, CODEC_VERSION};
pub use error::{CodecError, TimelineError};
pub use event::{EventKind, EventPayload, SourceEvent};
pub use node::{NodeId, VNode, VTree};
pub use patch::Patch;
pub use reducer::SnapshotState;
pub use sample::{Point, Sample};

#[cfg(test)]
pub(crate) mod testutil {
    use crate::container::RecordingId;
    use crate::event::{InteractionSnapshot, Snapshot};
    use crate::node::{NodeId, VNode, VTree, NODE_ID_LEN};

    /// Pad a short seed up to the fixed id length.
    pub fn nid(seed: &str) -> NodeId {
        let mut s = seed.to_string();
        while s.len() < NODE_ID_LEN {
            s.push('0');
        }
        NodeId::parse(&s).unwrap()
    }

    pub fn rid(seed: &str) -> RecordingId {
        let mut s = seed.to_string();
        while s.len() < 16 {
            s.push('0');
        }
        RecordingId::parse(&s).unwrap()
    }

    /// A small document: root -> el-1 -> txt-1 ("foo").
    pub fn simple_snapshot() -> Snapshot {
        let mut tree = VTree::new(nid("root"));
        tree.insert(VNode::Document {
            id: nid("root"),
            children: vec![nid("el-1")],
        });
        tree.insert(VNode::Element {
            id: nid("el-1"),
            tag: "body".to_string(),
            attributes: Default::default(),
            properties: Default::default(),
            children: vec![nid("txt-1")],
        });
        tree.insert(VNode::Text {
            id: nid("txt-1"),
            value: "foo".to_string(),
        });
        Snapshot {
            dom: Some(tree),
            interaction: Some(InteractionSnapshot {
                page_url: "https://example.com/".to_string(),
                ..Default::default()
            }),
        }
    }
}
