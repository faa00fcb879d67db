//! The event envelope.
//!
//! Every log entry is one encoded buffer: `[type:u8][time:u32][payload]`,
//! with the payload selected by the type tag. Tags are numerically
//! identical to the in-memory discriminants so no translation table exists
//! between the wire and the `match` arms below.

use bitflags::bitflags;
use std::collections::BTreeMap;

use crate::codec::{ByteReader, ByteWriter, EventView};
use crate::error::CodecError;
use crate::node::{check_str16, check_str8, NodeId, VTree};
use crate::patch::Patch;
use crate::sample::{Point, Sample};

/// Event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Snapshot = 0,
    DomPatch = 10,
    Interaction = 20,
    Network = 30,
    Console = 40,
    CloseRecording = 99,
}

impl EventKind {
    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(EventKind::Snapshot),
            10 => Ok(EventKind::DomPatch),
            20 => Ok(EventKind::Interaction),
            30 => Ok(EventKind::Network),
            40 => Ok(EventKind::Console),
            99 => Ok(EventKind::CloseRecording),
            tag => Err(CodecError::UnknownTag { what: "event", tag }),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Snapshot => write!(f, "snapshot"),
            EventKind::DomPatch => write!(f, "patch"),
            EventKind::Interaction => write!(f, "interaction"),
            EventKind::Network => write!(f, "network"),
            EventKind::Console => write!(f, "console"),
            EventKind::CloseRecording => write!(f, "close"),
        }
    }
}

bitflags! {
    /// Held pointer buttons, one bit per button.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PointerButtons: u8 {
        const PRIMARY = 0x01;
        const SECONDARY = 0x02;
        const AUXILIARY = 0x04;
    }
}

/// Inner tags of the Interaction union. `EventView::sample_end_time`
/// hardcodes payload offsets against these; keep them in sync.
pub(crate) mod interaction_tag {
    pub const VIEWPORT_RESIZE: u8 = 0;
    pub const SCROLL: u8 = 1;
    pub const POINTER_MOVE: u8 = 2;
    pub const POINTER_DOWN: u8 = 3;
    pub const POINTER_UP: u8 = 4;
    pub const KEY_DOWN: u8 = 5;
    pub const KEY_UP: u8 = 6;
}

/// One user interaction. Continuous interactions (resize, scroll, pointer
/// movement) are coalesced [`Sample`]s; the rest are discrete.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    ViewportResize(Sample<Point>),
    Scroll {
        target: NodeId,
        offset: Sample<Point>,
    },
    PointerMove(Sample<Point>),
    PointerDown {
        position: Point,
        button: PointerButtons,
    },
    PointerUp {
        position: Point,
        button: PointerButtons,
    },
    KeyDown {
        key: String,
    },
    KeyUp {
        key: String,
    },
}

impl Interaction {
    fn encode(&self, w: &mut ByteWriter) {
        match self {
            Interaction::ViewportResize(sample) => {
                w.put_u8(interaction_tag::VIEWPORT_RESIZE);
                sample.encode(w);
            }
            Interaction::Scroll { target, offset } => {
                w.put_u8(interaction_tag::SCROLL);
                target.encode(w);
                offset.encode(w);
            }
            Interaction::PointerMove(sample) => {
                w.put_u8(interaction_tag::POINTER_MOVE);
                sample.encode(w);
            }
            Interaction::PointerDown { position, button } => {
                w.put_u8(interaction_tag::POINTER_DOWN);
                position.encode(w);
                w.put_u8(button.bits());
            }
            Interaction::PointerUp { position, button } => {
                w.put_u8(interaction_tag::POINTER_UP);
                position.encode(w);
                w.put_u8(button.bits());
            }
            Interaction::KeyDown { key } => {
                w.put_u8(interaction_tag::KEY_DOWN);
                w.put_str8(key);
            }
            Interaction::KeyUp { key } => {
                w.put_u8(interaction_tag::KEY_UP);
                w.put_str8(key);
            }
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match r.get_u8()? {
            interaction_tag::VIEWPORT_RESIZE => {
                Ok(Interaction::ViewportResize(Sample::decode(r)?))
            }
            interaction_tag::SCROLL => Ok(Interaction::Scroll {
                target: NodeId::decode(r)?,
                offset: Sample::decode(r)?,
            }),
            interaction_tag::POINTER_MOVE => Ok(Interaction::PointerMove(Sample::decode(r)?)),
            interaction_tag::POINTER_DOWN => Ok(Interaction::PointerDown {
                position: Point::decode(r)?,
                button: PointerButtons::from_bits_truncate(r.get_u8()?),
            }),
            interaction_tag::POINTER_UP => Ok(Interaction::PointerUp {
                position: Point::decode(r)?,
                button: PointerButtons::from_bits_truncate(r.get_u8()?),
            }),
            interaction_tag::KEY_DOWN => Ok(Interaction::KeyDown { key: r.get_str8()? }),
            interaction_tag::KEY_UP => Ok(Interaction::KeyUp { key: r.get_str8()? }),
            tag => Err(CodecError::UnknownTag {
                what: "interaction",
                tag,
            }),
        }
    }

    fn validate(&self) -> Result<(), CodecError> {
        match self {
            Interaction::KeyDown { key } | Interaction::KeyUp { key } => {
                check_str8("interaction.key", key)
            }
            _ => Ok(()),
        }
    }
}

/// Direction of a WebSocket frame relative to the recorded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WsDirection {
    Outgoing = 0,
    Incoming = 1,
}

mod network_tag {
    pub const FETCH: u8 = 0;
    pub const WEB_SOCKET: u8 = 1;
}

/// Network activity of the recorded page, raw byte bodies included.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Fetch {
        request_id: u32,
        url: String,
        method: String,
        /// HTTP status; 0 while the request is in flight
        status: u16,
        body: Option<Vec<u8>>,
    },
    WebSocket {
        socket_id: u32,
        direction: WsDirection,
        payload: Vec<u8>,
    },
}

impl NetworkEvent {
    fn encode(&self, w: &mut ByteWriter) {
        match self {
            NetworkEvent::Fetch {
                request_id,
                url,
                method,
                status,
                body,
            } => {
                w.put_u8(network_tag::FETCH);
                w.put_u32(*request_id);
                w.put_str16(url);
                w.put_str8(method);
                w.put_u16(*status);
                w.put_opt(body.as_ref(), |w, b| w.put_buf32(b));
            }
            NetworkEvent::WebSocket {
                socket_id,
                direction,
                payload,
            } => {
                w.put_u8(network_tag::WEB_SOCKET);
                w.put_u32(*socket_id);
                w.put_u8(*direction as u8);
                w.put_buf32(payload);
            }
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match r.get_u8()? {
            network_tag::FETCH => Ok(NetworkEvent::Fetch {
                request_id: r.get_u32()?,
                url: r.get_str16()?,
                method: r.get_str8()?,
                status: r.get_u16()?,
                body: r.get_opt(|r| r.get_buf32())?,
            }),
            network_tag::WEB_SOCKET => {
                let socket_id = r.get_u32()?;
                let direction = match r.get_u8()? {
                    0 => WsDirection::Outgoing,
                    1 => WsDirection::Incoming,
                    tag => {
                        return Err(CodecError::UnknownTag {
                            what: "wsDirection",
                            tag,
                        })
                    }
                };
                Ok(NetworkEvent::WebSocket {
                    socket_id,
                    direction,
                    payload: r.get_buf32()?,
                })
            }
            tag => Err(CodecError::UnknownTag {
                what: "network",
                tag,
            }),
        }
    }

    fn validate(&self) -> Result<(), CodecError> {
        match self {
            NetworkEvent::Fetch { url, method, .. } => {
                check_str16("fetch.url", url)?;
                check_str8("fetch.method", method)
            }
            NetworkEvent::WebSocket { .. } => Ok(()),
        }
    }
}

/// Console message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConsoleLevel {
    Log = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl ConsoleLevel {
    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(ConsoleLevel::Log),
            1 => Ok(ConsoleLevel::Debug),
            2 => Ok(ConsoleLevel::Info),
            3 => Ok(ConsoleLevel::Warn),
            4 => Ok(ConsoleLevel::Error),
            tag => Err(CodecError::UnknownTag {
                what: "consoleLevel",
                tag,
            }),
        }
    }
}

/// One argument of a console call: literal text, or a reference to a node
/// in the recorded tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolePart {
    Text(String),
    Node(NodeId),
}

/// One frame of the capture-time stack trace.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// A leveled console message with string/node parts and stack frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub parts: Vec<ConsolePart>,
    pub stack: Vec<StackFrame>,
}

impl ConsoleMessage {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(self.level as u8);
        w.put_u16(self.parts.len() as u16);
        for part in &self.parts {
            match part {
                ConsolePart::Text(s) => {
                    w.put_u8(0);
                    w.put_str16(s);
                }
                ConsolePart::Node(id) => {
                    w.put_u8(1);
                    id.encode(w);
                }
            }
        }
        w.put_u16(self.stack.len() as u16);
        for frame in &self.stack {
            w.put_str8(&frame.function);
            w.put_str16(&frame.file);
            w.put_u32(frame.line);
            w.put_u32(frame.column);
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let level = ConsoleLevel::from_tag(r.get_u8()?)?;
        let part_count = r.get_u16()? as usize;
        let mut parts = Vec::with_capacity(part_count.min(1024));
        for _ in 0..part_count {
            parts.push(match r.get_u8()? {
                0 => ConsolePart::Text(r.get_str16()?),
                1 => ConsolePart::Node(NodeId::decode(r)?),
                tag => {
                    return Err(CodecError::UnknownTag {
                        what: "consolePart",
                        tag,
                    })
                }
            });
        }
        let frame_count = r.get_u16()? as usize;
        let mut stack = Vec::with_capacity(frame_count.min(256));
        for _ in 0..frame_count {
            stack.push(StackFrame {
                function: r.get_str8()?,
                file: r.get_str16()?,
                line: r.get_u32()?,
                column: r.get_u32()?,
            });
        }
        Ok(ConsoleMessage {
            level,
            parts,
            stack,
        })
    }

    fn validate(&self) -> Result<(), CodecError> {
        for part in &self.parts {
            if let ConsolePart::Text(s) = part {
                check_str16("console.part", s)?;
            }
        }
        for frame in &self.stack {
            check_str8("console.stack.function", &frame.function)?;
            check_str16("console.stack.file", &frame.file)?;
        }
        Ok(())
    }
}

/// Interaction portion of a full snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InteractionSnapshot {
    pub pointer: Point,
    pub pointer_state: PointerButtons,
    pub scroll: BTreeMap<NodeId, Point>,
    pub viewport: Point,
    pub page_url: String,
}

impl InteractionSnapshot {
    fn encode(&self, w: &mut ByteWriter) {
        self.pointer.encode(w);
        w.put_u8(self.pointer_state.bits());
        w.put_u16(self.scroll.len() as u16);
        for (id, offset) in &self.scroll {
            id.encode(w);
            offset.encode(w);
        }
        self.viewport.encode(w);
        w.put_str16(&self.page_url);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let pointer = Point::decode(r)?;
        let pointer_state = PointerButtons::from_bits_truncate(r.get_u8()?);
        let count = r.get_u16()? as usize;
        let mut scroll = BTreeMap::new();
        for _ in 0..count {
            let id = NodeId::decode(r)?;
            let offset = Point::decode(r)?;
            scroll.insert(id, offset);
        }
        Ok(InteractionSnapshot {
            pointer,
            pointer_state,
            scroll,
            viewport: Point::decode(r)?,
            page_url: r.get_str16()?,
        })
    }
}

/// Full reconstruction of recorded state at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub dom: Option<VTree>,
    pub interaction: Option<InteractionSnapshot>,
}

impl Snapshot {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_opt(self.dom.as_ref(), |w, tree| tree.encode(w));
        w.put_opt(self.interaction.as_ref(), |w, i| i.encode(w));
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Snapshot {
            dom: r.get_opt(VTree::decode)?,
            interaction: r.get_opt(InteractionSnapshot::decode)?,
        })
    }

    fn validate(&self) -> Result<(), CodecError> {
        if let Some(tree) = &self.dom {
            tree.validate()?;
        }
        if let Some(i) = &self.interaction {
            check_str16("snapshot.pageUrl", &i.page_url)?;
        }
        Ok(())
    }
}

/// Payload of one log entry; the tagged union behind [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Snapshot(Snapshot),
    DomPatch(Patch),
    Interaction(Interaction),
    Network(NetworkEvent),
    Console(ConsoleMessage),
    CloseRecording,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Snapshot(_) => EventKind::Snapshot,
            EventPayload::DomPatch(_) => EventKind::DomPatch,
            EventPayload::Interaction(_) => EventKind::Interaction,
            EventPayload::Network(_) => EventKind::Network,
            EventPayload::Console(_) => EventKind::Console,
            EventPayload::CloseRecording => EventKind::CloseRecording,
        }
    }
}

/// One immutable log entry: a payload stamped with its recording-relative
/// capture time in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub time: u32,
    pub payload: EventPayload,
}

impl SourceEvent {
    pub fn new(time: u32, payload: EventPayload) -> Self {
        SourceEvent { time, payload }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Encode without validation. The caller guarantees the value fits its
    /// layout; this is the hot path producers run on every callback.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(64);
        w.put_u8(self.kind() as u8);
        w.put_u32(self.time);
        match &self.payload {
            EventPayload::Snapshot(s) => s.encode(&mut w),
            EventPayload::DomPatch(p) => p.encode(&mut w),
            EventPayload::Interaction(i) => i.encode(&mut w),
            EventPayload::Network(n) => n.encode(&mut w),
            EventPayload::Console(c) => c.encode(&mut w),
            EventPayload::CloseRecording => {}
        }
        w.into_bytes()
    }

    /// Encode with layout validation first; the error names the offending
    /// field.
    pub fn encode_validated(&self) -> Result<Vec<u8>, CodecError> {
        self.validate()?;
        Ok(self.encode())
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        match &self.payload {
            EventPayload::Snapshot(s) => s.validate(),
            EventPayload::DomPatch(p) => p.validate(),
            EventPayload::Interaction(i) => i.validate(),
            EventPayload::Network(n) => n.validate(),
            EventPayload::Console(c) => c.validate(),
            EventPayload::CloseRecording => Ok(()),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let view = EventView::new(buf)?;
        let kind = view.kind()?;
        let time = view.time();
        let mut r = ByteReader::new(view.payload());
        let payload = match kind {
            EventKind::Snapshot => EventPayload::Snapshot(Snapshot::decode(&mut r)?),
            EventKind::DomPatch => EventPayload::DomPatch(Patch::decode(&mut r)?),
            EventKind::Interaction => EventPayload::Interaction(Interaction::decode(&mut r)?),
            EventKind::Network => EventPayload::Network(NetworkEvent::decode(&mut r)?),
            EventKind::Console => EventPayload::Console(ConsoleMessage::decode(&mut r)?),
            EventKind::CloseRecording => EventPayload::CloseRecording,
        };
        Ok(SourceEvent { time, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::VNode;
    use crate::testutil::nid;

    fn roundtrip(event: &SourceEvent) -> SourceEvent {
        let bytes = event.encode();
        SourceEvent::decode(&bytes).unwrap()
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut tree = VTree::new(nid("root"));
        tree.insert(VNode::Document {
            id: nid("root"),
            children: vec![],
        });
        let mut scroll = BTreeMap::new();
        scroll.insert(nid("el-1"), Point::new(0, 200));
        let event = SourceEvent::new(
            0,
            EventPayload::Snapshot(Snapshot {
                dom: Some(tree),
                interaction: Some(InteractionSnapshot {
                    pointer: Point::new(10, 20),
                    pointer_state: PointerButtons::PRIMARY,
                    scroll,
                    viewport: Point::new(1280, 720),
                    page_url: "https://example.com/app".to_string(),
                }),
            }),
        );
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn test_empty_snapshot_roundtrip() {
        let event = SourceEvent::new(0, EventPayload::Snapshot(Snapshot::default()));
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn test_patch_roundtrip() {
        let event = SourceEvent::new(
            500,
            EventPayload::DomPatch(Patch::Text {
                target: nid("txt-1"),
                value: "bar".to_string(),
                old: Some("foo".to_string()),
            }),
        );
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn test_interaction_roundtrips() {
        let interactions = [
            Interaction::ViewportResize(Sample {
                from: Point::new(800, 600),
                to: Point::new(1024, 768),
                duration: 50,
            }),
            Interaction::Scroll {
                target: nid("el-1"),
                offset: Sample {
                    from: Point::new(0, 0),
                    to: Point::new(0, 500),
                    duration: 200,
                },
            },
            Interaction::PointerMove(Sample {
                from: Point::new(0, 0),
                to: Point::new(50, 50),
                duration: 100,
            }),
            Interaction::PointerDown {
                position: Point::new(5, 5),
                button: PointerButtons::PRIMARY,
            },
            Interaction::PointerUp {
                position: Point::new(5, 5),
                button: PointerButtons::PRIMARY,
            },
            Interaction::KeyDown {
                key: "Enter".to_string(),
            },
            Interaction::KeyUp {
                key: "Enter".to_string(),
            },
        ];
        for (i, interaction) in interactions.into_iter().enumerate() {
            let event = SourceEvent::new(i as u32 * 10, EventPayload::Interaction(interaction));
            assert_eq!(roundtrip(&event), event);
        }
    }

    #[test]
    fn test_network_roundtrips() {
        let events = [
            NetworkEvent::Fetch {
                request_id: 1,
                url: "https://api.example.com/items".to_string(),
                method: "GET".to_string(),
                status: 200,
                body: Some(vec![0x7B, 0x7D]),
            },
            NetworkEvent::WebSocket {
                socket_id: 3,
                direction: WsDirection::Incoming,
                payload: vec![1, 2, 3, 4],
            },
        ];
        for network in events {
            let event = SourceEvent::new(42, EventPayload::Network(network));
            assert_eq!(roundtrip(&event), event);
        }
    }

    #[test]
    fn test_console_roundtrip() {
        let event = SourceEvent::new(
            7,
            EventPayload::Console(ConsoleMessage {
                level: ConsoleLevel::Error,
                parts: vec![
                    ConsolePart::Text("boom in".to_string()),
                    ConsolePart::Node(nid("el-1")),
                ],
                stack: vec![StackFrame {
                    function: "handleClick".to_string(),
                    file: "https://example.com/app.js".to_string(),
                    line: 10,
                    column: 4,
                }],
            }),
        );
        assert_eq!(roundtrip(&event), event);
    }

    #[test]
    fn test_close_roundtrip() {
        let event = SourceEvent::new(99_000, EventPayload::CloseRecording);
        assert_eq!(roundtrip(&event), event);
        assert_eq!(event.encode().len(), 5);
    }

    #[test]
    fn test_wire_tag_matches_discriminant() {
        let event = SourceEvent::new(0, EventPayload::CloseRecording);
        assert_eq!(event.encode()[0], 99);
        let event = SourceEvent::new(0, EventPayload::Snapshot(Snapshot::default()));
        assert_eq!(event.encode()[0], 0);
    }

    #[test]
    fn test_validated_encode_names_field() {
        let event = SourceEvent::new(
            0,
            EventPayload::DomPatch(Patch::Attribute {
                target: nid("el-1"),
                name: "x".repeat(300),
                value: None,
                old: None,
            }),
        );
        match event.encode_validated().unwrap_err() {
            CodecError::FieldViolation { field, .. } => assert_eq!(field, "attribute.name"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compact_encoding() {
        // a realistic text patch should be far smaller than a naive
        // JSON-ish estimate of the same value
        let event = SourceEvent::new(
            500,
            EventPayload::DomPatch(Patch::Text {
                target: nid("txt-1"),
                value: "bar".to_string(),
                old: Some("foo".to_string()),
            }),
        );
        let naive = format!("{:?}", event).len();
        assert!(event.encode().len() < naive);
    }
}
