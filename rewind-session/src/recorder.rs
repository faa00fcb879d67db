//! Session recorder - the producer-facing recording stream.
//!
//! Observers (out of scope here) create [`SourceEvent`]s and hand them to
//! [`Recorder::push`] synchronously from their callbacks; `push` appends to
//! the bounded ring and returns. Byte-ceiling maintenance runs on a
//! low-frequency task instead, which folds every evicted non-Snapshot
//! event into a "leading snapshot" through the same reducer playback uses,
//! so `slice()` can later synthesize a Snapshot covering everything that
//! was evicted without retaining the raw bytes.

use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use rewind_core::codec::write_time;
use rewind_core::container::{Recording, RecordingId, RecordingMode};
use rewind_core::event::{EventPayload, SourceEvent};
use rewind_core::node::{NodeId, VNode};
use rewind_core::reducer::SnapshotState;

use crate::ring::{EncodedEvent, EventRing, DEFAULT_BYTE_CEILING};

/// Recorder tuning knobs.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Ring buffer byte ceiling
    pub byte_ceiling: usize,
    /// How often a full Snapshot keyframe is synthesized into the log
    pub keyframe_interval: Duration,
    /// How often deferred eviction runs
    pub maintenance_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            byte_ceiling: DEFAULT_BYTE_CEILING,
            keyframe_interval: Duration::from_secs(10),
            maintenance_interval: Duration::from_millis(250),
        }
    }
}

/// Recording status information
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    /// Current state ("idle" or "recording")
    pub state: String,
    /// Events currently buffered
    pub event_count: usize,
    /// Exact encoded bytes currently buffered
    pub buffered_bytes: usize,
    /// Timestamp of the newest pushed event (ms, recording-relative)
    pub duration_ms: u32,
    /// Whether the ring has evicted anything yet
    pub windowed: bool,
}

struct RecorderInner {
    ring: EventRing,
    /// Live state mirror of everything pushed so far; serves `peek` and
    /// keyframe synthesis
    current: SnapshotState,
    /// State folded from evicted events; the base of the leading snapshot
    leading: SnapshotState,
    /// Time of the newest folded evicted event
    leading_time: u32,
    evicted_any: bool,
    last_time: u32,
    epoch: Instant,
    tail_tx: broadcast::Sender<SourceEvent>,
}

/// Producer-facing recording stream over a bounded ring buffer.
pub struct Recorder {
    config: RecorderConfig,
    inner: Arc<Mutex<RecorderInner>>,
    started: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        let (tail_tx, _) = broadcast::channel(256);
        let inner = RecorderInner {
            ring: EventRing::new(config.byte_ceiling),
            current: SnapshotState::default(),
            leading: SnapshotState::default(),
            leading_time: 0,
            evicted_any: false,
            last_time: 0,
            epoch: Instant::now(),
            tail_tx,
        };
        Recorder {
            config,
            inner: Arc::new(Mutex::new(inner)),
            started: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start accepting events and spawn the maintenance and keyframe
    /// loops. Requires a tokio runtime.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut inner = self.inner.lock().unwrap();
            inner.epoch = Instant::now();
        }
        info!(
            "Recording started (ceiling {} bytes)",
            self.config.byte_ceiling
        );

        let mut tasks = self.tasks.lock().unwrap();

        let inner = self.inner.clone();
        let started = self.started.clone();
        let period = self.config.maintenance_interval;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if !started.load(Ordering::SeqCst) {
                    break;
                }
                maintain_inner(&mut inner.lock().unwrap());
            }
            debug!("Maintenance task stopped");
        }));

        let inner = self.inner.clone();
        let started = self.started.clone();
        let period = self.config.keyframe_interval;
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // skip the immediate first tick; a keyframe at t=0 would
            // duplicate the producer's initial snapshot
            interval.tick().await;
            loop {
                interval.tick().await;
                if !started.load(Ordering::SeqCst) {
                    break;
                }
                keyframe_inner(&mut inner.lock().unwrap());
            }
            debug!("Keyframe task stopped");
        }));
    }

    /// Stop recording: appends the CloseRecording event and tears down the
    /// background loops. Idempotent.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let time = inner.epoch.elapsed().as_millis() as u32;
        let close = SourceEvent::new(time.max(inner.last_time), EventPayload::CloseRecording);
        append(&mut inner, close);
        drop(inner);

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("Recording stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Milliseconds since `start()`; producers stamp their events with
    /// this clock.
    pub fn elapsed_ms(&self) -> u32 {
        self.inner.lock().unwrap().epoch.elapsed().as_millis() as u32
    }

    /// Append one event to the log. O(1), non-blocking: the byte ceiling
    /// is only flagged here and enforced by the maintenance loop. Events
    /// pushed while stopped are dropped.
    pub fn push(&self, event: SourceEvent) {
        if !self.started.load(Ordering::SeqCst) {
            debug!("Dropping event pushed while stopped");
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        append(&mut inner, event);
    }

    /// Run one deferred-eviction pass now. The background loop calls this
    /// on its interval; tests call it directly.
    pub fn maintain(&self) {
        maintain_inner(&mut self.inner.lock().unwrap());
    }

    /// Synthesize a Snapshot keyframe from the live state now. The
    /// background loop calls this on its interval; tests call it directly.
    pub fn keyframe(&self) {
        keyframe_inner(&mut self.inner.lock().unwrap());
    }

    /// Current view of one node, if the live document contains it.
    pub fn peek(&self, id: &NodeId) -> Option<VNode> {
        let inner = self.inner.lock().unwrap();
        inner.current.dom.as_ref()?.get(id).cloned()
    }

    /// Deep, independent copy of the event log: leading-snapshot rebased
    /// and timestamps normalized to start at 0. The first event is always
    /// a Snapshot.
    pub fn slice(&self) -> Vec<EncodedEvent> {
        let inner = self.inner.lock().unwrap();
        slice_inner(&inner)
    }

    /// Package the current `slice()` into a whole-recording container.
    pub fn to_recording(&self, id: RecordingId) -> Recording {
        let inner = self.inner.lock().unwrap();
        let events = slice_inner(&inner);
        let duration = events
            .last()
            .and_then(|e| e.view().ok())
            .map(|v| v.time())
            .unwrap_or(0);
        Recording {
            id,
            mode: if inner.evicted_any {
                RecordingMode::Windowed
            } else {
                RecordingMode::Full
            },
            duration,
            events: events.into_iter().map(EncodedEvent::into_bytes).collect(),
        }
    }

    /// Stream of decoded events as they are pushed.
    pub fn tail(&self) -> broadcast::Receiver<SourceEvent> {
        self.inner.lock().unwrap().tail_tx.subscribe()
    }

    /// Evicted-batch notifications from the ring.
    pub fn on_evict(&self) -> broadcast::Receiver<Vec<EncodedEvent>> {
        self.inner.lock().unwrap().ring.subscribe()
    }

    pub fn status(&self) -> RecorderStatus {
        let inner = self.inner.lock().unwrap();
        RecorderStatus {
            state: if self.is_started() { "recording" } else { "idle" }.to_string(),
            event_count: inner.ring.len(),
            buffered_bytes: inner.ring.total_bytes(),
            duration_ms: inner.last_time,
            windowed: inner.evicted_any,
        }
    }
}

fn append(inner: &mut RecorderInner, event: SourceEvent) {
    let encoded = EncodedEvent::from_event(&event);
    inner.ring.push(encoded);
    inner.last_time = inner.last_time.max(event.time);
    if !inner.current.apply(&event, event.time) {
        // producer referenced a node the mirror does not know; the raw
        // event stays in the authoritative log regardless
        warn!("Event at {}ms references an unknown node", event.time);
    }
    if let Err(e) = inner.tail_tx.send(event) {
        trace!("No tail subscribers: {}", e);
    }
}

fn maintain_inner(inner: &mut RecorderInner) {
    let evicted = inner.ring.maintain();
    for entry in &evicted {
        match entry.decode() {
            Ok(event) => {
                // leading must be fully resolved, so fold samples at
                // their end time
                let clock = entry
                    .view()
                    .ok()
                    .and_then(|v| v.sample_end_time())
                    .unwrap_or(event.time);
                inner.leading.apply(&event, clock);
                inner.leading_time = inner.leading_time.max(event.time);
            }
            Err(e) => warn!("Skipping undecodable evicted event: {}", e),
        }
    }
    if !evicted.is_empty() {
        inner.evicted_any = true;
    }
}

fn keyframe_inner(inner: &mut RecorderInner) {
    // nothing worth keyframing before the first real snapshot arrives
    if inner.current.dom.is_none() {
        return;
    }
    let time = inner.epoch.elapsed().as_millis() as u32;
    let time = time.max(inner.last_time);
    let event = SourceEvent::new(time, EventPayload::Snapshot(inner.current.to_snapshot()));
    trace!("Keyframe snapshot at {}ms", time);
    append(inner, event);
}

fn slice_inner(inner: &RecorderInner) -> Vec<EncodedEvent> {
    let retained = inner.ring.copy();
    let first_is_snapshot = retained
        .first()
        .and_then(|e| e.view().ok())
        .map(|v| v.is_snapshot())
        .unwrap_or(false);

    let mut events = Vec::with_capacity(retained.len() + 1);
    // a Snapshot keyframe surviving at the head already covers everything
    // folded into `leading`, so no synthetic lead is needed then
    if !first_is_snapshot {
        if inner.leading.dom.is_none() && retained.is_empty() {
            // nothing recorded yet
            return Vec::new();
        }
        let lead = SourceEvent::new(
            inner.leading_time,
            EventPayload::Snapshot(inner.leading.to_snapshot()),
        );
        events.push(EncodedEvent::from_event(&lead));
    }
    events.extend(retained);

    let base = events
        .first()
        .and_then(|e| e.view().ok())
        .map(|v| v.time())
        .unwrap_or(0);
    if base > 0 {
        for event in &mut events {
            let time = event.view().map(|v| v.time()).unwrap_or(base);
            write_time(event.bytes_mut(), time.saturating_sub(base));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::event::{InteractionSnapshot, Snapshot};
    use rewind_core::node::{VTree, NODE_ID_LEN};
    use rewind_core::patch::Patch;
    use rewind_core::reducer::SnapshotState;

    fn nid(seed: &str) -> NodeId {
        let mut s = seed.to_string();
        while s.len() < NODE_ID_LEN {
            s.push('0');
        }
        NodeId::parse(&s).unwrap()
    }

    fn base_snapshot() -> Snapshot {
        let mut tree = VTree::new(nid("root"));
        tree.insert(VNode::Document {
            id: nid("root"),
            children: vec![nid("txt-1")],
        });
        tree.insert(VNode::Text {
            id: nid("txt-1"),
            value: "v0".to_string(),
        });
        Snapshot {
            dom: Some(tree),
            interaction: Some(InteractionSnapshot::default()),
        }
    }

    fn text_patch(time: u32, value: &str) -> SourceEvent {
        SourceEvent::new(
            time,
            EventPayload::DomPatch(Patch::Text {
                target: nid("txt-1"),
                value: value.to_string(),
                old: None,
            }),
        )
    }

    fn small_recorder(ceiling: usize) -> Recorder {
        Recorder::new(RecorderConfig {
            byte_ceiling: ceiling,
            ..Default::default()
        })
    }

    /// Replay a slice from its leading snapshot to the end.
    fn replay(events: &[EncodedEvent]) -> SnapshotState {
        let mut state = SnapshotState::default();
        for entry in events {
            let event = entry.decode().unwrap();
            let clock = entry
                .view()
                .unwrap()
                .sample_end_time()
                .unwrap_or(event.time);
            state.apply(&event, clock);
        }
        state
    }

    #[tokio::test]
    async fn test_push_requires_start() {
        let recorder = small_recorder(1 << 20);
        recorder.push(text_patch(0, "dropped"));
        assert_eq!(recorder.status().event_count, 0);
        recorder.start();
        assert!(recorder.is_started());
        recorder.push(SourceEvent::new(0, EventPayload::Snapshot(base_snapshot())));
        assert_eq!(recorder.status().event_count, 1);
        recorder.stop();
        assert!(!recorder.is_started());
    }

    #[tokio::test]
    async fn test_stop_appends_close_and_is_idempotent() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        recorder.push(SourceEvent::new(0, EventPayload::Snapshot(base_snapshot())));
        recorder.stop();
        recorder.stop();
        let slice = recorder.slice();
        let last = slice.last().unwrap().decode().unwrap();
        assert_eq!(last.payload, EventPayload::CloseRecording);
    }

    #[tokio::test]
    async fn test_peek_tracks_latest_value() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        recorder.push(SourceEvent::new(0, EventPayload::Snapshot(base_snapshot())));
        recorder.push(text_patch(100, "v1"));
        match recorder.peek(&nid("txt-1")) {
            Some(VNode::Text { value, .. }) => assert_eq!(value, "v1"),
            other => panic!("unexpected node: {other:?}"),
        }
        assert!(recorder.peek(&nid("missing")).is_none());
        recorder.stop();
    }

    #[tokio::test]
    async fn test_slice_rebases_to_zero() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        recorder.push(SourceEvent::new(
            2000,
            EventPayload::Snapshot(base_snapshot()),
        ));
        recorder.push(text_patch(2500, "v1"));
        let slice = recorder.slice();
        let times: Vec<u32> = slice.iter().map(|e| e.view().unwrap().time()).collect();
        assert_eq!(times, vec![0, 500]);
        recorder.stop();
    }

    #[tokio::test]
    async fn test_slice_synthesizes_leading_snapshot() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        // producer never sent a snapshot; slice still leads with one
        recorder.push(text_patch(100, "v1"));
        let slice = recorder.slice();
        assert!(slice[0].view().unwrap().is_snapshot());
        recorder.stop();
    }

    #[tokio::test]
    async fn test_slice_keeps_single_snapshot_after_surviving_keyframe() {
        let snap_len =
            EncodedEvent::from_event(&SourceEvent::new(0, EventPayload::Snapshot(base_snapshot())))
                .len();
        let patch_len = EncodedEvent::from_event(&text_patch(0, "v1")).len();

        // room for exactly one keyframe plus one trailing patch
        let recorder = small_recorder(snap_len + patch_len);
        recorder.start();
        recorder.push(SourceEvent::new(0, EventPayload::Snapshot(base_snapshot())));
        recorder.push(text_patch(100, "v1"));
        recorder.push(text_patch(200, "v2"));
        recorder.push(SourceEvent::new(
            300,
            EventPayload::Snapshot(base_snapshot()),
        ));
        recorder.push(text_patch(400, "v3"));
        recorder.maintain();

        assert!(recorder.status().windowed);
        let slice = recorder.slice();
        // the surviving keyframe leads; no synthetic snapshot doubles it
        assert_eq!(slice.len(), 2);
        assert!(slice[0].view().unwrap().is_snapshot());
        assert!(!slice[1].view().unwrap().is_snapshot());
        match replay(&slice).dom.unwrap().get(&nid("txt-1")) {
            Some(VNode::Text { value, .. }) => assert_eq!(value, "v3"),
            other => panic!("unexpected node: {other:?}"),
        }
        recorder.stop();
    }

    #[tokio::test]
    async fn test_eviction_fidelity() {
        // a tight ring that evicts many patches must replay to the same
        // final state as an unbounded one fed the same events
        let bounded = small_recorder(600);
        let unbounded = small_recorder(1 << 24);
        bounded.start();
        unbounded.start();

        let snapshot = SourceEvent::new(0, EventPayload::Snapshot(base_snapshot()));
        bounded.push(snapshot.clone());
        unbounded.push(snapshot);
        for i in 1..200u32 {
            let patch = text_patch(i * 10, &format!("v{}", i));
            bounded.push(patch.clone());
            unbounded.push(patch);
            bounded.maintain();
        }

        assert!(bounded.status().windowed);
        assert!(!unbounded.status().windowed);
        assert!(bounded.status().buffered_bytes <= 600);

        let a = replay(&bounded.slice());
        let b = replay(&unbounded.slice());
        assert_eq!(a, b);

        // the retained tail is a strict suffix of the unbounded log
        let bounded_slice = bounded.slice();
        let tail: Vec<SourceEvent> = bounded_slice[1..]
            .iter()
            .map(|e| e.decode().unwrap())
            .collect();
        let full: Vec<SourceEvent> = unbounded
            .slice()
            .iter()
            .map(|e| e.decode().unwrap())
            .collect();
        assert!(!tail.is_empty());
        let offset = full.len() - tail.len();
        // rebased times differ by the evicted span; compare payloads
        for (i, event) in tail.iter().enumerate() {
            assert_eq!(event.payload, full[offset + i].payload);
        }

        bounded.stop();
        unbounded.stop();
    }

    #[tokio::test]
    async fn test_keyframe_appends_snapshot() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        recorder.push(SourceEvent::new(0, EventPayload::Snapshot(base_snapshot())));
        recorder.push(text_patch(10, "v1"));
        recorder.keyframe();
        let slice = recorder.slice();
        let last = slice.last().unwrap();
        assert!(last.view().unwrap().is_snapshot());
        // the keyframe reflects the patched state
        let decoded = last.decode().unwrap();
        match decoded.payload {
            EventPayload::Snapshot(s) => match s.dom.unwrap().get(&nid("txt-1")) {
                Some(VNode::Text { value, .. }) => assert_eq!(value, "v1"),
                other => panic!("unexpected node: {other:?}"),
            },
            other => panic!("unexpected payload: {other:?}"),
        }
        recorder.stop();
    }

    #[tokio::test]
    async fn test_keyframe_needs_dom() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        recorder.keyframe();
        assert_eq!(recorder.status().event_count, 0);
        recorder.stop();
    }

    #[tokio::test]
    async fn test_tail_streams_decoded_events() {
        let recorder = small_recorder(1 << 20);
        recorder.start();
        let mut tail = recorder.tail();
        let event = SourceEvent::new(0, EventPayload::Snapshot(base_snapshot()));
        recorder.push(event.clone());
        assert_eq!(tail.recv().await.unwrap(), event);
        recorder.stop();
    }
}
