//! Snapshot-indexed playback engine.
//!
//! A player owns an ordered list of encoded events, records the positions
//! of every Snapshot event, and materializes any instant of the timeline
//! by decoding the last snapshot at or before the target and replaying the
//! tail through the reducer. Time advances one `tick` per render frame;
//! seeks jump. Interaction samples that straddle the target stay pending
//! so later ticks re-resolve their interpolation.

use log::{debug, info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use rewind_core::container::Recording;
use rewind_core::error::TimelineError;
use rewind_core::event::{EventPayload, SourceEvent};
use rewind_core::node::NodeId;
use rewind_core::reducer::SnapshotState;

use crate::ring::EncodedEvent;

/// Shared backing event list. Immutable entries; a live recorder may
/// append while a player reads.
pub type SharedEvents = Arc<RwLock<Vec<EncodedEvent>>>;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// What moved the playhead last. Consumers re-render wholesale on any
/// non-Idle frame and apply `drain_buffer()` incrementally on Idle ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Normal tick advancement
    Idle,
    SeekToEvent,
    SeekToTime,
    /// State replaced outside of a seek (first live-tailing resolution)
    Flush,
}

impl std::fmt::Display for ControlFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlFrame::Idle => write!(f, "idle"),
            ControlFrame::SeekToEvent => write!(f, "seekToEvent"),
            ControlFrame::SeekToTime => write!(f, "seekToTime"),
            ControlFrame::Flush => write!(f, "flush"),
        }
    }
}

/// A matched breakpoint: which node triggered, at which event ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    pub node: NodeId,
    pub event_index: usize,
}

/// Playback status information
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    /// Current state ("playing" or "paused")
    pub state: String,
    /// Current position in milliseconds
    pub elapsed_ms: u32,
    /// Total duration in milliseconds
    pub duration_ms: u32,
    /// Ordinal of the last applied event
    pub active_index: usize,
    /// Total event count
    pub event_count: usize,
    /// Playback speed multiplier
    pub speed: f32,
    /// Last control frame
    pub control: String,
    /// Node that triggered the current pause, if any
    pub matched_breakpoint: Option<NodeId>,
}

struct PlayerInner {
    /// Ordinals of Snapshot events, ascending
    snapshot_index: Vec<usize>,
    /// How many events have been indexed so far
    scanned: usize,
    /// Timestamp of the newest indexed event
    latest_time: u32,
    duration: u32,
    state: PlaybackState,
    elapsed: u32,
    /// Ordinal of the last applied event
    active_index: usize,
    /// Ordinal of the next not-yet-applied event
    queue_pos: usize,
    /// Materialized state at `elapsed`
    snapshot: SnapshotState,
    /// Whether a leading snapshot has ever been resolved
    resolved: bool,
    /// Decoded events applied since the consumer last drained
    buffer: Vec<SourceEvent>,
    /// Ordinals of applied samples still interpolating past `elapsed`
    pending_samples: Vec<usize>,
    breakpoints: Vec<NodeId>,
    matched: Option<BreakpointHit>,
    /// Event ordinal that caused the previous breakpoint pause; suppressed
    /// from re-triggering when playback resumes over it
    last_break: Option<usize>,
    control: ControlFrame,
    speed: f32,
}

impl PlayerInner {
    fn new(duration: u32) -> Self {
        PlayerInner {
            snapshot_index: Vec::new(),
            scanned: 0,
            latest_time: 0,
            duration,
            state: PlaybackState::Paused,
            elapsed: 0,
            active_index: 0,
            queue_pos: 0,
            snapshot: SnapshotState::default(),
            resolved: false,
            buffer: Vec::new(),
            pending_samples: Vec::new(),
            breakpoints: Vec::new(),
            matched: None,
            last_break: None,
            control: ControlFrame::Idle,
            speed: 1.0,
        }
    }
}

/// One playback instance over one timeline.
pub struct Player {
    events: SharedEvents,
    inner: Arc<Mutex<PlayerInner>>,
    closed: Arc<AtomicBool>,
    resync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Construct over a fixed event list. The snapshot index is built
    /// immediately; no state is materialized until the first seek or
    /// tick.
    pub fn new(events: Vec<EncodedEvent>, duration: u32) -> Self {
        Player::over(Arc::new(RwLock::new(events)), duration)
    }

    pub fn from_recording(recording: &Recording) -> Self {
        let events = recording
            .events
            .iter()
            .map(|b| EncodedEvent::new(b.clone()))
            .collect();
        Player::new(events, recording.duration)
    }

    /// Construct over a shared, possibly still-growing event list and
    /// spawn a low-frequency resync loop. Requires a tokio runtime.
    pub fn live(events: SharedEvents, duration: u32, resync_interval: Duration) -> Arc<Self> {
        let player = Arc::new(Player::over(events, duration));
        let task_player = player.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(resync_interval);
            loop {
                interval.tick().await;
                if task_player.closed.load(Ordering::SeqCst) {
                    break;
                }
                task_player.resync();
            }
            debug!("Resync task stopped");
        });
        *player.resync_task.lock().unwrap() = Some(task);
        player
    }

    fn over(events: SharedEvents, duration: u32) -> Self {
        let player = Player {
            events,
            inner: Arc::new(Mutex::new(PlayerInner::new(duration))),
            closed: Arc::new(AtomicBool::new(false)),
            resync_task: Mutex::new(None),
        };
        {
            let events = player.events.read().unwrap();
            let mut inner = player.inner.lock().unwrap();
            extend_index(&mut inner, &events);
        }
        player
    }

    /// Independent playback instance sharing the immutable backing list.
    pub fn copy(&self) -> Player {
        Player::over(self.events.clone(), self.inner.lock().unwrap().duration)
    }

    pub fn play(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.state = PlaybackState::Playing;
        inner.matched = None;
    }

    pub fn pause(&self) {
        self.inner.lock().unwrap().state = PlaybackState::Paused;
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().unwrap().state
    }

    pub fn elapsed(&self) -> u32 {
        self.inner.lock().unwrap().elapsed
    }

    pub fn active_index(&self) -> usize {
        self.inner.lock().unwrap().active_index
    }

    pub fn control_frame(&self) -> ControlFrame {
        self.inner.lock().unwrap().control
    }

    /// Materialized state at the current position.
    pub fn snapshot(&self) -> SnapshotState {
        self.inner.lock().unwrap().snapshot.clone()
    }

    /// Decoded events applied since the last drain. Consumers apply these
    /// incrementally instead of re-rendering from `snapshot()`.
    pub fn drain_buffer(&self) -> Vec<SourceEvent> {
        std::mem::take(&mut self.inner.lock().unwrap().buffer)
    }

    /// Set playback speed (1.0 = normal, 0.5 = half, 2.0 = double)
    pub fn set_speed(&self, speed: f32) {
        self.inner.lock().unwrap().speed = speed.clamp(0.1, 10.0);
    }

    pub fn speed(&self) -> f32 {
        self.inner.lock().unwrap().speed
    }

    pub fn add_breakpoint(&self, node: NodeId) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.breakpoints.contains(&node) {
            inner.breakpoints.push(node);
        }
    }

    pub fn remove_breakpoint(&self, node: &NodeId) {
        let mut inner = self.inner.lock().unwrap();
        inner.breakpoints.retain(|b| b != node);
    }

    pub fn breakpoints(&self) -> Vec<NodeId> {
        self.inner.lock().unwrap().breakpoints.clone()
    }

    /// The breakpoint hit that caused the current pause, if any. Cleared
    /// by `play()` and by seeks.
    pub fn matched_breakpoint(&self) -> Option<BreakpointHit> {
        self.inner.lock().unwrap().matched
    }

    /// Advance playback by one render-frame delta. No-op unless Playing.
    pub fn tick(&self, delta_ms: u32) {
        let events = self.events.read().unwrap();
        let mut inner = self.inner.lock().unwrap();
        if inner.state != PlaybackState::Playing {
            return;
        }
        if !inner.resolved {
            // nothing materialized yet; resolve from the top first
            if let Err(e) = seek(&mut inner, &events, 0, ControlFrame::Flush) {
                trace!("Initial resolution not yet possible: {}", e);
                return;
            }
        }

        let limit = inner.duration.min(inner.latest_time);
        let scaled = (delta_ms as f64 * inner.speed as f64).round() as u32;
        let mut target = inner.elapsed.saturating_add(scaled).min(limit);
        // a breakpoint inside this window caps the clock at its event
        // time, so everything applied this tick is materialized at the
        // pause position rather than the full tick target
        if let Some(break_time) = next_break_time(&inner, &events, target) {
            target = target.min(break_time);
        }

        resolve_pending(&mut inner, &events, target);
        let paused = apply_queue(&mut inner, &events, target, true);
        if paused {
            return;
        }

        inner.elapsed = target;
        inner.control = ControlFrame::Idle;
        if inner.elapsed >= limit {
            debug!("End of timeline at {}ms", inner.elapsed);
            inner.state = PlaybackState::Paused;
        }
    }

    /// Jump to an absolute time. Partitions the whole timeline from the
    /// last snapshot at or before `t`; samples straddling `t` stay queued
    /// for later ticks.
    pub fn seek_to_time(&self, t: u32) -> Result<(), TimelineError> {
        let events = self.events.read().unwrap();
        let mut inner = self.inner.lock().unwrap();
        seek(&mut inner, &events, t, ControlFrame::SeekToTime)
    }

    /// Jump to an event ordinal. Same mechanism as `seek_to_time`, keyed
    /// by the located event's timestamp.
    pub fn seek_to_event(&self, index: usize) -> Result<(), TimelineError> {
        let events = self.events.read().unwrap();
        let mut inner = self.inner.lock().unwrap();
        let t = match events.get(index) {
            Some(entry) => entry.view()?.time(),
            None => {
                return Err(TimelineError::EventOutOfRange {
                    index,
                    len: events.len(),
                })
            }
        };
        seek(&mut inner, &events, t, ControlFrame::SeekToEvent)
    }

    /// Seek to the next patch after the current position that matches an
    /// active breakpoint. Returns the matched ordinal, `None` when no
    /// later event matches.
    pub fn break_next(&self) -> Result<Option<usize>, TimelineError> {
        let events = self.events.read().unwrap();
        let mut inner = self.inner.lock().unwrap();
        let start = inner.active_index + 1;
        let hit = (start..events.len())
            .find_map(|i| matching_breakpoint(&events[i], &inner.breakpoints).map(|n| (i, n)));
        self.jump_to_hit(&mut inner, &events, hit)
    }

    /// Seek to the previous matching patch before the current position.
    pub fn break_previous(&self) -> Result<Option<usize>, TimelineError> {
        let events = self.events.read().unwrap();
        let mut inner = self.inner.lock().unwrap();
        let hit = (0..inner.active_index)
            .rev()
            .find_map(|i| matching_breakpoint(&events[i], &inner.breakpoints).map(|n| (i, n)));
        self.jump_to_hit(&mut inner, &events, hit)
    }

    fn jump_to_hit(
        &self,
        inner: &mut PlayerInner,
        events: &[EncodedEvent],
        hit: Option<(usize, NodeId)>,
    ) -> Result<Option<usize>, TimelineError> {
        let (index, node) = match hit {
            Some(h) => h,
            None => return Ok(None),
        };
        let t = events[index].view()?.time();
        seek(inner, events, t, ControlFrame::SeekToEvent)?;
        inner.state = PlaybackState::Paused;
        inner.matched = Some(BreakpointHit {
            node,
            event_index: index,
        });
        inner.last_break = Some(index);
        Ok(Some(index))
    }

    /// Pick up events appended to the backing list since construction.
    /// Extends the snapshot index, grows the known duration, and retries
    /// initial resolution if no snapshot had resolved yet. The live loop
    /// calls this on its interval; tests call it directly.
    pub fn resync(&self) {
        let events = self.events.read().unwrap();
        let mut inner = self.inner.lock().unwrap();
        extend_index(&mut inner, &events);
        inner.duration = inner.duration.max(inner.latest_time);
        if !inner.resolved && !inner.snapshot_index.is_empty() {
            let t = inner.elapsed;
            match seek(&mut inner, &events, t, ControlFrame::Flush) {
                Ok(()) => info!("Timeline resolved at {}ms after resync", t),
                Err(e) => warn!("Resync resolution failed: {}", e),
            }
        }
    }

    /// Tear down the resync loop and stop playback. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.resync_task.lock().unwrap().take() {
            task.abort();
        }
        self.inner.lock().unwrap().state = PlaybackState::Paused;
        debug!("Player closed");
    }

    pub fn status(&self) -> PlayerStatus {
        let event_count = self.events.read().unwrap().len();
        let inner = self.inner.lock().unwrap();
        PlayerStatus {
            state: inner.state.to_string(),
            elapsed_ms: inner.elapsed,
            duration_ms: inner.duration,
            active_index: inner.active_index,
            event_count,
            speed: inner.speed,
            control: inner.control.to_string(),
            matched_breakpoint: inner.matched.map(|m| m.node),
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scan events not yet indexed and record Snapshot positions.
fn extend_index(inner: &mut PlayerInner, events: &[EncodedEvent]) {
    for (i, entry) in events.iter().enumerate().skip(inner.scanned) {
        match entry.view() {
            Ok(view) => {
                if view.is_snapshot() {
                    inner.snapshot_index.push(i);
                }
                inner.latest_time = inner.latest_time.max(view.time());
            }
            Err(e) => warn!("Unreadable event at index {}: {}", i, e),
        }
    }
    inner.scanned = events.len();
}

/// Materialize the timeline at `t`: decode the last snapshot at or before
/// `t` as the base, then apply every event up to `t` through the reducer.
fn seek(
    inner: &mut PlayerInner,
    events: &[EncodedEvent],
    t: u32,
    control: ControlFrame,
) -> Result<(), TimelineError> {
    extend_index(inner, events);

    let base = inner
        .snapshot_index
        .iter()
        .rev()
        .find(|&&i| match events[i].view() {
            Ok(view) => view.time() <= t,
            Err(_) => false,
        })
        .copied()
        .ok_or(TimelineError::NoLeadingSnapshot { target_ms: t })?;

    let event = events[base].decode()?;
    inner.snapshot = match &event.payload {
        EventPayload::Snapshot(snapshot) => SnapshotState::from_snapshot(snapshot),
        // the index only holds Snapshot-tagged entries
        _ => return Err(TimelineError::NoLeadingSnapshot { target_ms: t }),
    };

    inner.queue_pos = base + 1;
    inner.active_index = base;
    inner.pending_samples.clear();
    inner.buffer.clear();
    inner.matched = None;
    inner.last_break = None;
    inner.resolved = true;
    apply_queue(inner, events, t, false);
    inner.elapsed = t;
    inner.control = control;
    // a seek replaces the materialized state wholesale; nothing to apply
    // incrementally on top of it
    inner.buffer.clear();
    Ok(())
}

/// Apply queued events with time ≤ `t` in order. With `honor_breakpoints`
/// set, pauses before applying a matching patch (unless that same event
/// caused the previous pause) and returns true.
fn apply_queue(
    inner: &mut PlayerInner,
    events: &[EncodedEvent],
    t: u32,
    honor_breakpoints: bool,
) -> bool {
    while inner.queue_pos < events.len() {
        let i = inner.queue_pos;
        let entry = &events[i];
        let (time, end) = match entry.view() {
            Ok(view) => (view.time(), view.sample_end_time()),
            Err(e) => {
                warn!("Skipping unreadable event at index {}: {}", i, e);
                inner.queue_pos += 1;
                continue;
            }
        };
        if time > t {
            break;
        }
        let event = match entry.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping undecodable event at index {}: {}", i, e);
                inner.queue_pos += 1;
                continue;
            }
        };
        if honor_breakpoints && inner.last_break != Some(i) {
            if let EventPayload::DomPatch(patch) = &event.payload {
                let node = patch.affected_node();
                if inner.breakpoints.contains(&node) {
                    info!("Breakpoint on {} hit at {}ms (event {})", node, time, i);
                    inner.elapsed = time;
                    inner.state = PlaybackState::Paused;
                    // a tick pause is still an incremental frame, not a
                    // wholesale state replacement
                    inner.control = ControlFrame::Idle;
                    inner.matched = Some(BreakpointHit {
                        node,
                        event_index: i,
                    });
                    inner.last_break = Some(i);
                    return true;
                }
            }
        }
        if !inner.snapshot.apply(&event, t) {
            warn!("Event at index {} references an unknown node", i);
        }
        // a sample still interpolating past t gets re-applied by later
        // ticks until its end time passes
        if end.is_some_and(|end| end > t) {
            inner.pending_samples.push(i);
        }
        inner.buffer.push(event);
        inner.active_index = i;
        inner.queue_pos += 1;
    }
    false
}

/// Re-apply straddling samples at the new clock; drop the ones whose
/// interpolation has completed.
fn resolve_pending(inner: &mut PlayerInner, events: &[EncodedEvent], t: u32) {
    if inner.pending_samples.is_empty() {
        return;
    }
    let pending = std::mem::take(&mut inner.pending_samples);
    for i in pending {
        let entry = match events.get(i) {
            Some(entry) => entry,
            None => continue,
        };
        let event = match entry.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable pending sample at index {}: {}", i, e);
                continue;
            }
        };
        inner.snapshot.apply(&event, t);
        let still_open = entry
            .view()
            .ok()
            .and_then(|v| v.sample_end_time())
            .is_some_and(|end| end > t);
        if still_open {
            inner.pending_samples.push(i);
        }
    }
}

/// Time of the first queued patch at or before `t` that matches an
/// active breakpoint, honoring the re-trigger suppression.
fn next_break_time(inner: &PlayerInner, events: &[EncodedEvent], t: u32) -> Option<u32> {
    if inner.breakpoints.is_empty() {
        return None;
    }
    for (i, entry) in events.iter().enumerate().skip(inner.queue_pos) {
        let time = match entry.view() {
            Ok(view) => view.time(),
            Err(_) => continue,
        };
        if time > t {
            break;
        }
        if inner.last_break == Some(i) {
            continue;
        }
        if matching_breakpoint(entry, &inner.breakpoints).is_some() {
            return Some(time);
        }
    }
    None
}

/// The affected node of a Patch event matching one of `breakpoints`.
/// Non-patch events never match.
fn matching_breakpoint(entry: &EncodedEvent, breakpoints: &[NodeId]) -> Option<NodeId> {
    if breakpoints.is_empty() {
        return None;
    }
    let event = match entry.decode() {
        Ok(event) => event,
        Err(_) => return None,
    };
    match &event.payload {
        EventPayload::DomPatch(patch) => {
            let node = patch.affected_node();
            breakpoints.contains(&node).then_some(node)
        }
        _ => None,
    }
}
