//! The apply-event-to-snapshot reducer.
//!
//! One reducer serves both sides of the system: the recorder folds evicted
//! events into its leading snapshot with it, and the playback engine
//! materializes seek targets with it. Keeping them on the same code path is
//! what makes eviction lossless for timeline-observable state.

use std::collections::BTreeMap;

use crate::event::{
    EventPayload, Interaction, InteractionSnapshot, PointerButtons, Snapshot, SourceEvent,
};
use crate::node::{NodeId, VNode, VTree};
use crate::patch::Patch;
use crate::sample::Point;

/// Mutable interaction state accumulated from interaction events.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InteractionState {
    pub pointer: Point,
    pub pointer_state: PointerButtons,
    /// Latest scroll offset per node; later events supersede earlier ones
    /// under the same key
    pub scroll: BTreeMap<NodeId, Point>,
    pub viewport: Point,
    pub page_url: String,
}

/// Materialized recorded state at one instant of the timeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotState {
    pub dom: Option<VTree>,
    pub interaction: InteractionState,
}

impl SnapshotState {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut state = SnapshotState {
            dom: snapshot.dom.clone(),
            interaction: InteractionState::default(),
        };
        if let Some(i) = &snapshot.interaction {
            state.interaction = InteractionState {
                pointer: i.pointer,
                pointer_state: i.pointer_state,
                scroll: i.scroll.clone(),
                viewport: i.viewport,
                page_url: i.page_url.clone(),
            };
        }
        state
    }

    /// Synthesize a Snapshot event payload from this state. Used to rebuild
    /// the leading snapshot after eviction.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            dom: self.dom.clone(),
            interaction: Some(InteractionSnapshot {
                pointer: self.interaction.pointer,
                pointer_state: self.interaction.pointer_state,
                scroll: self.interaction.scroll.clone(),
                viewport: self.interaction.viewport,
                page_url: self.interaction.page_url.clone(),
            }),
        }
    }

    /// Apply one event at interpolation clock `clock` (normally the seek
    /// target or the playback elapsed time).
    ///
    /// Returns `false` when the event referenced a node this state does not
    /// contain and was skipped; the caller decides whether that is worth a
    /// log line. Network and console events carry no snapshot-observable
    /// state and apply trivially.
    pub fn apply(&mut self, event: &SourceEvent, clock: u32) -> bool {
        match &event.payload {
            EventPayload::Snapshot(snapshot) => {
                *self = SnapshotState::from_snapshot(snapshot);
                true
            }
            EventPayload::DomPatch(patch) => self.apply_patch(patch),
            EventPayload::Interaction(interaction) => {
                self.apply_interaction(event.time, interaction, clock)
            }
            EventPayload::Network(_) | EventPayload::Console(_) | EventPayload::CloseRecording => {
                true
            }
        }
    }

    fn apply_patch(&mut self, patch: &Patch) -> bool {
        let tree = match self.dom.as_mut() {
            Some(tree) => tree,
            None => return false,
        };
        match patch {
            Patch::Attribute {
                target,
                name,
                value,
                ..
            } => match tree.get_mut(target) {
                Some(VNode::Element { attributes, .. }) => {
                    match value {
                        Some(v) => attributes.insert(name.clone(), v.clone()),
                        None => attributes.remove(name),
                    };
                    true
                }
                _ => false,
            },
            Patch::Text { target, value, .. } => match tree.get_mut(target) {
                Some(VNode::Text { value: current, .. }) => {
                    *current = value.clone();
                    true
                }
                _ => false,
            },
            Patch::TextProperty {
                target,
                name,
                value,
                ..
            } => set_property(
                tree,
                target,
                name,
                crate::node::PropertyValue::Text(value.clone()),
            ),
            Patch::NumberProperty {
                target,
                name,
                value,
                ..
            } => set_property(
                tree,
                target,
                name,
                crate::node::PropertyValue::Number(*value),
            ),
            Patch::BooleanProperty {
                target,
                name,
                value,
                ..
            } => set_property(
                tree,
                target,
                name,
                crate::node::PropertyValue::Boolean(*value),
            ),
            Patch::AddNodes {
                parent,
                before,
                subtree,
            } => {
                let root = match subtree.root {
                    Some(root) => root,
                    None => return false,
                };
                // attach first so a bad parent leaves the tree untouched
                match tree.get_mut(parent).and_then(VNode::children_mut) {
                    Some(children) => {
                        let at = before
                            .and_then(|b| children.iter().position(|c| *c == b))
                            .unwrap_or(children.len());
                        children.insert(at, root);
                    }
                    None => return false,
                }
                for node in subtree.nodes.values() {
                    tree.insert(node.clone());
                }
                true
            }
            Patch::RemoveNodes { parent, ids } => {
                match tree.get_mut(parent).and_then(VNode::children_mut) {
                    Some(children) => children.retain(|c| !ids.contains(c)),
                    None => return false,
                }
                for id in ids {
                    tree.remove_subtree(id);
                }
                true
            }
        }
    }

    fn apply_interaction(&mut self, time: u32, interaction: &Interaction, clock: u32) -> bool {
        let state = &mut self.interaction;
        match interaction {
            Interaction::ViewportResize(sample) => {
                state.viewport = sample.at(time, clock);
            }
            Interaction::Scroll { target, offset } => {
                state.scroll.insert(*target, offset.at(time, clock));
            }
            Interaction::PointerMove(sample) => {
                state.pointer = sample.at(time, clock);
            }
            Interaction::PointerDown { position, button } => {
                state.pointer = *position;
                state.pointer_state |= *button;
            }
            Interaction::PointerUp { position, button } => {
                state.pointer = *position;
                state.pointer_state &= !*button;
            }
            // keys leave no state behind in a snapshot
            Interaction::KeyDown { .. } | Interaction::KeyUp { .. } => {}
        }
        true
    }
}

fn set_property(
    tree: &mut VTree,
    target: &NodeId,
    name: &str,
    value: crate::node::PropertyValue,
) -> bool {
    match tree.get_mut(target) {
        Some(VNode::Element { properties, .. }) => {
            properties.insert(name.to_string(), value);
            true
        }
        _ => false,
    }
}
