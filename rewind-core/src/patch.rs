//! Incremental document mutations.
//!
//! A patch describes one mutation relative to the previously materialized
//! tree. Old values are retained on the wire so a patch can be applied in
//! reverse by tooling that walks the timeline backwards.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::CodecError;
use crate::node::{check_count16, check_str16, check_str8, NodeId, VTree};

/// Wire tags; numerically identical to the in-memory discriminants.
mod patch_tag {
    pub const ATTRIBUTE: u8 = 0;
    pub const TEXT: u8 = 1;
    pub const TEXT_PROPERTY: u8 = 2;
    pub const NUMBER_PROPERTY: u8 = 3;
    pub const BOOLEAN_PROPERTY: u8 = 4;
    pub const ADD_NODES: u8 = 5;
    pub const REMOVE_NODES: u8 = 6;
}

/// One incremental mutation of the virtual tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Attribute set (`value: Some`) or removed (`value: None`)
    Attribute {
        target: NodeId,
        name: String,
        value: Option<String>,
        old: Option<String>,
    },
    /// Text node content change
    Text {
        target: NodeId,
        value: String,
        old: Option<String>,
    },
    TextProperty {
        target: NodeId,
        name: String,
        value: String,
        old: Option<String>,
    },
    NumberProperty {
        target: NodeId,
        name: String,
        value: f64,
        old: Option<f64>,
    },
    BooleanProperty {
        target: NodeId,
        name: String,
        value: bool,
        old: Option<bool>,
    },
    /// Insert a subtree under `parent`, before the `before` sibling
    /// (appended when `before` is `None`)
    AddNodes {
        parent: NodeId,
        before: Option<NodeId>,
        subtree: VTree,
    },
    /// Remove child subtrees of `parent`
    RemoveNodes { parent: NodeId, ids: Vec<NodeId> },
}

impl Patch {
    /// The node a breakpoint on this patch resolves to: the target for
    /// value patches, the parent for node insertion/removal.
    pub fn affected_node(&self) -> NodeId {
        match self {
            Patch::Attribute { target, .. }
            | Patch::Text { target, .. }
            | Patch::TextProperty { target, .. }
            | Patch::NumberProperty { target, .. }
            | Patch::BooleanProperty { target, .. } => *target,
            Patch::AddNodes { parent, .. } | Patch::RemoveNodes { parent, .. } => *parent,
        }
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        match self {
            Patch::Attribute {
                target,
                name,
                value,
                old,
            } => {
                w.put_u8(patch_tag::ATTRIBUTE);
                target.encode(w);
                w.put_str8(name);
                w.put_opt(value.as_ref(), |w, v| w.put_str16(v));
                w.put_opt(old.as_ref(), |w, v| w.put_str16(v));
            }
            Patch::Text { target, value, old } => {
                w.put_u8(patch_tag::TEXT);
                target.encode(w);
                w.put_str32(value);
                w.put_opt(old.as_ref(), |w, v| w.put_str32(v));
            }
            Patch::TextProperty {
                target,
                name,
                value,
                old,
            } => {
                w.put_u8(patch_tag::TEXT_PROPERTY);
                target.encode(w);
                w.put_str8(name);
                w.put_str16(value);
                w.put_opt(old.as_ref(), |w, v| w.put_str16(v));
            }
            Patch::NumberProperty {
                target,
                name,
                value,
                old,
            } => {
                w.put_u8(patch_tag::NUMBER_PROPERTY);
                target.encode(w);
                w.put_str8(name);
                w.put_f64(*value);
                w.put_opt(old.as_ref(), |w, v| w.put_f64(*v));
            }
            Patch::BooleanProperty {
                target,
                name,
                value,
                old,
            } => {
                w.put_u8(patch_tag::BOOLEAN_PROPERTY);
                target.encode(w);
                w.put_str8(name);
                w.put_bool(*value);
                w.put_opt(old.as_ref(), |w, v| w.put_bool(*v));
            }
            Patch::AddNodes {
                parent,
                before,
                subtree,
            } => {
                w.put_u8(patch_tag::ADD_NODES);
                parent.encode(w);
                w.put_opt(before.as_ref(), |w, id| id.encode(w));
                subtree.encode(w);
            }
            Patch::RemoveNodes { parent, ids } => {
                w.put_u8(patch_tag::REMOVE_NODES);
                parent.encode(w);
                w.put_u16(ids.len() as u16);
                for id in ids {
                    id.encode(w);
                }
            }
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match r.get_u8()? {
            patch_tag::ATTRIBUTE => Ok(Patch::Attribute {
                target: NodeId::decode(r)?,
                name: r.get_str8()?,
                value: r.get_opt(|r| r.get_str16())?,
                old: r.get_opt(|r| r.get_str16())?,
            }),
            patch_tag::TEXT => Ok(Patch::Text {
                target: NodeId::decode(r)?,
                value: r.get_str32()?,
                old: r.get_opt(|r| r.get_str32())?,
            }),
            patch_tag::TEXT_PROPERTY => Ok(Patch::TextProperty {
                target: NodeId::decode(r)?,
                name: r.get_str8()?,
                value: r.get_str16()?,
                old: r.get_opt(|r| r.get_str16())?,
            }),
            patch_tag::NUMBER_PROPERTY => Ok(Patch::NumberProperty {
                target: NodeId::decode(r)?,
                name: r.get_str8()?,
                value: r.get_f64()?,
                old: r.get_opt(|r| r.get_f64())?,
            }),
            patch_tag::BOOLEAN_PROPERTY => Ok(Patch::BooleanProperty {
                target: NodeId::decode(r)?,
                name: r.get_str8()?,
                value: r.get_bool()?,
                old: r.get_opt(|r| r.get_bool())?,
            }),
            patch_tag::ADD_NODES => Ok(Patch::AddNodes {
                parent: NodeId::decode(r)?,
                before: r.get_opt(NodeId::decode)?,
                subtree: VTree::decode(r)?,
            }),
            patch_tag::REMOVE_NODES => {
                let parent = NodeId::decode(r)?;
                let count = r.get_u16()? as usize;
                let mut ids = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    ids.push(NodeId::decode(r)?);
                }
                Ok(Patch::RemoveNodes { parent, ids })
            }
            tag => Err(CodecError::UnknownTag { what: "patch", tag }),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CodecError> {
        match self {
            Patch::Attribute { name, value, old, .. } => {
                check_str8("attribute.name", name)?;
                if let Some(v) = value {
                    check_str16("attribute.value", v)?;
                }
                if let Some(v) = old {
                    check_str16("attribute.old", v)?;
                }
                Ok(())
            }
            Patch::Text { .. } => Ok(()),
            Patch::TextProperty { name, value, old, .. } => {
                check_str8("textProperty.name", name)?;
                check_str16("textProperty.value", value)?;
                if let Some(v) = old {
                    check_str16("textProperty.old", v)?;
                }
                Ok(())
            }
            Patch::NumberProperty { name, .. } | Patch::BooleanProperty { name, .. } => {
                check_str8("property.name", name)
            }
            Patch::AddNodes { subtree, .. } => subtree.validate(),
            Patch::RemoveNodes { ids, .. } => check_count16("removeNodes.ids", ids.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::VNode;
    use crate::testutil::nid;

    fn roundtrip(patch: &Patch) -> Patch {
        let mut w = ByteWriter::new();
        patch.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let decoded = Patch::decode(&mut r).unwrap();
        assert!(r.is_empty());
        decoded
    }

    #[test]
    fn test_attribute_roundtrip() {
        let patch = Patch::Attribute {
            target: nid("el-1"),
            name: "title".to_string(),
            value: Some("tooltip".to_string()),
            old: None,
        };
        assert_eq!(roundtrip(&patch), patch);
    }

    #[test]
    fn test_attribute_removal_roundtrip() {
        let patch = Patch::Attribute {
            target: nid("el-1"),
            name: "title".to_string(),
            value: None,
            old: Some("tooltip".to_string()),
        };
        assert_eq!(roundtrip(&patch), patch);
    }

    #[test]
    fn test_text_roundtrip() {
        let patch = Patch::Text {
            target: nid("txt-1"),
            value: "bar".to_string(),
            old: Some("foo".to_string()),
        };
        assert_eq!(roundtrip(&patch), patch);
    }

    #[test]
    fn test_property_roundtrips() {
        let patches = [
            Patch::TextProperty {
                target: nid("el-1"),
                name: "value".to_string(),
                value: "typed".to_string(),
                old: Some(String::new()),
            },
            Patch::NumberProperty {
                target: nid("el-1"),
                name: "scrollTop".to_string(),
                value: 33.25,
                old: Some(0.0),
            },
            Patch::BooleanProperty {
                target: nid("el-1"),
                name: "checked".to_string(),
                value: true,
                old: Some(false),
            },
        ];
        for patch in &patches {
            assert_eq!(&roundtrip(patch), patch);
        }
    }

    #[test]
    fn test_add_nodes_roundtrip() {
        let mut subtree = VTree::new(nid("el-9"));
        subtree.insert(VNode::Element {
            id: nid("el-9"),
            tag: "span".to_string(),
            attributes: Default::default(),
            properties: Default::default(),
            children: vec![],
        });
        let patch = Patch::AddNodes {
            parent: nid("el-1"),
            before: Some(nid("el-2")),
            subtree,
        };
        assert_eq!(roundtrip(&patch), patch);
    }

    #[test]
    fn test_remove_nodes_roundtrip() {
        let patch = Patch::RemoveNodes {
            parent: nid("el-1"),
            ids: vec![nid("el-2"), nid("el-3")],
        };
        assert_eq!(roundtrip(&patch), patch);
    }

    #[test]
    fn test_affected_node() {
        let patch = Patch::RemoveNodes {
            parent: nid("parent"),
            ids: vec![nid("child")],
        };
        assert_eq!(patch.affected_node(), nid("parent"));
    }

    #[test]
    fn test_unknown_tag() {
        let mut r = ByteReader::new(&[0x7F]);
        assert_eq!(
            Patch::decode(&mut r).unwrap_err(),
            CodecError::UnknownTag { what: "patch", tag: 0x7F }
        );
    }
}
