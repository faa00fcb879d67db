//! Virtual node tree.
//!
//! One recording observes one live document. The document is modelled as a
//! flat map of typed nodes keyed by [`NodeId`]; children are referenced by
//! id, never by parent back-pointers, so a subtree encodes without cycles.

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::CodecError;

/// Fixed encoded length of a node id.
pub const NODE_ID_LEN: usize = 16;

/// Fixed-length node identifier, unique within one recording.
///
/// Ids are printable ASCII so they survive logging and JSON debugging
/// untouched; on the wire they are the raw 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Parse an id, enforcing the fixed length and ASCII alphabet.
    pub fn parse(value: &str) -> Result<Self, CodecError> {
        let bytes = value.as_bytes();
        if bytes.len() != NODE_ID_LEN {
            return Err(CodecError::field(
                "nodeId",
                format!("expected {} chars, got {}", NODE_ID_LEN, bytes.len()),
            ));
        }
        if !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(CodecError::field("nodeId", "non-printable character"));
        }
        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(NodeId(id))
    }

    pub fn as_str(&self) -> &str {
        // invariant: constructed from ASCII
        std::str::from_utf8(&self.0).unwrap_or("<invalid>")
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_bytes(&self.0);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let bytes = r.get_bytes(NODE_ID_LEN)?;
        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(NodeId(id))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.as_str())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A typed element property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Boolean(bool),
}

mod property_tag {
    pub const TEXT: u8 = 0;
    pub const NUMBER: u8 = 1;
    pub const BOOLEAN: u8 = 2;
}

impl PropertyValue {
    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        match self {
            PropertyValue::Text(s) => {
                w.put_u8(property_tag::TEXT);
                w.put_str16(s);
            }
            PropertyValue::Number(n) => {
                w.put_u8(property_tag::NUMBER);
                w.put_f64(*n);
            }
            PropertyValue::Boolean(b) => {
                w.put_u8(property_tag::BOOLEAN);
                w.put_bool(*b);
            }
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match r.get_u8()? {
            property_tag::TEXT => Ok(PropertyValue::Text(r.get_str16()?)),
            property_tag::NUMBER => Ok(PropertyValue::Number(r.get_f64()?)),
            property_tag::BOOLEAN => Ok(PropertyValue::Boolean(r.get_bool()?)),
            tag => Err(CodecError::UnknownTag {
                what: "property",
                tag,
            }),
        }
    }
}

/// One node of the virtual document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    DocType {
        id: NodeId,
        name: String,
        public_id: String,
        system_id: String,
    },
    Document {
        id: NodeId,
        children: Vec<NodeId>,
    },
    Element {
        id: NodeId,
        tag: String,
        attributes: BTreeMap<String, String>,
        properties: BTreeMap<String, PropertyValue>,
        children: Vec<NodeId>,
    },
    Text {
        id: NodeId,
        value: String,
    },
}

mod node_tag {
    pub const DOC_TYPE: u8 = 0;
    pub const DOCUMENT: u8 = 1;
    pub const ELEMENT: u8 = 2;
    pub const TEXT: u8 = 3;
}

impl VNode {
    pub fn id(&self) -> NodeId {
        match self {
            VNode::DocType { id, .. }
            | VNode::Document { id, .. }
            | VNode::Element { id, .. }
            | VNode::Text { id, .. } => *id,
        }
    }

    /// Child list, for node kinds that have one.
    pub fn children(&self) -> Option<&[NodeId]> {
        match self {
            VNode::Document { children, .. } | VNode::Element { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            VNode::Document { children, .. } | VNode::Element { children, .. } => Some(children),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        match self {
            VNode::DocType {
                id,
                name,
                public_id,
                system_id,
            } => {
                w.put_u8(node_tag::DOC_TYPE);
                id.encode(w);
                w.put_str8(name);
                w.put_str8(public_id);
                w.put_str8(system_id);
            }
            VNode::Document { id, children } => {
                w.put_u8(node_tag::DOCUMENT);
                id.encode(w);
                encode_id_list(w, children);
            }
            VNode::Element {
                id,
                tag,
                attributes,
                properties,
                children,
            } => {
                w.put_u8(node_tag::ELEMENT);
                id.encode(w);
                w.put_str8(tag);
                w.put_u16(attributes.len() as u16);
                for (name, value) in attributes {
                    w.put_str8(name);
                    w.put_str16(value);
                }
                w.put_u16(properties.len() as u16);
                for (name, value) in properties {
                    w.put_str8(name);
                    value.encode(w);
                }
                encode_id_list(w, children);
            }
            VNode::Text { id, value } => {
                w.put_u8(node_tag::TEXT);
                id.encode(w);
                w.put_str32(value);
            }
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        match r.get_u8()? {
            node_tag::DOC_TYPE => Ok(VNode::DocType {
                id: NodeId::decode(r)?,
                name: r.get_str8()?,
                public_id: r.get_str8()?,
                system_id: r.get_str8()?,
            }),
            node_tag::DOCUMENT => Ok(VNode::Document {
                id: NodeId::decode(r)?,
                children: decode_id_list(r)?,
            }),
            node_tag::ELEMENT => {
                let id = NodeId::decode(r)?;
                let tag = r.get_str8()?;
                let attr_count = r.get_u16()? as usize;
                let mut attributes = BTreeMap::new();
                for _ in 0..attr_count {
                    let name = r.get_str8()?;
                    let value = r.get_str16()?;
                    attributes.insert(name, value);
                }
                let prop_count = r.get_u16()? as usize;
                let mut properties = BTreeMap::new();
                for _ in 0..prop_count {
                    let name = r.get_str8()?;
                    let value = PropertyValue::decode(r)?;
                    properties.insert(name, value);
                }
                let children = decode_id_list(r)?;
                Ok(VNode::Element {
                    id,
                    tag,
                    attributes,
                    properties,
                    children,
                })
            }
            node_tag::TEXT => Ok(VNode::Text {
                id: NodeId::decode(r)?,
                value: r.get_str32()?,
            }),
            tag => Err(CodecError::UnknownTag { what: "node", tag }),
        }
    }

    /// Opt-in encode validation; checks the bounds the trusting fast path
    /// skips. Returns the offending field by name.
    pub(crate) fn validate(&self) -> Result<(), CodecError> {
        match self {
            VNode::DocType {
                name,
                public_id,
                system_id,
                ..
            } => {
                check_str8("docType.name", name)?;
                check_str8("docType.publicId", public_id)?;
                check_str8("docType.systemId", system_id)
            }
            VNode::Document { children, .. } => check_count16("document.children", children.len()),
            VNode::Element {
                tag,
                attributes,
                properties,
                children,
                ..
            } => {
                check_str8("element.tag", tag)?;
                check_count16("element.attributes", attributes.len())?;
                for (name, value) in attributes {
                    check_str8("element.attributes.name", name)?;
                    check_str16("element.attributes.value", value)?;
                }
                check_count16("element.properties", properties.len())?;
                for (name, value) in properties {
                    check_str8("element.properties.name", name)?;
                    if let PropertyValue::Text(s) = value {
                        check_str16("element.properties.value", s)?;
                    }
                }
                check_count16("element.children", children.len())
            }
            VNode::Text { .. } => Ok(()),
        }
    }
}

fn encode_id_list(w: &mut ByteWriter, ids: &[NodeId]) {
    w.put_u16(ids.len() as u16);
    for id in ids {
        id.encode(w);
    }
}

fn decode_id_list(r: &mut ByteReader<'_>) -> Result<Vec<NodeId>, CodecError> {
    let count = r.get_u16()? as usize;
    let mut ids = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        ids.push(NodeId::decode(r)?);
    }
    Ok(ids)
}

pub(crate) fn check_str8(field: &str, value: &str) -> Result<(), CodecError> {
    if value.len() > u8::MAX as usize {
        return Err(CodecError::field(
            field,
            format!("string of {} bytes exceeds 8-bit length prefix", value.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_str16(field: &str, value: &str) -> Result<(), CodecError> {
    if value.len() > u16::MAX as usize {
        return Err(CodecError::field(
            field,
            format!("string of {} bytes exceeds 16-bit length prefix", value.len()),
        ));
    }
    Ok(())
}

pub(crate) fn check_count16(field: &str, count: usize) -> Result<(), CodecError> {
    if count > u16::MAX as usize {
        return Err(CodecError::field(
            field,
            format!("{} entries exceed 16-bit count prefix", count),
        ));
    }
    Ok(())
}

/// One subtree snapshot: a root id plus a flat id-to-node map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VTree {
    pub root: Option<NodeId>,
    pub nodes: BTreeMap<NodeId, VNode>,
}

impl VTree {
    pub fn new(root: NodeId) -> Self {
        VTree {
            root: Some(root),
            nodes: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, node: VNode) {
        self.nodes.insert(node.id(), node);
    }

    pub fn get(&self, id: &NodeId) -> Option<&VNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut VNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove `id` and every node reachable from it through child lists.
    pub fn remove_subtree(&mut self, id: &NodeId) {
        let mut stack = vec![*id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                if let Some(children) = node.children() {
                    stack.extend_from_slice(children);
                }
            }
        }
        if self.root == Some(*id) {
            self.root = None;
        }
    }

    pub(crate) fn encode(&self, w: &mut ByteWriter) {
        w.put_opt(self.root.as_ref(), |w, id| id.encode(w));
        w.put_u32(self.nodes.len() as u32);
        for node in self.nodes.values() {
            node.encode(w);
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let root = r.get_opt(NodeId::decode)?;
        let count = r.get_u32()? as usize;
        let mut nodes = BTreeMap::new();
        for _ in 0..count {
            let node = VNode::decode(r)?;
            nodes.insert(node.id(), node);
        }
        Ok(VTree { root, nodes })
    }

    pub(crate) fn validate(&self) -> Result<(), CodecError> {
        if let Some(root) = &self.root {
            if !self.nodes.contains_key(root) {
                return Err(CodecError::field("tree.root", "root id not in node map"));
            }
        }
        for node in self.nodes.values() {
            node.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::nid;

    fn roundtrip(node: &VNode) -> VNode {
        let mut w = ByteWriter::new();
        node.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        let decoded = VNode::decode(&mut r).unwrap();
        assert!(r.is_empty());
        decoded
    }

    #[test]
    fn test_node_id_fixed_length() {
        assert!(NodeId::parse("too-short").is_err());
        assert!(NodeId::parse("exactly-16-chars").is_ok());
        let err = NodeId::parse("x").unwrap_err();
        assert!(matches!(err, CodecError::FieldViolation { .. }));
    }

    #[test]
    fn test_doctype_roundtrip() {
        let node = VNode::DocType {
            id: nid("doctype"),
            name: "html".to_string(),
            public_id: String::new(),
            system_id: String::new(),
        };
        assert_eq!(roundtrip(&node), node);
    }

    #[test]
    fn test_element_roundtrip() {
        let mut attributes = BTreeMap::new();
        attributes.insert("class".to_string(), "main dark".to_string());
        attributes.insert("id".to_string(), "app".to_string());
        let mut properties = BTreeMap::new();
        properties.insert("value".to_string(), PropertyValue::Text("abc".to_string()));
        properties.insert("scrollTop".to_string(), PropertyValue::Number(120.5));
        properties.insert("checked".to_string(), PropertyValue::Boolean(true));
        let node = VNode::Element {
            id: nid("el-1"),
            tag: "div".to_string(),
            attributes,
            properties,
            children: vec![nid("el-2"), nid("txt-1")],
        };
        assert_eq!(roundtrip(&node), node);
    }

    #[test]
    fn test_text_roundtrip() {
        let node = VNode::Text {
            id: nid("txt-1"),
            value: "hello world".to_string(),
        };
        assert_eq!(roundtrip(&node), node);
    }

    #[test]
    fn test_tree_roundtrip() {
        let mut tree = VTree::new(nid("root"));
        tree.insert(VNode::Document {
            id: nid("root"),
            children: vec![nid("el-1")],
        });
        tree.insert(VNode::Element {
            id: nid("el-1"),
            tag: "body".to_string(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            children: vec![],
        });

        let mut w = ByteWriter::new();
        tree.encode(&mut w);
        let bytes = w.into_bytes();
        let decoded = VTree::decode(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = VTree::new(nid("root"));
        tree.insert(VNode::Document {
            id: nid("root"),
            children: vec![nid("el-1")],
        });
        tree.insert(VNode::Element {
            id: nid("el-1"),
            tag: "div".to_string(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            children: vec![nid("txt-1")],
        });
        tree.insert(VNode::Text {
            id: nid("txt-1"),
            value: "x".to_string(),
        });

        tree.remove_subtree(&nid("el-1"));
        assert!(tree.get(&nid("el-1")).is_none());
        assert!(tree.get(&nid("txt-1")).is_none());
        assert!(tree.get(&nid("root")).is_some());
    }

    #[test]
    fn test_validate_rejects_long_tag() {
        let node = VNode::Element {
            id: nid("el-1"),
            tag: "x".repeat(300),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            children: vec![],
        };
        let err = node.validate().unwrap_err();
        match err {
            CodecError::FieldViolation { field, .. } => assert_eq!(field, "element.tag"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
