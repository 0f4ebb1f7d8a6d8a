//! Serde snapshot tree.
//!
//! The boundary format between the host page and the pipeline's document
//! model: the content-script glue serializes a subtree, the pipeline builds
//! it here, and `to_snapshot` round-trips for mirroring and tests.

use serde::{Deserialize, Serialize};

use crate::dom::mutation::WriteStamp;
use crate::dom::tree::{Document, NodeData, NodeId};

/// One node of a serialized subtree.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSnapshot {
    Element {
        tag: String,
        #[serde(default)]
        attributes: Vec<(String, String)>,
        #[serde(default)]
        children: Vec<NodeSnapshot>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

impl NodeSnapshot {
    pub fn element(tag: &str) -> Self {
        NodeSnapshot::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        NodeSnapshot::Text {
            text: text.to_string(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        if let NodeSnapshot::Element { attributes, .. } = &mut self {
            attributes.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub fn with_child(mut self, child: NodeSnapshot) -> Self {
        if let NodeSnapshot::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Element with a single text child; the common paragraph shape.
    pub fn paragraph(tag: &str, text: &str) -> Self {
        NodeSnapshot::element(tag).with_child(NodeSnapshot::text(text))
    }
}

impl Document {
    /// Build a fresh document from a snapshot. The load itself is silent:
    /// the initial eager pass walks the whole tree anyway, so journaling it
    /// would only hand the coordinator duplicate work.
    pub fn from_snapshot(snapshot: &NodeSnapshot) -> Result<(Document, NodeId), String> {
        let mut doc = Document::new();
        let root = doc.build_subtree(snapshot)?;
        doc.attach_silent(doc.root(), root)?;
        Ok((doc, root))
    }

    /// Build a snapshot subtree and attach it under `parent`, journaling a
    /// single record for the subtree root, the same granularity a
    /// childList observer reports for an inserted fragment.
    pub fn append_snapshot(
        &mut self,
        parent: NodeId,
        snapshot: &NodeSnapshot,
        stamp: WriteStamp,
    ) -> Result<NodeId, String> {
        let root = self.build_subtree(snapshot)?;
        self.append_child(parent, root, stamp)?;
        Ok(root)
    }

    fn build_subtree(&mut self, snapshot: &NodeSnapshot) -> Result<NodeId, String> {
        match snapshot {
            NodeSnapshot::Element {
                tag,
                attributes,
                children,
            } => {
                if tag.is_empty() {
                    return Err("snapshot: empty element tag".to_string());
                }
                let node = self.create_element(tag, attributes.clone());
                for child in children {
                    let built = self.build_subtree(child)?;
                    self.attach_silent(node, built)?;
                }
                Ok(node)
            }
            NodeSnapshot::Text { text } => Ok(self.create_text(text)),
            NodeSnapshot::Comment { text } => Ok(self.create_comment(text)),
        }
    }

    /// Serialize a subtree back out.
    pub fn to_snapshot(&self, id: NodeId) -> Option<NodeSnapshot> {
        match self.data(id)? {
            NodeData::Element { tag, attributes } => {
                let children = self
                    .children(id)
                    .iter()
                    .filter_map(|&c| self.to_snapshot(c))
                    .collect();
                Some(NodeSnapshot::Element {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                    children,
                })
            }
            NodeData::Text { text } => Some(NodeSnapshot::Text { text: text.clone() }),
            NodeData::Comment { text } => Some(NodeSnapshot::Comment { text: text.clone() }),
        }
    }
}
