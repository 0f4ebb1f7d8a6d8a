//! Arena-backed document tree.
//!
//! The pipeline's realization of the host document interface: element and
//! text nodes in a flat slot arena addressed by `NodeId`, with the read and
//! replace operations the rewrite pass needs and a mutation journal that
//! plays the role of the host's change-notification mechanism (see
//! `dom::mutation`).
//!
//! Slots are never reused. Detaching a subtree marks its root; connectivity
//! is answered by climbing the parent chain, so a stale `NodeId` held across
//! chunks resolves to "not connected" instead of aliasing a new node.

use serde::{Deserialize, Serialize};

use crate::dom::mutation::{MutationRecord, WriteStamp};

/// Stable handle to a node in one `Document` arena. Crosses the JS boundary
/// as a plain integer key.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node payload. Mirrors the host node kinds the pipeline can encounter.
#[derive(Debug, Clone)]
pub enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

#[derive(Debug)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Set on the root of a detached subtree.
    detached: bool,
}

/// A single document tree plus its mutation journal.
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    root: NodeId,
    journal: Vec<MutationRecord>,
}

impl Document {
    /// Create an empty document with a root container element.
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            root: NodeId(0),
            journal: Vec::new(),
        };
        let root = doc.alloc(NodeData::Element {
            tag: "#document".to_string(),
            attributes: Vec::new(),
        });
        doc.root = root;
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot {
            data,
            parent: None,
            children: Vec::new(),
            detached: false,
        });
        id
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.index())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.index())
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Allocate an element node. Unattached until appended.
    pub fn create_element(&mut self, tag: &str, attributes: Vec<(String, String)>) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_string(),
            attributes,
        })
    }

    /// Allocate a text node. Unattached until appended.
    ///
    /// This is the only way text enters the tree; there is no markup-parsing
    /// write path, so content set here can never become structure.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text {
            text: text.to_string(),
        })
    }

    /// Allocate a comment node. Unattached until appended.
    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment {
            text: text.to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.slot(id).map(|s| &s.data)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element { .. }))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Text { .. }))
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text { text }) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { attributes, .. }) => attributes
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    /// True while the node can be reached from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = id;
        loop {
            let slot = match self.slot(cursor) {
                Some(s) => s,
                None => return false,
            };
            if slot.detached {
                return false;
            }
            match slot.parent {
                Some(p) => cursor = p,
                None => return cursor == self.root,
            }
        }
    }

    /// Concatenated text of the subtree, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            match self.data(n) {
                Some(NodeData::Text { text }) => out.push_str(text),
                Some(NodeData::Element { .. }) => {
                    for &c in self.children(n).iter().rev() {
                        stack.push(c);
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// All nodes of the subtree in document order, root included.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if self.slot(n).is_none() {
                continue;
            }
            out.push(n);
            for &c in self.children(n).iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// First descendant element matching the predicate, in document order.
    pub fn find_element<F>(&self, from: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.subtree(from)
            .into_iter()
            .filter(|&n| self.is_element(n))
            .find(|&n| pred(self, n))
    }

    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), String> {
        match self.slot_mut(id).map(|s| &mut s.data) {
            Some(NodeData::Element { attributes, .. }) => {
                if let Some(entry) = attributes.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                    entry.1 = value.to_string();
                } else {
                    attributes.push((name.to_string(), value.to_string()));
                }
                Ok(())
            }
            _ => Err(format!("set_attribute: node {:?} is not an element", id)),
        }
    }

    /// Replace a text node's content. Text-only write path; never parsed.
    pub fn set_text(&mut self, id: NodeId, value: &str) -> Result<(), String> {
        match self.slot_mut(id).map(|s| &mut s.data) {
            Some(NodeData::Text { text }) => {
                *text = value.to_string();
                Ok(())
            }
            _ => Err(format!("set_text: node {:?} is not a text node", id)),
        }
    }

    /// Attach `child` as the last child of `parent` without journaling.
    ///
    /// Used while assembling subtrees that are not yet visible to the
    /// change feed (initial snapshot load, wrapper construction).
    pub fn attach_silent(&mut self, parent: NodeId, child: NodeId) -> Result<(), String> {
        if !self.is_element(parent) {
            return Err(format!("attach: parent {:?} is not an element", parent));
        }
        let child_slot = self
            .slot_mut(child)
            .ok_or_else(|| format!("attach: unknown child {:?}", child))?;
        if child_slot.parent.is_some() {
            return Err(format!("attach: child {:?} already has a parent", child));
        }
        child_slot.parent = Some(parent);
        child_slot.detached = false;
        match self.slot_mut(parent) {
            Some(slot) => slot.children.push(child),
            None => return Err(format!("attach: unknown parent {:?}", parent)),
        }
        Ok(())
    }

    /// Attach `child` under `parent` and journal the addition.
    pub fn append_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        stamp: WriteStamp,
    ) -> Result<(), String> {
        self.attach_silent(parent, child)?;
        self.journal.push(MutationRecord {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
            stamp,
        });
        Ok(())
    }

    /// Swap `old` for `new` at the same position under `old`'s parent and
    /// journal the replacement. `old` becomes the root of a detached subtree.
    pub fn replace_child(
        &mut self,
        old: NodeId,
        new: NodeId,
        stamp: WriteStamp,
    ) -> Result<(), String> {
        let parent = self
            .parent(old)
            .ok_or_else(|| format!("replace: node {:?} has no parent", old))?;
        if self
            .slot(new)
            .ok_or_else(|| format!("replace: unknown node {:?}", new))?
            .parent
            .is_some()
        {
            return Err(format!("replace: node {:?} already has a parent", new));
        }

        let position = self
            .children(parent)
            .iter()
            .position(|&c| c == old)
            .ok_or_else(|| format!("replace: node {:?} not under its parent", old))?;

        match self.slot_mut(parent) {
            Some(slot) => slot.children[position] = new,
            None => return Err(format!("replace: unknown parent {:?}", parent)),
        }
        if let Some(new_slot) = self.slot_mut(new) {
            new_slot.parent = Some(parent);
            new_slot.detached = false;
        }
        if let Some(old_slot) = self.slot_mut(old) {
            old_slot.parent = None;
            old_slot.detached = true;
        }

        self.journal.push(MutationRecord {
            target: parent,
            added: vec![new],
            removed: vec![old],
            stamp,
        });
        Ok(())
    }

    /// Detach a subtree and journal the removal.
    pub fn remove_child(&mut self, node: NodeId, stamp: WriteStamp) -> Result<(), String> {
        let parent = self
            .parent(node)
            .ok_or_else(|| format!("remove: node {:?} has no parent", node))?;
        let position = self
            .children(parent)
            .iter()
            .position(|&c| c == node)
            .ok_or_else(|| format!("remove: node {:?} not under its parent", node))?;
        match self.slot_mut(parent) {
            Some(slot) => {
                slot.children.remove(position);
            }
            None => return Err(format!("remove: unknown parent {:?}", parent)),
        }
        if let Some(slot) = self.slot_mut(node) {
            slot.parent = None;
            slot.detached = true;
        }
        self.journal.push(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![node],
            stamp,
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Change feed
    // -------------------------------------------------------------------------

    /// Drain the mutation journal, oldest first. The coordinator calls this
    /// once per pump turn; records do not accumulate past a drain.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.journal)
    }

    pub fn pending_records(&self) -> usize {
        self.journal.len()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> WriteStamp {
        WriteStamp::HOST
    }

    #[test]
    fn test_append_and_read() {
        let mut doc = Document::new();
        let p = doc.create_element("p", vec![]);
        let t = doc.create_text("hello");
        doc.append_child(doc.root(), p, stamp()).unwrap();
        doc.append_child(p, t, stamp()).unwrap();

        assert_eq!(doc.tag(p), Some("p"));
        assert_eq!(doc.text(t), Some("hello"));
        assert_eq!(doc.children(p), &[t]);
        assert_eq!(doc.parent(t), Some(p));
        assert_eq!(doc.text_content(doc.root()), "hello");
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut doc = Document::new();
        let p = doc.create_element("p", vec![]);
        doc.append_child(doc.root(), p, stamp()).unwrap();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        for t in [a, b, c] {
            doc.append_child(p, t, stamp()).unwrap();
        }

        let span = doc.create_element("span", vec![]);
        doc.replace_child(b, span, stamp()).unwrap();

        assert_eq!(doc.children(p), &[a, span, c]);
        assert!(!doc.is_connected(b));
        assert!(doc.is_connected(span));
    }

    #[test]
    fn test_detached_subtree_is_not_connected() {
        let mut doc = Document::new();
        let outer = doc.create_element("div", vec![]);
        let inner = doc.create_element("p", vec![]);
        let t = doc.create_text("x");
        doc.append_child(doc.root(), outer, stamp()).unwrap();
        doc.append_child(outer, inner, stamp()).unwrap();
        doc.append_child(inner, t, stamp()).unwrap();

        doc.remove_child(outer, stamp()).unwrap();

        // Removal marks the root; descendants resolve through the chain.
        assert!(!doc.is_connected(outer));
        assert!(!doc.is_connected(inner));
        assert!(!doc.is_connected(t));
    }

    #[test]
    fn test_journal_drains_in_order() {
        let mut doc = Document::new();
        let a = doc.create_element("p", vec![]);
        let b = doc.create_element("p", vec![]);
        doc.append_child(doc.root(), a, stamp()).unwrap();
        doc.append_child(doc.root(), b, stamp()).unwrap();

        let records = doc.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].added, vec![a]);
        assert_eq!(records[1].added, vec![b]);
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn test_attach_silent_does_not_journal() {
        let mut doc = Document::new();
        let p = doc.create_element("p", vec![]);
        doc.attach_silent(doc.root(), p).unwrap();
        assert_eq!(doc.pending_records(), 0);
        assert!(doc.is_connected(p));
    }

    #[test]
    fn test_attribute_set_and_overwrite() {
        let mut doc = Document::new();
        let e = doc.create_element("span", vec![("class".into(), "a".into())]);
        doc.set_attribute(e, "class", "b").unwrap();
        doc.set_attribute(e, "tabindex", "0").unwrap();
        assert_eq!(doc.attribute(e, "class"), Some("b"));
        assert_eq!(doc.attribute(e, "TABINDEX"), Some("0"));
    }

    #[test]
    fn test_set_text_rejects_elements() {
        let mut doc = Document::new();
        let e = doc.create_element("span", vec![]);
        assert!(doc.set_text(e, "nope").is_err());
    }
}
