//! Node classifier.
//!
//! Resolves a node into a small tagged variant once; the walker consumes
//! the variant instead of re-probing node shape at every decision point.
//! Classification is deliberately conservative: only unambiguously plain,
//! visible, non-editable text is eligible, and anything uncertain is
//! skipped. All checks read the node's own tag and attributes: O(1), no
//! ancestor walks, since exclusion of a region happens by refusing
//! descent at the region's root.

use crate::dom::{Document, NodeData, NodeId};

/// Idempotence marker written on every element the walker has handled.
pub const PROCESSED_ATTR: &str = "data-rl-processed";
/// Wrapper attribute holding the original text verbatim (plain data).
pub const ORIGINAL_ATTR: &str = "data-rl-original";
/// Class applied to conversion wrappers (styling hook for the host).
pub const WRAPPER_CLASS: &str = "rl-swap";
/// Class applied to the tooltip companion element.
pub const TIP_CLASS: &str = "rl-tip";

/// Elements whose subtrees never contain renderable prose.
const NON_RENDERED_TAGS: [&str; 11] = [
    "script", "style", "noscript", "template", "iframe", "canvas", "svg", "head", "title", "meta",
    "link",
];

/// Form controls; their text is interactive state, not prose.
const FORM_CONTROL_TAGS: [&str; 6] = ["input", "textarea", "select", "option", "button", "label"];

/// Why an element's subtree is excluded from processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    FormControl,
    Editable,
    NonRendered,
    AlreadyProcessed,
}

/// Category of a node, resolved once per visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeClass {
    /// Text node with processable content.
    Text,
    /// Element safe to descend into.
    Container,
    /// A conversion wrapper; its content is never re-scanned.
    Wrapper,
    /// Element whose whole subtree is excluded.
    Skipped(SkipReason),
    /// Whitespace-only text, comments, unknown slots.
    Inert,
}

pub fn classify(doc: &Document, node: NodeId) -> NodeClass {
    match doc.data(node) {
        Some(NodeData::Text { text }) => {
            if text.chars().all(char::is_whitespace) {
                return NodeClass::Inert;
            }
            // A wrapper's own text children are terminal even when a change
            // record delivers them directly (duplicate/overlapping delivery).
            if let Some(parent) = doc.parent(node) {
                if doc.has_attribute(parent, ORIGINAL_ATTR) {
                    return NodeClass::Inert;
                }
            }
            NodeClass::Text
        }
        Some(NodeData::Element { tag, .. }) => classify_element(doc, node, tag),
        Some(NodeData::Comment { .. }) | None => NodeClass::Inert,
    }
}

fn classify_element(doc: &Document, node: NodeId, tag: &str) -> NodeClass {
    if doc.has_attribute(node, ORIGINAL_ATTR) {
        return NodeClass::Wrapper;
    }
    if doc.has_attribute(node, PROCESSED_ATTR) {
        return NodeClass::Skipped(SkipReason::AlreadyProcessed);
    }
    if is_editable(doc, node) {
        return NodeClass::Skipped(SkipReason::Editable);
    }
    if FORM_CONTROL_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
        return NodeClass::Skipped(SkipReason::FormControl);
    }
    if NON_RENDERED_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
        return NodeClass::Skipped(SkipReason::NonRendered);
    }
    NodeClass::Container
}

/// Root of an editable region: `contenteditable` present and not "false".
fn is_editable(doc: &Document, node: NodeId) -> bool {
    match doc.attribute(node, "contenteditable") {
        Some(value) => !value.eq_ignore_ascii_case("false"),
        None => false,
    }
}

/// True when the walker may descend below this class.
pub fn descends(class: NodeClass) -> bool {
    matches!(class, NodeClass::Container)
}
