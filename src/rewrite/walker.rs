//! PageWalker: chunked, resumable depth-first conversion pass.
//!
//! The traversal cursor is an explicit stack, not the call stack, so a pass
//! can stop at any chunk boundary and resume on the next pump, or be
//! abandoned outright, without leaving the document half-written. Every
//! structural write a pass performs carries that pass's `WriteStamp`; the
//! change coordinator uses the stamp to discard the walker's own output
//! from the mutation feed.
//!
//! Replacement is atomic per node: the wrapper subtree is assembled off to
//! the side and swapped in with a single `replace_child`, so an abandoned
//! pass leaves each node either untouched or fully converted.

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId, WriteStamp};
use crate::rewrite::classify::{
    classify, NodeClass, ORIGINAL_ATTR, PROCESSED_ATTR, TIP_CLASS, WRAPPER_CLASS,
};
use crate::rewrite::engine::TextEngine;

pub const DEFAULT_CHUNK_SIZE: usize = 48;

/// One wrapper insertion, in host-mirror form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RewritePatch {
    /// The text node that was replaced.
    pub replaced: NodeId,
    /// The wrapper element now in its place.
    pub wrapper: NodeId,
    pub converted: String,
    pub original: String,
    /// `id` of the tooltip companion, target of `aria-describedby`.
    pub tip_id: String,
}

/// Counters for the walking phase.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WalkerStats {
    pub visited: u64,
    pub wrapped: u64,
    pub detached_skips: u64,
    pub traversal_errors: u64,
    pub passes: u64,
}

/// Result of one pump turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkReport {
    pub visited: usize,
    pub wrapped: usize,
    pub remaining: usize,
}

pub struct PageWalker {
    stack: Vec<NodeId>,
    chunk_size: usize,
    /// Pass generation; doubles as the write stamp (never `HOST`).
    pass: u32,
    tip_seq: u32,
    patches: Vec<RewritePatch>,
    stats: WalkerStats,
}

impl PageWalker {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            stack: Vec::new(),
            chunk_size: chunk_size.max(1),
            pass: 0,
            tip_seq: 0,
            patches: Vec::new(),
            stats: WalkerStats::default(),
        }
    }

    /// Stamp applied to this pass's writes.
    pub fn stamp(&self) -> WriteStamp {
        WriteStamp(self.pass)
    }

    /// Queue a subtree root. Starting from an empty queue opens a new pass
    /// (fresh generation stamp).
    pub fn enqueue(&mut self, root: NodeId) {
        if self.stack.is_empty() {
            self.pass = self.pass.wrapping_add(1).max(1);
            self.stats.passes += 1;
        }
        self.stack.push(root);
    }

    pub fn pending(&self) -> usize {
        self.stack.len()
    }

    /// Abandon the current pass. Already-converted nodes stay converted;
    /// everything still queued stays untouched.
    pub fn cancel(&mut self) {
        self.stack.clear();
    }

    pub fn stats(&self) -> &WalkerStats {
        &self.stats
    }

    /// Hand the accumulated wrapper patches to the host mirror.
    pub fn drain_patches(&mut self) -> Vec<RewritePatch> {
        std::mem::take(&mut self.patches)
    }

    /// Process up to one chunk of nodes, then yield.
    pub fn pump(&mut self, doc: &mut Document, engine: &mut TextEngine) -> ChunkReport {
        let mut visited = 0usize;
        let mut wrapped = 0usize;

        while visited < self.chunk_size {
            let node = match self.stack.pop() {
                Some(n) => n,
                None => break,
            };
            // Detached between chunks (or delivered twice and already
            // replaced): skip, the pass continues.
            if !doc.is_connected(node) {
                self.stats.detached_skips += 1;
                continue;
            }
            visited += 1;

            match classify(doc, node) {
                NodeClass::Container => {
                    if doc.set_attribute(node, PROCESSED_ATTR, "1").is_err() {
                        self.stats.traversal_errors += 1;
                        continue;
                    }
                    let children = doc.children(node).to_vec();
                    for child in children.into_iter().rev() {
                        self.stack.push(child);
                    }
                }
                NodeClass::Text => {
                    let original = match doc.text(node) {
                        Some(t) => t.to_string(),
                        None => {
                            self.stats.traversal_errors += 1;
                            continue;
                        }
                    };
                    let result = engine.process(&original);
                    if result.changed {
                        match self.wrap(doc, node, &original, &result.text) {
                            Ok(_) => wrapped += 1,
                            Err(_) => self.stats.traversal_errors += 1,
                        }
                    }
                }
                NodeClass::Wrapper | NodeClass::Skipped(_) | NodeClass::Inert => {}
            }
        }

        self.stats.visited += visited as u64;
        self.stats.wrapped += wrapped as u64;
        ChunkReport {
            visited,
            wrapped,
            remaining: self.stack.len(),
        }
    }

    /// Build a conversion wrapper and swap it in for `text_node`.
    ///
    /// The wrapper holds the converted text visibly, the original verbatim
    /// in an attribute and in the tooltip companion (both written through
    /// text-only paths), a focus stop, and the accessibility linkage.
    fn wrap(
        &mut self,
        doc: &mut Document,
        text_node: NodeId,
        original: &str,
        converted: &str,
    ) -> Result<NodeId, String> {
        self.tip_seq += 1;
        let tip_id = format!("rl-tip-{}", self.tip_seq);

        let wrapper = doc.create_element(
            "span",
            vec![
                ("class".to_string(), WRAPPER_CLASS.to_string()),
                (PROCESSED_ATTR.to_string(), "1".to_string()),
                (ORIGINAL_ATTR.to_string(), original.to_string()),
                ("tabindex".to_string(), "0".to_string()),
                ("aria-describedby".to_string(), tip_id.clone()),
            ],
        );
        let visible = doc.create_text(converted);
        doc.attach_silent(wrapper, visible)?;

        let tip = doc.create_element(
            "span",
            vec![
                ("id".to_string(), tip_id.clone()),
                ("class".to_string(), TIP_CLASS.to_string()),
                ("role".to_string(), "tooltip".to_string()),
                ("aria-hidden".to_string(), "true".to_string()),
            ],
        );
        let tip_text = doc.create_text(original);
        doc.attach_silent(tip, tip_text)?;
        doc.attach_silent(wrapper, tip)?;

        doc.replace_child(text_node, wrapper, self.stamp())?;

        self.patches.push(RewritePatch {
            replaced: text_node,
            wrapper,
            converted: converted.to_string(),
            original: original.to_string(),
            tip_id,
        });
        Ok(wrapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeSnapshot;
    use crate::rewrite::rules::{RuleConfig, RuleKind};

    fn rules() -> Vec<RuleConfig> {
        vec![RuleConfig {
            pattern: "Trump".to_string(),
            replacement: "The Orange One".to_string(),
            kind: RuleKind::Literal,
            whole_word: true,
            case_sensitive: true,
            trigger: None,
        }]
    }

    fn engine() -> TextEngine {
        let (engine, errors) = TextEngine::with_defaults(&rules());
        assert!(errors.is_empty());
        engine
    }

    fn run_to_completion(
        walker: &mut PageWalker,
        doc: &mut Document,
        engine: &mut TextEngine,
    ) -> usize {
        let mut chunks = 0;
        while walker.pending() > 0 {
            walker.pump(doc, engine);
            chunks += 1;
            assert!(chunks < 10_000, "walker failed to terminate");
        }
        chunks
    }

    #[test]
    fn test_conversion_wrapper_shape() {
        // Scenario A: <p>Trump said it.</p>
        let (mut doc, root) =
            Document::from_snapshot(&NodeSnapshot::paragraph("p", "Trump said it.")).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        let wrapper = doc
            .find_element(root, |d, n| d.has_attribute(n, ORIGINAL_ATTR))
            .expect("wrapper inserted");
        assert_eq!(doc.tag(wrapper), Some("span"));
        assert_eq!(doc.attribute(wrapper, ORIGINAL_ATTR), Some("Trump said it."));
        assert_eq!(doc.attribute(wrapper, "tabindex"), Some("0"));
        assert!(doc.has_attribute(wrapper, PROCESSED_ATTR));

        // Visible content carries the converted text; the companion (also
        // in the subtree) holds the original.
        assert_eq!(
            doc.text_content(root),
            "The Orange One said it.Trump said it."
        );
        let tip = doc
            .find_element(wrapper, |d, n| {
                d.attribute(n, "role") == Some("tooltip")
            })
            .expect("tooltip companion");
        assert_eq!(
            doc.attribute(wrapper, "aria-describedby"),
            doc.attribute(tip, "id")
        );
        assert_eq!(doc.attribute(tip, "aria-hidden"), Some("true"));
    }

    #[test]
    fn test_unmatched_text_left_alone() {
        let (mut doc, root) =
            Document::from_snapshot(&NodeSnapshot::paragraph("p", "Nothing notable.")).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        assert_eq!(walker.stats().wrapped, 0);
        assert_eq!(doc.text_content(root), "Nothing notable.");
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let (mut doc, root) =
            Document::from_snapshot(&NodeSnapshot::paragraph("p", "Trump said it.")).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);
        let after_first = doc.text_content(root);
        let wrapped_first = walker.stats().wrapped;

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        assert_eq!(walker.stats().wrapped, wrapped_first, "no new wrappers");
        assert_eq!(doc.text_content(root), after_first);
    }

    #[test]
    fn test_wrapper_content_never_rescanned() {
        // A wrapper whose converted text itself contains a matchable word
        // must not be wrapped again.
        let (mut doc, root) = Document::from_snapshot(&NodeSnapshot::paragraph(
            "p",
            "Trump endorsed Trump.",
        ))
        .unwrap();
        let mut engine = {
            let (e, _) = TextEngine::with_defaults(&[RuleConfig {
                pattern: "Trump".to_string(),
                replacement: "Trump the Orange".to_string(),
                kind: RuleKind::Literal,
                whole_word: true,
                case_sensitive: true,
                trigger: None,
            }]);
            e
        };
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        // Overlapping delivery hands the walker the wrapper itself and its
        // visible text child; neither may be wrapped again.
        let wrapper = doc
            .find_element(root, |d, n| d.has_attribute(n, ORIGINAL_ATTR))
            .unwrap();
        let visible_text = doc.children(wrapper)[0];
        walker.enqueue(wrapper);
        walker.enqueue(visible_text);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        let wrappers: Vec<NodeId> = doc
            .subtree(root)
            .into_iter()
            .filter(|&n| doc.has_attribute(n, ORIGINAL_ATTR))
            .collect();
        assert_eq!(wrappers.len(), 1, "no nested wrappers");
    }

    #[test]
    fn test_skipped_subtrees_not_descended() {
        let snap = NodeSnapshot::element("div")
            .with_child(NodeSnapshot::paragraph("script", "Trump variable"))
            .with_child(
                NodeSnapshot::element("div")
                    .with_attribute("contenteditable", "true")
                    .with_child(NodeSnapshot::text("Trump draft")),
            )
            .with_child(NodeSnapshot::paragraph("textarea", "Trump input"))
            .with_child(NodeSnapshot::paragraph("p", "Trump spoke"));
        let (mut doc, root) = Document::from_snapshot(&snap).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        assert_eq!(walker.stats().wrapped, 1, "only the paragraph converts");
        // Untouched regions keep their text verbatim.
        assert!(doc.text_content(root).contains("Trump variable"));
        assert!(doc.text_content(root).contains("Trump draft"));
        assert!(doc.text_content(root).contains("Trump input"));
    }

    #[test]
    fn test_chunk_budget_bounds_every_slice() {
        // Scenario C, scaled for unit-test time: many eligible nodes, no
        // single pump visits more than the budget.
        let mut body = NodeSnapshot::element("body");
        for i in 0..500 {
            body = body.with_child(NodeSnapshot::paragraph("p", &format!("Trump item {i}")));
        }
        let (mut doc, root) = Document::from_snapshot(&body).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(16);

        walker.enqueue(root);
        let mut chunks = 0;
        while walker.pending() > 0 {
            let report = walker.pump(&mut doc, &mut engine);
            assert!(report.visited <= 16, "slice exceeded budget");
            chunks += 1;
        }
        assert!(chunks >= 500 * 2 / 16, "work actually spread across chunks");
        assert_eq!(walker.stats().wrapped, 500);
    }

    #[test]
    fn test_abandoned_pass_leaves_consistent_document() {
        let mut body = NodeSnapshot::element("body");
        for i in 0..50 {
            body = body.with_child(NodeSnapshot::paragraph("p", &format!("Trump item {i}")));
        }
        let (mut doc, root) = Document::from_snapshot(&body).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(8);

        walker.enqueue(root);
        walker.pump(&mut doc, &mut engine);
        walker.pump(&mut doc, &mut engine);
        walker.cancel();
        assert_eq!(walker.pending(), 0);

        // Every paragraph is either untouched or fully wrapped.
        for &p in doc.children(root) {
            let text = doc.text_content(p);
            let has_wrapper = doc
                .find_element(p, |d, n| d.has_attribute(n, ORIGINAL_ATTR))
                .is_some();
            if has_wrapper {
                assert!(text.contains("The Orange One"));
            } else {
                assert!(text.contains("Trump"));
                assert!(!text.contains("The Orange One"));
            }
        }
    }

    #[test]
    fn test_detached_node_skipped_silently() {
        let snap = NodeSnapshot::element("body")
            .with_child(NodeSnapshot::paragraph("p", "Trump one"))
            .with_child(NodeSnapshot::paragraph("p", "Trump two"));
        let (mut doc, root) = Document::from_snapshot(&snap).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(1);

        walker.enqueue(root);
        walker.pump(&mut doc, &mut engine); // visits root, queues both <p>

        // Host removes the second paragraph mid-pass.
        let second = doc.children(root)[1];
        doc.remove_child(second, WriteStamp::HOST).unwrap();

        run_to_completion(&mut walker, &mut doc, &mut engine);
        assert_eq!(walker.stats().wrapped, 1);
        assert!(walker.stats().detached_skips >= 1);
    }

    #[test]
    fn test_writes_carry_self_stamp() {
        let (mut doc, root) =
            Document::from_snapshot(&NodeSnapshot::paragraph("p", "Trump said it.")).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        let records = doc.take_records();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.stamp.is_self()));
    }

    #[test]
    fn test_patches_describe_replacements() {
        let (mut doc, root) =
            Document::from_snapshot(&NodeSnapshot::paragraph("p", "Trump said it.")).unwrap();
        let mut engine = engine();
        let mut walker = PageWalker::new(DEFAULT_CHUNK_SIZE);

        walker.enqueue(root);
        run_to_completion(&mut walker, &mut doc, &mut engine);

        let patches = walker.drain_patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].converted, "The Orange One said it.");
        assert_eq!(patches[0].original, "Trump said it.");
        assert!(walker.drain_patches().is_empty(), "drain empties the queue");
    }
}
