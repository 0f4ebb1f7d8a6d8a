//! Relabel: live document text rewriter.
//!
//! A Rust/WASM implementation of the Relabel content pipeline: scan a live
//! document tree for spans matching an ordered rule table, swap them for
//! replacement text while keeping the original recoverable and accessible,
//! and keep the transformation correct as the page mutates underneath.
//!
//! # Architecture
//!
//! ## Rewrite pipeline (`rewrite/`)
//! - `rules.rs` - RuleSet: ordered match/replace table, compiled once
//! - `engine.rs` - TextEngine: Aho-Corasick prefilter, cached rewriting
//! - `cache.rs` - RewriteCache: bounded LRU, rule-set versioned
//! - `classify.rs` - NodeClass: eligibility resolved once per node
//! - `walker.rs` - PageWalker: chunked, resumable conversion pass
//! - `coordinator.rs` - ChangeCoordinator: mutation feed, self-write filter
//! - `pipeline.rs` - RewritePipeline: the owning per-page context
//!
//! ## Document model (`dom/`)
//! - `tree.rs` - arena document, the host-tree interface realized in-crate
//! - `snapshot.rs` - serde subtree format crossing the JS boundary
//! - `mutation.rs` - stamped change records (reentrancy guard)
//!
//! ## Tooltip (`tooltip/`)
//! - `capabilities.rs` - environment differences resolved once
//! - `mod.rs` - hover/focus state machine revealing stored originals
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { RewritePipeline, TooltipController } from 'relabel-core';
//!
//! await init();
//! const pipeline = new RewritePipeline({ rules: RULE_TABLE });
//! pipeline.loadSnapshot(captureSubtree(document.body));
//!
//! const drive = () => {
//!   const report = pipeline.pump();
//!   applyPatches(pipeline.drainPatches());
//!   if (report.more) requestIdleCallback(drive);
//! };
//! drive();
//!
//! const tips = new TooltipController(null);
//! delegate(document.body, tips.enterEventName(), e =>
//!   run(tips.onEvent({ kind: 'enter', anchor: keyOf(e.target) })));
//! ```

pub mod dom;
pub mod rewrite;
pub mod tooltip;

pub use dom::{Document, MutationRecord, NodeData, NodeId, NodeSnapshot, WriteStamp};
pub use rewrite::{
    ChangeCoordinator, NodeClass, PipelineConfig, PipelineOptions, PipelineStats, PumpReport,
    RewritePipeline, RuleConfig, RuleKind, RuleSet, TextEngine,
};
pub use tooltip::{Capabilities, TooltipController};

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("relabel-core v{}", env!("CARGO_PKG_VERSION"))
}
