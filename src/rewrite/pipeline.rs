//! RewritePipeline: the single owning context for one page.
//!
//! Owns the document model, the text engine (and its cache), the walker,
//! and the change coordinator. No module-level state anywhere, so a
//! pipeline can be constructed, driven, and torn down in isolation.
//!
//! Control flow per pump turn (one cooperative slice):
//! 1. advance the walker by at most one chunk,
//! 2. drain the mutation journal into the coordinator,
//! 3. flush the batch into the walker queue if the window closed.
//!
//! The host glue calls `pump` from its scheduler (idle callback / timeout)
//! until `more` goes false, and again whenever the page mutates.
//!
//! # Usage (JavaScript)
//! ```javascript,ignore
//! import init, { RewritePipeline } from 'relabel-core';
//!
//! await init();
//! const pipeline = new RewritePipeline({ rules: RULE_TABLE });
//! pipeline.loadSnapshot(captureSubtree(document.body));
//! while (pipeline.pump().more) await idle();
//! applyPatches(pipeline.drainPatches());
//! ```

use instant::Instant;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::dom::{Document, NodeId, NodeSnapshot, WriteStamp};
use crate::rewrite::coordinator::{ChangeCoordinator, CoordinatorOptions};
use crate::rewrite::engine::TextEngine;
use crate::rewrite::rules::RuleConfig;
use crate::rewrite::walker::{PageWalker, RewritePatch, DEFAULT_CHUNK_SIZE};

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_cache_capacity() -> usize {
    crate::rewrite::cache::DEFAULT_CACHE_CAPACITY
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct PipelineOptions {
    /// Nodes visited per synchronous slice.
    #[serde(default = "default_chunk_size", rename = "chunkSize")]
    pub chunk_size: usize,
    #[serde(default = "default_cache_capacity", rename = "cacheCapacity")]
    pub cache_capacity: usize,
    #[serde(flatten)]
    pub coordinator: CoordinatorOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            cache_capacity: default_cache_capacity(),
            coordinator: CoordinatorOptions::default(),
        }
    }
}

/// Full construction payload: the rule table plus optional tuning.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineConfig {
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub options: PipelineOptions,
}

/// Non-fatal error surfaced through the stats channel.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineError {
    pub phase: String,
    pub message: String,
}

/// Aggregate counters across all components.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PipelineStats {
    pub nodes_visited: u64,
    pub wrappers_inserted: u64,
    pub passes: u64,
    pub detached_skips: u64,
    pub texts_processed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub prefilter_skips: u64,
    /// False when some rule disabled the cheap-rejection fast path.
    pub prefilter_complete: bool,
    pub rule_errors: u64,
    pub records_seen: u64,
    pub records_self_filtered: u64,
    pub nodes_batched: u64,
    pub flushes: u64,
    pub last_pump_us: u64,
}

/// Result of one pump turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default)]
pub struct PumpReport {
    pub visited: usize,
    pub wrapped: usize,
    /// Subtree roots promoted from the change batch this turn.
    pub flushed: usize,
    /// True while queued walker work or an open coalescing window remains.
    pub more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Constructed, no document yet.
    Unloaded,
    /// Document loaded; pumping converts it.
    Active,
    /// Navigation/unload: all continuations cancelled.
    TornDown,
}

#[wasm_bindgen]
pub struct RewritePipeline {
    doc: Option<Document>,
    engine: TextEngine,
    walker: PageWalker,
    coordinator: ChangeCoordinator,
    errors: Vec<PipelineError>,
    lifecycle: Lifecycle,
    last_pump_us: u64,
}

impl RewritePipeline {
    /// Build a pipeline from a rule table. Rules that fail to compile are
    /// recorded and skipped; the pipeline runs with the rest.
    pub fn new(rules: &[RuleConfig], options: PipelineOptions) -> Self {
        let (engine, rule_errors) = TextEngine::new(rules, options.cache_capacity);
        let errors = rule_errors
            .into_iter()
            .map(|e| PipelineError {
                phase: "rules".to_string(),
                message: format!("rule {}: {}", e.rule_index, e.message),
            })
            .collect();
        Self {
            doc: None,
            engine,
            walker: PageWalker::new(options.chunk_size),
            coordinator: ChangeCoordinator::new(options.coordinator),
            errors,
            lifecycle: Lifecycle::Unloaded,
            last_pump_us: 0,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self.lifecycle {
            Lifecycle::Unloaded => "unloaded",
            Lifecycle::Active => "active",
            Lifecycle::TornDown => "torn-down",
        }
    }

    /// Load the initial document and queue the eager full pass.
    pub fn load_snapshot(&mut self, snapshot: &NodeSnapshot) -> Result<NodeId, String> {
        if self.lifecycle == Lifecycle::TornDown {
            return Err("pipeline is torn down".to_string());
        }
        let (doc, root) = Document::from_snapshot(snapshot)?;
        self.doc = Some(doc);
        self.walker.cancel();
        self.walker.enqueue(root);
        self.lifecycle = Lifecycle::Active;
        Ok(root)
    }

    /// Host-side write: attach new content the way the page would, visible
    /// to the change feed with the `HOST` stamp.
    pub fn append_snapshot(
        &mut self,
        parent: NodeId,
        snapshot: &NodeSnapshot,
    ) -> Result<NodeId, String> {
        if self.lifecycle != Lifecycle::Active {
            return Err(format!("pipeline is {}", self.state_name()));
        }
        let doc = self
            .doc
            .as_mut()
            .ok_or_else(|| "no document loaded".to_string())?;
        doc.append_snapshot(parent, snapshot, WriteStamp::HOST)
    }

    /// One cooperative slice. `now` is a millisecond timestamp; the facade
    /// passes `Date.now()`, tests pass synthetic clocks.
    pub fn pump(&mut self, now: f64) -> PumpReport {
        if self.lifecycle != Lifecycle::Active {
            return PumpReport::default();
        }
        let doc = match self.doc.as_mut() {
            Some(d) => d,
            None => return PumpReport::default(),
        };
        let started = Instant::now();

        let chunk = self.walker.pump(doc, &mut self.engine);

        let records = doc.take_records();
        self.coordinator.ingest(&records, now);

        let mut flushed = 0usize;
        if self.coordinator.due(now) {
            for root in self.coordinator.flush() {
                self.walker.enqueue(root);
                flushed += 1;
            }
        }

        self.last_pump_us = started.elapsed().as_micros() as u64;
        PumpReport {
            visited: chunk.visited,
            wrapped: chunk.wrapped,
            flushed,
            more: self.walker.pending() > 0 || self.coordinator.is_collecting(),
        }
    }

    /// Queue another full pass from the document root. Processing marks
    /// make this cheap on an already-converted document; it exists for
    /// embedders that bypass the change feed.
    pub fn rescan(&mut self) -> Result<(), String> {
        if self.lifecycle != Lifecycle::Active {
            return Err(format!("pipeline is {}", self.state_name()));
        }
        let root = self
            .doc
            .as_ref()
            .ok_or_else(|| "no document loaded".to_string())?
            .root();
        self.walker.enqueue(root);
        Ok(())
    }

    /// Replace the rule table. Retires every cached result; applies to
    /// content processed from here on (existing conversions stand).
    pub fn hydrate_rules(&mut self, rules: &[RuleConfig]) {
        for e in self.engine.hydrate(rules) {
            self.errors.push(PipelineError {
                phase: "rules".to_string(),
                message: format!("rule {}: {}", e.rule_index, e.message),
            });
        }
    }

    /// Wrapper insertions accumulated since the last drain.
    pub fn drain_patches(&mut self) -> Vec<RewritePatch> {
        self.walker.drain_patches()
    }

    /// Synchronously cancel all scheduled work. Safe to call twice.
    pub fn teardown(&mut self) {
        self.walker.cancel();
        self.coordinator.teardown();
        self.lifecycle = Lifecycle::TornDown;
    }

    pub fn errors(&self) -> &[PipelineError] {
        &self.errors
    }

    pub fn stats(&self) -> PipelineStats {
        let walker = self.walker.stats();
        let engine = self.engine.stats();
        let coordinator = self.coordinator.stats();
        PipelineStats {
            nodes_visited: walker.visited,
            wrappers_inserted: walker.wrapped,
            passes: walker.passes,
            detached_skips: walker.detached_skips,
            texts_processed: engine.processed,
            cache_hits: self.engine.cache_hits(),
            cache_misses: self.engine.cache_misses(),
            prefilter_skips: engine.prefilter_skips,
            prefilter_complete: self.engine.rules().prefilter_complete(),
            rule_errors: engine.rule_errors,
            records_seen: coordinator.records_seen,
            records_self_filtered: coordinator.records_self_filtered,
            nodes_batched: coordinator.nodes_batched,
            flushes: coordinator.flushes,
            last_pump_us: self.last_pump_us,
        }
    }

    /// The in-model document. Present after `load_snapshot`.
    pub fn document(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    /// Mutable access for host-style edits beyond appends (tests, advanced
    /// embedders).
    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.doc.as_mut()
    }
}

// =============================================================================
// WASM Bindings
// =============================================================================

#[wasm_bindgen]
impl RewritePipeline {
    /// Create a pipeline from `{ rules, options? }` (JS binding).
    #[wasm_bindgen(constructor)]
    pub fn js_new(config: JsValue) -> Result<RewritePipeline, JsValue> {
        let config: PipelineConfig = serde_wasm_bindgen::from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;
        Ok(Self::new(&config.rules, config.options))
    }

    /// Load the initial subtree snapshot; returns the root key (JS binding).
    #[wasm_bindgen(js_name = loadSnapshot)]
    pub fn js_load_snapshot(&mut self, snapshot: JsValue) -> Result<u32, JsValue> {
        let snapshot: NodeSnapshot = serde_wasm_bindgen::from_value(snapshot)
            .map_err(|e| JsValue::from_str(&format!("Invalid snapshot: {}", e)))?;
        self.load_snapshot(&snapshot)
            .map(|id| id.0)
            .map_err(|e| JsValue::from_str(&e))
    }

    /// Feed an observed insertion under `parent` (JS binding). Malformed
    /// records are logged and dropped; the subscription survives.
    #[wasm_bindgen(js_name = observeInsertion)]
    pub fn js_observe_insertion(&mut self, parent: u32, snapshot: JsValue) -> Option<u32> {
        let snapshot: NodeSnapshot = match serde_wasm_bindgen::from_value(snapshot) {
            Ok(s) => s,
            Err(e) => {
                web_sys::console::error_1(
                    &format!("[RewritePipeline] Dropping malformed record: {}", e).into(),
                );
                return None;
            }
        };
        match self.append_snapshot(NodeId(parent), &snapshot) {
            Ok(id) => Some(id.0),
            Err(e) => {
                web_sys::console::error_1(
                    &format!("[RewritePipeline] Dropping record: {}", e).into(),
                );
                None
            }
        }
    }

    /// One cooperative slice, clocked by `Date.now()` (JS binding).
    #[wasm_bindgen(js_name = pump)]
    pub fn js_pump(&mut self) -> JsValue {
        let report = self.pump(js_sys::Date::now());
        serde_wasm_bindgen::to_value(&report).unwrap_or(JsValue::NULL)
    }

    /// Accumulated wrapper patches for the host mirror (JS binding).
    #[wasm_bindgen(js_name = drainPatches)]
    pub fn js_drain_patches(&mut self) -> JsValue {
        let patches = self.drain_patches();
        serde_wasm_bindgen::to_value(&patches).unwrap_or(JsValue::NULL)
    }

    /// Replace the rule table (JS binding).
    #[wasm_bindgen(js_name = hydrateRules)]
    pub fn js_hydrate_rules(&mut self, rules: JsValue) -> Result<(), JsValue> {
        let rules: Vec<RuleConfig> = serde_wasm_bindgen::from_value(rules)
            .map_err(|e| JsValue::from_str(&format!("Invalid rules: {}", e)))?;
        self.hydrate_rules(&rules);
        Ok(())
    }

    /// Queue another full pass from the root (JS binding).
    #[wasm_bindgen(js_name = rescan)]
    pub fn js_rescan(&mut self) -> Result<(), JsValue> {
        self.rescan().map_err(|e| JsValue::from_str(&e))
    }

    /// Aggregate counters (JS binding).
    #[wasm_bindgen(js_name = stats)]
    pub fn js_stats(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.stats()).unwrap_or(JsValue::NULL)
    }

    /// Recorded non-fatal errors (JS binding).
    #[wasm_bindgen(js_name = errors)]
    pub fn js_errors(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.errors).unwrap_or(JsValue::NULL)
    }

    /// Current lifecycle state (JS binding).
    #[wasm_bindgen(js_name = stateName)]
    pub fn js_state_name(&self) -> String {
        self.state_name().to_string()
    }

    /// Cancel everything on navigation/unload (JS binding).
    #[wasm_bindgen(js_name = teardown)]
    pub fn js_teardown(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::rules::RuleKind;

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

    #[test]
    fn test_lifecycle_progression() {
        let mut pipeline = RewritePipeline::new(&rules(), PipelineOptions::default());
        assert_eq!(pipeline.state_name(), "unloaded");

        pipeline
            .load_snapshot(&NodeSnapshot::paragraph("p", "x"))
            .unwrap();
        assert_eq!(pipeline.state_name(), "active");

        pipeline.teardown();
        assert_eq!(pipeline.state_name(), "torn-down");
        assert!(pipeline
            .load_snapshot(&NodeSnapshot::paragraph("p", "x"))
            .is_err());
    }

    #[test]
    fn test_pump_before_load_is_inert() {
        let mut pipeline = RewritePipeline::new(&rules(), PipelineOptions::default());
        let report = pipeline.pump(0.0);
        assert_eq!(report.visited, 0);
        assert!(!report.more);
    }

    #[test]
    fn test_bad_rule_recorded_pipeline_still_runs() {
        let mut table = rules();
        table.push(RuleConfig {
            pattern: "(".to_string(),
            replacement: "x".to_string(),
            kind: RuleKind::Regex,
            whole_word: true,
            case_sensitive: true,
            trigger: None,
        });
        let mut pipeline = RewritePipeline::new(&table, PipelineOptions::default());
        assert_eq!(pipeline.errors().len(), 1);
        assert_eq!(pipeline.errors()[0].phase, "rules");

        let root = pipeline
            .load_snapshot(&NodeSnapshot::paragraph("p", "Trump spoke"))
            .unwrap();
        while pipeline.pump(0.0).more {}
        let doc = pipeline.document().unwrap();
        assert!(doc.text_content(root).contains("The Orange One"));
    }

    #[test]
    fn test_teardown_cancels_mid_pass() {
        let mut body = NodeSnapshot::element("body");
        for i in 0..100 {
            body = body.with_child(NodeSnapshot::paragraph("p", &format!("Trump {i}")));
        }
        let mut pipeline = RewritePipeline::new(
            &rules(),
            PipelineOptions {
                chunk_size: 4,
                ..Default::default()
            },
        );
        pipeline.load_snapshot(&body).unwrap();
        pipeline.pump(0.0);
        pipeline.teardown();

        // No continuation survives teardown.
        let report = pipeline.pump(10_000.0);
        assert_eq!(report.visited, 0);
        assert!(!report.more);
    }

    #[test]
    fn test_stats_surface_populated() {
        let mut pipeline = RewritePipeline::new(&rules(), PipelineOptions::default());
        pipeline
            .load_snapshot(&NodeSnapshot::paragraph("p", "Trump spoke"))
            .unwrap();
        while pipeline.pump(0.0).more {}

        let stats = pipeline.stats();
        assert!(stats.nodes_visited > 0);
        assert_eq!(stats.wrappers_inserted, 1);
        assert!(stats.texts_processed > 0);
        assert!(stats.records_self_filtered > 0, "walker write was filtered");
    }
}
