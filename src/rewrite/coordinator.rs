//! ChangeCoordinator: reconciles the mutation feed with the walker.
//!
//! Consumes drained mutation records, throws away the ones stamped by the
//! walker itself (the reentrancy guard; without it every replacement
//! would be observed and reprocessed forever), and coalesces the genuine
//! additions into a batch. The batch flushes after a quiet period
//! (debounce) or once the oldest entry has waited long enough (max wait),
//! so bursty feeds settle and steady trickles still make progress.
//!
//! State machine: Idle -> Collecting on the first retained record;
//! Collecting -> Idle on flush (the flush itself is synchronous, with
//! no suspension inside it). Teardown clears everything; no deadline
//! survives it.
//!
//! Deadlines are caller-supplied millisecond timestamps, not internal
//! timers: the pipeline's pump turn asks `due(now)` and flushes. That keeps
//! the component single-threaded, deterministic, and clock-free in tests.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dom::{MutationRecord, NodeId};

fn default_debounce_ms() -> f64 {
    250.0
}

fn default_max_wait_ms() -> f64 {
    1000.0
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct CoordinatorOptions {
    /// Quiet period after the last retained record before a flush.
    #[serde(default = "default_debounce_ms", rename = "debounceMs")]
    pub debounce_ms: f64,
    /// Upper bound on how long the oldest batched node may wait.
    #[serde(default = "default_max_wait_ms", rename = "maxWaitMs")]
    pub max_wait_ms: f64,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CoordinatorStats {
    pub records_seen: u64,
    pub records_self_filtered: u64,
    pub nodes_batched: u64,
    pub flushes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Collecting { first_at: f64, last_at: f64 },
}

pub struct ChangeCoordinator {
    options: CoordinatorOptions,
    phase: Phase,
    batch: Vec<NodeId>,
    seen: HashSet<NodeId>,
    stats: CoordinatorStats,
    torn_down: bool,
}

impl ChangeCoordinator {
    pub fn new(options: CoordinatorOptions) -> Self {
        Self {
            options,
            phase: Phase::Idle,
            batch: Vec::new(),
            seen: HashSet::new(),
            stats: CoordinatorStats::default(),
            torn_down: false,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Idle => "idle",
            Phase::Collecting { .. } => "collecting",
        }
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.phase, Phase::Collecting { .. })
    }

    /// Feed one drain of the mutation journal into the batch.
    pub fn ingest(&mut self, records: &[MutationRecord], now: f64) {
        if self.torn_down {
            return;
        }
        let mut retained_any = false;
        for record in records {
            self.stats.records_seen += 1;
            if record.stamp.is_self() {
                self.stats.records_self_filtered += 1;
                continue;
            }
            for &node in &record.added {
                // Deduplicated by node identity; a node delivered twice in
                // one window costs one batch slot.
                if self.seen.insert(node) {
                    self.batch.push(node);
                    self.stats.nodes_batched += 1;
                    retained_any = true;
                }
            }
        }
        if retained_any {
            self.phase = match self.phase {
                Phase::Idle => Phase::Collecting {
                    first_at: now,
                    last_at: now,
                },
                Phase::Collecting { first_at, .. } => Phase::Collecting {
                    first_at,
                    last_at: now,
                },
            };
        }
    }

    /// True when the coalescing window has closed.
    pub fn due(&self, now: f64) -> bool {
        match self.phase {
            Phase::Idle => false,
            Phase::Collecting { first_at, last_at } => {
                now - last_at >= self.options.debounce_ms
                    || now - first_at >= self.options.max_wait_ms
            }
        }
    }

    /// Drain the batch and return to Idle. The caller hands the roots to
    /// the walker; the flush itself performs no document work.
    pub fn flush(&mut self) -> Vec<NodeId> {
        if self.batch.is_empty() {
            self.phase = Phase::Idle;
            return Vec::new();
        }
        self.stats.flushes += 1;
        self.phase = Phase::Idle;
        self.seen.clear();
        std::mem::take(&mut self.batch)
    }

    /// Cancel the subscription: drop pending work and refuse new records.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.phase = Phase::Idle;
        self.batch.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::WriteStamp;

    fn host_record(nodes: &[u32]) -> MutationRecord {
        MutationRecord {
            target: NodeId(0),
            added: nodes.iter().map(|&n| NodeId(n)).collect(),
            removed: Vec::new(),
            stamp: WriteStamp::HOST,
        }
    }

    fn self_record(nodes: &[u32]) -> MutationRecord {
        MutationRecord {
            target: NodeId(0),
            added: nodes.iter().map(|&n| NodeId(n)).collect(),
            removed: Vec::new(),
            stamp: WriteStamp(3),
        }
    }

    fn coordinator() -> ChangeCoordinator {
        ChangeCoordinator::new(CoordinatorOptions::default())
    }

    #[test]
    fn test_idle_until_first_record() {
        let c = coordinator();
        assert_eq!(c.state_name(), "idle");
        assert!(!c.due(10_000.0));
    }

    #[test]
    fn test_self_writes_are_discarded() {
        let mut c = coordinator();
        c.ingest(&[self_record(&[1]), self_record(&[2, 3])], 0.0);

        assert_eq!(c.state_name(), "idle", "self noise opens no window");
        assert_eq!(c.batch_len(), 0);
        assert_eq!(c.stats().records_self_filtered, 2);
    }

    #[test]
    fn test_debounce_window() {
        let mut c = coordinator();
        c.ingest(&[host_record(&[1])], 0.0);
        assert_eq!(c.state_name(), "collecting");
        assert!(!c.due(100.0), "still inside the quiet period");
        assert!(c.due(250.0));
    }

    #[test]
    fn test_burst_extends_quiet_period() {
        let mut c = coordinator();
        c.ingest(&[host_record(&[1])], 0.0);
        c.ingest(&[host_record(&[2])], 200.0);
        assert!(!c.due(300.0), "second record reset the quiet period");
        assert!(c.due(450.0));
    }

    #[test]
    fn test_max_wait_caps_a_steady_trickle() {
        let mut c = coordinator();
        let mut now = 0.0;
        // A record every 100 ms keeps resetting the debounce forever.
        while now < 1000.0 {
            c.ingest(&[host_record(&[now as u32 + 1])], now);
            now += 100.0;
        }
        assert!(c.due(1000.0), "max wait forces the flush");
    }

    #[test]
    fn test_flush_dedupes_and_returns_to_idle() {
        let mut c = coordinator();
        c.ingest(&[host_record(&[1, 2]), host_record(&[2, 1, 3])], 0.0);

        let batch = c.flush();
        assert_eq!(batch, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(c.state_name(), "idle");
        assert!(c.flush().is_empty());
    }

    #[test]
    fn test_mixed_records_keep_only_host_nodes() {
        let mut c = coordinator();
        c.ingest(&[self_record(&[10]), host_record(&[20]), self_record(&[30])], 0.0);
        assert_eq!(c.flush(), vec![NodeId(20)]);
    }

    #[test]
    fn test_batch_memory_is_bounded_by_identity() {
        let mut c = coordinator();
        // The same node delivered many times over a long burst occupies a
        // single slot.
        for i in 0..1000 {
            c.ingest(&[host_record(&[7])], i as f64);
        }
        assert_eq!(c.batch_len(), 1);
    }

    #[test]
    fn test_teardown_drops_pending_and_refuses_more() {
        let mut c = coordinator();
        c.ingest(&[host_record(&[1])], 0.0);
        c.teardown();

        assert_eq!(c.batch_len(), 0);
        assert!(!c.due(10_000.0));

        c.ingest(&[host_record(&[2])], 10_001.0);
        assert_eq!(c.batch_len(), 0, "no records accepted after teardown");
    }
}
