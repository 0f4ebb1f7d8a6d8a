//! TextEngine: applies the rule table to one text run.
//!
//! `process` is pure with respect to the rule set: same input and same
//! table always produce the same output. The fast paths in front of the
//! matcher (cheap rejection, memoized results) are optimizations only and
//! can never change the answer: the rejection automaton may over-admit
//! but never over-reject, and a cache miss falls back to full matching.
//!
//! Overlap precedence: candidates from all rules are merged into a single
//! left-to-right pass. The earliest-starting candidate wins; ties at the
//! same position go to the rule that appears first in the table. Replaced
//! output is never re-matched.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::rewrite::cache::{CachedRewrite, RewriteCache, DEFAULT_CACHE_CAPACITY};
use crate::rewrite::rules::{RuleConfig, RuleError, RuleSet};

/// A replacement expanding past this is treated as a pathological rule and
/// skipped for that input.
const MAX_EXPANSION_LEN: usize = 4096;

/// Result of one `process` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub text: String,
    pub changed: bool,
}

impl Rewritten {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            changed: false,
        }
    }
}

/// Engine counters, reported through the pipeline stats surface.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct EngineStats {
    pub processed: u64,
    pub prefilter_skips: u64,
    pub rule_errors: u64,
}

struct Candidate {
    start: usize,
    end: usize,
    priority: usize,
    output: String,
}

pub struct TextEngine {
    rules: RuleSet,
    cache: RewriteCache,
    stats: EngineStats,
}

impl TextEngine {
    /// Compile `configs` into the engine's rule set. Invalid rules are
    /// dropped and returned; the engine runs with the rest.
    pub fn new(configs: &[RuleConfig], cache_capacity: usize) -> (Self, Vec<RuleError>) {
        let (rules, errors) = RuleSet::build(configs, 1);
        (
            Self {
                rules,
                cache: RewriteCache::new(cache_capacity),
                stats: EngineStats::default(),
            },
            errors,
        )
    }

    pub fn with_defaults(configs: &[RuleConfig]) -> (Self, Vec<RuleError>) {
        Self::new(configs, DEFAULT_CACHE_CAPACITY)
    }

    /// Replace the rule table. Bumps the rule-set version, which retires
    /// every cached result from the previous table.
    pub fn hydrate(&mut self, configs: &[RuleConfig]) -> Vec<RuleError> {
        let next_version = self.rules.version() + 1;
        let (rules, errors) = RuleSet::build(configs, next_version);
        self.rules = rules;
        errors
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache.misses()
    }

    /// Apply the rule table to `text`.
    pub fn process(&mut self, text: &str) -> Rewritten {
        self.stats.processed += 1;

        if self.rules.may_match(text) == Some(false) {
            self.stats.prefilter_skips += 1;
            return Rewritten::unchanged(text);
        }

        let version = self.rules.version();
        if let Some(hit) = self.cache.get(version, text) {
            return Rewritten {
                text: hit.output,
                changed: hit.changed,
            };
        }

        let result = self.rewrite(text);
        self.cache.put(
            version,
            text,
            CachedRewrite {
                changed: result.changed,
                output: result.text.clone(),
            },
        );
        result
    }

    /// Full matching path: gather candidates from every rule, then resolve
    /// them in one pass over the input.
    fn rewrite(&mut self, text: &str) -> Rewritten {
        let mut candidates: Vec<Candidate> = Vec::new();

        let literals = self.rules.literal_matches(text);
        let bounds = if literals.iter().any(|m| m.whole_word) {
            Some(word_bounds(text))
        } else {
            None
        };
        for m in literals {
            if m.whole_word {
                let aligned = bounds
                    .as_ref()
                    .map(|b| is_aligned(b, m.start) && is_aligned(b, m.end))
                    .unwrap_or(false);
                if !aligned {
                    continue;
                }
            }
            candidates.push(Candidate {
                start: m.start,
                end: m.end,
                priority: m.priority,
                output: m.replacement,
            });
        }

        for rule in self.rules.regex_rules() {
            let mut rule_candidates = Vec::new();
            let mut pathological = false;
            for caps in rule.regex.captures_iter(text) {
                let whole = match caps.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                // Zero-width matches would loop in place; drop them.
                if whole.start() == whole.end() {
                    continue;
                }
                let mut output = String::new();
                caps.expand(&rule.replacement, &mut output);
                if output.len() > MAX_EXPANSION_LEN {
                    pathological = true;
                    break;
                }
                rule_candidates.push(Candidate {
                    start: whole.start(),
                    end: whole.end(),
                    priority: rule.priority,
                    output,
                });
            }
            if pathological {
                // This rule is skipped for this input; the rest still apply.
                self.stats.rule_errors += 1;
                continue;
            }
            candidates.extend(rule_candidates);
        }

        if candidates.is_empty() {
            return Rewritten::unchanged(text);
        }

        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.priority.cmp(&b.priority))
                .then(b.end.cmp(&a.end))
        });

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        let mut changed = false;
        for c in &candidates {
            if c.start < cursor {
                continue;
            }
            out.push_str(&text[cursor..c.start]);
            out.push_str(&c.output);
            cursor = c.end;
            changed = true;
        }
        out.push_str(&text[cursor..]);

        if !changed {
            return Rewritten::unchanged(text);
        }
        Rewritten { text: out, changed }
    }
}

/// Word-boundary offsets of `text` (UAX-29 segments), end offset included.
fn word_bounds(text: &str) -> Vec<usize> {
    let mut bounds: Vec<usize> = text.split_word_bound_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    bounds
}

fn is_aligned(bounds: &[usize], offset: usize) -> bool {
    bounds.binary_search(&offset).is_ok()
}
