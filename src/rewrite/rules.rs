//! Rule table: ordered match/replace pairs compiled into a `RuleSet`.
//!
//! Rules arrive as JSON (the extension's static table), get compiled once,
//! and are immutable afterwards. List order is significant: it is the
//! tie-break priority the engine applies when two rules claim the same span.
//!
//! Literal rules share one Aho-Corasick automaton (overlapping iteration,
//! hybrid ASCII case-insensitivity; non-ASCII cases fall through to
//! exact matching). A second automaton holds the cheap-rejection tokens:
//! every literal pattern plus each regex rule's declared trigger. A regex
//! rule without a trigger marks the prefilter incomplete and the engine
//! skips the early exit for correctness.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// How a rule's pattern is interpreted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    #[default]
    Literal,
    Regex,
}

/// One rule as supplied by the host configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RuleConfig {
    /// Pattern text: a literal phrase or a regex, per `kind`.
    #[serde(rename = "match")]
    pub pattern: String,
    /// Replacement text. Regex rules may reference capture groups (`$1`).
    #[serde(rename = "replace")]
    pub replacement: String,
    #[serde(default)]
    pub kind: RuleKind,
    /// Literal rules only: require word boundaries around the match.
    #[serde(default = "default_true", rename = "wholeWord")]
    pub whole_word: bool,
    #[serde(default = "default_true", rename = "caseSensitive")]
    pub case_sensitive: bool,
    /// Regex rules only: a literal token that must appear in any text the
    /// pattern could match. Feeds the cheap-rejection automaton.
    #[serde(default)]
    pub trigger: Option<String>,
}

/// A rule that failed to compile. The rest of the table still applies.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RuleError {
    pub rule_index: usize,
    pub message: String,
}

#[derive(Debug)]
struct LiteralMeta {
    priority: usize,
    whole_word: bool,
    /// Present for case-sensitive rules: the match slice must equal this.
    exact: Option<String>,
    replacement: String,
}

#[derive(Debug)]
pub struct RegexRule {
    pub priority: usize,
    pub regex: regex::Regex,
    pub replacement: String,
}

/// A raw literal candidate: case-verified, boundary check still pending.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralMatch {
    pub priority: usize,
    pub start: usize,
    pub end: usize,
    pub whole_word: bool,
    pub replacement: String,
}

/// The immutable, ordered, compiled rule table.
pub struct RuleSet {
    literal_ac: Option<AhoCorasick>,
    literal_meta: Vec<LiteralMeta>,
    regex_rules: Vec<RegexRule>,
    prefilter: Option<AhoCorasick>,
    /// False when some rule could not contribute a prefilter token; the
    /// engine must then always run the full path.
    prefilter_complete: bool,
    /// Bumped on every build; part of the cache contract.
    version: u64,
    rule_count: usize,
}

impl RuleSet {
    /// Empty set; matches nothing. `version` starts at 0 so the first real
    /// hydration invalidates any cache built against it.
    pub fn empty() -> Self {
        Self {
            literal_ac: None,
            literal_meta: Vec::new(),
            regex_rules: Vec::new(),
            prefilter: None,
            prefilter_complete: true,
            version: 0,
            rule_count: 0,
        }
    }

    /// Compile a configuration table. Invalid rules are dropped and
    /// reported; compilation of the rest proceeds.
    pub fn build(configs: &[RuleConfig], version: u64) -> (Self, Vec<RuleError>) {
        let mut literal_patterns: Vec<String> = Vec::new();
        let mut literal_meta: Vec<LiteralMeta> = Vec::new();
        let mut regex_rules: Vec<RegexRule> = Vec::new();
        let mut errors = Vec::new();
        let mut prefilter_tokens: Vec<String> = Vec::new();
        let mut prefilter_complete = true;

        for (index, config) in configs.iter().enumerate() {
            if config.pattern.is_empty() {
                errors.push(RuleError {
                    rule_index: index,
                    message: "empty pattern".to_string(),
                });
                continue;
            }
            match config.kind {
                RuleKind::Literal => {
                    literal_patterns.push(config.pattern.clone());
                    literal_meta.push(LiteralMeta {
                        priority: index,
                        whole_word: config.whole_word,
                        exact: config.case_sensitive.then(|| config.pattern.clone()),
                        replacement: config.replacement.clone(),
                    });
                    prefilter_tokens.push(config.pattern.clone());
                }
                RuleKind::Regex => {
                    match RegexBuilder::new(&config.pattern)
                        .case_insensitive(!config.case_sensitive)
                        .size_limit(1 << 20)
                        .build()
                    {
                        Ok(regex) => {
                            match &config.trigger {
                                Some(token) if !token.is_empty() => {
                                    prefilter_tokens.push(token.clone());
                                }
                                _ => prefilter_complete = false,
                            }
                            regex_rules.push(RegexRule {
                                priority: index,
                                regex,
                                replacement: config.replacement.clone(),
                            });
                        }
                        Err(e) => errors.push(RuleError {
                            rule_index: index,
                            message: format!("regex: {}", e),
                        }),
                    }
                }
            }
        }

        let literal_ac = if literal_patterns.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .ascii_case_insensitive(true)
                .build(&literal_patterns)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    errors.push(RuleError {
                        rule_index: usize::MAX,
                        message: format!("literal automaton: {}", e),
                    });
                    literal_meta.clear();
                    None
                }
            }
        };

        // Case-insensitive automaton over-admits for case-sensitive rules,
        // which is the safe direction for a rejection test.
        let prefilter = if prefilter_tokens.is_empty() {
            None
        } else {
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .ascii_case_insensitive(true)
                .build(&prefilter_tokens)
                .ok()
        };
        let rule_count = literal_meta.len() + regex_rules.len();
        if prefilter.is_none() && rule_count > 0 {
            prefilter_complete = false;
        }

        (
            Self {
                literal_ac,
                literal_meta,
                regex_rules,
                prefilter,
                prefilter_complete,
                version,
                rule_count,
            },
            errors,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }

    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True when every rule contributed a cheap-rejection token, i.e. the
    /// early exit is actually in play.
    pub fn prefilter_complete(&self) -> bool {
        self.prefilter_complete
    }

    pub fn regex_rules(&self) -> &[RegexRule] {
        &self.regex_rules
    }

    /// All literal occurrences in `text`, overlaps included, case already
    /// verified. Word-boundary filtering is the engine's job (it computes
    /// the boundary set once per input).
    pub fn literal_matches(&self, text: &str) -> Vec<LiteralMatch> {
        let ac = match &self.literal_ac {
            Some(ac) => ac,
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        for m in ac.find_overlapping_iter(text) {
            let meta = &self.literal_meta[m.pattern().as_usize()];
            if let Some(exact) = &meta.exact {
                if &text[m.start()..m.end()] != exact {
                    continue;
                }
            }
            out.push(LiteralMatch {
                priority: meta.priority,
                start: m.start(),
                end: m.end(),
                whole_word: meta.whole_word,
                replacement: meta.replacement.clone(),
            });
        }
        out
    }

    /// Cheap rejection test. `Some(false)` means no rule can match; `None`
    /// means the prefilter cannot decide and the full path must run.
    pub fn may_match(&self, text: &str) -> Option<bool> {
        if self.rule_count == 0 {
            return Some(false);
        }
        if !self.prefilter_complete {
            return None;
        }
        self.prefilter.as_ref().map(|ac| ac.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(pattern: &str, replacement: &str) -> RuleConfig {
        RuleConfig {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            kind: RuleKind::Literal,
            whole_word: true,
            case_sensitive: true,
            trigger: None,
        }
    }

    #[test]
    fn test_config_json_defaults() {
        let json = r#"{"match": "Trump", "replace": "The Orange One"}"#;
        let config: RuleConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, RuleKind::Literal);
        assert!(config.whole_word);
        assert!(config.case_sensitive);
        assert!(config.trigger.is_none());
    }

    #[test]
    fn test_literal_matches_reports_occurrences() {
        let (set, errors) = RuleSet::build(&[literal("cat", "feline")], 1);
        assert!(errors.is_empty());

        let matches = set.literal_matches("cat catalog cat");
        let spans: Vec<(usize, usize)> = matches.iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(spans, vec![(0, 3), (4, 7), (12, 15)]);
    }

    #[test]
    fn test_case_sensitive_rule_rejects_wrong_case() {
        let (set, _) = RuleSet::build(&[literal("Trump", "The Orange One")], 1);
        assert!(set.literal_matches("trump card").is_empty());
        assert_eq!(set.literal_matches("Trump card").len(), 1);
    }

    #[test]
    fn test_case_insensitive_rule_accepts_any_case() {
        let mut config = literal("media", "propaganda");
        config.case_sensitive = false;
        let (set, _) = RuleSet::build(&[config], 1);
        assert_eq!(set.literal_matches("MEDIA Media media").len(), 3);
    }

    #[test]
    fn test_overlapping_rules_all_reported() {
        let (set, _) = RuleSet::build(
            &[literal("Donald Trump", "45"), literal("Trump", "The Orange One")],
            1,
        );
        let matches = set.literal_matches("Donald Trump spoke");
        // Both candidates surface; the engine decides precedence.
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().any(|m| m.priority == 0));
        assert!(matches.iter().any(|m| m.priority == 1));
    }

    #[test]
    fn test_bad_regex_dropped_others_survive() {
        let mut bad = literal("(", "x");
        bad.kind = RuleKind::Regex;
        let (set, errors) = RuleSet::build(&[literal("ok", "fine"), bad], 1);

        assert_eq!(set.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_index, 1);
    }

    #[test]
    fn test_prefilter_rejects_unrelated_text() {
        let (set, _) = RuleSet::build(&[literal("Trump", "The Orange One")], 1);
        assert_eq!(set.may_match("nothing relevant here"), Some(false));
        assert_eq!(set.may_match("Trump said it"), Some(true));
        // Over-admission on case is allowed; wrong-case text still passes
        // the prefilter and is rejected by the full matcher.
        assert_eq!(set.may_match("trump card"), Some(true));
    }

    #[test]
    fn test_regex_without_trigger_disables_prefilter() {
        let mut re_rule = literal("H(?:illary)? Clinton", "Crooked Hillary");
        re_rule.kind = RuleKind::Regex;
        let (set, errors) = RuleSet::build(&[literal("Trump", "x"), re_rule], 1);
        assert!(errors.is_empty());
        assert_eq!(set.may_match("totally unrelated"), None);
    }

    #[test]
    fn test_regex_with_trigger_keeps_prefilter() {
        let mut re_rule = literal("H(?:illary)? Clinton", "Crooked Hillary");
        re_rule.kind = RuleKind::Regex;
        re_rule.trigger = Some("Clinton".to_string());
        let (set, _) = RuleSet::build(&[re_rule], 1);
        assert_eq!(set.may_match("no politicians"), Some(false));
        assert_eq!(set.may_match("Clinton spoke"), Some(true));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = RuleSet::empty();
        assert_eq!(set.may_match("anything"), Some(false));
        assert!(set.literal_matches("anything").is_empty());
    }
}
