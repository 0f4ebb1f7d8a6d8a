pub mod cache;
pub mod classify;
pub mod coordinator;
pub mod engine;
pub mod pipeline;
pub mod rules;
pub mod walker;


pub use cache::{CachedRewrite, RewriteCache};
pub use classify::{classify, NodeClass, SkipReason, ORIGINAL_ATTR, PROCESSED_ATTR};
pub use coordinator::{ChangeCoordinator, CoordinatorOptions};
pub use engine::{EngineStats, Rewritten, TextEngine};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineOptions, PipelineStats, PumpReport, RewritePipeline,
};
pub use rules::{RuleConfig, RuleError, RuleKind, RuleSet};
pub use walker::{PageWalker, RewritePatch, WalkerStats};
