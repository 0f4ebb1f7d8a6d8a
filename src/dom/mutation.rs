//! Mutation journal types.
//!
//! Every structural write carries a `WriteStamp` so the change coordinator
//! can tell the walker's own output apart from host additions. This is an
//! explicit stamp applied at write time, not an identity or timing
//! heuristic; it is the reentrancy guard that keeps the
//! replace -> observe -> replace loop from closing.

use crate::dom::tree::NodeId;

/// Generation tag applied to a structural write.
///
/// `HOST` marks writes originating outside the pipeline (the page itself).
/// The walker allocates a fresh non-zero stamp per pass; the coordinator
/// treats every non-`HOST` record as self-generated noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WriteStamp(pub u32);

impl WriteStamp {
    pub const HOST: WriteStamp = WriteStamp(0);

    pub fn is_self(self) -> bool {
        self != WriteStamp::HOST
    }
}

/// One childList-style change record: nodes added to / removed from `target`.
#[derive(Clone, Debug)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub stamp: WriteStamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_stamp_is_not_self() {
        assert!(!WriteStamp::HOST.is_self());
        assert!(WriteStamp(1).is_self());
        assert!(WriteStamp(17).is_self());
    }
}
