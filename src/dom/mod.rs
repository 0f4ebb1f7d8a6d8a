pub mod mutation;
pub mod snapshot;
pub mod tree;

pub use mutation::{MutationRecord, WriteStamp};
pub use snapshot::NodeSnapshot;
pub use tree::{Document, NodeData, NodeId};
