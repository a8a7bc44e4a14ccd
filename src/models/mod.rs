pub mod operation;
pub mod phase;
pub mod queue;

pub use operation::{Operation, OperationKind};
pub use phase::Phase;
pub use queue::{MergeType, QueueDocument, QueueEntry, QueueStatus};
