pub mod event_log;
pub mod operation_store;
pub mod queue_store;
pub mod schema;

pub use operation_store::OperationStore;
pub use queue_store::QueueStore;
