//! File-system substrate: locking primitives and the atomic JSON store.

pub mod atomic_store;
pub mod doc_lock;
pub mod locking;

pub use atomic_store::AtomicStore;
