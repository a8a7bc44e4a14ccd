pub mod dependencies;
pub mod readiness;
pub mod transitions;

pub use dependencies::DependencyGraph;
pub use readiness::is_merge_ready;
pub use transitions::TransitionEngine;
