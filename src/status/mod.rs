pub mod projection;

pub use projection::{Color, MergeIcon, StatusProjector, StatusRow};
