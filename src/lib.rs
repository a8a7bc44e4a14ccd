pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod mergequeue;
pub mod models;
pub mod notify;
pub mod process;
pub mod status;
pub mod store;
pub mod tracker;
pub mod worker;

pub use config::Config;
pub use error::{CoreError, CoreResult};
