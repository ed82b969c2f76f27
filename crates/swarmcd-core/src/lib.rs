pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod paths;
pub mod reconciler;
pub mod repo_lock;
pub mod scheduler;
pub mod stack;
pub mod status;

pub use error::{Result, SwarmcdError};
