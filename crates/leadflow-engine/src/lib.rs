//! Assignment runtime: one guarded round-robin run per invocation.

mod engine;
mod error;

pub use engine::{Engine, RunOptions};
pub use error::AssignError;
pub use tokio_util::sync::CancellationToken;
