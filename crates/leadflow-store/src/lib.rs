//! Storage layer: lead, rule, and employee stores behind async traits.

mod error;
mod memory;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use traits::{EmployeeDirectory, LeadStore, RuleSource, RuleStore};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
