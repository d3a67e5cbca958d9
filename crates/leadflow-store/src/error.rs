use leadflow_core::RuleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("import file not found: {0}")]
    ImportNotFound(std::path::PathBuf),

    #[error("unsupported import format: {0:?}")]
    UnsupportedFormat(String),

    #[error("lead {0} is missing or already held by another handler")]
    LeadUnavailable(String),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("invalid rules: {0}")]
    Rules(#[from] RuleError),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Other(String),
}
