use chrono::NaiveDate;
use leadflow_store::StoreError;
use thiserror::Error;

/// Errors that abort an assignment run.
///
/// Individual write failures never surface here; they are counted in the
/// run report.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error("no assignment rules saved for {day}")]
    ConfigurationMissing { day: NaiveDate },

    #[error("assignment rules for {day} name no employees for any service")]
    ConfigurationEmpty { day: NaiveDate },

    #[error("an assignment run is already in progress")]
    RunInProgress,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
