use async_trait::async_trait;
use chrono::NaiveDate;
use leadflow_core::{Employee, Lead, RuleSet, RuleSnapshot};

use crate::StoreError;

/// Read access to saved assignment rules.
///
/// Implementations return `Ok(None)` when no snapshot exists for the day;
/// `Err` is reserved for backend failures.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn rules_for(&self, day: NaiveDate) -> Result<Option<RuleSet>, StoreError>;
}

/// Write access to assignment rules, used by the configuration surface.
#[async_trait]
pub trait RuleStore: RuleSource {
    /// Save a snapshot, replacing any existing snapshot for the same day.
    async fn save_rules(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError>;
}

/// The lead collection an assignment run reads from and writes back to.
///
/// ## Write semantics
///
/// `assign_lead` must be idempotent: it succeeds when the lead currently has
/// no handler or already has `handler`, and fails with
/// [`StoreError::LeadUnavailable`] when the lead is missing or held by a
/// different handler. Retrying a write that may have landed is therefore safe.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Fetch every lead, in a stable order.
    async fn fetch_leads(&self) -> Result<Vec<Lead>, StoreError>;

    /// Set the handler of one lead.
    async fn assign_lead(&self, lead_id: &str, handler: &str) -> Result<(), StoreError>;
}

/// The employee directory, used to validate rule snapshots.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn employees(&self) -> Result<Vec<Employee>, StoreError>;
}
