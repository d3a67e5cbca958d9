//! In-memory store for tests, dry runs, and embedding the engine without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use leadflow_core::{Employee, Lead, RuleSet, RuleSnapshot};
use tracing::debug;

use crate::StoreError;
use crate::traits::{EmployeeDirectory, LeadStore, RuleSource, RuleStore};

/// Leads, employees, and rule snapshots held in process memory.
///
/// Leads keep insertion order, which is the order `fetch_leads` returns.
/// Write failures can be injected per lead with
/// [`fail_writes_for`](Self::fail_writes_for).
#[derive(Default)]
pub struct MemoryStore {
    leads: Mutex<Vec<Lead>>,
    employees: Mutex<Vec<Employee>>,
    snapshots: Mutex<HashMap<NaiveDate, RuleSet>>,
    /// Lead id → remaining forced write failures.
    faults: Mutex<HashMap<String, u32>>,
    fetches: AtomicUsize,
    write_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(leads: Vec<Lead>) -> Self {
        let mut store = Self::new();
        *store.leads.get_mut().unwrap_or_else(|e| e.into_inner()) = leads;
        store
    }

    pub fn with_rules(self, day: NaiveDate, rules: RuleSet) -> Self {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert(day, rules);
        }
        self
    }

    pub fn with_employees(self, employees: Vec<Employee>) -> Self {
        if let Ok(mut guard) = self.employees.lock() {
            *guard = employees;
        }
        self
    }

    /// Make the next `times` writes for `lead_id` fail. `u32::MAX` fails forever.
    pub fn fail_writes_for(&self, lead_id: &str, times: u32) -> Result<(), StoreError> {
        lock(&self.faults)?.insert(lead_id.to_string(), times);
        Ok(())
    }

    /// Snapshot of all leads in insertion order.
    pub fn leads(&self) -> Result<Vec<Lead>, StoreError> {
        Ok(lock(&self.leads)?.clone())
    }

    /// Current handler of a lead, if the lead exists and is assigned.
    pub fn handler_of(&self, lead_id: &str) -> Option<String> {
        lock(&self.leads)
            .ok()?
            .iter()
            .find(|l| l.id == lead_id)
            .and_then(|l| l.assigned_to.clone())
    }

    /// Number of `fetch_leads` calls served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `assign_lead` calls received, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|e| StoreError::Other(format!("mutex poisoned: {e}")))
}

#[async_trait]
impl RuleSource for MemoryStore {
    async fn rules_for(&self, day: NaiveDate) -> Result<Option<RuleSet>, StoreError> {
        Ok(lock(&self.snapshots)?.get(&day).cloned())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn save_rules(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError> {
        lock(&self.snapshots)?.insert(snapshot.day, snapshot.rules.clone());
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.leads()
    }

    async fn assign_lead(&self, lead_id: &str, handler: &str) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        {
            let mut faults = lock(&self.faults)?;
            if let Some(remaining) = faults.get_mut(lead_id) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(StoreError::Backend(format!(
                        "injected write failure for {lead_id}"
                    )));
                }
            }
        }

        let mut leads = lock(&self.leads)?;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| StoreError::LeadUnavailable(lead_id.to_string()))?;
        if !lead.is_unassigned() && lead.assigned_to.as_deref() != Some(handler) {
            return Err(StoreError::LeadUnavailable(lead_id.to_string()));
        }
        lead.assigned_to = Some(handler.to_string());
        debug!(lead_id, handler, "lead assigned");
        Ok(())
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryStore {
    async fn employees(&self) -> Result<Vec<Employee>, StoreError> {
        Ok(lock(&self.employees)?.clone())
    }
}
