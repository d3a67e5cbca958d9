//! Round-robin planning: pure computation of lead → handler assignments.
//!
//! Nothing here performs I/O. The planner walks eligible leads in the order
//! they were fetched and hands each one to the next handler in its service's
//! rotation. Applying the plan is the caller's job.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::category::CategoryMatch;
use crate::lead::{Assignment, Lead};
use crate::rules::RuleSet;

/// Per-service cursor into the handler rotation.
///
/// Lives for exactly one planning pass. Every configured service starts at 0.
#[derive(Debug, Default)]
pub struct RotationCounter {
    next: HashMap<String, usize>,
}

impl RotationCounter {
    /// Start a counter at 0 for every key.
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            next: keys.into_iter().map(|k| (k.to_string(), 0)).collect(),
        }
    }

    /// Pick the handler at the current index and advance, wrapping at `handlers.len()`.
    ///
    /// Returns `None` for an empty handler list and leaves the counter untouched.
    pub fn take<'h>(&mut self, key: &str, handlers: &'h [String]) -> Option<&'h str> {
        if handlers.is_empty() {
            return None;
        }
        let index = self.next.entry(key.to_string()).or_insert(0);
        let handler = handlers[*index % handlers.len()].as_str();
        *index = (*index + 1) % handlers.len();
        Some(handler)
    }
}

/// Rules keyed by their match key, one entry per key.
///
/// When several services map to the same key the first configured one wins.
/// Rules that are not usable keep their key but carry no handlers, so leads
/// matching them are skipped rather than falling through to a later rule.
#[derive(Debug)]
pub struct RoutingTable<'r> {
    routes: HashMap<String, &'r [String]>,
}

impl<'r> RoutingTable<'r> {
    pub fn build(rules: &'r RuleSet, matching: CategoryMatch) -> Self {
        let mut routes: HashMap<String, &'r [String]> = HashMap::with_capacity(rules.len());
        for rule in rules.iter() {
            let key = matching.key(&rule.service);
            if routes.contains_key(&key) {
                warn!(
                    service = %rule.service,
                    key = %key,
                    "rule collides with an earlier service after normalisation; ignoring"
                );
                continue;
            }
            let handlers: &'r [String] = if rule.is_usable() { &rule.handlers } else { &[] };
            routes.insert(key, handlers);
        }
        Self { routes }
    }

    /// Whether any key routes to at least one handler.
    pub fn has_usable_rules(&self) -> bool {
        self.routes.values().any(|handlers| !handlers.is_empty())
    }

    fn handlers(&self, key: &str) -> Option<&'r [String]> {
        self.routes.get(key).copied()
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

/// Output of a planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentPlan {
    /// Leads with no handler at planning time.
    pub eligible: usize,
    /// Intended assignments, in eligible-lead order.
    pub assignments: Vec<Assignment>,
    /// Ids of eligible leads with no usable rule for their service.
    pub skipped: Vec<String>,
}

impl AssignmentPlan {
    pub fn is_empty(&self) -> bool {
        self.eligible == 0
    }
}

/// Compute round-robin assignments for every unassigned lead.
///
/// Leads that already have a handler are ignored entirely. Eligible leads
/// whose service has no rule, or a rule that is not usable, are reported in
/// [`AssignmentPlan::skipped`]. Within a service, the first eligible lead
/// gets handler 0, the next handler 1, and so on, wrapping around.
pub fn plan_assignments(rules: &RuleSet, leads: &[Lead], matching: CategoryMatch) -> AssignmentPlan {
    let table = RoutingTable::build(rules, matching);
    let mut counter = RotationCounter::new(table.keys());
    let mut plan = AssignmentPlan::default();

    for lead in leads.iter().filter(|l| l.is_unassigned()) {
        plan.eligible += 1;
        let key = matching.key(&lead.service);
        let handler = table
            .handlers(&key)
            .and_then(|handlers| counter.take(&key, handlers));

        match handler {
            Some(handler) => plan.assignments.push(Assignment {
                lead_id: lead.id.clone(),
                handler: handler.to_string(),
                service: lead.service.clone(),
            }),
            None => {
                debug!(lead_id = %lead.id, service = %lead.service, "no usable rule, skipping");
                plan.skipped.push(lead.id.clone());
            }
        }
    }

    plan
}
