//! Core types for leadflow: leads, assignment rules, the round-robin planner,
//! and run reports.
//!
//! Everything here is pure; storage lives in `leadflow-store` and the run
//! itself in `leadflow-engine`.

pub mod category;
pub mod lead;
pub mod plan;
pub mod report;
pub mod rules;
pub mod schema;

pub use category::{CategoryMatch, normalize_category};
pub use lead::{Assignment, Employee, Lead};
pub use plan::{AssignmentPlan, RotationCounter, RoutingTable, plan_assignments};
pub use report::{RunReport, RunStatus, WriteFailure};
pub use rules::{AssignmentRule, RuleError, RuleSet, RuleSnapshot};
pub use schema::crm;
