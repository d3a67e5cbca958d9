//! Terminal rendering for run reports, rule snapshots, and lead tables.
//!
//! Scalars are printed as a vertical card; row sets go through Arrow's
//! pretty-printer so every backend renders identically.

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::NaiveDate;
use leadflow_core::{Employee, Lead, RuleSet, RunReport, RunStatus, crm};

const MAX_FAILURES_SHOWN: usize = 10;

// ── Run report ──

/// Print a run report as a card, followed by the assignment table.
pub fn print_report(report: &RunReport, show_assignments: bool) -> anyhow::Result<()> {
    println!("=== Assignment run {} ===", report.day);
    println!("{}", report.summary());
    println!();

    print_field("status", report.status.as_str());
    print_field("eligible", report.eligible);
    print_field("assigned", report.assigned);
    print_field("skipped (no rule)", report.skipped);
    print_field("failed writes", report.failed_writes);
    if report.status == RunStatus::Cancelled {
        print_field("not attempted", report.not_attempted);
    }
    if report.dry_run {
        print_field("mode", "dry run");
    }
    println!();

    if show_assignments && !report.assignments.is_empty() {
        let batch = crm::assignments_to_batch(&report.assignments)?;
        print_batches(&[batch])?;
        println!();
    }

    if !report.failures.is_empty() {
        println!("Failures");
        for f in report.failures.iter().take(MAX_FAILURES_SHOWN) {
            println!(
                "  {:<16} → {:<12} after {} attempt(s): {}",
                f.lead_id, f.handler, f.attempts, f.error
            );
        }
        if report.failures.len() > MAX_FAILURES_SHOWN {
            println!("  ... and {} more", report.failures.len() - MAX_FAILURES_SHOWN);
        }
    }
    Ok(())
}

// ── Rules ──

pub fn print_rules(day: NaiveDate, rules: &RuleSet) {
    println!("=== Assignment rules for {day} ===");
    if rules.is_empty() {
        println!("(no services configured)");
        return;
    }
    for rule in rules.iter() {
        let handlers = if rule.handlers.is_empty() {
            "(none, leads will be skipped)".to_string()
        } else {
            rule.handlers.join(" → ")
        };
        print_field(&rule.service, handlers);
    }
}

// ── Tables ──

pub fn print_leads(leads: &[Lead]) -> anyhow::Result<()> {
    if leads.is_empty() {
        println!("(no leads)");
        return Ok(());
    }
    print_batches(&[crm::leads_to_batch(leads)?])
}

pub fn print_employees(employees: &[Employee]) -> anyhow::Result<()> {
    if employees.is_empty() {
        println!("(no employees)");
        return Ok(());
    }
    print_batches(&[crm::employees_to_batch(employees)?])
}

pub fn print_batches(batches: &[RecordBatch]) -> anyhow::Result<()> {
    println!("{}", pretty_format_batches(batches)?);
    Ok(())
}

fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("  {:<26} {}", name, value);
}
