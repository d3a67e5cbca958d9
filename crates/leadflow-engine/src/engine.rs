//! Assignment run: read rules, read leads, plan, apply writes, report.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use leadflow_core::{
    Assignment, CategoryMatch, RoutingTable, RunReport, RunStatus, WriteFailure,
    plan_assignments,
};
use leadflow_store::{LeadStore, RuleSource, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::AssignError;

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Day whose rule snapshot drives the run.
    pub day: NaiveDate,
    pub matching: CategoryMatch,
    /// Plan and report without writing.
    pub dry_run: bool,
    /// Attempts per lead write, including the first. Values below 1 mean 1.
    pub max_write_attempts: u32,
    /// Pause between attempts on the same lead.
    pub retry_backoff: Duration,
    /// Checked before every write and during retry backoff; committed
    /// assignments are kept on cancel.
    pub cancel: CancellationToken,
}

/// How a single lead's write ended.
enum WriteOutcome {
    Committed,
    Failed(WriteFailure),
    /// Cancelled between attempts; the lead is left as it was.
    Abandoned,
}

impl RunOptions {
    pub fn for_day(day: NaiveDate) -> Self {
        Self {
            day,
            matching: CategoryMatch::Exact,
            dry_run: false,
            max_write_attempts: 1,
            retry_backoff: Duration::from_millis(250),
            cancel: CancellationToken::new(),
        }
    }
}

/// Round-robin assignment engine bound to a rule source and a lead store.
///
/// At most one run executes per engine at a time; a concurrent call to
/// [`run`](Self::run) fails fast with [`AssignError::RunInProgress`].
/// Rotation state is local to each run.
pub struct Engine {
    rules: Arc<dyn RuleSource>,
    leads: Arc<dyn LeadStore>,
    running: AtomicBool,
}

/// Clears the run flag when dropped, including on early return.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Engine {
    pub fn new(rules: Arc<dyn RuleSource>, leads: Arc<dyn LeadStore>) -> Self {
        Self {
            rules,
            leads,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute one assignment run.
    ///
    /// Configuration is validated before any lead is read. Per-lead write
    /// failures are collected into the report and never abort the run.
    #[instrument(name = "assign_run", skip_all, fields(day = %opts.day, dry_run = opts.dry_run))]
    pub async fn run(&self, opts: &RunOptions) -> Result<RunReport, AssignError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(AssignError::RunInProgress)?;

        let rules = self
            .rules
            .rules_for(opts.day)
            .await?
            .ok_or(AssignError::ConfigurationMissing { day: opts.day })?;
        if !RoutingTable::build(&rules, opts.matching).has_usable_rules() {
            return Err(AssignError::ConfigurationEmpty { day: opts.day });
        }
        debug!(services = rules.len(), "loaded rules");

        let leads = self.leads.fetch_leads().await?;
        let plan = plan_assignments(&rules, &leads, opts.matching);
        info!(
            leads = leads.len(),
            eligible = plan.eligible,
            planned = plan.assignments.len(),
            skipped = plan.skipped.len(),
            "planned assignments"
        );

        if plan.is_empty() {
            return Ok(RunReport {
                dry_run: opts.dry_run,
                ..RunReport::nothing_to_do(opts.day)
            });
        }

        let mut report = RunReport {
            day: opts.day,
            status: RunStatus::Completed,
            eligible: plan.eligible,
            assigned: 0,
            skipped: plan.skipped.len(),
            failed_writes: 0,
            not_attempted: 0,
            dry_run: opts.dry_run,
            assignments: Vec::with_capacity(plan.assignments.len()),
            failures: Vec::new(),
        };

        if opts.dry_run {
            report.assigned = plan.assignments.len();
            report.assignments = plan.assignments;
            info!(summary = %report.summary(), "dry run finished");
            return Ok(report);
        }

        let total = plan.assignments.len();
        for (i, assignment) in plan.assignments.into_iter().enumerate() {
            let outcome = if opts.cancel.is_cancelled() {
                WriteOutcome::Abandoned
            } else {
                self.write_with_retry(&assignment, opts).await
            };
            match outcome {
                WriteOutcome::Committed => report.assignments.push(assignment),
                WriteOutcome::Failed(failure) => report.failures.push(failure),
                WriteOutcome::Abandoned => {
                    report.status = RunStatus::Cancelled;
                    report.not_attempted = total - i;
                    warn!(remaining = report.not_attempted, "run cancelled");
                    break;
                }
            }
        }

        report.assigned = report.assignments.len();
        report.failed_writes = report.failures.len();
        info!(summary = %report.summary(), "run finished");
        Ok(report)
    }

    async fn write_with_retry(&self, assignment: &Assignment, opts: &RunOptions) -> WriteOutcome {
        let max_attempts = opts.max_write_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self
                .leads
                .assign_lead(&assignment.lead_id, &assignment.handler)
                .await
            {
                Ok(()) => {
                    debug!(lead_id = %assignment.lead_id, handler = %assignment.handler, "assigned");
                    return WriteOutcome::Committed;
                }
                Err(e) => e,
            };

            // Another handler owns the lead; retrying cannot change that.
            let permanent = matches!(err, StoreError::LeadUnavailable(_));
            if permanent || attempts >= max_attempts {
                warn!(
                    lead_id = %assignment.lead_id,
                    handler = %assignment.handler,
                    attempts,
                    error = %err,
                    "assignment write failed"
                );
                return WriteOutcome::Failed(WriteFailure {
                    lead_id: assignment.lead_id.clone(),
                    handler: assignment.handler.clone(),
                    error: err.to_string(),
                    attempts,
                });
            }

            debug!(lead_id = %assignment.lead_id, attempts, error = %err, "retrying write");
            tokio::select! {
                biased;
                _ = opts.cancel.cancelled() => {
                    debug!(lead_id = %assignment.lead_id, attempts, "cancelled during retry backoff");
                    return WriteOutcome::Abandoned;
                }
                _ = tokio::time::sleep(opts.retry_backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadflow_core::{Lead, RuleSet};
    use leadflow_store::MemoryStore;
    use tokio::sync::Notify;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn opts() -> RunOptions {
        RunOptions {
            retry_backoff: Duration::from_millis(1),
            ..RunOptions::for_day(day())
        }
    }

    fn engine_for(store: &Arc<MemoryStore>) -> Engine {
        Engine::new(store.clone(), store.clone())
    }

    fn five_web_leads() -> Vec<Lead> {
        (1..=5)
            .map(|i| Lead::new(format!("L{i}"), "Web Design"))
            .collect()
    }

    #[tokio::test]
    async fn web_design_and_seo_scenario() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![
                Lead::new("L1", "Web Design"),
                Lead::new("L2", "Web Design"),
                Lead::new("L3", "SEO"),
            ])
            .with_rules(day(), RuleSet::new().with("Web Design", vec!["E1", "E2"])),
        );
        let report = engine_for(&store).run(&opts()).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(
            (report.eligible, report.assigned, report.skipped, report.failed_writes),
            (3, 2, 1, 0)
        );
        assert_eq!(store.handler_of("L1").as_deref(), Some("E1"));
        assert_eq!(store.handler_of("L2").as_deref(), Some("E2"));
        assert_eq!(store.handler_of("L3"), None);
    }

    #[tokio::test]
    async fn rotation_is_committed_in_order() {
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads())
                .with_rules(day(), RuleSet::new().with("Web Design", vec!["A", "B", "C"])),
        );
        let report = engine_for(&store).run(&opts()).await.unwrap();

        let handlers: Vec<String> = (1..=5)
            .map(|i| store.handler_of(&format!("L{i}")).unwrap())
            .collect();
        assert_eq!(handlers, ["A", "B", "C", "A", "B"]);
        assert_eq!(report.assigned, 5);
    }

    #[tokio::test]
    async fn one_failed_write_does_not_stop_the_rest() {
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads())
                .with_rules(day(), RuleSet::new().with("Web Design", vec!["A", "B"])),
        );
        store.fail_writes_for("L3", u32::MAX).unwrap();

        let report = engine_for(&store).run(&opts()).await.unwrap();

        assert_eq!(report.assigned, 4);
        assert_eq!(report.failed_writes, 1);
        assert_eq!(report.failures[0].lead_id, "L3");
        assert_eq!(report.failures[0].attempts, 1);
        assert_eq!(store.write_attempts(), 5);
        assert_eq!(store.handler_of("L3"), None);
        assert_eq!(store.handler_of("L4").as_deref(), Some("B"));
        assert_eq!(store.handler_of("L5").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn retry_recovers_transient_failure() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "SEO")])
                .with_rules(day(), RuleSet::new().with("SEO", vec!["A"])),
        );
        store.fail_writes_for("L1", 2).unwrap();

        let report = engine_for(&store)
            .run(&RunOptions {
                max_write_attempts: 3,
                ..opts()
            })
            .await
            .unwrap();

        assert_eq!(report.assigned, 1);
        assert_eq!(report.failed_writes, 0);
        assert_eq!(store.write_attempts(), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "SEO"), Lead::new("L2", "SEO")])
                .with_rules(day(), RuleSet::new().with("SEO", vec!["A"])),
        );
        store.fail_writes_for("L1", u32::MAX).unwrap();

        let report = engine_for(&store)
            .run(&RunOptions {
                max_write_attempts: 2,
                ..opts()
            })
            .await
            .unwrap();

        assert_eq!(report.failures[0].attempts, 2);
        assert_eq!(report.assigned, 1);
        assert_eq!(store.write_attempts(), 3);
    }

    #[tokio::test]
    async fn missing_configuration_reads_no_leads() {
        let store = Arc::new(MemoryStore::with_leads(five_web_leads()));
        let err = engine_for(&store).run(&opts()).await.unwrap_err();
        assert!(matches!(err, AssignError::ConfigurationMissing { day: d } if d == day()));
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn configuration_for_another_day_is_missing() {
        let other = day().succ_opt().unwrap();
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads())
                .with_rules(other, RuleSet::new().with("Web Design", vec!["A"])),
        );
        let err = engine_for(&store).run(&opts()).await.unwrap_err();
        assert!(matches!(err, AssignError::ConfigurationMissing { .. }));
    }

    #[tokio::test]
    async fn all_empty_handler_lists_is_fatal() {
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads()).with_rules(
                day(),
                RuleSet::new()
                    .with("Web Design", Vec::<String>::new())
                    .with("SEO", Vec::<String>::new()),
            ),
        );
        let err = engine_for(&store).run(&opts()).await.unwrap_err();
        assert!(matches!(err, AssignError::ConfigurationEmpty { .. }));
        assert_eq!(store.fetch_count(), 0);
        assert_eq!(store.write_attempts(), 0);
        assert!(store.leads().unwrap().iter().all(Lead::is_unassigned));
    }

    #[tokio::test]
    async fn no_unassigned_leads_is_nothing_to_do() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "SEO").with_handler("Z")])
                .with_rules(day(), RuleSet::new().with("SEO", vec!["A"])),
        );
        let report = engine_for(&store).run(&opts()).await.unwrap();
        assert_eq!(report.status, RunStatus::NothingToDo);
        assert_eq!(report.assigned, 0);
        assert_eq!(store.write_attempts(), 0);
        assert_eq!(store.handler_of("L1").as_deref(), Some("Z"));
    }

    #[tokio::test]
    async fn already_assigned_leads_are_untouched() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![
                Lead::new("L1", "SEO").with_handler("Z"),
                Lead::new("L2", "SEO"),
            ])
            .with_rules(day(), RuleSet::new().with("SEO", vec!["A", "B"])),
        );
        let report = engine_for(&store).run(&opts()).await.unwrap();
        assert_eq!(report.eligible, 1);
        assert_eq!(store.handler_of("L1").as_deref(), Some("Z"));
        assert_eq!(store.handler_of("L2").as_deref(), Some("A"));
        assert_eq!(store.write_attempts(), 1);
    }

    #[tokio::test]
    async fn second_run_finds_nothing_to_do() {
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads())
                .with_rules(day(), RuleSet::new().with("Web Design", vec!["A"])),
        );
        let engine = engine_for(&store);
        assert_eq!(engine.run(&opts()).await.unwrap().assigned, 5);
        let again = engine.run(&opts()).await.unwrap();
        assert_eq!(again.status, RunStatus::NothingToDo);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads())
                .with_rules(day(), RuleSet::new().with("Web Design", vec!["A", "B"])),
        );
        let report = engine_for(&store)
            .run(&RunOptions {
                dry_run: true,
                ..opts()
            })
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.assigned, 5);
        assert_eq!(report.assignments[4].handler, "A");
        assert_eq!(store.write_attempts(), 0);
        assert!(report.summary().starts_with("Would assign 5 of 5"));
    }

    #[tokio::test]
    async fn cancelled_before_writes_commits_nothing() {
        let store = Arc::new(
            MemoryStore::with_leads(five_web_leads())
                .with_rules(day(), RuleSet::new().with("Web Design", vec!["A"])),
        );
        let opts = opts();
        opts.cancel.cancel();

        let report = engine_for(&store).run(&opts).await.unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.assigned, 0);
        assert_eq!(report.not_attempted, 5);
        assert_eq!(store.write_attempts(), 0);
    }

    #[tokio::test]
    async fn cancel_during_backoff_abandons_the_lead() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "SEO"), Lead::new("L2", "SEO")])
                .with_rules(day(), RuleSet::new().with("SEO", vec!["A"])),
        );
        store.fail_writes_for("L1", u32::MAX).unwrap();
        let opts = RunOptions {
            max_write_attempts: 5,
            retry_backoff: Duration::from_secs(60),
            ..opts()
        };
        let cancel = opts.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = engine_for(&store).run(&opts).await.unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.failed_writes, 0);
        assert_eq!(report.not_attempted, 2);
        assert_eq!(report.assigned, 0);
        assert_eq!(store.write_attempts(), 1);
        assert_eq!(store.handler_of("L2"), None);
    }

    #[tokio::test]
    async fn blank_handler_rule_assigns_nothing() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "SEO")])
                .with_rules(day(), RuleSet::new().with("SEO", vec![""])),
        );
        let err = engine_for(&store).run(&opts()).await.unwrap_err();
        assert!(matches!(err, AssignError::ConfigurationEmpty { .. }));
        assert_eq!(store.write_attempts(), 0);
        assert!(store.leads().unwrap()[0].is_unassigned());
    }

    #[tokio::test]
    async fn normalized_collision_can_leave_day_empty() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "web design")]).with_rules(
                day(),
                RuleSet::new()
                    .with("Web Design", Vec::<String>::new())
                    .with("web design", vec!["A"]),
            ),
        );
        let err = engine_for(&store)
            .run(&RunOptions {
                matching: CategoryMatch::Normalized,
                ..opts()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AssignError::ConfigurationEmpty { .. }));
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn normalized_matching_is_opt_in() {
        let store = Arc::new(
            MemoryStore::with_leads(vec![Lead::new("L1", "web design")])
                .with_rules(day(), RuleSet::new().with("Web Design", vec!["A"])),
        );
        let engine = engine_for(&store);

        let exact = engine.run(&opts()).await.unwrap();
        assert_eq!((exact.assigned, exact.skipped), (0, 1));

        let lenient = engine
            .run(&RunOptions {
                matching: CategoryMatch::Normalized,
                ..opts()
            })
            .await
            .unwrap();
        assert_eq!(lenient.assigned, 1);
        assert_eq!(store.handler_of("L1").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn guard_released_after_error() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_for(&store);
        for _ in 0..2 {
            assert!(matches!(
                engine.run(&opts()).await,
                Err(AssignError::ConfigurationMissing { .. })
            ));
        }
        assert!(!engine.is_running());
    }

    /// Lead store that parks inside `fetch_leads` until released.
    struct GatedStore {
        inner: MemoryStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl LeadStore for GatedStore {
        async fn fetch_leads(&self) -> Result<Vec<Lead>, StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.fetch_leads().await
        }

        async fn assign_lead(&self, lead_id: &str, handler: &str) -> Result<(), StoreError> {
            self.inner.assign_lead(lead_id, handler).await
        }
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let rules = Arc::new(
            MemoryStore::new().with_rules(day(), RuleSet::new().with("Web Design", vec!["A"])),
        );
        let gated = Arc::new(GatedStore {
            inner: MemoryStore::with_leads(five_web_leads()),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let engine = Arc::new(Engine::new(rules, gated.clone()));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(&opts()).await }
        });
        gated.entered.notified().await;
        assert!(engine.is_running());

        let second = engine.run(&opts()).await;
        assert!(matches!(second, Err(AssignError::RunInProgress)));

        gated.release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.assigned, 5);
        assert!(!engine.is_running());
    }
}
