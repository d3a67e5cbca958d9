mod backend;
mod display;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use leadflow_core::{CategoryMatch, RuleSet, RuleSnapshot};
use leadflow_engine::{AssignError, CancellationToken, Engine, RunOptions};
use tracing::{info, warn};

use backend::Backend;

#[derive(Parser, Debug)]
#[command(name = "leadflow", version, about = "Round-robin lead assignment for the CRM")]
struct Cli {
    /// Local DuckDB database file.
    #[arg(long, global = true, env = "LEADFLOW_DB", default_value = "leadflow.duckdb")]
    db: PathBuf,

    /// Hosted backend URL. When set (with a key), the REST API is used instead of --db.
    #[arg(long, global = true, env = "LEADFLOW_API_URL")]
    api_url: Option<String>,

    #[arg(long, global = true, env = "LEADFLOW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the local database and its tables.
    Init,
    /// Import leads from a JSON, CSV, or Parquet file.
    ImportLeads { file: PathBuf },
    /// Import the employee directory from a JSON, CSV, or Parquet file.
    ImportEmployees { file: PathBuf },
    /// Save the rule snapshot for a day from a JSON file.
    Configure {
        /// Rule document: {"Service": ["employee-id", ...], ...}
        #[arg(long)]
        rules: PathBuf,
        /// Defaults to today.
        #[arg(long)]
        day: Option<NaiveDate>,
        /// Refuse to save when a rule names an unknown or inactive employee.
        #[arg(long)]
        strict: bool,
    },
    /// Print the rule snapshot for a day.
    ShowConfig {
        #[arg(long, conflicts_with = "list")]
        day: Option<NaiveDate>,
        /// List every day with saved rules instead (local database only).
        #[arg(long)]
        list: bool,
    },
    /// Assign every unassigned lead using the day's rules.
    Run {
        #[arg(long)]
        day: Option<NaiveDate>,
        /// Plan and report without writing.
        #[arg(long)]
        dry_run: bool,
        /// Extra attempts per failed lead write.
        #[arg(long, default_value_t = 0)]
        retries: u32,
        /// Milliseconds between retries.
        #[arg(long, default_value_t = 250)]
        retry_backoff_ms: u64,
        /// Match services case- and whitespace-insensitively.
        #[arg(long)]
        normalize_categories: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List leads.
    Leads {
        #[arg(long)]
        unassigned: bool,
    },
    /// List the employee directory.
    Employees,
    /// Lead counts per handler and service.
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    info!("leadflow v{}", env!("CARGO_PKG_VERSION"));

    let backend = Backend::connect(&cli.db, cli.api_url.as_deref(), cli.api_key.as_deref())?;

    match cli.command {
        Command::Init => {
            let store = backend.local("init")?;
            println!(
                "Database ready at {} ({} leads)",
                cli.db.display(),
                store.lead_count()?
            );
        }
        Command::ImportLeads { file } => {
            let store = backend.local("import-leads")?;
            let inserted = store
                .import_leads(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("Imported {inserted} new leads ({} total)", store.lead_count()?);
        }
        Command::ImportEmployees { file } => {
            let store = backend.local("import-employees")?;
            let inserted = store
                .import_employees(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            println!("Imported {inserted} employees");
        }
        Command::Configure { rules, day, strict } => {
            configure(&backend, &rules, day.unwrap_or_else(today), strict).await?;
        }
        Command::ShowConfig { list: true, .. } => {
            let days = backend.local("show-config --list")?.snapshot_days()?;
            if days.is_empty() {
                println!("No assignment rules saved");
            }
            for day in days {
                println!("{day}");
            }
        }
        Command::ShowConfig { day, .. } => {
            let day = day.unwrap_or_else(today);
            match backend.rule_source().rules_for(day).await? {
                Some(rules) => display::print_rules(day, &rules),
                None => println!("No assignment rules saved for {day}"),
            }
        }
        Command::Run {
            day,
            dry_run,
            retries,
            retry_backoff_ms,
            normalize_categories,
            json,
        } => {
            let opts = RunOptions {
                day: day.unwrap_or_else(today),
                matching: if normalize_categories {
                    CategoryMatch::Normalized
                } else {
                    CategoryMatch::Exact
                },
                dry_run,
                max_write_attempts: retries.saturating_add(1),
                retry_backoff: Duration::from_millis(retry_backoff_ms),
                cancel: CancellationToken::new(),
            };
            run(&backend, opts, json).await?;
        }
        Command::Leads { unassigned } => {
            let mut leads = backend.lead_store().fetch_leads().await?;
            if unassigned {
                leads.retain(|l| l.is_unassigned());
            }
            display::print_leads(&leads)?;
        }
        Command::Employees => {
            let employees = backend.directory().employees().await?;
            display::print_employees(&employees)?;
        }
        Command::Summary => {
            let store = backend.local("summary")?;
            display::print_batches(&store.workload_summary()?)?;
            println!("{} of {} leads unassigned", store.unassigned_count()?, store.lead_count()?);
        }
    }

    Ok(())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

async fn configure(
    backend: &Backend,
    path: &std::path::Path,
    day: NaiveDate,
    strict: bool,
) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let rules = RuleSet::from_json(&json).with_context(|| format!("parsing {}", path.display()))?;

    if !rules.has_usable_rules() {
        warn!(%day, "no service has any employees; runs for this day will fail");
    }

    let employees = backend.directory().employees().await?;
    if employees.is_empty() {
        warn!("employee directory is empty; skipping handler validation");
    } else {
        let active: HashSet<&str> = employees
            .iter()
            .filter(|e| e.active)
            .map(|e| e.id.as_str())
            .collect();
        let unknown = rules.unknown_handlers(&active);
        for (service, handler) in &unknown {
            warn!(%service, %handler, "employee is unknown or inactive");
        }
        if strict && !unknown.is_empty() {
            bail!("{} rule entries name unknown or inactive employees", unknown.len());
        }
    }

    backend
        .rule_store()
        .save_rules(&RuleSnapshot { day, rules: rules.clone() })
        .await?;
    display::print_rules(day, &rules);
    Ok(())
}

async fn run(backend: &Backend, opts: RunOptions, json: bool) -> anyhow::Result<()> {
    let cancel = opts.cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current write");
            cancel.cancel();
        }
    });

    let engine = Engine::new(backend.rule_source(), backend.lead_store());
    let result = engine.run(&opts).await;
    ctrl_c.abort();

    let report = match result {
        Ok(report) => report,
        Err(e @ (AssignError::ConfigurationMissing { .. } | AssignError::ConfigurationEmpty { .. })) => {
            bail!("{e}; save rules with `leadflow configure --day {}`", opts.day)
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::print_report(&report, true)?;
    }
    Ok(())
}
