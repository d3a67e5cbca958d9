//! DuckDB storage for leads, the employee directory, and daily rule snapshots.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::NaiveDate;
use duckdb::{Connection, params};
use leadflow_core::{Employee, Lead, RuleSet, RuleSnapshot};
use tracing::{debug, info};

use crate::StoreError;
use crate::traits::{EmployeeDirectory, LeadStore, RuleSource, RuleStore};

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS leads (
        id          VARCHAR PRIMARY KEY,
        name        VARCHAR,
        service     VARCHAR NOT NULL,
        assigned_to VARCHAR,
        created_at  VARCHAR
    );
    CREATE TABLE IF NOT EXISTS employees (
        id     VARCHAR PRIMARY KEY,
        name   VARCHAR NOT NULL,
        active BOOLEAN NOT NULL DEFAULT true
    );
    CREATE TABLE IF NOT EXISTS assignment_rules (
        day      DATE PRIMARY KEY,
        rules    VARCHAR NOT NULL,
        saved_at TIMESTAMP NOT NULL DEFAULT current_timestamp
    );
";

/// DuckDB-backed CRM store.
///
/// Three tables:
/// - `leads`: one row per lead; `assigned_to` is the only column a run writes
/// - `employees`: the directory rule snapshots are validated against
/// - `assignment_rules`: one JSON rule document per calendar day
///
/// Leads are returned in `created_at` order, then insertion order, so repeated
/// runs over the same data rotate identically.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory database with the schema created.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent database at the given path.
    ///
    /// Creating the schema is idempotent, so reopening an existing file keeps
    /// its data.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Other(format!("mutex poisoned: {e}")))
    }

    // ── Imports ──

    /// Import leads from a JSON, CSV, or Parquet file.
    ///
    /// Columns are matched by name; absent optional columns are left NULL.
    /// Leads whose id already exists are left untouched. Returns the number of
    /// new rows.
    pub fn import_leads(&self, path: &Path) -> Result<usize, StoreError> {
        let inserted = self.import_into("leads", path)?;
        info!(inserted, path = %path.display(), "imported leads");
        Ok(inserted)
    }

    /// Import the employee directory from a JSON, CSV, or Parquet file.
    pub fn import_employees(&self, path: &Path) -> Result<usize, StoreError> {
        let inserted = self.import_into("employees", path)?;
        info!(inserted, path = %path.display(), "imported employees");
        Ok(inserted)
    }

    fn import_into(&self, table: &str, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            return Err(StoreError::ImportNotFound(path.to_path_buf()));
        }
        let reader = reader_for(path)?;
        let sql = format!("INSERT OR IGNORE INTO {table} BY NAME SELECT * FROM {reader}");
        Ok(self.conn()?.execute(&sql, [])?)
    }

    /// Insert leads directly.
    pub fn insert_leads(&self, leads: &[Lead]) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO leads (id, name, service, assigned_to, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )?;
        let mut inserted = 0;
        for lead in leads {
            inserted += stmt.execute(params![
                lead.id,
                lead.name,
                lead.service,
                lead.assigned_to,
                lead.created_at
            ])?;
        }
        Ok(inserted)
    }

    /// Insert employees directly.
    pub fn insert_employees(&self, employees: &[Employee]) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO employees (id, name, active) VALUES (?, ?, ?)")?;
        let mut inserted = 0;
        for emp in employees {
            inserted += stmt.execute(params![emp.id, emp.name, emp.active])?;
        }
        Ok(inserted)
    }

    // ── Counts ──

    /// Number of rows in the `leads` table.
    pub fn lead_count(&self) -> Result<usize, StoreError> {
        self.count("SELECT count(*)::BIGINT FROM leads")
    }

    /// Number of leads with no handler.
    pub fn unassigned_count(&self) -> Result<usize, StoreError> {
        self.count(
            "SELECT count(*)::BIGINT FROM leads
             WHERE assigned_to IS NULL OR trim(assigned_to) = ''",
        )
    }

    fn count(&self, sql: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // ── Rules ──

    /// Days that have a saved rule snapshot, newest first.
    pub fn snapshot_days(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT day::VARCHAR FROM assignment_rules ORDER BY day DESC")?;
        let days = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        days.iter()
            .map(|d| {
                d.parse::<NaiveDate>()
                    .map_err(|e| StoreError::Other(format!("bad snapshot day {d:?}: {e}")))
            })
            .collect()
    }

    // ── Analytics ──

    /// Lead counts per handler and service, unassigned leads grouped under
    /// `(unassigned)`.
    ///
    /// Returns rows with columns `(handler, employee, service, leads)`.
    pub fn workload_summary(&self) -> Result<Vec<RecordBatch>, StoreError> {
        self.query_arrow(
            "SELECT
                coalesce(nullif(trim(l.assigned_to), ''), '(unassigned)') AS handler,
                any_value(e.name) AS employee,
                l.service,
                count(*)::BIGINT AS leads
             FROM leads l
             LEFT JOIN employees e ON e.id = l.assigned_to
             GROUP BY ALL
             ORDER BY handler, l.service",
        )
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    // ── Sync bodies for the trait impls ──

    fn load_leads(&self) -> Result<Vec<Lead>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, service, assigned_to, name, created_at
             FROM leads
             ORDER BY created_at NULLS LAST, rowid",
        )?;
        let leads = stmt
            .query_map([], |row| {
                Ok(Lead {
                    id: row.get(0)?,
                    service: row.get(1)?,
                    assigned_to: row.get(2)?,
                    name: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = leads.len(), "fetched leads");
        Ok(leads)
    }

    fn set_handler(&self, lead_id: &str, handler: &str) -> Result<(), StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE leads SET assigned_to = ?
             WHERE id = ?
               AND (assigned_to IS NULL OR trim(assigned_to) = '' OR assigned_to = ?)",
            params![handler, lead_id, handler],
        )?;
        if changed == 0 {
            return Err(StoreError::LeadUnavailable(lead_id.to_string()));
        }
        Ok(())
    }

    fn load_rules(&self, day: NaiveDate) -> Result<Option<RuleSet>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT rules FROM assignment_rules WHERE day = ?::DATE")?;
        let mut rows = stmt.query([day.to_string()])?;
        let json: Option<String> = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        json.map(|j| RuleSet::from_json(&j))
            .transpose()
            .map_err(StoreError::from)
    }

    fn store_rules(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO assignment_rules (day, rules, saved_at)
             VALUES (?::DATE, ?, current_timestamp)",
            params![snapshot.day.to_string(), snapshot.rules.to_json()],
        )?;
        info!(day = %snapshot.day, services = snapshot.rules.len(), "saved rule snapshot");
        Ok(())
    }

    fn load_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, active FROM employees ORDER BY id")?;
        let employees = stmt
            .query_map([], |row| {
                Ok(Employee {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    active: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(employees)
    }
}

/// DuckDB table function reading `path`, chosen by file extension.
fn reader_for(path: &Path) -> Result<String, StoreError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let func = match ext.as_str() {
        "json" | "ndjson" | "jsonl" => "read_json_auto",
        "csv" => "read_csv_auto",
        "parquet" => "read_parquet",
        _ => return Err(StoreError::UnsupportedFormat(ext)),
    };
    let quoted = path.display().to_string().replace('\'', "''");
    Ok(format!("{func}('{quoted}')"))
}

#[async_trait]
impl LeadStore for DuckStore {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, StoreError> {
        self.load_leads()
    }

    async fn assign_lead(&self, lead_id: &str, handler: &str) -> Result<(), StoreError> {
        self.set_handler(lead_id, handler)
    }
}

#[async_trait]
impl RuleSource for DuckStore {
    async fn rules_for(&self, day: NaiveDate) -> Result<Option<RuleSet>, StoreError> {
        self.load_rules(day)
    }
}

#[async_trait]
impl RuleStore for DuckStore {
    async fn save_rules(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError> {
        self.store_rules(snapshot)
    }
}

#[async_trait]
impl EmployeeDirectory for DuckStore {
    async fn employees(&self) -> Result<Vec<Employee>, StoreError> {
        self.load_employees()
    }
}
