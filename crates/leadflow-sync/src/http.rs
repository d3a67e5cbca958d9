//! HTTP client for the hosted Postgres backend's REST interface.
//!
//! Tables are exposed PostgREST-style under `{base}/rest/v1/{table}` with
//! filters in the query string (`id=eq.L1`).

use async_trait::async_trait;
use chrono::NaiveDate;
use leadflow_core::{Employee, Lead, RuleSet, RuleSnapshot};
use leadflow_store::{EmployeeDirectory, LeadStore, RuleSource, RuleStore, StoreError};
use reqwest::{Request, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const LEAD_COLUMNS: &str = "id,name,service,assigned_to,created_at";
/// POSIX regex for an empty or whitespace-only handler.
const BLANK_PATTERN: &str = r"^\s*$";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SyncError> for StoreError {
    fn from(e: SyncError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// REST client for the `leads`, `employees`, and `assignment_rules` tables.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct HandlerPatch<'a> {
    assigned_to: &'a str,
}

#[derive(Serialize, Deserialize)]
struct RuleRow {
    day: NaiveDate,
    rules: RuleSet,
}

impl RestClient {
    /// Create a client for the given project URL and API key.
    ///
    /// `base_url` should be like `https://project.example.co` (no trailing slash).
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn leads_request(&self) -> Result<Request, SyncError> {
        let req = self
            .authed(self.client.get(self.table_url("leads")))
            .query(&[("select", LEAD_COLUMNS), ("order", "created_at.asc,id.asc")])
            .build()?;
        Ok(req)
    }

    /// PATCH that only matches the lead while it is unassigned (null or
    /// whitespace only) or already held by `handler`, so replays are harmless.
    fn assign_request(&self, lead_id: &str, handler: &str) -> Result<Request, SyncError> {
        let quoted = handler.replace('\\', "\\\\").replace('"', "\\\"");
        let holder_filter = format!(
            "(assigned_to.is.null,assigned_to.match.{BLANK_PATTERN},assigned_to.eq.\"{quoted}\")"
        );
        let req = self
            .authed(self.client.patch(self.table_url("leads")))
            .query(&[
                ("id", format!("eq.{lead_id}")),
                ("or", holder_filter),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&HandlerPatch {
                assigned_to: handler,
            })
            .build()?;
        Ok(req)
    }

    fn rules_request(&self, day: NaiveDate) -> Result<Request, SyncError> {
        let req = self
            .authed(self.client.get(self.table_url("assignment_rules")))
            .query(&[("day", format!("eq.{day}")), ("select", "day,rules".into())])
            .build()?;
        Ok(req)
    }

    fn save_rules_request(&self, snapshot: &RuleSnapshot) -> Result<Request, SyncError> {
        let row = RuleRow {
            day: snapshot.day,
            rules: snapshot.rules.clone(),
        };
        let req = self
            .authed(self.client.post(self.table_url("assignment_rules")))
            .query(&[("on_conflict", "day")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row])
            .build()?;
        Ok(req)
    }

    fn employees_request(&self) -> Result<Request, SyncError> {
        let req = self
            .authed(self.client.get(self.table_url("employees")))
            .query(&[("select", "id,name,active"), ("order", "id.asc")])
            .build()?;
        Ok(req)
    }

    async fn send(&self, req: Request) -> Result<Response, SyncError> {
        debug!(method = %req.method(), url = %req.url(), "sending request");
        let resp = self.client.execute(req).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Fetch all leads, oldest first.
    pub async fn pull_leads(&self) -> Result<Vec<Lead>, SyncError> {
        let resp = self.send(self.leads_request()?).await?;
        let leads: Vec<Lead> = resp.json().await?;
        info!(count = leads.len(), "pulled leads");
        Ok(leads)
    }

    /// Set a lead's handler. Returns `false` when no row matched the filter.
    pub async fn patch_handler(&self, lead_id: &str, handler: &str) -> Result<bool, SyncError> {
        let resp = self.send(self.assign_request(lead_id, handler)?).await?;
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(!rows.is_empty())
    }

    /// Fetch the rule snapshot for a day, if one was saved.
    pub async fn pull_rules(&self, day: NaiveDate) -> Result<Option<RuleSet>, SyncError> {
        let resp = self.send(self.rules_request(day)?).await?;
        let rows: Vec<RuleRow> = resp.json().await?;
        Ok(rows.into_iter().next().map(|r| r.rules))
    }

    /// Upsert the rule snapshot for its day.
    pub async fn push_rules(&self, snapshot: &RuleSnapshot) -> Result<(), SyncError> {
        self.send(self.save_rules_request(snapshot)?).await?;
        info!(day = %snapshot.day, services = snapshot.rules.len(), "pushed rule snapshot");
        Ok(())
    }

    /// Fetch the employee directory.
    pub async fn pull_employees(&self) -> Result<Vec<Employee>, SyncError> {
        let resp = self.send(self.employees_request()?).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl LeadStore for RestClient {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, StoreError> {
        Ok(self.pull_leads().await?)
    }

    async fn assign_lead(&self, lead_id: &str, handler: &str) -> Result<(), StoreError> {
        if self.patch_handler(lead_id, handler).await? {
            Ok(())
        } else {
            Err(StoreError::LeadUnavailable(lead_id.to_string()))
        }
    }
}

#[async_trait]
impl RuleSource for RestClient {
    async fn rules_for(&self, day: NaiveDate) -> Result<Option<RuleSet>, StoreError> {
        Ok(self.pull_rules(day).await?)
    }
}

#[async_trait]
impl RuleStore for RestClient {
    async fn save_rules(&self, snapshot: &RuleSnapshot) -> Result<(), StoreError> {
        Ok(self.push_rules(snapshot).await?)
    }
}

#[async_trait]
impl EmployeeDirectory for RestClient {
    async fn employees(&self) -> Result<Vec<Employee>, StoreError> {
        Ok(self.pull_employees().await?)
    }
}
