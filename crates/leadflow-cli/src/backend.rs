//! Backend selection: the local DuckDB file or the hosted REST API.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use leadflow_store::{DuckStore, EmployeeDirectory, LeadStore, RuleSource, RuleStore};
use leadflow_sync::RestClient;
use tracing::info;

pub enum Backend {
    Local(Arc<DuckStore>),
    Remote(Arc<RestClient>),
}

impl Backend {
    /// Use the REST API when both URL and key are set, otherwise the DuckDB file.
    pub fn connect(db: &Path, api_url: Option<&str>, api_key: Option<&str>) -> anyhow::Result<Self> {
        match (api_url, api_key) {
            (Some(url), Some(key)) => {
                info!(url, "using hosted backend");
                Ok(Self::Remote(Arc::new(RestClient::new(url.to_string(), key.to_string()))))
            }
            (Some(_), None) => bail!("--api-url requires --api-key (or LEADFLOW_API_KEY)"),
            _ => {
                let store = DuckStore::open_persistent(db)
                    .with_context(|| format!("opening {}", db.display()))?;
                info!(db = %db.display(), "using local database");
                Ok(Self::Local(Arc::new(store)))
            }
        }
    }

    /// The local store, for commands that only make sense against it.
    pub fn local(&self, command: &str) -> anyhow::Result<&DuckStore> {
        match self {
            Self::Local(store) => Ok(store),
            Self::Remote(_) => bail!("`{command}` only works against a local database"),
        }
    }

    pub fn rule_source(&self) -> Arc<dyn RuleSource> {
        match self {
            Self::Local(s) => s.clone(),
            Self::Remote(c) => c.clone(),
        }
    }

    pub fn rule_store(&self) -> Arc<dyn RuleStore> {
        match self {
            Self::Local(s) => s.clone(),
            Self::Remote(c) => c.clone(),
        }
    }

    pub fn lead_store(&self) -> Arc<dyn LeadStore> {
        match self {
            Self::Local(s) => s.clone(),
            Self::Remote(c) => c.clone(),
        }
    }

    pub fn directory(&self) -> Arc<dyn EmployeeDirectory> {
        match self {
            Self::Local(s) => s.clone(),
            Self::Remote(c) => c.clone(),
        }
    }
}
