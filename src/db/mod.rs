//! Lead and access-log storage

mod classify;
mod rest;
mod schema;
mod sqlite;
mod write_buffer;

pub use rest::RestStore;
pub use sqlite::SqliteStore;
pub use write_buffer::{start_write_buffer, WriteSender};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::http::HttpError;

pub const DEFAULT_LEAD_LIMIT: u32 = 100;
pub const MAX_LEAD_LIMIT: u32 = 200;
pub const DEFAULT_LOG_LIMIT: u32 = 10;
pub const MAX_LOG_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The (email, project) pair is already on file
    #[error("lead already exists")]
    Conflict,
    #[error("store returned HTTP {status}")]
    Upstream { status: u16, body: String },
    #[error("store request timed out")]
    Timeout,
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("unexpected store response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<HttpError> for StoreError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout => StoreError::Timeout,
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// A lead as submitted from the portal access form
#[derive(Debug, Clone, Serialize)]
pub struct NewLead {
    pub project_slug: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl NewLead {
    /// Trims every field, lower-cases the email and drops an empty phone
    pub fn new(project_slug: &str, full_name: &str, email: &str, phone: Option<&str>) -> Self {
        Self {
            project_slug: project_slug.trim().to_string(),
            full_name: full_name.split_whitespace().collect::<Vec<_>>().join(" "),
            email: email.trim().to_lowercase(),
            phone: phone
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }
}

/// A stored lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default)]
    pub id: Option<i64>,
    pub project_slug: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Filters for the admin lead listing
#[derive(Debug, Clone, Default)]
pub struct LeadQuery {
    pub project_slug: Option<String>,
    /// Case-insensitive substring over name, email and project
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LeadQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LEAD_LIMIT).min(MAX_LEAD_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// One page view, as recorded by the access logger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLog {
    #[serde(default)]
    pub id: Option<i64>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccessLog {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: None,
            country_code: None,
            country_name: None,
            city: None,
            timezone: None,
            path: Some(path.into()),
            referrer: None,
            user_agent: None,
            request_id: None,
            created_at: Utc::now(),
        }
    }
}

/// One opening of a project portal page
#[derive(Debug, Clone, Serialize)]
pub struct PortalAccess {
    pub project_slug: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub accessed_at: DateTime<Utc>,
}

/// Filters for the admin access-log listing
#[derive(Debug, Clone, Default)]
pub struct AccessLogQuery {
    pub country_code: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AccessLogQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Result of a lead submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadOutcome {
    /// First access for this (email, project) pair
    Created,
    /// Returning visitor
    Duplicate,
}

impl LeadOutcome {
    pub fn is_created(self) -> bool {
        self == LeadOutcome::Created
    }

    pub fn is_duplicate(self) -> bool {
        self == LeadOutcome::Duplicate
    }
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a lead; an existing (email, project) pair yields `StoreError::Conflict`
    async fn insert_lead(&self, lead: &NewLead) -> Result<(), StoreError>;

    /// Refresh `last_seen_at` for an existing lead
    async fn touch_lead(&self, email: &str, project_slug: &str) -> Result<(), StoreError>;

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError>;

    async fn insert_access_logs(&self, logs: &[AccessLog]) -> Result<(), StoreError>;

    async fn recent_access_logs(&self, query: &AccessLogQuery) -> Result<Vec<AccessLog>, StoreError>;

    async fn insert_portal_access(&self, access: &PortalAccess) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn LeadStore>;

/// Insert a lead, folding a conflict into a returning-visitor outcome
pub async fn submit_lead(store: &dyn LeadStore, lead: &NewLead) -> Result<LeadOutcome, StoreError> {
    match store.insert_lead(lead).await {
        Ok(()) => Ok(LeadOutcome::Created),
        Err(StoreError::Conflict) => {
            if let Err(e) = store.touch_lead(&lead.email, &lead.project_slug).await {
                warn!(project = %lead.project_slug, error = %e, "Failed to refresh last_seen_at");
            }
            Ok(LeadOutcome::Duplicate)
        }
        Err(e) => Err(e),
    }
}

/// Open the store selected by `store.driver`
pub async fn connect(config: &StoreConfig) -> Result<SharedStore> {
    match config.driver.as_str() {
        "sqlite" => {
            let store = SqliteStore::new(config).await?;
            store.run_migrations().await?;
            info!("Using SQLite store at {}", config.url);
            Ok(Arc::new(store))
        }
        _ => {
            info!("Using REST store at {}", config.url);
            Ok(Arc::new(RestStore::new(config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lead_is_normalized() {
        let lead = NewLead::new(" acme ", "  Jane   Doe ", " Jane@X.com ", Some("  "));
        assert_eq!(lead.project_slug, "acme");
        assert_eq!(lead.full_name, "Jane Doe");
        assert_eq!(lead.email, "jane@x.com");
        assert_eq!(lead.phone, None);
    }

    #[test]
    fn query_limits_are_bounded() {
        assert_eq!(LeadQuery::default().limit(), 100);
        let big = LeadQuery { limit: Some(5000), ..Default::default() };
        assert_eq!(big.limit(), 200);

        assert_eq!(AccessLogQuery::default().limit(), 10);
        let zero = AccessLogQuery { limit: Some(0), ..Default::default() };
        assert_eq!(zero.limit(), 1);
        let big = AccessLogQuery { limit: Some(99), ..Default::default() };
        assert_eq!(big.limit(), 50);
    }

    #[tokio::test]
    async fn conflict_becomes_duplicate_and_touches() {
        let store = SqliteStore::in_memory().await.unwrap();
        let lead = NewLead::new("acme", "Jane Doe", "jane@x.com", None);

        assert_eq!(submit_lead(&store, &lead).await.unwrap(), LeadOutcome::Created);
        assert_eq!(submit_lead(&store, &lead).await.unwrap(), LeadOutcome::Duplicate);

        let leads = store.list_leads(&LeadQuery::default()).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert!(leads[0].last_seen_at.is_some());
    }
}
