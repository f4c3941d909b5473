//! SQLite-backed store for local development and tests

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};

use super::{
    classify, schema, AccessLog, AccessLogQuery, Lead, LeadQuery, LeadStore, NewLead, PortalAccess,
    StoreError,
};
use crate::config::StoreConfig;

type LeadRow = (i64, String, String, String, Option<String>, i64, Option<i64>);

type AccessLogRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.url)).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database, migrated and ready
    pub async fn in_memory() -> Result<Self> {
        // A single long-lived connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_LEADS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_ACCESS_LOGS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_PORTAL_ACCESS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_LEADS_CREATED)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_LEADS_PROJECT)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_LOGS_CREATED)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Route database errors through the shared duplicate classifier
fn classify_db_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() || classify::looks_like_duplicate(db_err.message()) {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl LeadStore for SqliteStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO portal_leads (project_slug, full_name, email, phone, created_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead.project_slug)
        .bind(&lead.full_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;

        Ok(())
    }

    async fn touch_lead(&self, email: &str, project_slug: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE portal_leads SET last_seen_at = ? WHERE email = ? AND project_slug = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(email)
            .bind(project_slug)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, project_slug, full_name, email, phone, created_at, last_seen_at FROM portal_leads WHERE 1 = 1",
        );

        if let Some(slug) = &query.project_slug {
            qb.push(" AND project_slug = ").push_bind(slug.clone());
        }
        if let Some(search) = &query.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (full_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR email LIKE ")
                .push_bind(pattern.clone())
                .push(" OR project_slug LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let rows = qb.build_query_as::<LeadRow>().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, project_slug, full_name, email, phone, created_at, last_seen_at)| Lead {
                id: Some(id),
                project_slug,
                full_name,
                email,
                phone,
                created_at: from_millis(created_at),
                last_seen_at: last_seen_at.map(from_millis),
            })
            .collect())
    }

    async fn insert_access_logs(&self, logs: &[AccessLog]) -> Result<(), StoreError> {
        if logs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for log in logs {
            sqlx::query(
                r#"
                INSERT INTO site_access_logs (country_code, country_name, city, timezone, path, referrer, user_agent, request_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&log.country_code)
            .bind(&log.country_name)
            .bind(&log.city)
            .bind(&log.timezone)
            .bind(&log.path)
            .bind(&log.referrer)
            .bind(&log.user_agent)
            .bind(&log.request_id)
            .bind(log.created_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn recent_access_logs(&self, query: &AccessLogQuery) -> Result<Vec<AccessLog>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, country_code, country_name, city, timezone, path, referrer, user_agent, request_id, created_at FROM site_access_logs WHERE 1 = 1",
        );
        if let Some(country) = &query.country_code {
            qb.push(" AND country_code = ").push_bind(country.clone());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let rows = qb.build_query_as::<AccessLogRow>().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, country_code, country_name, city, timezone, path, referrer, user_agent, request_id, created_at)| {
                    AccessLog {
                        id: Some(id),
                        country_code,
                        country_name,
                        city,
                        timezone,
                        path,
                        referrer,
                        user_agent,
                        request_id,
                        created_at: from_millis(created_at),
                    }
                },
            )
            .collect())
    }

    async fn insert_portal_access(&self, access: &PortalAccess) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO portal_access_logs (project_slug, full_name, email, accessed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&access.project_slug)
        .bind(&access.full_name)
        .bind(&access.email)
        .bind(access.accessed_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteStore {
    #[cfg(test)]
    pub(crate) async fn portal_access_rows(&self) -> Vec<(String, Option<String>, Option<String>)> {
        sqlx::query_as("SELECT project_slug, full_name, email FROM portal_access_logs ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .unwrap()
    }
}
