//! SQLite schema definitions

pub const CREATE_LEADS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS portal_leads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_slug TEXT NOT NULL,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT,
    created_at BIGINT NOT NULL,
    last_seen_at BIGINT,
    UNIQUE (email, project_slug)
)
"#;

pub const CREATE_ACCESS_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS site_access_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    country_code TEXT,
    country_name TEXT,
    city TEXT,
    timezone TEXT,
    path TEXT,
    referrer TEXT,
    user_agent TEXT,
    request_id TEXT,
    created_at BIGINT NOT NULL
)
"#;

pub const CREATE_PORTAL_ACCESS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS portal_access_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_slug TEXT NOT NULL,
    full_name TEXT,
    email TEXT,
    accessed_at BIGINT NOT NULL
)
"#;

// Admin listing is newest first
pub const CREATE_INDEX_LEADS_CREATED: &str =
    "CREATE INDEX IF NOT EXISTS idx_leads_created ON portal_leads(created_at DESC)";

pub const CREATE_INDEX_LEADS_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_leads_project ON portal_leads(project_slug, created_at DESC)";

pub const CREATE_INDEX_LOGS_CREATED: &str =
    "CREATE INDEX IF NOT EXISTS idx_logs_created ON site_access_logs(created_at DESC)";
