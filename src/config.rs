//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub mail: MailConfig,
    pub admin: AdminConfig,
    pub brand: BrandConfig,
    pub github: GitHubConfig,
    pub geoip: GeoIpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Directory holding the pre-built static site
    pub public_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8888,
            public_dir: "public".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// "rest" (PostgREST-compatible endpoint) or "sqlite"
    pub driver: String,
    /// Base URL for "rest", database file path for "sqlite"
    pub url: String,
    /// Service key sent as `apikey` and bearer token
    pub key: String,
    /// Ceiling for each store call; a call that exceeds it is a hard failure
    pub timeout_secs: u64,
    /// Table names on the REST endpoint; the SQLite schema is fixed
    pub leads_table: String,
    pub access_logs_table: String,
    pub portal_access_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: "rest".to_string(),
            url: String::new(),
            key: String::new(),
            timeout_secs: 12,
            leads_table: "portal_leads".to_string(),
            access_logs_table: "site_access_logs".to_string(),
            portal_access_table: "portal_access_logs".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    /// Sender for admin notifications, e.g. "Leads <leads@example.com>"
    pub admin_from: String,
    /// Comma-separated admin recipients
    pub admin_to: String,
    /// Sender for client confirmations
    pub client_from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.resend.com/emails".to_string(),
            api_key: String::new(),
            admin_from: String::new(),
            admin_to: String::new(),
            client_from: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Expected `x-admin-key` value for admin endpoints
    pub key: String,
    /// Expected `x-log-token` value for /log-access
    pub log_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    /// Display name; derived from the client sender when empty
    pub name: String,
    pub logo_url: String,
    /// Portal links are `<portal_base_url>/<project>/`
    pub portal_base_url: String,
    pub accent_color: String,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            logo_url: "https://mcmprosolutions.com/images/transparent-logo-2.png".to_string(),
            portal_base_url: "https://mcmprosolutions.com/projects".to_string(),
            accent_color: "#C6A46C".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            token: String::new(),
        }
    }
}

impl GitHubConfig {
    pub fn is_configured(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty() && !self.token.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    pub database: String,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            database: "data/GeoLite2-City.mmdb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Variable names from the serverless deployment, first match wins
const LEGACY_ENV: &[(&str, &[&str])] = &[
    ("store.url", &["SUPABASE_URL"]),
    ("store.key", &["SUPABASE_SERVICE_ROLE_KEY"]),
    ("mail.api_key", &["RESEND_API_KEY"]),
    ("mail.admin_to", &["LEAD_NOTIFY_TO", "LEADS_NOTIFY_TO", "MAIL_TO_ADMIN"]),
    ("mail.admin_from", &["LEAD_NOTIFY_FROM", "LEADS_NOTIFY_FROM", "MAIL_FROM_ADMIN"]),
    ("mail.client_from", &["MAIL_FROM_CLIENT", "LEAD_NOTIFY_FROM"]),
    ("admin.key", &["DASH_ADMIN_KEY", "ADMIN_KEY"]),
    ("admin.log_token", &["SITE_LOG_TOKEN"]),
    ("brand.logo_url", &["BRAND_LOGO_URL"]),
    ("github.owner", &["GITHUB_OWNER"]),
    ("github.repo", &["GITHUB_REPO"]),
    ("github.branch", &["GITHUB_BRANCH"]),
    ("github.token", &["GITHUB_TOKEN"]),
];

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";

        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("PORTAL")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings = builder.build()?;
        let mut config: Config = settings.try_deserialize()?;
        config.apply_legacy_env(|name| std::env::var(name).ok());

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Fill empty keys from the legacy variable names
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (key, names) in LEGACY_ENV {
            let Some(value) = names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
            else {
                continue;
            };

            let slot = match *key {
                "store.url" => &mut self.store.url,
                "store.key" => &mut self.store.key,
                "mail.api_key" => &mut self.mail.api_key,
                "mail.admin_to" => &mut self.mail.admin_to,
                "mail.admin_from" => &mut self.mail.admin_from,
                "mail.client_from" => &mut self.mail.client_from,
                "admin.key" => &mut self.admin.key,
                "admin.log_token" => &mut self.admin.log_token,
                "brand.logo_url" => &mut self.brand.logo_url,
                "github.owner" => &mut self.github.owner,
                "github.repo" => &mut self.github.repo,
                "github.branch" => &mut self.github.branch,
                "github.token" => &mut self.github.token,
                _ => continue,
            };

            // Structured keys win, but built-in defaults do not
            let is_default = match *key {
                "github.branch" => *slot == GitHubConfig::default().branch,
                "brand.logo_url" => *slot == BrandConfig::default().logo_url,
                _ => false,
            };
            if slot.trim().is_empty() || is_default {
                *slot = value;
            }
        }

        self.store.url = self.store.url.trim().trim_end_matches('/').to_string();
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.http_port == 0 {
            anyhow::bail!("Invalid http_port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        // Validate store config
        if self.store.driver != "rest" && self.store.driver != "sqlite" {
            anyhow::bail!("Invalid store driver '{}'. Must be 'rest' or 'sqlite'", self.store.driver);
        }
        if self.store.url.is_empty() {
            anyhow::bail!("Store URL cannot be empty (set store.url or SUPABASE_URL)");
        }
        if self.store.driver == "rest" && self.store.key.is_empty() {
            anyhow::bail!("Store key cannot be empty for the rest driver (set store.key or SUPABASE_SERVICE_ROLE_KEY)");
        }
        if self.store.timeout_secs == 0 {
            anyhow::bail!("Invalid store timeout_secs: 0 is not allowed");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }
}
