//! Portal Leads - client portal backend for a construction consultancy
//!
//! - Captures portal access leads and notifies the team and the client
//! - Logs page views of the static site with visitor geolocation
//! - Normalizes project statuses and commits status changes to the project repo

mod config;
mod db;
mod geoip;
mod github;
mod http;
mod mail;
mod status;
mod web;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = config::Config::load()?;

    // RUST_LOG wins over logging.level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    info!("Starting Portal Leads...");
    info!("Configuration loaded (store driver: {})", config.store.driver);

    // Lead and access-log store
    let store = db::connect(&config.store).await?;
    let write_tx = db::start_write_buffer(store.clone());

    // Initialize GeoIP
    let geoip = Arc::new(geoip::GeoIp::new(&config.geoip.database));
    if geoip.is_available() {
        info!("GeoIP enabled");
    } else {
        info!("GeoIP disabled (database not found), relying on edge headers");
    }

    // Email
    let mailer = mail::ResendMailer::from_config(&config.mail)
        .map(|m| Arc::new(m) as Arc<dyn mail::Mailer>);
    if mailer.is_none() {
        info!("Email disabled (no API key)");
    }
    let dispatcher = mail::Dispatcher::new(mailer, &config.mail, &config.brand);

    // Project records
    let projects = github::GitHubProjects::from_config(&config.github)
        .map(|p| Arc::new(p) as Arc<dyn github::ProjectRecords>);
    if projects.is_none() {
        info!("Project status updates disabled (GitHub not configured)");
    }

    let state = Arc::new(web::AppState {
        config,
        store,
        dispatcher,
        projects,
        geoip,
        write_tx,
    });

    // Start web server (blocking)
    web::start_server(state).await?;

    Ok(())
}
