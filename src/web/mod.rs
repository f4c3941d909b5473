//! Web server module

mod error;
mod middleware;
mod routes;

pub use error::ApiError;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::{any::Any, net::SocketAddr, sync::Arc};
use tower::Layer;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db::{SharedStore, WriteSender};
use crate::geoip::SharedGeoIp;
use crate::github::ProjectRecords;
use crate::mail::Dispatcher;
use middleware::AccessLogLayer;

pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    pub dispatcher: Dispatcher,
    pub projects: Option<Arc<dyn ProjectRecords>>,
    pub geoip: SharedGeoIp,
    pub write_tx: WriteSender,
}

const ALLOW_HEADERS: &str = "Content-Type, x-admin-key, x-log-token";
const ALLOW_METHODS: &str = "GET, POST, OPTIONS";

/// Turn a handler panic into the JSON error envelope
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Handler panicked: {}", details);
    ApiError::Internal(details).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    // Static site, with page views logged
    let site = AccessLogLayer::new(state.clone()).layer(ServeDir::new(&state.config.server.public_dir));

    Router::new()
        .route("/save-leads", any(routes::save_leads))
        .route("/log-access", any(routes::log_access))
        .route("/get-portal-leads", any(routes::get_portal_leads))
        .route("/get-access-logs", any(routes::get_access_logs))
        .route("/updateProjectStatus", any(routes::update_project_status))
        .route("/project-status", any(routes::project_status))
        .route("/send-portal-access", any(routes::send_portal_access))
        .route("/log-portal-visit", any(routes::log_portal_visit))
        .fallback_service(site)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
}

pub async fn start_server(state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.http_port);
    let app = router(state);

    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;

    Ok(())
}
