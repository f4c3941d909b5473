//! Page-view access logging for the static site
//!
//! Wraps the static file service. Every GET of a page (not an asset) becomes
//! an access-log row queued on the write buffer; the response never waits
//! on the store.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request},
};
use futures::future::BoxFuture;
use std::{net::SocketAddr, sync::Arc, task::{Context, Poll}};
use tower::{Layer, Service};
use tracing::debug;

use crate::db::AccessLog;
use crate::geoip::{self, GeoLocation, UNKNOWN_COUNTRY};
use super::AppState;

/// Asset directories that are never logged
const ASSET_PREFIXES: &[&str] = &["/images/", "/css/", "/js/"];

/// Asset suffixes that are never logged
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".svg", ".gif", ".ico", ".css", ".js"];

pub fn is_asset(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    ASSET_PREFIXES.iter().any(|p| lower.starts_with(p))
        || ASSET_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn get_real_ip(headers: &HeaderMap, fallback_ip: &str) -> String {
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }

    // First entry of the chain is the original client
    if let Some(first) = header_str(headers, "x-forwarded-for").and_then(|ips| ips.split(',').next()) {
        let ip = first.trim();
        if !ip.is_empty() {
            return ip.to_string();
        }
    }

    fallback_ip.to_string()
}

/// Edge-resolved location, when the proxy sent one
pub fn edge_geo(headers: &HeaderMap) -> Option<GeoLocation> {
    header_str(headers, "x-nf-geo").and_then(geoip::from_edge_header)
}

/// Request id from the edge, or a fresh one
pub fn request_id(headers: &HeaderMap) -> String {
    header_str(headers, "x-nf-request-id")
        .or_else(|| header_str(headers, "x-request-id"))
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Build the access-log row for a page view
fn page_view(state: &AppState, path: &str, headers: &HeaderMap, fallback_ip: &str) -> AccessLog {
    let geo = edge_geo(headers)
        .or_else(|| state.geoip.lookup(&get_real_ip(headers, fallback_ip)))
        .unwrap_or_default();

    let mut log = AccessLog::new(path);
    log.country_code = Some(geo.country_code.unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()));
    log.country_name = geo.country_name;
    log.city = geo.city;
    log.timezone = geo.timezone;
    log.referrer = header_str(headers, "referer").map(str::to_string);
    log.user_agent = header_str(headers, "user-agent").map(str::to_string);
    log.request_id = Some(request_id(headers));
    log
}

/// Layer for page-view logging
#[derive(Clone)]
pub struct AccessLogLayer {
    state: Arc<AppState>,
}

impl AccessLogLayer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogMiddleware {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Middleware service for page-view logging
#[derive(Clone)]
pub struct AccessLogMiddleware<S> {
    inner: S,
    state: Arc<AppState>,
}

impl<S> Service<Request<Body>> for AccessLogMiddleware<S>
where
    S: Service<Request<Body>> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let path = request.uri().path();

        if request.method() == Method::GET && !is_asset(path) {
            let fallback_ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let log = page_view(&self.state, path, request.headers(), &fallback_ip);
            debug!(path = %path, country = ?log.country_code, "Page view");

            // Write buffer is unbounded; this never blocks
            if self.state.write_tx.send(log).is_err() {
                debug!("Access-log buffer closed, dropping page view");
            }
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn assets_are_skipped() {
        assert!(is_asset("/images/hero.webp"));
        assert!(is_asset("/css/site.css"));
        assert!(is_asset("/js/app.js"));
        assert!(is_asset("/logo.PNG"));
        assert!(!is_asset("/"));
        assert!(!is_asset("/projects/acme/"));
        assert!(!is_asset("/contact.html"));
    }

    #[test]
    fn real_ip_prefers_proxy_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_real_ip(&headers, "10.0.0.1"), "10.0.0.1");
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.2"));
        assert_eq!(get_real_ip(&headers, "10.0.0.1"), "203.0.113.7");
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(get_real_ip(&headers, "10.0.0.1"), "198.51.100.4");
    }

    #[test]
    fn request_id_order() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers).len(), 36);
        headers.insert("x-request-id", HeaderValue::from_static("req-2"));
        assert_eq!(request_id(&headers), "req-2");
        headers.insert("x-nf-request-id", HeaderValue::from_static("nf-1"));
        assert_eq!(request_id(&headers), "nf-1");
    }
}
