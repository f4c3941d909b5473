//! JSON API handlers
//!
//! Every handler is mounted with `any` so it can answer the CORS preflight
//! and report a wrong method itself.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::info;

use super::error::ApiError;
use super::middleware::{edge_geo, header_str, request_id};
use super::AppState;
use crate::db::{self, AccessLog, AccessLogQuery, LeadQuery, NewLead, PortalAccess};
use crate::github::StatusUpdate;
use crate::mail::PortalVisit;
use crate::status::{self, CanonicalStatus, STATUS_OPTIONS};

type ApiResult = Result<Response, ApiError>;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Answers a preflight, or rejects anything other than `allowed`
fn preflight(method: &Method, allowed: Method) -> Result<Option<Response>, ApiError> {
    if method == Method::OPTIONS {
        return Ok(Some(StatusCode::NO_CONTENT.into_response()));
    }
    if *method != allowed {
        let name = if allowed == Method::GET { "GET" } else { "POST" };
        return Err(ApiError::MethodNotAllowed(name));
    }
    Ok(None)
}

/// An empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };
    serde_json::from_slice(raw).map_err(|e| ApiError::InvalidJson(e.to_string()))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// First non-empty of two spellings of the same field
fn either<'a>(first: &'a Option<String>, second: &'a Option<String>) -> Option<&'a str> {
    present(first).or_else(|| present(second))
}

/// Phone numbers arrive as strings or bare numbers
fn phone_text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state.config.admin.key.as_str();
    if expected.is_empty() {
        return Err(ApiError::NotConfigured("ADMIN_KEY"));
    }
    match header_str(headers, "x-admin-key") {
        Some(key) if key == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn parse_number(value: &Option<String>) -> Option<u32> {
    present(value).and_then(|v| v.parse().ok())
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveLeadBody {
    #[serde(rename = "projectSlug")]
    pub project_slug: Option<String>,
    #[serde(rename = "project_slug")]
    pub project_slug_snake: Option<String>,
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
    #[serde(rename = "full_name")]
    pub full_name_snake: Option<String>,
    pub email: Option<String>,
    pub phone: Option<Value>,
}

impl SaveLeadBody {
    pub fn project_slug(&self) -> Option<&str> {
        either(&self.project_slug, &self.project_slug_snake)
    }

    pub fn full_name(&self) -> Option<&str> {
        either(&self.full_name, &self.full_name_snake)
    }
}

/// POST /save-leads
pub async fn save_leads(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::POST)? {
        return Ok(response);
    }

    let body: SaveLeadBody = parse_body(&body)?;
    let mut missing = Vec::new();
    if body.project_slug().is_none() {
        missing.push("projectSlug");
    }
    if body.full_name().is_none() {
        missing.push("fullName");
    }
    if present(&body.email).is_none() {
        missing.push("email");
    }
    let (Some(project_slug), Some(full_name), Some(email)) =
        (body.project_slug(), body.full_name(), present(&body.email))
    else {
        return Err(ApiError::MissingFields(missing));
    };

    let phone = phone_text(&body.phone);
    let lead = NewLead::new(project_slug, full_name, email, phone.as_deref());
    if !is_valid_email(&lead.email) {
        return Err(ApiError::Invalid("Invalid email address".into()));
    }

    let outcome = db::submit_lead(state.store.as_ref(), &lead).await?;
    info!(
        project = %lead.project_slug,
        created = outcome.is_created(),
        "Lead recorded"
    );
    let emails = state.dispatcher.notify(outcome, &lead).await;

    Ok(Json(json!({
        "ok": true,
        "leadCreated": outcome.is_created(),
        "duplicate": outcome.is_duplicate(),
        "emails": emails,
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct LogAccessBody {
    pub path: Option<String>,
    pub referrer: Option<String>,
    #[serde(alias = "userAgent")]
    pub user_agent: Option<String>,
    #[serde(alias = "requestId")]
    pub request_id: Option<String>,
    #[serde(alias = "countryCode")]
    pub country_code: Option<String>,
    #[serde(alias = "countryName")]
    pub country_name: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
}

/// POST /log-access
pub async fn log_access(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::POST)? {
        return Ok(response);
    }

    let token = state.config.admin.log_token.as_str();
    match header_str(&headers, "x-log-token") {
        Some(given) if !token.is_empty() && given == token => {}
        _ => return Err(ApiError::Unauthorized),
    }

    let body: LogAccessBody = parse_body(&body)?;
    let geo = edge_geo(&headers).unwrap_or_default();

    let mut log = AccessLog::new(present(&body.path).unwrap_or("/"));
    log.country_code = present(&body.country_code)
        .map(str::to_string)
        .or(geo.country_code);
    log.country_name = present(&body.country_name)
        .map(str::to_string)
        .or(geo.country_name);
    log.city = present(&body.city).map(str::to_string).or(geo.city);
    log.timezone = present(&body.timezone).map(str::to_string).or(geo.timezone);
    log.referrer = present(&body.referrer)
        .or_else(|| header_str(&headers, "referer"))
        .map(str::to_string);
    log.user_agent = present(&body.user_agent)
        .or_else(|| header_str(&headers, "user-agent"))
        .map(str::to_string);
    log.request_id = Some(
        present(&body.request_id)
            .map(str::to_string)
            .unwrap_or_else(|| request_id(&headers)),
    );

    state.store.insert_access_logs(std::slice::from_ref(&log)).await?;
    Ok(Json(json!({ "ok": true })).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadsParams {
    #[serde(rename = "projectSlug")]
    pub project_slug: Option<String>,
    #[serde(rename = "project_slug")]
    pub project_slug_snake: Option<String>,
    pub q: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// GET /get-portal-leads
pub async fn get_portal_leads(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<LeadsParams>,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::GET)? {
        return Ok(response);
    }
    require_admin(&state, &headers)?;

    let query = LeadQuery {
        project_slug: either(&params.project_slug, &params.project_slug_snake).map(str::to_string),
        search: present(&params.q).map(str::to_string),
        limit: parse_number(&params.limit),
        offset: parse_number(&params.offset),
    };
    let data = state.store.list_leads(&query).await?;
    Ok(Json(json!({ "ok": true, "data": data })).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct AccessLogParams {
    pub country: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// GET /get-access-logs
pub async fn get_access_logs(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<AccessLogParams>,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::GET)? {
        return Ok(response);
    }
    require_admin(&state, &headers)?;

    let query = AccessLogQuery {
        country_code: present(&params.country).map(str::to_uppercase),
        limit: parse_number(&params.limit),
        offset: parse_number(&params.offset),
    };
    let data = state.store.recent_access_logs(&query).await?;
    Ok(Json(json!({ "ok": true, "data": data })).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub slug: Option<String>,
    pub project_status: Option<String>,
    pub project_status_sub: Option<String>,
}

/// POST /updateProjectStatus
pub async fn update_project_status(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::POST)? {
        return Ok(response);
    }
    require_admin(&state, &headers)?;

    let body: StatusBody = parse_body(&body)?;
    let (Some(slug), Some(raw_status)) = (present(&body.slug), present(&body.project_status)) else {
        let mut missing = Vec::new();
        if present(&body.slug).is_none() {
            missing.push("slug");
        }
        if present(&body.project_status).is_none() {
            missing.push("projectStatus");
        }
        return Err(ApiError::MissingFields(missing));
    };
    if !is_valid_slug(slug) {
        return Err(ApiError::Invalid("Invalid slug".into()));
    }
    let Some(canonical) = CanonicalStatus::parse_exact(raw_status) else {
        return Err(ApiError::Invalid(format!("Invalid projectStatus: {}", raw_status)));
    };

    let Some(projects) = state.projects.as_ref() else {
        return Err(ApiError::NotConfigured("GITHUB_TOKEN"));
    };

    let update = StatusUpdate {
        slug: slug.to_string(),
        project_status: canonical.label().to_string(),
        project_status_sub: body.project_status_sub.as_deref().unwrap_or("").trim().to_string(),
    };
    let record = projects.update_status(&update).await?;

    Ok(Json(json!({
        "ok": true,
        "slug": update.slug,
        "projectStatus": update.project_status,
        "projectStatusSub": update.project_status_sub,
        "path": record.path,
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    pub status: Option<String>,
}

/// GET /project-status
pub async fn project_status(method: Method, Query(params): Query<StatusParams>) -> ApiResult {
    if let Some(response) = preflight(&method, Method::GET)? {
        return Ok(response);
    }

    let canonical = status::canonicalize(params.status.as_deref().unwrap_or(""));
    let options: Vec<&str> = STATUS_OPTIONS.iter().map(|s| s.label()).collect();
    Ok(Json(json!({
        "status": canonical,
        "percent": status::progress_percent(canonical),
        "color": canonical.color(),
        "background": status::progress_color(canonical),
        "options": options,
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalAccessBody {
    pub to: Option<String>,
    pub full_name: Option<String>,
    pub portal_url: Option<String>,
    pub project_slug: Option<String>,
}

/// POST /send-portal-access
pub async fn send_portal_access(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::POST)? {
        return Ok(response);
    }
    require_admin(&state, &headers)?;

    let body: PortalAccessBody = parse_body(&body)?;
    let Some(to) = present(&body.to).map(str::to_lowercase) else {
        return Err(ApiError::MissingFields(vec!["to"]));
    };
    if !is_valid_email(&to) {
        return Err(ApiError::Invalid("Invalid email address".into()));
    }
    let portal_url = match (present(&body.portal_url), present(&body.project_slug)) {
        (Some(url), _) => url.to_string(),
        (None, Some(slug)) if is_valid_slug(slug) => state.dispatcher.portal_url(slug),
        (None, Some(_)) => return Err(ApiError::Invalid("Invalid slug".into())),
        (None, None) => return Err(ApiError::MissingFields(vec!["portalUrl"])),
    };

    let full_name = present(&body.full_name).unwrap_or("");
    let Some(sent) = state
        .dispatcher
        .send_portal_access(&to, full_name, &portal_url)
        .await?
    else {
        return Err(ApiError::NotConfigured("RESEND_API_KEY"));
    };

    info!(portal = %portal_url, "Portal access email sent");
    Ok(Json(json!({ "ok": true, "id": sent.id })).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalVisitBody {
    pub project_slug: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub page_url: Option<String>,
}

/// POST /log-portal-visit
pub async fn log_portal_visit(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: Bytes,
) -> ApiResult {
    if let Some(response) = preflight(&method, Method::POST)? {
        return Ok(response);
    }

    let body: PortalVisitBody = parse_body(&body)?;
    let Some(project_slug) = present(&body.project_slug) else {
        return Err(ApiError::MissingFields(vec!["projectSlug"]));
    };

    let visit = PortalVisit {
        project_slug: project_slug.to_string(),
        full_name: present(&body.full_name).map(str::to_string),
        email: present(&body.email).map(str::to_lowercase),
        page_url: present(&body.page_url).map(str::to_string),
    };
    let access = PortalAccess {
        project_slug: visit.project_slug.clone(),
        full_name: visit.full_name.clone(),
        email: visit.email.clone(),
        accessed_at: chrono::Utc::now(),
    };
    state.store.insert_portal_access(&access).await?;
    info!(project = %access.project_slug, "Portal visit recorded");

    let sent = state
        .dispatcher
        .notify_portal_visit(&visit)
        .await
        .map_err(ApiError::Gateway)?;
    let Some(sent) = sent else {
        return Err(ApiError::NotConfigured("RESEND_API_KEY"));
    };

    Ok(Json(json!({ "ok": true, "id": sent.id })).into_response())
}
