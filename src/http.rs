//! Outbound HTTP client shared by the store, mail and GitHub adapters
//!
//! Requests run on the blocking pool through `ureq`. When a ceiling is set
//! the call is abandoned once it elapses and reported as a timeout.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
}

/// Outbound request description
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and raw body; non-2xx statuses are not errors at this layer
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

impl HttpClient {
    /// Client with an optional hard ceiling on each call
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::Agent::config_builder().http_status_as_error(false);
        if let Some(limit) = timeout {
            builder = builder.timeout_global(Some(limit));
        }
        let agent: ureq::Agent = builder.build().into();
        Self { agent, timeout }
    }

    pub async fn send(&self, request: Request) -> Result<Response, HttpError> {
        let agent = self.agent.clone();
        let task = tokio::task::spawn_blocking(move || execute(&agent, request));

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| HttpError::Timeout)?,
            None => task.await,
        };

        joined.map_err(|e| HttpError::Worker(e.to_string()))?
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &Request,
) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (name, value) in &request.query {
        builder = builder.query(name.as_str(), value.as_str());
    }
    builder
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&Value>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(value) => builder.send_json(value),
        None => builder.send_empty(),
    }
}

fn execute(agent: &ureq::Agent, request: Request) -> Result<Response, HttpError> {
    let url = request.url.as_str();
    let result = match request.method {
        Method::Get => with_headers(agent.get(url), &request).call(),
        Method::Post => send_with_body(with_headers(agent.post(url), &request), request.body.as_ref()),
        Method::Patch => send_with_body(with_headers(agent.patch(url), &request), request.body.as_ref()),
        Method::Put => send_with_body(with_headers(agent.put(url), &request), request.body.as_ref()),
    };

    let mut response = result.map_err(map_error)?;
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().map_err(map_error)?;

    Ok(Response { status, body })
}

fn map_error(err: ureq::Error) -> HttpError {
    match err {
        ureq::Error::Timeout(_) => HttpError::Timeout,
        other => HttpError::Transport(other.to_string()),
    }
}
