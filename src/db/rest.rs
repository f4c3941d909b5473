//! PostgREST-compatible store (hosted Postgres behind a REST data API)

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    classify, AccessLog, AccessLogQuery, Lead, LeadQuery, LeadStore, NewLead, PortalAccess, StoreError,
};
use crate::config::StoreConfig;
use crate::http::{HttpClient, Method, Request, Response};

#[derive(Clone)]
pub struct RestStore {
    client: HttpClient,
    base_url: String,
    key: String,
    leads_table: String,
    access_logs_table: String,
    portal_access_table: String,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: HttpClient::new(Some(config.timeout())),
            base_url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            leads_table: config.leads_table.clone(),
            access_logs_table: config.access_logs_table.clone(),
            portal_access_table: config.portal_access_table.clone(),
        }
    }

    fn request(&self, method: Method, table: &str) -> Request {
        Request::new(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", self.key.as_str())
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Content-Type", "application/json")
    }

    fn ensure_success(response: Response) -> Result<Response, StoreError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(StoreError::Upstream {
                status: response.status,
                body: response.body,
            })
        }
    }

    fn decode_rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StoreError> {
        let response = Self::ensure_success(response)?;
        if response.body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&response.body)?)
    }
}

/// Strip characters that would break a PostgREST `or=(...)` filter
fn sanitize_search(search: &str) -> String {
    search
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '"' | '\\' | '*'))
        .collect()
}

/// PostgREST filter for a case-insensitive substring match on any lead column
fn search_filter(search: &str) -> String {
    let term = sanitize_search(search);
    format!(
        "(full_name.ilike.*{term}*,email.ilike.*{term}*,project_slug.ilike.*{term}*)"
    )
}

#[async_trait]
impl LeadStore for RestStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut body = serde_json::to_value(lead)?;
        body["last_seen_at"] = json!(now);

        let response = self
            .client
            .send(
                self.request(Method::Post, &self.leads_table)
                    .header("Prefer", "return=minimal")
                    .json(body),
            )
            .await?;

        classify::classify_insert(response.status, &response.body)
    }

    async fn touch_lead(&self, email: &str, project_slug: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .send(
                self.request(Method::Patch, &self.leads_table)
                    .query("email", format!("eq.{}", email))
                    .query("project_slug", format!("eq.{}", project_slug))
                    .header("Prefer", "return=minimal")
                    .json(json!({ "last_seen_at": Utc::now() })),
            )
            .await?;

        Self::ensure_success(response).map(|_| ())
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let mut request = self
            .request(Method::Get, &self.leads_table)
            .query("select", "id,project_slug,full_name,email,phone,created_at,last_seen_at")
            .query("order", "created_at.desc")
            .query("limit", query.limit().to_string())
            .query("offset", query.offset().to_string());

        if let Some(slug) = &query.project_slug {
            request = request.query("project_slug", format!("eq.{}", slug));
        }
        if let Some(search) = &query.search {
            request = request.query("or", search_filter(search));
        }

        let response = self.client.send(request).await?;
        Self::decode_rows(response)
    }

    async fn insert_access_logs(&self, logs: &[AccessLog]) -> Result<(), StoreError> {
        if logs.is_empty() {
            return Ok(());
        }

        // ids are assigned by the database
        let rows: Vec<serde_json::Value> = logs
            .iter()
            .map(|log| -> Result<serde_json::Value, serde_json::Error> {
                let mut row = serde_json::to_value(log)?;
                if let Some(obj) = row.as_object_mut() {
                    obj.remove("id");
                }
                Ok(row)
            })
            .collect::<Result<_, _>>()?;

        let response = self
            .client
            .send(
                self.request(Method::Post, &self.access_logs_table)
                    .header("Prefer", "return=minimal")
                    .json(serde_json::Value::Array(rows)),
            )
            .await?;

        Self::ensure_success(response).map(|_| ())
    }

    async fn recent_access_logs(&self, query: &AccessLogQuery) -> Result<Vec<AccessLog>, StoreError> {
        let mut request = self
            .request(Method::Get, &self.access_logs_table)
            .query("select", "*")
            .query("order", "created_at.desc")
            .query("limit", query.limit().to_string())
            .query("offset", query.offset().to_string());

        if let Some(country) = &query.country_code {
            request = request.query("country_code", format!("eq.{}", country));
        }

        let response = self.client.send(request).await?;
        Self::decode_rows(response)
    }

    async fn insert_portal_access(&self, access: &PortalAccess) -> Result<(), StoreError> {
        let response = self
            .client
            .send(
                self.request(Method::Post, &self.portal_access_table)
                    .header("Prefer", "return=minimal")
                    .json(serde_json::to_value(access)?),
            )
            .await?;

        Self::ensure_success(response).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_filter_covers_all_columns() {
        assert_eq!(
            search_filter("jane"),
            "(full_name.ilike.*jane*,email.ilike.*jane*,project_slug.ilike.*jane*)"
        );
    }

    #[test]
    fn search_filter_drops_syntax_characters() {
        assert_eq!(sanitize_search("a,b(c)\"d*"), "abcd");
    }

    #[test]
    fn failed_reads_keep_upstream_details() {
        let response = Response {
            status: 401,
            body: r#"{"message":"Invalid API key"}"#.to_string(),
        };
        match RestStore::decode_rows::<Lead>(response) {
            Err(StoreError::Upstream { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("expected upstream error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn decodes_postgrest_rows() {
        let response = Response {
            status: 200,
            body: r#"[{"id":7,"project_slug":"acme","full_name":"Jane Doe","email":"jane@x.com","phone":null,"created_at":"2025-01-02T03:04:05.123456+00:00"}]"#.to_string(),
        };
        let leads = RestStore::decode_rows::<Lead>(response).unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, Some(7));
        assert!(leads[0].last_seen_at.is_none());
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = RestStore::new(&StoreConfig {
            url: format!("http://{}", addr),
            key: "service-key".into(),
            timeout_secs: 1,
            ..Default::default()
        });
        let lead = NewLead::new("acme", "Jane Doe", "jane@x.com", None);

        let started = std::time::Instant::now();
        let result = crate::db::submit_lead(&store, &lead).await;
        assert!(matches!(result, Err(StoreError::Timeout)), "{:?}", result);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
