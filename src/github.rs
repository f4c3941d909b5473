//! Project records tracked in a GitHub repository
//!
//! Each project lives at `projects/<slug>/project.json`. Status updates
//! rewrite only the affected lines so the file keeps its formatting; a key
//! with no rewritable line is set by re-serializing the document.

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::GitHubConfig;
use crate::http::{HttpClient, HttpError, Method, Request};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{action} failed with HTTP {status}")]
    Upstream {
        action: &'static str,
        status: u16,
        body: String,
    },
    #[error("project file is not valid: {0}")]
    InvalidFile(String),
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Status fields written to a project record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub slug: String,
    pub project_status: String,
    pub project_status_sub: String,
}

/// Where the change landed
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedRecord {
    pub path: String,
    pub branch: String,
}

#[async_trait]
pub trait ProjectRecords: Send + Sync {
    async fn update_status(&self, update: &StatusUpdate) -> Result<UpdatedRecord, ProjectError>;
}

pub fn project_path(slug: &str) -> String {
    format!("projects/{}/project.json", slug)
}

/// Replace the string value of `"key": "..."` on its own line.
/// Returns None when no such line exists.
pub fn update_json_line(text: &str, key: &str, value: &str) -> Option<String> {
    let pattern = format!(
        r#"(?m)^([\t ]*"{}"[\t ]*:[\t ]*)"([^"]*)"([\t ]*,?[\t ]*\r?)$"#,
        regex::escape(key)
    );
    let re = Regex::new(&pattern).ok()?;
    if !re.is_match(text) {
        return None;
    }
    let quoted = serde_json::to_string(value).ok()?;
    let updated = re.replacen(text, 1, |caps: &Captures| {
        format!("{}{}{}", &caps[1], quoted, &caps[3])
    });
    Some(updated.into_owned())
}

/// Apply both status fields, falling back to a full rewrite for missing keys
pub fn apply_status_fields(raw: &str, status: &str, sub: &str) -> Result<String, ProjectError> {
    let mut text = raw.to_string();
    let mut missing = Vec::new();

    for (key, value) in [("projectStatus", status), ("projectStatusSub", sub)] {
        match update_json_line(&text, key, value) {
            Some(updated) => text = updated,
            None => missing.push((key, value)),
        }
    }

    if missing.is_empty() {
        return Ok(text);
    }

    let mut doc: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| ProjectError::InvalidFile(e.to_string()))?;
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| ProjectError::InvalidFile("top level is not an object".into()))?;
    for (key, value) in missing {
        obj.insert(key.to_string(), json!(value));
    }

    let mut out = serde_json::to_string_pretty(&doc)
        .map_err(|e| ProjectError::InvalidFile(e.to_string()))?;
    if raw.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    content: String,
}

pub struct GitHubProjects {
    client: HttpClient,
    api_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl GitHubProjects {
    /// None unless owner, repo and token are all set
    pub fn from_config(config: &GitHubConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            client: HttpClient::new(None),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/contents/{}", self.api_url, self.owner, self.repo, path)
    }

    fn request(&self, method: Method, path: &str) -> Request {
        Request::new(method, self.contents_url(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "portal-leads")
    }
}

#[async_trait]
impl ProjectRecords for GitHubProjects {
    async fn update_status(&self, update: &StatusUpdate) -> Result<UpdatedRecord, ProjectError> {
        let path = project_path(&update.slug);

        let response = self
            .client
            .send(self.request(Method::Get, &path).query("ref", self.branch.as_str()))
            .await?;
        if !response.is_success() {
            return Err(ProjectError::Upstream {
                action: "read file",
                status: response.status,
                body: response.body,
            });
        }

        let file: ContentsFile = serde_json::from_str(&response.body)
            .map_err(|e| ProjectError::InvalidFile(e.to_string()))?;
        // The contents API wraps base64 at 60 columns
        let encoded: String = file.content.split_whitespace().collect();
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| ProjectError::InvalidFile(e.to_string()))?;
        let raw = String::from_utf8(bytes).map_err(|e| ProjectError::InvalidFile(e.to_string()))?;

        let updated = apply_status_fields(&raw, &update.project_status, &update.project_status_sub)?;

        let body = json!({
            "message": format!("Update projectStatus to \"{}\" for {}", update.project_status, update.slug),
            "content": BASE64_STANDARD.encode(updated.as_bytes()),
            "sha": file.sha,
            "branch": self.branch,
        });
        let response = self
            .client
            .send(self.request(Method::Put, &path).json(body))
            .await?;
        if !response.is_success() {
            return Err(ProjectError::Upstream {
                action: "commit file",
                status: response.status,
                body: response.body,
            });
        }

        info!(slug = %update.slug, status = %update.project_status, "Project status committed");
        Ok(UpdatedRecord {
            path,
            branch: self.branch.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = "{\n  \"name\": \"Acme Residence\",\n  \"projectStatus\": \"Planning\",\n  \"projectStatusSub\": \"Permits\",\n  \"budget\": 120000\n}\n";

    #[test]
    fn rewrites_only_target_lines() {
        let out = apply_status_fields(PROJECT, "Active", "Framing").unwrap();
        assert_eq!(
            out,
            "{\n  \"name\": \"Acme Residence\",\n  \"projectStatus\": \"Active\",\n  \"projectStatusSub\": \"Framing\",\n  \"budget\": 120000\n}\n"
        );
    }

    #[test]
    fn status_key_does_not_match_sub_key() {
        let out = update_json_line(PROJECT, "projectStatus", "On Hold").unwrap();
        assert!(out.contains("\"projectStatus\": \"On Hold\","));
        assert!(out.contains("\"projectStatusSub\": \"Permits\","));
    }

    #[test]
    fn values_are_escaped() {
        let out = update_json_line(PROJECT, "projectStatusSub", "Waiting on \"HOA\" $1 \\ ok").unwrap();
        assert!(out.contains(r#""projectStatusSub": "Waiting on \"HOA\" $1 \\ ok","#));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["projectStatusSub"], "Waiting on \"HOA\" $1 \\ ok");
    }

    #[test]
    fn control_characters_stay_valid_json() {
        let sub = "Line one\nLine two\twith tab\u{1}";
        let out = update_json_line(PROJECT, "projectStatusSub", sub).unwrap();
        assert!(out.contains(r#""projectStatusSub": "Line one\nLine two\twith tab\u0001","#));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["projectStatusSub"], sub);
        assert_eq!(out.lines().count(), PROJECT.lines().count());
    }

    #[test]
    fn missing_keys_fall_back_to_reserialization() {
        let raw = "{\"name\":\"Acme\",\"projectStatus\":\"Planning\"}";
        let out = apply_status_fields(raw, "Completed", "").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["projectStatus"], "Completed");
        assert_eq!(parsed["projectStatusSub"], "");
        // Key order is kept
        assert!(out.find("\"name\"").unwrap() < out.find("\"projectStatus\"").unwrap());
    }

    #[test]
    fn non_object_files_are_rejected() {
        assert!(matches!(
            apply_status_fields("[1, 2]", "Active", ""),
            Err(ProjectError::InvalidFile(_))
        ));
    }
}
