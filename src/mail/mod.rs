//! Notification dispatch
//!
//! Each notification class (admin summary, client confirmation) has its own
//! sender and recipients, taken from configuration. Sends are independent:
//! a failure is recorded in the report and never aborts the other send.

mod resend;
pub mod templates;

pub use resend::ResendMailer;
pub use templates::PortalVisit;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BrandConfig, MailConfig};
use crate::db::{LeadOutcome, NewLead};
use crate::http::HttpError;
use templates::Brand;

const DEFAULT_BRAND_NAME: &str = "Moura Consulting & Management";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email API returned HTTP {status}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("invalid email payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound message, serialized as the email API request body
#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SentEmail {
    pub id: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<SentEmail, MailError>;
}

/// Per-email result embedded in API responses
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmailStatus {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<&'static str>,
}

impl EmailStatus {
    fn skipped(reason: &'static str) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotifyReport {
    pub admin: EmailStatus,
    pub client: EmailStatus,
}

/// Notification classes and their configured addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationClass {
    Admin,
    Client,
}

#[derive(Debug, Clone, Default)]
struct Route {
    from: Option<String>,
    /// Fixed recipients; client mail goes to the lead instead
    to: Vec<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Clone)]
pub struct Dispatcher {
    mailer: Option<Arc<dyn Mailer>>,
    admin: Route,
    client: Route,
    brand: Brand,
    portal_base_url: String,
}

impl Dispatcher {
    pub fn new(mailer: Option<Arc<dyn Mailer>>, mail: &MailConfig, brand: &BrandConfig) -> Self {
        let admin = Route {
            from: non_empty(&mail.admin_from),
            to: mail
                .admin_to
                .split(',')
                .filter_map(non_empty)
                .collect(),
        };
        let client = Route {
            from: non_empty(&mail.client_from),
            to: Vec::new(),
        };

        let name = non_empty(&brand.name)
            .or_else(|| client.from.as_deref().and_then(templates::display_name))
            .unwrap_or_else(|| DEFAULT_BRAND_NAME.to_string());

        Self {
            mailer,
            admin,
            client,
            brand: Brand {
                name,
                logo_url: brand.logo_url.trim().to_string(),
                accent_color: brand.accent_color.clone(),
            },
            portal_base_url: brand.portal_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn route(&self, class: NotificationClass) -> &Route {
        match class {
            NotificationClass::Admin => &self.admin,
            NotificationClass::Client => &self.client,
        }
    }

    /// Sender for a class, or None when the class cannot be sent
    fn sender(&self, class: NotificationClass) -> Option<(&Arc<dyn Mailer>, &str)> {
        let mailer = self.mailer.as_ref()?;
        let from = self.route(class).from.as_deref()?;
        if class == NotificationClass::Admin && self.admin.to.is_empty() {
            return None;
        }
        Some((mailer, from))
    }

    pub fn portal_url(&self, project_slug: &str) -> String {
        format!("{}/{}/", self.portal_base_url, project_slug)
    }

    async fn deliver(&self, mailer: &Arc<dyn Mailer>, email: Email, class: NotificationClass) -> EmailStatus {
        match mailer.send(&email).await {
            Ok(sent) => {
                info!(?class, id = sent.id.as_deref().unwrap_or("-"), "Email sent");
                EmailStatus {
                    sent: true,
                    id: sent.id,
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(?class, error = %e, "Email send failed");
                EmailStatus {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    /// Admin summary on every outcome, client confirmation on first access only
    pub async fn notify(&self, outcome: LeadOutcome, lead: &NewLead) -> NotifyReport {
        let admin = match self.sender(NotificationClass::Admin) {
            Some((mailer, from)) => {
                let email = Email {
                    from: from.to_string(),
                    to: self.admin.to.clone(),
                    subject: templates::admin_subject(lead),
                    html: templates::admin_html(lead, outcome),
                    text: Some(templates::admin_text(lead, outcome)),
                    reply_to: Some(lead.email.clone()),
                };
                self.deliver(mailer, email, NotificationClass::Admin).await
            }
            None => EmailStatus::skipped("not configured"),
        };

        let client = if !outcome.is_created() {
            EmailStatus::skipped("return access")
        } else {
            match self.sender(NotificationClass::Client) {
                Some((mailer, from)) => {
                    let url = self.portal_url(&lead.project_slug);
                    let email = Email {
                        from: from.to_string(),
                        to: vec![lead.email.clone()],
                        subject: templates::PORTAL_ACCESS_SUBJECT.to_string(),
                        html: templates::portal_access_html(&self.brand, &lead.full_name, &url),
                        text: Some(templates::portal_access_text(&self.brand, &lead.full_name, &url)),
                        reply_to: None,
                    };
                    self.deliver(mailer, email, NotificationClass::Client).await
                }
                None => EmailStatus::skipped("not configured"),
            }
        };

        NotifyReport { admin, client }
    }

    /// Stand-alone portal access email to an arbitrary recipient
    pub async fn send_portal_access(
        &self,
        to: &str,
        full_name: &str,
        portal_url: &str,
    ) -> Result<Option<SentEmail>, MailError> {
        let Some((mailer, from)) = self.sender(NotificationClass::Client) else {
            return Ok(None);
        };
        let email = Email {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: templates::PORTAL_ACCESS_SUBJECT.to_string(),
            html: templates::portal_access_html(&self.brand, full_name, portal_url),
            text: Some(templates::portal_access_text(&self.brand, full_name, portal_url)),
            reply_to: None,
        };
        mailer.send(&email).await.map(Some)
    }

    /// Admin notice for a portal page view
    pub async fn notify_portal_visit(&self, visit: &PortalVisit) -> Result<Option<SentEmail>, MailError> {
        let Some((mailer, from)) = self.sender(NotificationClass::Admin) else {
            return Ok(None);
        };
        let email = Email {
            from: from.to_string(),
            to: self.admin.to.clone(),
            subject: templates::visit_subject(visit),
            html: templates::visit_html(visit),
            text: None,
            reply_to: visit.email.clone(),
        };
        mailer.send(&email).await.map(Some)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{mail_config, RecordingMailer};
    use super::*;

    fn dispatcher(mailer: Arc<RecordingMailer>, mail: &MailConfig) -> Dispatcher {
        Dispatcher::new(Some(mailer), mail, &BrandConfig::default())
    }

    fn lead() -> NewLead {
        NewLead::new("acme", "Jane Doe", "jane@x.com", None)
    }

    #[tokio::test]
    async fn first_access_sends_both() {
        let mailer = Arc::new(RecordingMailer::default());
        let report = dispatcher(mailer.clone(), &mail_config())
            .notify(LeadOutcome::Created, &lead())
            .await;

        assert!(report.admin.sent);
        assert!(report.client.sent);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, vec!["ops@example.com", "owner@example.com"]);
        assert_eq!(sent[0].reply_to.as_deref(), Some("jane@x.com"));
        assert!(sent[0].html.contains("FIRST ACCESS"));
        assert_eq!(sent[1].to, vec!["jane@x.com"]);
        assert!(sent[1].html.contains("https://mcmprosolutions.com/projects/acme/"));
    }

    #[tokio::test]
    async fn return_access_sends_admin_only() {
        let mailer = Arc::new(RecordingMailer::default());
        let report = dispatcher(mailer.clone(), &mail_config())
            .notify(LeadOutcome::Duplicate, &lead())
            .await;

        assert!(report.admin.sent);
        assert!(!report.client.sent);
        assert_eq!(report.client.skipped, Some("return access"));
        assert_eq!(mailer.sent().len(), 1);
        assert!(mailer.sent()[0].html.contains("RETURN ACCESS"));
    }

    #[tokio::test]
    async fn admin_failure_does_not_block_client() {
        let mailer = Arc::new(RecordingMailer {
            fail_to: Some("ops@example.com".into()),
            ..Default::default()
        });
        let report = dispatcher(mailer.clone(), &mail_config())
            .notify(LeadOutcome::Created, &lead())
            .await;

        assert!(!report.admin.sent);
        assert!(report.admin.error.as_deref().unwrap().contains("422"));
        assert!(report.client.sent);
    }

    #[tokio::test]
    async fn unconfigured_classes_are_skipped() {
        let mut mail = mail_config();
        mail.admin_to = " ".into();
        let mailer = Arc::new(RecordingMailer::default());
        let report = dispatcher(mailer.clone(), &mail)
            .notify(LeadOutcome::Created, &lead())
            .await;
        assert_eq!(report.admin.skipped, Some("not configured"));
        assert!(report.client.sent);

        let no_mailer = Dispatcher::new(None, &mail_config(), &BrandConfig::default());
        let report = no_mailer.notify(LeadOutcome::Created, &lead()).await;
        assert_eq!(report.admin, EmailStatus::skipped("not configured"));
        assert_eq!(report.client, EmailStatus::skipped("not configured"));
    }

    #[test]
    fn brand_name_falls_back_to_sender() {
        let d = Dispatcher::new(None, &mail_config(), &BrandConfig::default());
        assert_eq!(d.brand.name, "Moura Portal");

        let mut mail = mail_config();
        mail.client_from = "portal@example.com".into();
        let d = Dispatcher::new(None, &mail, &BrandConfig::default());
        assert_eq!(d.brand.name, DEFAULT_BRAND_NAME);
    }
}
