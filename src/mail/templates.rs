//! Email bodies
//!
//! Every value that came from a visitor is HTML-escaped before it is placed
//! in markup.

use chrono::{Datelike, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::db::{LeadOutcome, NewLead};

/// Brand values shared by all templates
#[derive(Debug, Clone)]
pub struct Brand {
    pub name: String,
    pub logo_url: String,
    pub accent_color: String,
}

/// Display name from a sender such as `Moura Consulting <portal@example.com>`
pub fn display_name(from: &str) -> Option<String> {
    let from = from.trim();
    let name = match (from.find('<'), from.ends_with('>')) {
        (Some(idx), true) => from[..idx].trim(),
        _ => from,
    };
    let name = name.trim_matches('"').trim();
    if name.is_empty() || name.contains('@') {
        None
    } else {
        Some(name.to_string())
    }
}

fn access_label(outcome: LeadOutcome) -> &'static str {
    match outcome {
        LeadOutcome::Created => "FIRST ACCESS",
        LeadOutcome::Duplicate => "RETURN ACCESS",
    }
}

pub fn admin_subject(lead: &NewLead) -> String {
    format!("Portal Access: {} ({})", lead.full_name, lead.project_slug)
}

pub fn admin_html(lead: &NewLead, outcome: LeadOutcome) -> String {
    let phone = lead.phone.as_deref().unwrap_or("-");
    format!(
        r#"<div style="font-family:Arial;padding:20px;">
  <h3>Client Activity</h3>
  <p><b>Project:</b> {project}</p>
  <p><b>Name:</b> {name}</p>
  <p><b>Email:</b> {email}</p>
  <p><b>Phone:</b> {phone}</p>
  <p>Status: {status}</p>
</div>"#,
        project = encode_text(&lead.project_slug),
        name = encode_text(&lead.full_name),
        email = encode_text(&lead.email),
        phone = encode_text(phone),
        status = access_label(outcome),
    )
}

pub fn admin_text(lead: &NewLead, outcome: LeadOutcome) -> String {
    format!(
        "Client Activity\n\nProject: {}\nName: {}\nEmail: {}\nPhone: {}\nStatus: {}\n",
        lead.project_slug,
        lead.full_name,
        lead.email,
        lead.phone.as_deref().unwrap_or("-"),
        access_label(outcome),
    )
}

pub const PORTAL_ACCESS_SUBJECT: &str = "Your Secure Project Portal Access";

pub fn portal_access_html(brand: &Brand, full_name: &str, portal_url: &str) -> String {
    let greeting = if full_name.trim().is_empty() {
        "Hello".to_string()
    } else {
        format!("Hello {}", encode_text(full_name.trim()))
    };
    let logo = if brand.logo_url.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div style="text-align:center;margin-bottom:18px;">
        <img src="{src}" alt="{alt}" style="display:block;margin:auto;border:0;height:60px;width:auto;object-fit:contain;" />
      </div>"#,
            src = encode_double_quoted_attribute(&brand.logo_url),
            alt = encode_double_quoted_attribute(&brand.name),
        )
    };

    format!(
        r#"<div style="margin:0;padding:0;background:#f6f6f6;">
  <div style="display:none;max-height:0;overflow:hidden;opacity:0;color:transparent;">
    Your secure access to the project portal is confirmed.
  </div>
  <div style="padding:28px 16px;">
    <div style="max-width:560px;margin:auto;background:#ffffff;border-radius:16px;padding:26px 22px;border:1px solid #ececec;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,Helvetica,sans-serif;">
      {logo}
      <div style="text-align:center;font-size:20px;line-height:1.3;font-weight:600;color:#111111;margin:0 0 10px 0;">
        Secure Access Confirmed
      </div>
      <div style="text-align:center;font-size:14.5px;line-height:1.6;color:#444444;margin:0 0 18px 0;">
        {greeting}, your access to the private project portal has been successfully confirmed.
      </div>
      <div style="text-align:center;margin:26px 0;">
        <a href="{url}" style="display:inline-block;padding:14px 26px;background:{accent};color:#ffffff;text-decoration:none;border-radius:10px;font-size:15px;font-weight:500;">
          Access Your Project Portal
        </a>
      </div>
      <div style="font-size:12px;line-height:1.6;color:#8a8a8a;text-align:center;margin-top:18px;">
        &copy; {year} {brand}
      </div>
    </div>
  </div>
</div>"#,
        logo = logo,
        greeting = greeting,
        url = encode_double_quoted_attribute(portal_url),
        accent = encode_double_quoted_attribute(&brand.accent_color),
        year = Utc::now().year(),
        brand = encode_text(&brand.name),
    )
}

pub fn portal_access_text(brand: &Brand, full_name: &str, portal_url: &str) -> String {
    let greeting = if full_name.trim().is_empty() {
        "Hello".to_string()
    } else {
        format!("Hello {}", full_name.trim())
    };
    format!(
        "{greeting},\n\nYour access to the private project portal has been successfully confirmed.\n\nAccess your project portal:\n{portal_url}\n\n(c) {year} {brand}\n",
        greeting = greeting,
        portal_url = portal_url,
        year = Utc::now().year(),
        brand = brand.name,
    )
}

/// A portal page view reported by the client-side script
#[derive(Debug, Clone, Default)]
pub struct PortalVisit {
    pub project_slug: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub page_url: Option<String>,
}

pub fn visit_subject(visit: &PortalVisit) -> String {
    let who = visit
        .full_name
        .as_deref()
        .or(visit.email.as_deref())
        .unwrap_or("Visitor");
    format!("Portal Access: {} - {}", visit.project_slug, who)
}

pub fn visit_html(visit: &PortalVisit) -> String {
    let field = |v: &Option<String>| encode_text(v.as_deref().unwrap_or("-")).into_owned();
    format!(
        r#"<div style="font-family:-apple-system,Segoe UI,Roboto,Arial,sans-serif;line-height:1.5">
  <h2 style="margin:0 0 12px;">Client accessed the portal</h2>
  <p style="margin:0 0 6px;"><b>Project:</b> {project}</p>
  <p style="margin:0 0 6px;"><b>Name:</b> {name}</p>
  <p style="margin:0 0 6px;"><b>Email:</b> {email}</p>
  <p style="margin:0 0 6px;"><b>Page:</b> {page}</p>
  <p style="margin:14px 0 0;color:#666;font-size:12px;">Time: {time} UTC</p>
</div>"#,
        project = encode_text(&visit.project_slug),
        name = field(&visit.full_name),
        email = field(&visit.email),
        page = field(&visit.page_url),
        time = Utc::now().format("%Y-%m-%d %H:%M:%S"),
    )
}
