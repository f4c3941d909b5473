//! Insert outcome classification
//!
//! The hosted store reports unique-constraint violations only through the
//! HTTP status and error text, so the duplicate heuristic lives here and
//! nowhere else.

use super::StoreError;

/// Error-text fragments that mean "this row already exists"
const DUPLICATE_MARKERS: &[&str] = &[
    "duplicate key",
    "23505",
    "unique constraint",
    "already exists",
];

pub fn looks_like_duplicate(body: &str) -> bool {
    let body = body.to_lowercase();
    DUPLICATE_MARKERS.iter().any(|m| body.contains(m))
}

/// Classify an insert response: 2xx is success, 409 or duplicate text is a
/// conflict, anything else is a hard failure carrying the raw response.
pub fn classify_insert(status: u16, body: &str) -> Result<(), StoreError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    if status == 409 || looks_like_duplicate(body) {
        return Err(StoreError::Conflict);
    }
    Err(StoreError::Upstream {
        status,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses() {
        assert!(classify_insert(201, "").is_ok());
        assert!(classify_insert(200, "[]").is_ok());
        assert!(classify_insert(204, "").is_ok());
    }

    #[test]
    fn conflict_by_status() {
        assert!(matches!(classify_insert(409, ""), Err(StoreError::Conflict)));
    }

    #[test]
    fn conflict_by_error_text() {
        let postgrest = r#"{"code":"23505","details":"Key (email, project_slug)=(a@b.c, acme) already exists.","message":"duplicate key value violates unique constraint \"portal_leads_email_project_key\""}"#;
        assert!(matches!(classify_insert(400, postgrest), Err(StoreError::Conflict)));
        assert!(matches!(
            classify_insert(500, "UNIQUE constraint failed: portal_leads.email"),
            Err(StoreError::Conflict)
        ));
    }

    #[test]
    fn other_failures_keep_status_and_body() {
        let body = r#"{"code":"PGRST204","message":"Could not find the 'fullname' column"}"#;
        match classify_insert(500, body) {
            Err(StoreError::Upstream { status, body: raw }) => {
                assert_eq!(status, 500);
                assert_eq!(raw, body);
            }
            other => panic!("expected upstream failure, got {:?}", other),
        }
    }
}
