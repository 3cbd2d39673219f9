//! Deriving action, entity and flags for audit entries.

use uuid::Uuid;

const SENSITIVE_ENTITY_TYPES: [&str; 5] = ["patients", "prescriptions", "lab", "ipd", "users"];
const SENSITIVE_ACTIONS: [&str; 3] = ["change_password", "password_reset", "role_change"];

/// CRUD verb for an HTTP method.
pub fn action_for_method(method: &str) -> &'static str {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" => "read",
        "POST" => "create",
        "PUT" | "PATCH" => "update",
        "DELETE" => "delete",
        _ => "other",
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with(['v', 'V'])
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

fn looks_like_id(segment: &str) -> bool {
    Uuid::parse_str(segment).is_ok() || segment.chars().all(|c| c.is_ascii_digit())
}

/// Entity type and id from an endpoint path.
///
/// `/api/v1/patients/42/notes` gives `("patients", Some("42"))`; the query
/// string is ignored.
pub fn entity_from_path(endpoint: &str) -> (String, Option<String>) {
    let path = endpoint.split('?').next().unwrap_or_default();
    let mut segments = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip_while(|s| s.eq_ignore_ascii_case("api") || is_version_segment(s));

    let entity_type = segments
        .next()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "unknown".to_string());
    let entity_id = segments.find(|s| looks_like_id(s)).map(str::to_string);

    (entity_type, entity_id)
}

pub fn is_sensitive(entity_type: &str, action: &str) -> bool {
    SENSITIVE_ENTITY_TYPES.contains(&entity_type) || SENSITIVE_ACTIONS.contains(&action)
}

/// Server-side failures are queued for human review.
pub fn requires_review(status_code: u16) -> bool {
    status_code >= 500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_method() {
        assert_eq!(action_for_method("GET"), "read");
        assert_eq!(action_for_method("post"), "create");
        assert_eq!(action_for_method("PATCH"), "update");
        assert_eq!(action_for_method("PUT"), "update");
        assert_eq!(action_for_method("DELETE"), "delete");
        assert_eq!(action_for_method("OPTIONS"), "other");
    }

    #[test]
    fn test_entity_skips_api_and_version_prefixes() {
        assert_eq!(
            entity_from_path("/api/v1/patients/42/notes"),
            ("patients".to_string(), Some("42".to_string()))
        );
        assert_eq!(entity_from_path("/auth/login"), ("auth".to_string(), None));
        assert_eq!(
            entity_from_path("/api/v2/lab?status=open"),
            ("lab".to_string(), None)
        );
        assert_eq!(entity_from_path("/"), ("unknown".to_string(), None));
    }

    #[test]
    fn test_entity_id_is_first_identifier_after_type() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(
            entity_from_path(&format!("/audit/logs/{}/review", id)),
            ("audit".to_string(), Some(id))
        );
    }

    #[test]
    fn test_sensitivity_and_review_rules() {
        assert!(is_sensitive("patients", "read"));
        assert!(is_sensitive("auth", "change_password"));
        assert!(!is_sensitive("appointments", "update"));
        assert!(requires_review(500));
        assert!(requires_review(503));
        assert!(!requires_review(404));
    }
}
