//! Shared HTTP client, auth headers, and status mapping.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::config::Credential;
use crate::error::RelayError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// Sessions share only this connection pool.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Build default JSON headers, with the credential if one is configured.
pub fn agent_headers(credential: Option<&Credential>, conversation_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    match credential {
        Some(Credential::Bearer(token)) => {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, val);
            }
        }
        Some(Credential::BarePassword(password)) => {
            if let Ok(val) = HeaderValue::from_str(&format!("password {password}")) {
                headers.insert("x-bare-password", val);
            }
        }
        None => {}
    }
    if let Ok(val) = HeaderValue::from_str(conversation_id) {
        headers.insert("x-conversation-id", val);
    }
    headers
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> RelayError {
    let message = extract_error_message(body).unwrap_or_else(|| body.to_string());
    match status {
        401 | 403 => RelayError::Authentication(message),
        _ => RelayError::api(status, message),
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    let detail = value.get("detail").or_else(|| value.get("error"))?;
    match detail {
        serde_json::Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| Some(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_and_password_headers() {
        let bearer = agent_headers(Some(&Credential::Bearer("tok".into())), "c1");
        assert_eq!(bearer.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(bearer.get("x-conversation-id").unwrap(), "c1");

        let bare = agent_headers(Some(&Credential::BarePassword("pw".into())), "c1");
        assert_eq!(bare.get("x-bare-password").unwrap(), "password pw");
        assert!(bare.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn status_mapping_uses_detail() {
        let err = status_to_error(404, r#"{"detail": "Run not found"}"#);
        assert_eq!(err.to_string(), "API error (status 404): Run not found");
        assert!(!err.is_retryable());

        assert!(matches!(status_to_error(401, "nope"), RelayError::Authentication(_)));
        assert!(status_to_error(503, "busy").is_retryable());
    }
}
