use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};

use crate::app::{MarksError, Result};
use crate::config::BackendConfig;

pub fn build_client(config: &BackendConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.request_timeout())
        .gzip(true)
        .brotli(true)
        .user_agent(concat!("smartmarks/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// `apikey` plus a bearer token: the caller's access token, or the anon key.
pub fn auth_headers(anon_key: &str, access_token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("apikey", header_value(anon_key)?);
    let bearer = format!("Bearer {}", access_token.unwrap_or(anon_key));
    headers.insert(AUTHORIZATION, header_value(&bearer)?);
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| MarksError::Config("API key or token contains invalid characters".into()))
}

/// Turn a non-2xx response into [`MarksError::Backend`] with the server's message.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MarksError::Backend {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("request failed").to_string()
        }),
    })
}

/// Pull a readable message out of an auth or REST error body.
pub fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.to_string());
    };
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(String::from)
        .or_else(|| Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_headers_default_to_anon_key() {
        let headers = auth_headers("anon", None).unwrap();
        assert_eq!(headers["apikey"], "anon");
        assert_eq!(headers[AUTHORIZATION], "Bearer anon");

        let headers = auth_headers("anon", Some("jwt")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer jwt");
    }

    #[test]
    fn test_auth_headers_reject_newlines() {
        assert!(auth_headers("anon\nkey", None).is_err());
    }

    #[test]
    fn test_error_message_from_gotrue_and_postgrest() {
        assert_eq!(
            error_message(r#"{"code":400,"error_code":"bad_code_verifier","msg":"code challenge does not match"}"#),
            Some("code challenge does not match".into())
        );
        assert_eq!(
            error_message(r#"{"code":"42501","message":"permission denied for table bookmarks"}"#),
            Some("permission denied for table bookmarks".into())
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token"}"#),
            Some("Invalid Refresh Token".into())
        );
        assert_eq!(error_message("Bad Gateway"), Some("Bad Gateway".into()));
        assert_eq!(error_message("  "), None);
    }
}
