//! HTTP utilities for GCP REST API calls

use crate::error::TransportError;
use reqwest::Client;
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header naming the project billed for quota
const USER_PROJECT_HEADER: &str = "X-Goog-User-Project";

/// HTTP verbs used by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Truncate a body and drop non-printable characters before logging it
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull `error.message` out of a Google API error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| sanitize_for_log(body))
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Send one request and decode the JSON answer
    ///
    /// Empty bodies (204, or a DELETE answering nothing) decode as `Value::Null`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        billing_project: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.as_reqwest(), url)
            .bearer_auth(token);

        if let Some(project) = billing_project {
            request = request.header(USER_PROJECT_HEADER, project);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            if status.as_u16() == 404 {
                tracing::debug!("{} {} -> 404", method, url);
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            }
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
