//! GCP Client
//!
//! The production API transport, combining authentication and HTTP
//! functionality, plus the provider-wide settings every reconciler is
//! constructed with.

use super::auth::{self, TokenSource};
use super::http::{GcpHttpClient, Method};
use crate::error::TransportError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("gcp-reconciler/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_COMPUTE_BASE_PATH: &str = "https://compute.googleapis.com/compute/beta/";
pub const DEFAULT_NETWORK_SECURITY_BASE_PATH: &str =
    "https://networksecurity.googleapis.com/v1beta1/";

/// Authenticated request/response exchange with a Google API
///
/// Non-2xx answers come back as [`TransportError::Api`] with the status
/// preserved, so callers can tell 404 and 409/412 apart from other failures.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        billing_project: Option<&str>,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError>;
}

/// Google API a resource lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Compute,
    NetworkSecurity,
}

/// API roots, overridable to point at a test server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePaths {
    pub compute: String,
    pub network_security: String,
}

impl Default for BasePaths {
    fn default() -> Self {
        Self {
            compute: DEFAULT_COMPUTE_BASE_PATH.to_string(),
            network_security: DEFAULT_NETWORK_SECURITY_BASE_PATH.to_string(),
        }
    }
}

impl BasePaths {
    /// Every path in this crate is rendered relative to the same root,
    /// e.g. `http://127.0.0.1:4000/` in tests
    pub fn uniform(root: &str) -> Self {
        let root = with_trailing_slash(root);
        Self {
            compute: root.clone(),
            network_security: root,
        }
    }

    pub fn for_service(&self, service: Service) -> &str {
        match service {
            Service::Compute => &self.compute,
            Service::NetworkSecurity => &self.network_security,
        }
    }

    /// Absolute URL for a path relative to the service root
    pub fn url(&self, service: Service, path: &str) -> String {
        format!(
            "{}{}",
            with_trailing_slash(self.for_service(service)),
            path.trim_start_matches('/')
        )
    }
}

fn with_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}

/// Values used to fill identifying fields the caller left out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub project: Option<String>,
    pub region: Option<String>,
    /// Project billed for quota (`X-Goog-User-Project`)
    pub billing_project: Option<String>,
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: Arc<dyn TokenSource>,
    pub http: GcpHttpClient,
}

impl GcpClient {
    pub fn new(credentials: Arc<dyn TokenSource>) -> Result<Self, TransportError> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::new(USER_AGENT)?,
        })
    }

    /// Client using the ambient credentials (access token or ADC)
    pub async fn from_environment() -> Result<Self> {
        let credentials = auth::default_token_source()
            .await
            .context("Failed to initialize GCP credentials")?;
        Self::new(credentials).context("Failed to build GCP client")
    }
}

#[async_trait]
impl Transport for GcpClient {
    async fn send(
        &self,
        method: Method,
        billing_project: Option<&str>,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let token = self.credentials.token().await?;
        match self
            .http
            .send(method, url, &token, billing_project, body)
            .await
        {
            Err(TransportError::Api { status: 401, .. }) => {
                tracing::debug!("Access token rejected, retrying with a fresh one");
                self.credentials.invalidate().await;
                let token = self.credentials.token().await?;
                self.http
                    .send(method, url, &token, billing_project, body)
                    .await
            },
            other => other,
        }
    }
}

/// Last path segment of a self link, e.g. a region URL to `us-central1`
pub fn short_name(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}
