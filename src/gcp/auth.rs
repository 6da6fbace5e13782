//! GCP Authentication
//!
//! Access tokens come from Application Default Credentials (ADC) or from a
//! token supplied up front (`GOOGLE_OAUTH_ACCESS_TOKEN`, tests). Default
//! project and region are discovered from the environment and the
//! active gcloud configuration.

use crate::error::TransportError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token TTL used when the provider does not report one
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Source of OAuth2 bearer tokens for API calls
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, TransportError>;

    /// Forget any cached token so the next call fetches a fresh one
    async fn invalidate(&self) {}
}

/// A fixed token, never refreshed
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Token from `GOOGLE_OAUTH_ACCESS_TOKEN`, if set
    pub fn from_env() -> Option<Self> {
        std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, TransportError> {
        Ok(self.0.clone())
    }
}

/// Application Default Credentials with token caching
#[derive(Clone)]
pub struct AdcCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl AdcCredentials {
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }
}

#[async_trait]
impl TokenSource for AdcCredentials {
    async fn token(&self) -> Result<String, TransportError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .map_err(|e| TransportError::Auth(e.to_string()))?;
        let token = token.as_str().to_string();

        *self.token_cache.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER,
        });

        Ok(token)
    }

    async fn invalidate(&self) {
        *self.token_cache.write().await = None;
    }
}

/// Pick the token source: an explicit access token wins over ADC
pub async fn default_token_source() -> Result<Arc<dyn TokenSource>> {
    if let Some(token) = StaticToken::from_env() {
        tracing::info!("Using access token from GOOGLE_OAUTH_ACCESS_TOKEN");
        return Ok(Arc::new(token));
    }
    Ok(Arc::new(AdcCredentials::new().await?))
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Project IDs are 6-30 characters of lowercase letters, digits and hyphens,
/// starting with a letter and not ending with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }
    if !project.starts_with(|c: char| c.is_ascii_lowercase()) || project.ends_with('-') {
        return false;
    }
    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Look up `key` inside `[section]` of an ini-style gcloud file
fn read_ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let header = format!("[{}]", section);
    let mut in_section = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }

    None
}

/// Read a property from the active gcloud configuration
fn gcloud_property(section: &str, key: &str) -> Option<String> {
    let config_dir = get_gcloud_config_dir()?;
    let active = std::fs::read_to_string(config_dir.join("active_config"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string());

    // Reject names that could escape the configurations directory
    if !active
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let path = config_dir
        .join("configurations")
        .join(format!("config_{}", active));
    let content = std::fs::read_to_string(path).ok()?;
    read_ini_value(&content, section, key)
}

/// Default project: environment first, then the gcloud configuration
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    gcloud_property("core", "project").filter(|p| validate_project_id(p))
}

/// Default compute region
pub fn get_default_region() -> Option<String> {
    std::env::var("CLOUDSDK_COMPUTE_REGION")
        .ok()
        .or_else(|| gcloud_property("compute", "region"))
}
