//! Asynchronous operation polling
//!
//! Mutating calls on most GCP resources answer with an operation handle that
//! completes later. [`poll_until`] is the single polling loop used for all of
//! them; [`GcpOperationPoller`] plugs the three operation flavors into it.

use super::client::{short_name, BasePaths, Service, Transport};
use super::http::Method;
use crate::error::{PollError, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Flavor of operation a resource's mutations return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStyle {
    /// `compute#operation` scoped to a project (regional, zonal or global)
    Compute,
    /// `compute#operation` scoped to an organization, polled with `parentId`
    ComputeOrganization,
    /// `google.longrunning.Operation` (`done` / `error` / `response`)
    LongRunning,
}

/// Operation status
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Running,
    /// Finished; carries the final body (the operation, or its `response`)
    Done(Value),
    Failed(String),
    Unknown(String),
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}

/// Handle to a server-side mutation
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncOperation {
    pub style: OperationStyle,
    pub name: String,
    pub self_link: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    /// Body the operation was decoded from
    pub raw: Value,
}

impl AsyncOperation {
    /// Decode an operation from a mutating call's answer, `None` when the
    /// call completed synchronously and returned something else
    pub fn from_response(style: OperationStyle, body: &Value) -> Option<Self> {
        let name = body.get("name").and_then(|v| v.as_str())?;

        let is_operation = match style {
            OperationStyle::Compute | OperationStyle::ComputeOrganization => body
                .get("kind")
                .and_then(|v| v.as_str())
                .is_some_and(|k| k.ends_with("#operation")),
            OperationStyle::LongRunning => name.contains("/operations/"),
        };
        if !is_operation {
            return None;
        }

        let text = |key: &str| body.get(key).and_then(|v| v.as_str()).map(String::from);
        Some(Self {
            style,
            name: name.to_string(),
            self_link: text("selfLink"),
            region: text("region"),
            zone: text("zone"),
            raw: body.clone(),
        })
    }

    pub fn status(&self) -> OperationStatus {
        status_for(self.style, &self.raw)
    }
}

fn status_for(style: OperationStyle, body: &Value) -> OperationStatus {
    match style {
        OperationStyle::Compute | OperationStyle::ComputeOrganization => compute_status(body),
        OperationStyle::LongRunning => long_running_status(body),
    }
}

/// Status of a `compute#operation`
pub fn compute_status(body: &Value) -> OperationStatus {
    let status = body.get("status").and_then(|v| v.as_str()).unwrap_or("");
    match status {
        "DONE" => {
            let messages: Vec<&str> = body
                .pointer("/error/errors")
                .and_then(|v| v.as_array())
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                        .collect()
                })
                .unwrap_or_default();

            if messages.is_empty() && body.get("error").is_none() {
                OperationStatus::Done(body.clone())
            } else if messages.is_empty() {
                OperationStatus::Failed("operation finished with an error".to_string())
            } else {
                OperationStatus::Failed(messages.join("; "))
            }
        },
        "PENDING" | "RUNNING" => OperationStatus::Running,
        other => OperationStatus::Unknown(other.to_string()),
    }
}

/// Status of a `google.longrunning.Operation`
pub fn long_running_status(body: &Value) -> OperationStatus {
    if !body.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
        return OperationStatus::Running;
    }

    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        return OperationStatus::Failed(format!("Error code {}, message: {}", code, message));
    }

    OperationStatus::Done(body.get("response").cloned().unwrap_or(Value::Null))
}

/// Exponential backoff between polls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl PollSettings {
    pub fn with_initial_interval(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        let delay = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }
}

/// Fetch a status until `is_terminal` holds or `timeout` elapses
///
/// Transient fetch failures (429, 5xx, network) are logged and retried until
/// the deadline; any other failure ends the wait.
pub async fn poll_until<T, F, Fut, S, P>(
    operation: &str,
    settings: &PollSettings,
    timeout: Duration,
    mut fetch: F,
    status_of: S,
    is_terminal: P,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, TransportError>>,
    S: Fn(&Value) -> T,
    P: Fn(&T) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        match fetch().await {
            Ok(body) => {
                let status = status_of(&body);
                if is_terminal(&status) {
                    return Ok(status);
                }
            },
            Err(e) if e.is_transient() => {
                tracing::warn!("Failed to poll operation {}: {}", operation, e);
            },
            Err(e) => {
                return Err(PollError::Transport {
                    operation: operation.to_string(),
                    source: e,
                });
            },
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::Timeout {
                operation: operation.to_string(),
                timeout,
            });
        }

        let delay = settings.delay_for_attempt(attempt).min(deadline - now);
        attempt = attempt.saturating_add(1);
        sleep(delay).await;
    }
}

/// Blocks until an asynchronous operation reaches a terminal state
#[async_trait]
pub trait OperationPoller: Send + Sync {
    /// Returns the final body on success. `scope_parent` is the project
    /// (`projects/P`) or organization (`organizations/O`) the operation
    /// lives under.
    async fn wait_until_done(
        &self,
        operation: &AsyncOperation,
        scope_parent: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, PollError>;
}

/// Polls GCP operations through a [`Transport`]
#[derive(Clone)]
pub struct GcpOperationPoller {
    transport: Arc<dyn Transport>,
    base_paths: BasePaths,
    billing_project: Option<String>,
    settings: PollSettings,
}

impl GcpOperationPoller {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_paths: BasePaths,
        billing_project: Option<String>,
        settings: PollSettings,
    ) -> Self {
        Self {
            transport,
            base_paths,
            billing_project,
            settings,
        }
    }

    fn operation_url(
        &self,
        operation: &AsyncOperation,
        scope_parent: Option<&str>,
    ) -> Result<String, PollError> {
        match operation.style {
            OperationStyle::Compute => {
                // Re-root the self link so the configured base path wins
                if let Some(path) = operation
                    .self_link
                    .as_deref()
                    .and_then(|link| link.find("projects/").map(|idx| &link[idx..]))
                {
                    return Ok(self.base_paths.url(Service::Compute, path));
                }

                let scope = scope_parent.ok_or_else(|| {
                    PollError::Malformed(format!(
                        "operation {} has no self link and no project scope",
                        operation.name
                    ))
                })?;
                let location = match (&operation.region, &operation.zone) {
                    (Some(region), _) => format!("regions/{}", short_name(region)),
                    (None, Some(zone)) => format!("zones/{}", short_name(zone)),
                    (None, None) => "global".to_string(),
                };
                Ok(self.base_paths.url(
                    Service::Compute,
                    &format!("{}/{}/operations/{}", scope, location, operation.name),
                ))
            },
            OperationStyle::ComputeOrganization => {
                let parent = scope_parent.ok_or_else(|| {
                    PollError::Malformed(format!(
                        "organization operation {} needs a parent",
                        operation.name
                    ))
                })?;
                Ok(self.base_paths.url(
                    Service::Compute,
                    &format!(
                        "locations/global/operations/{}?parentId={}",
                        operation.name,
                        urlencoding::encode(parent)
                    ),
                ))
            },
            OperationStyle::LongRunning => Ok(self
                .base_paths
                .url(Service::NetworkSecurity, &operation.name)),
        }
    }
}

#[async_trait]
impl OperationPoller for GcpOperationPoller {
    async fn wait_until_done(
        &self,
        operation: &AsyncOperation,
        scope_parent: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, PollError> {
        let status = operation.status();
        let status = if status.is_terminal() {
            status
        } else {
            let url = self.operation_url(operation, scope_parent)?;
            let transport = &self.transport;
            let billing = self.billing_project.as_deref();
            let style = operation.style;
            tracing::debug!("Waiting on operation {}", operation.name);

            poll_until(
                &operation.name,
                &self.settings,
                timeout,
                || transport.send(Method::Get, billing, &url, None),
                |body| status_for(style, body),
                |status| {
                    if let OperationStatus::Unknown(s) = status {
                        tracing::warn!("Unknown operation status: {}", s);
                    }
                    status.is_terminal()
                },
            )
            .await?
        };

        match status {
            OperationStatus::Done(body) => Ok(body),
            OperationStatus::Failed(message) => Err(PollError::Failed {
                operation: operation.name.clone(),
                message,
            }),
            other => Err(PollError::Malformed(format!(
                "operation {} ended in {:?}",
                operation.name, other
            ))),
        }
    }
}
