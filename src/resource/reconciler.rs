//! Resource reconciler
//!
//! Drives one remote resource through
//! `Absent -> Creating -> Present -> Updating -> Present -> Deleting -> Absent`,
//! with `import` as an alternate entry straight to `Present`. Every call runs
//! to completion, including operation polling, before it returns; callers
//! serialize calls against the same ReconcilerID.

use super::diff::{diff_fields, diff_keyed, ItemChange};
use super::schema::{Behavior, DefaultKey, OperationScope, ResourceDef};
use super::template::{self, TemplateError};
use crate::error::{PollError, ReconcileError, Result, TransportError};
use crate::gcp::client::{BasePaths, ProviderDefaults, Service, Transport};
use crate::gcp::http::Method;
use crate::gcp::operation::{AsyncOperation, OperationPoller};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle position of an [`Instance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Creating,
    Present,
    Updating,
    Deleting,
    /// Identity known from an import, attributes not read yet
    Importing,
}

/// A resource as the caller knows it: its ReconcilerID (when assigned) and
/// the last known spec, including Computed fields and the fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<S> {
    pub id: Option<String>,
    pub spec: S,
    pub phase: Phase,
}

impl<S> Instance<S> {
    /// A desired resource not yet created
    pub fn new(spec: S) -> Self {
        Self {
            id: None,
            spec,
            phase: Phase::Absent,
        }
    }

    /// A resource known to exist under `id`
    pub fn existing(id: impl Into<String>, spec: S) -> Self {
        Self {
            id: Some(id.into()),
            spec,
            phase: Phase::Present,
        }
    }

    fn clear(&mut self) {
        self.id = None;
        self.phase = Phase::Absent;
    }
}

/// Result of a read; a missing resource is an outcome, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Found,
    NotFound,
}

/// Reconciles resources of one kind
pub struct Reconciler<S: 'static> {
    def: &'static ResourceDef<S>,
    transport: Arc<dyn Transport>,
    poller: Arc<dyn OperationPoller>,
    defaults: ProviderDefaults,
    base_paths: BasePaths,
}

impl<S> Reconciler<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    pub fn new(
        def: &'static ResourceDef<S>,
        transport: Arc<dyn Transport>,
        poller: Arc<dyn OperationPoller>,
        defaults: ProviderDefaults,
        base_paths: BasePaths,
    ) -> Self {
        Self {
            def,
            transport,
            poller,
            defaults,
            base_paths,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the resource described by `instance.spec`
    ///
    /// The ReconcilerID is assigned as soon as the create call is accepted
    /// and voided again if the operation fails or times out.
    pub async fn create(&self, instance: &mut Instance<S>) -> Result<()> {
        if let Some(id) = &instance.id {
            return Err(self.invalid(format!("already created as {}", id)));
        }

        let mut spec = instance.spec.clone();
        self.apply_defaults(&mut spec)?;
        self.validate(&spec)?;

        let id = self.render(self.def.id_template, &spec)?;
        let mut url = self.url(self.def.create.path, &spec)?;
        if self.def.request_id {
            url = with_query(&url, "requestId", &uuid::Uuid::new_v4().to_string());
        }
        let body = self.request_body(&spec);

        instance.phase = Phase::Creating;
        tracing::info!("Creating {} {}", self.def.display_name, id);

        let response = match self
            .transport
            .send(self.def.create.method, self.billing(), &url, Some(&body))
            .await
        {
            Ok(response) => response,
            Err(source) => {
                instance.phase = Phase::Absent;
                return Err(ReconcileError::Create {
                    kind: self.def.kind,
                    source,
                });
            },
        };

        instance.id = Some(id.clone());
        instance.spec = spec;

        let timeout = self.def.timeouts.create;
        if let Err(e) = self.wait(&response, &instance.spec, timeout).await {
            tracing::warn!("Create of {} did not complete: {}", id, e);
            instance.clear();
            return Err(wait_error(id, "creating", timeout, e, |id, source| {
                ReconcileError::CreateWait { id, source }
            }));
        }

        tracing::info!("Finished creating {} {}", self.def.display_name, id);
        self.read_after_mutation(instance, &id).await
    }

    /// Refresh `instance.spec` from the server
    ///
    /// On [`ReadOutcome::NotFound`] the instance's identity is cleared.
    pub async fn read(&self, instance: &mut Instance<S>) -> Result<ReadOutcome> {
        let id = self.require_id(instance)?;
        self.identify(&id, &mut instance.spec)?;
        let url = self.url(self.def.read.path, &instance.spec)?;

        let body = match self
            .transport
            .send(self.def.read.method, self.billing(), &url, None)
            .await
        {
            Ok(body) => body,
            Err(e) if (self.def.not_found)(&e) => {
                tracing::warn!("{} {} not found, removing from state", self.def.display_name, id);
                instance.clear();
                return Ok(ReadOutcome::NotFound);
            },
            Err(source) => return Err(ReconcileError::Read { id, source }),
        };

        self.flatten(&id, &body, &mut instance.spec)?;
        instance.phase = Phase::Present;
        Ok(ReadOutcome::Found)
    }

    /// Move the resource from `instance.spec` to `desired`
    ///
    /// Changed fields go out in one call together with the last read
    /// fingerprint. Keyed collections are then updated item by item; the first
    /// failing call aborts the rest and the remote state must be read again.
    pub async fn update(&self, instance: &mut Instance<S>, desired: S) -> Result<()> {
        let id = self.require_id(instance)?;

        let mut desired = desired;
        self.apply_defaults(&mut desired)?;
        self.validate(&desired)?;

        let changes = diff_fields(self.def, &instance.spec, &desired)
            .map_err(|field| ReconcileError::ForceNew {
                id: id.clone(),
                field,
            })?;

        instance.phase = Phase::Updating;
        let timeout = self.def.timeouts.update;

        if !changes.is_empty() {
            let Some(endpoint) = self.def.update else {
                instance.phase = Phase::Present;
                return Err(ReconcileError::ForceNew {
                    id,
                    field: changes[0].name,
                });
            };

            let mut body = Map::new();
            for change in &changes {
                body.insert(
                    change.wire.to_string(),
                    change.value.clone().unwrap_or(Value::Null),
                );
            }
            if let Some((wire, fingerprint)) = self.fingerprint(&instance.spec) {
                body.insert(wire.to_string(), fingerprint);
            }

            let mut url = self.url(endpoint.path, &desired)?;
            if endpoint.update_mask {
                let mask: Vec<&str> = changes.iter().map(|c| c.wire).collect();
                url = with_query(&url, "updateMask", &mask.join(","));
            }

            tracing::info!(
                "Updating {} {}: {:?}",
                self.def.display_name,
                id,
                changes.iter().map(|c| c.name).collect::<Vec<_>>()
            );
            let response = self
                .mutate(&id, endpoint.method, &url, Some(&Value::Object(body)))
                .await?;
            self.wait(&response, &desired, timeout)
                .await
                .map_err(|e| update_wait_error(&id, timeout, e))?;
        }

        for collection in self.def.collections {
            let Some(new_items) = (collection.items)(&desired) else {
                continue;
            };
            let old_items = (collection.items)(&instance.spec).unwrap_or_default();

            for change in diff_keyed(&old_items, &new_items) {
                let (endpoint, body) = match &change {
                    ItemChange::Add(item) => (collection.add, Some(&item.body)),
                    ItemChange::Patch(item) => (collection.patch, Some(&item.body)),
                    ItemChange::Remove(_) => (collection.remove, None),
                };

                let key = change.key().to_string();
                let path = template::render(endpoint.path, |name| {
                    if name == "key" {
                        Some(key.clone())
                    } else {
                        self.def.value_of(&desired, name)
                    }
                })
                .map_err(|e| self.template_error(e))?;
                let url = self.base_paths.url(self.def.service, &path);

                tracing::info!("{} {} {} {}", describe(&change), collection.field, key, id);
                let response = self.mutate(&id, endpoint.method, &url, body).await?;
                self.wait(&response, &desired, timeout)
                    .await
                    .map_err(|e| update_wait_error(&id, timeout, e))?;
            }
        }

        self.read_after_mutation(instance, &id).await
    }

    /// Delete the resource; an already missing resource counts as deleted
    ///
    /// Identity is cleared once the delete call is accepted, even when
    /// waiting on its operation fails.
    pub async fn delete(&self, instance: &mut Instance<S>) -> Result<()> {
        let id = self.require_id(instance)?;
        self.identify(&id, &mut instance.spec)?;
        let url = self.url(self.def.delete.path, &instance.spec)?;

        instance.phase = Phase::Deleting;
        tracing::info!("Deleting {} {}", self.def.display_name, id);

        let response = match self
            .transport
            .send(self.def.delete.method, self.billing(), &url, None)
            .await
        {
            Ok(response) => response,
            Err(e) if (self.def.not_found)(&e) => {
                tracing::info!("{} {} already deleted", self.def.display_name, id);
                instance.clear();
                return Ok(());
            },
            Err(source) => {
                instance.phase = Phase::Present;
                return Err(ReconcileError::Delete { id, source });
            },
        };

        let timeout = self.def.timeouts.delete;
        let waited = self.wait(&response, &instance.spec, timeout).await;
        instance.clear();

        waited.map_err(|e| {
            wait_error(id.clone(), "deleting", timeout, e, |id, source| {
                ReconcileError::DeleteWait { id, source }
            })
        })?;

        tracing::info!("Finished deleting {} {}", self.def.display_name, id);
        Ok(())
    }

    /// Build an instance from an external identifier without touching the API
    ///
    /// Import patterns are tried in order; segments a pattern leaves out are
    /// filled from the provider defaults. Read the instance afterwards to
    /// populate the rest of its fields.
    pub fn import(&self, import_id: &str) -> Result<Instance<S>> {
        let mut spec = S::default();
        self.identify(import_id, &mut spec)?;
        self.apply_defaults(&mut spec)?;

        let id = template::render(self.def.id_template, |name| {
            self.def.value_of(&spec, name)
        })
        .map_err(|e| self.invalid(format!("cannot build id from {:?}: {}", import_id, e)))?;

        tracing::info!("Imported {} {}", self.def.display_name, id);
        Ok(Instance {
            id: Some(id),
            spec,
            phase: Phase::Importing,
        })
    }

    /// The ReconcilerID `spec` would be created under, after defaults
    pub fn id_for(&self, spec: &S) -> Result<String> {
        let mut spec = spec.clone();
        self.apply_defaults(&mut spec)?;
        self.render(self.def.id_template, &spec)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn billing(&self) -> Option<&str> {
        self.defaults.billing_project.as_deref()
    }

    fn invalid(&self, message: String) -> ReconcileError {
        ReconcileError::Validation {
            kind: self.def.kind,
            message,
        }
    }

    fn template_error(&self, e: TemplateError) -> ReconcileError {
        self.invalid(e.to_string())
    }

    fn require_id(&self, instance: &Instance<S>) -> Result<String> {
        instance
            .id
            .clone()
            .ok_or_else(|| self.invalid("resource has no id; create or import it first".to_string()))
    }

    fn render(&self, path: &str, spec: &S) -> Result<String> {
        template::render(path, |name| self.def.value_of(spec, name))
            .map_err(|e| self.template_error(e))
    }

    fn url(&self, path: &str, spec: &S) -> Result<String> {
        let path = self.render(path, spec)?;
        Ok(self.base_paths.url(self.def.service, &path))
    }

    fn apply_defaults(&self, spec: &mut S) -> Result<()> {
        for field in self.def.fields {
            let Some(key) = field.default else {
                continue;
            };
            if (field.get)(spec).is_some() {
                continue;
            }
            let value = match key {
                DefaultKey::Project => self.defaults.project.clone(),
                DefaultKey::Region => self.defaults.region.clone(),
                DefaultKey::Fixed(value) => Some(value.to_string()),
            };
            if let Some(value) = value {
                (field.set)(spec, Some(Value::String(value)))
                    .map_err(|e| self.invalid(format!("{}: {}", field.name, e)))?;
            }
        }
        Ok(())
    }

    fn validate(&self, spec: &S) -> Result<()> {
        for field in self.def.fields {
            if field.behavior == Behavior::Required && (field.get)(spec).is_none() {
                return Err(self.invalid(format!("missing required field {}", field.name)));
            }
        }
        for name in template::variables(self.def.id_template) {
            if self.def.value_of(spec, &name).is_none() {
                return Err(self.invalid(format!(
                    "cannot determine {}; set it or configure a default",
                    name
                )));
            }
        }
        (self.def.validate)(spec).map_err(|message| self.invalid(message))
    }

    /// Wire body of every input field set in `spec`
    fn request_body(&self, spec: &S) -> Value {
        let mut body = Map::new();
        for field in self.def.fields.iter().filter(|f| f.is_input()) {
            if let (Some(wire), Some(value)) = (field.wire, (field.get)(spec)) {
                body.insert(wire.to_string(), value);
            }
        }
        Value::Object(body)
    }

    fn fingerprint(&self, spec: &S) -> Option<(&'static str, Value)> {
        let field = self.def.field(self.def.fingerprint?)?;
        Some((field.wire?, (field.get)(spec)?))
    }

    /// Overwrite identifying fields with the segments of `import_id`
    fn identify(&self, import_id: &str, spec: &mut S) -> Result<()> {
        let groups = template::parse_import(self.def.import_formats, import_id)
            .map_err(|e| self.template_error(e))?
            .ok_or_else(|| ReconcileError::ImportFormat {
                kind: self.def.kind,
                import_id: import_id.to_string(),
                formats: self.def.import_formats.iter().map(|f| f.to_string()).collect(),
            })?;

        for (name, value) in groups {
            let field = self
                .def
                .field(&name)
                .ok_or_else(|| self.invalid(format!("import pattern names unknown field {}", name)))?;
            (field.set)(spec, Some(Value::String(value))).map_err(|message| {
                ReconcileError::Decode {
                    id: import_id.to_string(),
                    field: field.name,
                    message,
                }
            })?;
        }
        Ok(())
    }

    /// Decode a resource body into `spec` through each field's flatten rule
    fn flatten(&self, id: &str, body: &Value, spec: &mut S) -> Result<()> {
        for field in self.def.fields {
            let Some(wire) = field.wire else {
                continue;
            };
            let value = body.get(wire).filter(|v| !v.is_null()).cloned();
            if value.is_none() && field.keeps_value_when_absent() {
                continue;
            }
            (field.set)(spec, value).map_err(|message| ReconcileError::Decode {
                id: id.to_string(),
                field: field.name,
                message,
            })?;
        }
        Ok(())
    }

    async fn read_after_mutation(&self, instance: &mut Instance<S>, id: &str) -> Result<()> {
        match self.read(instance).await? {
            ReadOutcome::Found => Ok(()),
            ReadOutcome::NotFound => Err(ReconcileError::Read {
                id: id.to_string(),
                source: TransportError::Api {
                    status: 404,
                    message: "resource disappeared right after it was written".to_string(),
                },
            }),
        }
    }

    /// A mutating call during update; 409/412 mean the fingerprint was stale
    async fn mutate(
        &self,
        id: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        self.transport
            .send(method, self.billing(), url, body)
            .await
            .map_err(|source| {
                if source.is_conflict() {
                    ReconcileError::Conflict {
                        id: id.to_string(),
                        source,
                    }
                } else {
                    ReconcileError::Update {
                        id: id.to_string(),
                        source,
                    }
                }
            })
    }

    /// Wait on the operation a mutating call returned, if any
    async fn wait(
        &self,
        response: &Value,
        spec: &S,
        timeout: Duration,
    ) -> std::result::Result<(), PollError> {
        let Some(style) = self.def.operation else {
            return Ok(());
        };
        let Some(operation) = AsyncOperation::from_response(style, response) else {
            return Ok(());
        };

        let scope = self.operation_scope(spec).await?;
        self.poller
            .wait_until_done(&operation, scope.as_deref(), timeout)
            .await?;
        Ok(())
    }

    async fn operation_scope(&self, spec: &S) -> std::result::Result<Option<String>, PollError> {
        match self.def.scope {
            OperationScope::Project => Ok(self
                .def
                .value_of(spec, "project")
                .map(|p| format!("projects/{}", p))),
            OperationScope::PolicyParent { policy_field } => {
                let policy = self.def.value_of(spec, policy_field).ok_or_else(|| {
                    PollError::Malformed(format!("{} is not set", policy_field))
                })?;
                let url = self.base_paths.url(Service::Compute, &policy);
                let body = self
                    .transport
                    .send(Method::Get, None, &url, None)
                    .await
                    .map_err(|source| PollError::Transport {
                        operation: format!("reading parent of {}", policy),
                        source,
                    })?;
                body.get("parent")
                    .and_then(|v| v.as_str())
                    .map(|p| Some(p.to_string()))
                    .ok_or_else(|| PollError::Malformed(format!("{} has no parent", policy)))
            },
        }
    }
}

fn describe(change: &ItemChange) -> &'static str {
    match change {
        ItemChange::Add(_) => "Adding",
        ItemChange::Patch(_) => "Patching",
        ItemChange::Remove(_) => "Removing",
    }
}

/// Append a query parameter to a URL that may already carry some
fn with_query(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, key, urlencoding::encode(value))
}

/// Timeouts surface as [`ReconcileError::Timeout`]; everything else goes
/// through `wrap`
fn wait_error(
    id: String,
    operation: &'static str,
    timeout: Duration,
    error: PollError,
    wrap: fn(String, PollError) -> ReconcileError,
) -> ReconcileError {
    match error {
        PollError::Timeout { .. } => ReconcileError::Timeout {
            id,
            operation,
            timeout,
        },
        other => wrap(id, other),
    }
}

fn update_wait_error(id: &str, timeout: Duration, error: PollError) -> ReconcileError {
    wait_error(id.to_string(), "updating", timeout, error, |id, source| {
        ReconcileError::UpdateWait { id, source }
    })
}
