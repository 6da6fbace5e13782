//! In-memory stand-in for the Compute API
//!
//! Stores resources by path, answers with `compute#operation` bodies and
//! records every call so tests can assert on the exact request sequence.

#![allow(dead_code)]

use async_trait::async_trait;
use gcp_reconciler::gcp::client::{BasePaths, ProviderDefaults, Transport};
use gcp_reconciler::gcp::http::Method;
use gcp_reconciler::gcp::operation::{GcpOperationPoller, PollSettings};
use gcp_reconciler::resource::{Reconciler, ResourceDef};
use gcp_reconciler::TransportError;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "https://compute.fake.test/";
pub const PROJECT: &str = "my-project";
pub const REGION: &str = "us-central1";

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub billing_project: Option<String>,
    pub body: Option<Value>,
}

impl Call {
    /// URL without the fake's base, e.g. `projects/p/regions/r/...`
    pub fn path(&self) -> &str {
        self.url.strip_prefix(BASE).unwrap_or(&self.url)
    }
}

#[derive(Debug)]
struct PendingOperation {
    polls_left: usize,
    error: Option<String>,
    body: Value,
}

#[derive(Default)]
struct Inner {
    resources: BTreeMap<String, Value>,
    calls: Vec<Call>,
    operations: HashMap<String, PendingOperation>,
    next_operation: u64,
    next_fingerprint: u64,
    next_numeric_id: u64,
    running_polls: usize,
    failing_operation: Option<String>,
    failures: Vec<(Method, String, TransportError)>,
}

#[derive(Default)]
pub struct FakeGcp {
    inner: Mutex<Inner>,
}

impl FakeGcp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Every call except GETs
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method != Method::Get)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn resource(&self, path: &str) -> Option<Value> {
        self.inner.lock().unwrap().resources.get(path).cloned()
    }

    /// Change a stored resource behind the reconciler's back; bumps the fingerprint
    pub fn modify_externally(&self, path: &str, key: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        let fingerprint = inner.fingerprint();
        if let Some(resource) = inner.resources.get_mut(path) {
            resource[key] = value;
            resource["fingerprint"] = json!(fingerprint);
        }
    }

    pub fn remove_externally(&self, path: &str) {
        self.inner.lock().unwrap().resources.remove(path);
    }

    /// New operations report RUNNING for this many polls
    pub fn set_running_polls(&self, polls: usize) {
        self.inner.lock().unwrap().running_polls = polls;
    }

    /// The next operation finishes with this error
    pub fn fail_next_operation(&self, message: &str) {
        self.inner.lock().unwrap().failing_operation = Some(message.to_string());
    }

    /// The next `method` call whose URL contains `fragment` fails with `error`
    pub fn fail_on(&self, method: Method, fragment: &str, error: TransportError) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .push((method, fragment.to_string(), error));
    }

    pub fn reconciler<S>(self: &Arc<Self>, def: &'static ResourceDef<S>) -> Reconciler<S>
    where
        S: Clone + Default + Send + Sync + 'static,
    {
        let transport: Arc<dyn Transport> = self.clone();
        let poller = Arc::new(GcpOperationPoller::new(
            transport.clone(),
            BasePaths::uniform(BASE),
            None,
            PollSettings::with_initial_interval(Duration::from_millis(10)),
        ));
        Reconciler::new(
            def,
            transport,
            poller,
            ProviderDefaults {
                project: Some(PROJECT.to_string()),
                region: Some(REGION.to_string()),
                ..Default::default()
            },
            BasePaths::uniform(BASE),
        )
    }
}

fn not_found(path: &str) -> TransportError {
    TransportError::Api {
        status: 404,
        message: format!("The resource '{}' was not found", path),
    }
}

fn bad_request(message: String) -> TransportError {
    TransportError::Api {
        status: 400,
        message,
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let value = urlencoding::decode(v).map(|v| v.into_owned()).unwrap_or_default();
            (k.to_string(), value)
        })
        .collect()
}

/// `projects/p/regions/r` or `projects/p/global` for a resource path
fn operation_scope(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        ["projects", project, "regions", region, ..] => {
            format!("projects/{}/regions/{}", project, region)
        },
        ["projects", project, ..] => format!("projects/{}/global", project),
        _ => "global".to_string(),
    }
}

impl Inner {
    fn fingerprint(&mut self) -> String {
        self.next_fingerprint += 1;
        format!("fp-{}", self.next_fingerprint)
    }

    fn operation(&mut self, target: &str, kind: &str) -> Value {
        self.next_operation += 1;
        let name = format!("operation-{}", self.next_operation);
        let self_link = format!("{}{}/operations/{}", BASE, operation_scope(target), name);
        let error = self.failing_operation.take();

        let mut body = json!({
            "kind": "compute#operation",
            "name": name,
            "operationType": kind,
            "targetLink": format!("{}{}", BASE, target),
            "selfLink": self_link,
            "status": "DONE",
        });

        if self.running_polls > 0 {
            self.operations.insert(
                format!("{}/operations/{}", operation_scope(target), name),
                PendingOperation {
                    polls_left: self.running_polls,
                    error,
                    body: body.clone(),
                },
            );
            body["status"] = json!("RUNNING");
        } else if let Some(message) = error {
            body["error"] = json!({"errors": [{"code": "RESOURCE_ERROR", "message": message}]});
        }
        body
    }

    fn poll(&mut self, path: &str) -> Result<Value, TransportError> {
        let op = self.operations.get_mut(path).ok_or_else(|| not_found(path))?;
        if op.polls_left > 1 {
            op.polls_left -= 1;
            let mut body = op.body.clone();
            body["status"] = json!("RUNNING");
            return Ok(body);
        }
        let mut body = op.body.clone();
        if let Some(message) = &op.error {
            body["error"] = json!({"errors": [{"code": "RESOURCE_ERROR", "message": message}]});
        }
        self.operations.remove(path);
        Ok(body)
    }

    fn create(&mut self, collection: &str, query: &HashMap<String, String>, body: &Value) -> Result<Value, TransportError> {
        let name = body
            .get("name")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| {
                query
                    .iter()
                    .find(|(k, _)| k.ends_with("Id") && k.as_str() != "requestId")
                    .map(|(_, v)| v.clone())
            })
            .ok_or_else(|| bad_request("name is required".to_string()))?;

        let path = format!("{}/{}", collection, name);
        if self.resources.contains_key(&path) {
            return Err(TransportError::Api {
                status: 409,
                message: format!("The resource '{}' already exists", path),
            });
        }

        self.next_numeric_id += 1;
        let mut stored = body.as_object().cloned().unwrap_or_default();
        stored.insert("name".to_string(), json!(name));
        stored.insert("selfLink".to_string(), json!(format!("{}{}", BASE, path)));
        stored.insert("id".to_string(), json!(format!("{}", 7_000_000 + self.next_numeric_id)));
        stored.insert(
            "creationTimestamp".to_string(),
            json!("2026-10-19T08:00:00.000-07:00"),
        );
        stored.insert("fingerprint".to_string(), json!(self.fingerprint()));
        if let ["projects", project, "regions", region, ..] =
            path.split('/').collect::<Vec<_>>().as_slice()
        {
            stored.insert(
                "region".to_string(),
                json!(format!("{}projects/{}/regions/{}", BASE, project, region)),
            );
        }
        if path.contains("/securityPolicies/") && !stored.contains_key("rules") {
            stored.insert("rules".to_string(), json!([]));
        }

        self.resources.insert(path.clone(), Value::Object(stored));
        Ok(self.operation(&path, "insert"))
    }

    fn patch(&mut self, path: &str, body: &Value) -> Result<Value, TransportError> {
        let fingerprint = self.fingerprint();
        let stored = self.resources.get_mut(path).ok_or_else(|| not_found(path))?;

        if let Some(sent) = body.get("fingerprint") {
            if stored.get("fingerprint") != Some(sent) {
                return Err(TransportError::Api {
                    status: 412,
                    message: "Supplied fingerprint does not match current metadata fingerprint."
                        .to_string(),
                });
            }
        }

        let object = stored.as_object_mut().ok_or_else(|| not_found(path))?;
        for (key, value) in body.as_object().into_iter().flatten() {
            if key == "fingerprint" {
                continue;
            }
            if value.is_null() {
                object.remove(key);
            } else {
                object.insert(key.clone(), value.clone());
            }
        }
        object.insert("fingerprint".to_string(), json!(fingerprint));
        Ok(self.operation(path, "patch"))
    }

    fn rule_call(
        &mut self,
        policy: &str,
        verb: &str,
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let fingerprint = self.fingerprint();
        let stored = self.resources.get_mut(policy).ok_or_else(|| not_found(policy))?;
        let mut rules: Vec<Value> = stored
            .get("rules")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        let priority_of = |rule: &Value| rule.get("priority").and_then(|p| p.as_i64());
        let key = match verb {
            "addRule" => body.and_then(priority_of),
            _ => query.get("priority").and_then(|p| p.parse().ok()),
        }
        .ok_or_else(|| bad_request("priority is required".to_string()))?;
        let position = rules.iter().position(|r| priority_of(r) == Some(key));

        match (verb, position) {
            ("addRule", None) => rules.push(body.cloned().unwrap_or(Value::Null)),
            ("addRule", Some(_)) => {
                return Err(bad_request(format!("rule {} already exists", key)));
            },
            ("patchRule", Some(i)) => rules[i] = body.cloned().unwrap_or(Value::Null),
            ("removeRule", Some(i)) => {
                rules.remove(i);
            },
            (_, _) => return Err(bad_request(format!("no rule at priority {}", key))),
        }

        stored["rules"] = Value::Array(rules);
        stored["fingerprint"] = json!(fingerprint);
        Ok(self.operation(policy, verb))
    }
}

#[async_trait]
impl Transport for FakeGcp {
    async fn send(
        &self,
        method: Method,
        billing_project: Option<&str>,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call {
            method,
            url: url.to_string(),
            billing_project: billing_project.map(String::from),
            body: body.cloned(),
        });

        if let Some(i) = inner
            .failures
            .iter()
            .position(|(m, fragment, _)| *m == method && url.contains(fragment.as_str()))
        {
            let (_, _, error) = inner.failures.remove(i);
            return Err(error);
        }

        let relative = url.strip_prefix(BASE).unwrap_or(url);
        let (path, query) = relative.split_once('?').unwrap_or((relative, ""));
        let query = parse_query(query);
        let empty = Value::Object(Map::new());

        if path.contains("/operations/") {
            return inner.poll(path);
        }

        match method {
            Method::Get => inner.resources.get(path).cloned().ok_or_else(|| not_found(path)),
            Method::Patch => inner.patch(path, body.unwrap_or(&empty)),
            Method::Delete => {
                inner.resources.remove(path).ok_or_else(|| not_found(path))?;
                Ok(inner.operation(path, "delete"))
            },
            Method::Post => match path.rsplit_once('/') {
                Some((policy, verb @ ("addRule" | "patchRule" | "removeRule"))) => {
                    inner.rule_call(policy, verb, &query, body)
                },
                _ => inner.create(path, &query, body.unwrap_or(&empty)),
            },
        }
    }
}
