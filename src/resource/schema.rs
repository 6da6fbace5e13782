//! Resource definitions
//!
//! A [`ResourceDef`] declares everything the reconciler needs to drive one
//! resource kind: the path templates of its endpoints, the import grammar,
//! timeouts, the operation flavor, and the field table mapping each typed
//! spec field to its wire key through an explicit expand/flatten pair.

use crate::error::TransportError;
use crate::gcp::client::Service;
use crate::gcp::http::Method;
use crate::gcp::operation::OperationStyle;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// How a field participates in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Must be present; fixed at creation
    Required,
    /// May be omitted; server default applies
    Optional,
    /// Output only, populated from the server's answer
    Computed,
    /// Server assigns a value when the caller leaves it out
    OptionalComputed,
}

/// Default used to fill a field left unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultKey {
    Project,
    Region,
    /// A constant, e.g. `global` for a location
    Fixed(&'static str),
}

/// Encode a spec field to its wire value; `None` means absent
pub type Expand<S> = fn(&S) -> Option<Value>;

/// Decode a wire value into a spec field; `None` clears the field
pub type Flatten<S> = fn(&mut S, Option<Value>) -> Result<(), String>;

/// One row of a resource's field table
pub struct Field<S> {
    /// snake_case name, also the template variable name
    pub name: &'static str,
    /// JSON key in request and response bodies; `None` for fields that only
    /// appear in URLs (project, region, parent policy)
    pub wire: Option<&'static str>,
    pub behavior: Behavior,
    pub force_new: bool,
    pub default: Option<DefaultKey>,
    pub get: Expand<S>,
    pub set: Flatten<S>,
}

impl<S> Field<S> {
    /// Whether the caller may supply this field
    pub fn is_input(&self) -> bool {
        self.behavior != Behavior::Computed
    }

    /// Identity and defaulted fields keep their value when the server omits them
    pub fn keeps_value_when_absent(&self) -> bool {
        self.behavior == Behavior::Required || self.default.is_some()
    }
}

/// An item of a keyed collection (e.g. a security policy rule by priority)
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedItem {
    pub key: String,
    pub body: Value,
}

/// A collection field updated item by item instead of wholesale
///
/// Endpoint paths may use `{{key}}` for the item key.
pub struct Collection<S> {
    pub field: &'static str,
    /// `None` when the caller does not manage the collection
    pub items: fn(&S) -> Option<Vec<KeyedItem>>,
    pub add: Endpoint,
    pub patch: Endpoint,
    pub remove: Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub method: Method,
    /// Path template relative to the service base path
    pub path: &'static str,
}

impl Endpoint {
    pub const fn new(method: Method, path: &'static str) -> Self {
        Self { method, path }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateEndpoint {
    pub method: Method,
    pub path: &'static str,
    /// Send the changed wire keys as an `updateMask` query parameter
    pub update_mask: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

/// Where a resource's operations are polled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationScope {
    /// `projects/{{project}}`
    Project,
    /// The `parent` of the policy named by this field, fetched before polling
    PolicyParent { policy_field: &'static str },
}

/// Declarative description of a resource kind
pub struct ResourceDef<S: 'static> {
    pub kind: &'static str,
    pub display_name: &'static str,
    pub service: Service,
    /// Canonical ReconcilerID template
    pub id_template: &'static str,
    /// Import patterns, most specific first; anchored when matched
    pub import_formats: &'static [&'static str],
    pub create: Endpoint,
    pub read: Endpoint,
    /// `None` when every field is ForceNew
    pub update: Option<UpdateEndpoint>,
    pub delete: Endpoint,
    pub fields: &'static [Field<S>],
    pub collections: &'static [Collection<S>],
    /// Name of the field holding the fingerprint
    pub fingerprint: Option<&'static str>,
    /// `None` for resources whose mutations complete synchronously
    pub operation: Option<OperationStyle>,
    pub scope: OperationScope,
    pub timeouts: Timeouts,
    /// Append a fresh `requestId` to create calls
    pub request_id: bool,
    pub not_found: fn(&TransportError) -> bool,
    pub validate: fn(&S) -> Result<(), String>,
}

impl<S: 'static> ResourceDef<S> {
    pub fn field(&self, name: &str) -> Option<&Field<S>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A field's value as a template variable
    pub fn value_of(&self, spec: &S, name: &str) -> Option<String> {
        self.field(name)
            .and_then(|f| (f.get)(spec))
            .and_then(|v| scalar_to_string(&v))
    }

    pub fn is_collection(&self, field: &str) -> bool {
        self.collections.iter().any(|c| c.field == field)
    }
}

/// Accept any spec
pub fn no_validation<S>(_: &S) -> Result<(), String> {
    Ok(())
}

/// Reject values outside an enumeration
pub fn check_one_of(field: &str, value: Option<&str>, allowed: &[&str]) -> Result<(), String> {
    match value {
        Some(v) if !allowed.contains(&v) => Err(format!(
            "expected {} to be one of {:?}, got {}",
            field, allowed, v
        )),
        _ => Ok(()),
    }
}

/// Expand an optional serializable value
pub fn expand<T: Serialize>(value: &Option<T>) -> Option<Value> {
    value.as_ref().and_then(|v| serde_json::to_value(v).ok())
}

/// Flatten a wire value into an optional field; JSON null clears it
pub fn flatten<T: DeserializeOwned>(slot: &mut Option<T>, value: Option<Value>) -> Result<(), String> {
    *slot = match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(serde_json::from_value(v).map_err(|e| e.to_string())?),
    };
    Ok(())
}

/// Strings and numbers as they appear in URLs
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
