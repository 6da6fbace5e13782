//! Compute global network endpoint group (internet NEG)
//!
//! Every input field is fixed at creation, so the kind has no update call.

use super::check_gce_name;
use crate::error::TransportError;
use crate::gcp::client::Service;
use crate::gcp::http::Method;
use crate::gcp::operation::OperationStyle;
use crate::resource::{
    check_one_of, expand, flatten, Behavior, DefaultKey, Endpoint, Field, OperationScope,
    ResourceDef, Timeouts,
};
use serde::{Deserialize, Serialize};

const ENDPOINT_TYPES: &[&str] = &["INTERNET_IP_PORT", "INTERNET_FQDN_PORT"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalNetworkEndpointGroup {
    pub name: Option<String>,
    pub project: Option<String>,
    pub description: Option<String>,
    /// `INTERNET_IP_PORT` or `INTERNET_FQDN_PORT`
    pub network_endpoint_type: Option<String>,
    pub default_port: Option<u32>,
    pub self_link: Option<String>,
}

fn validate(spec: &GlobalNetworkEndpointGroup) -> Result<(), String> {
    check_gce_name("name", spec.name.as_deref())?;
    check_one_of(
        "network_endpoint_type",
        spec.network_endpoint_type.as_deref(),
        ENDPOINT_TYPES,
    )?;
    match spec.default_port {
        Some(port) if port == 0 || port > 65535 => Err(format!("default_port {} out of range", port)),
        _ => Ok(()),
    }
}

const NEG_PATH: &str = "projects/{{project}}/global/networkEndpointGroups/{{name}}";

pub static GLOBAL_NETWORK_ENDPOINT_GROUP: ResourceDef<GlobalNetworkEndpointGroup> = ResourceDef {
    kind: "compute_global_network_endpoint_group",
    display_name: "GlobalNetworkEndpointGroup",
    service: Service::Compute,
    id_template: NEG_PATH,
    import_formats: &[
        "projects/(?P<project>[^/]+)/global/networkEndpointGroups/(?P<name>[^/]+)",
        "(?P<project>[^/]+)/(?P<name>[^/]+)",
        "(?P<name>[^/]+)",
    ],
    create: Endpoint::new(Method::Post, "projects/{{project}}/global/networkEndpointGroups"),
    read: Endpoint::new(Method::Get, NEG_PATH),
    update: None,
    delete: Endpoint::new(Method::Delete, NEG_PATH),
    fields: &[
        Field {
            name: "name",
            wire: Some("name"),
            behavior: Behavior::Required,
            force_new: true,
            default: None,
            get: |s| expand(&s.name),
            set: |s, v| flatten(&mut s.name, v),
        },
        Field {
            name: "project",
            wire: None,
            behavior: Behavior::OptionalComputed,
            force_new: true,
            default: Some(DefaultKey::Project),
            get: |s| expand(&s.project),
            set: |s, v| flatten(&mut s.project, v),
        },
        Field {
            name: "description",
            wire: Some("description"),
            behavior: Behavior::Optional,
            force_new: true,
            default: None,
            get: |s| expand(&s.description),
            set: |s, v| flatten(&mut s.description, v),
        },
        Field {
            name: "network_endpoint_type",
            wire: Some("networkEndpointType"),
            behavior: Behavior::OptionalComputed,
            force_new: true,
            default: None,
            get: |s| expand(&s.network_endpoint_type),
            set: |s, v| flatten(&mut s.network_endpoint_type, v),
        },
        Field {
            name: "default_port",
            wire: Some("defaultPort"),
            behavior: Behavior::Optional,
            force_new: true,
            default: None,
            get: |s| expand(&s.default_port),
            set: |s, v| flatten(&mut s.default_port, v),
        },
        Field {
            name: "self_link",
            wire: Some("selfLink"),
            behavior: Behavior::Computed,
            force_new: false,
            default: None,
            get: |s| expand(&s.self_link),
            set: |s, v| flatten(&mut s.self_link, v),
        },
    ],
    collections: &[],
    fingerprint: None,
    operation: Some(OperationStyle::Compute),
    scope: OperationScope::Project,
    timeouts: Timeouts::minutes(20, 20, 20),
    request_id: true,
    not_found: TransportError::is_not_found,
    validate,
};
