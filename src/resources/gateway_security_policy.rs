//! Network security gateway security policy (Secure Web Proxy)

use crate::error::TransportError;
use crate::gcp::client::Service;
use crate::gcp::http::Method;
use crate::gcp::operation::OperationStyle;
use crate::resource::{
    expand, flatten, no_validation, Behavior, DefaultKey, Endpoint, Field, OperationScope,
    ResourceDef, Timeouts, UpdateEndpoint,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySecurityPolicy {
    pub name: Option<String>,
    pub project: Option<String>,
    /// Defaults to `global`
    pub location: Option<String>,
    pub description: Option<String>,
    pub self_link: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

const POLICY_PATH: &str =
    "projects/{{project}}/locations/{{location}}/gatewaySecurityPolicies/{{name}}";

pub static GATEWAY_SECURITY_POLICY: ResourceDef<GatewaySecurityPolicy> = ResourceDef {
    kind: "network_security_gateway_security_policy",
    display_name: "GatewaySecurityPolicy",
    service: Service::NetworkSecurity,
    id_template: POLICY_PATH,
    import_formats: &[
        "projects/(?P<project>[^/]+)/locations/(?P<location>[^/]+)/gatewaySecurityPolicies/(?P<name>[^/]+)",
        "(?P<project>[^/]+)/(?P<location>[^/]+)/(?P<name>[^/]+)",
        "(?P<location>[^/]+)/(?P<name>[^/]+)",
    ],
    create: Endpoint::new(
        Method::Post,
        "projects/{{project}}/locations/{{location}}/gatewaySecurityPolicies?gatewaySecurityPolicyId={{name}}",
    ),
    read: Endpoint::new(Method::Get, POLICY_PATH),
    update: Some(UpdateEndpoint {
        method: Method::Patch,
        path: POLICY_PATH,
        update_mask: true,
    }),
    delete: Endpoint::new(Method::Delete, POLICY_PATH),
    fields: &[
        Field {
            name: "name",
            wire: None,
            behavior: Behavior::Required,
            force_new: true,
            default: None,
            get: |s| expand(&s.name),
            set: |s, v| flatten(&mut s.name, v),
        },
        Field {
            name: "location",
            wire: None,
            behavior: Behavior::OptionalComputed,
            force_new: true,
            default: Some(DefaultKey::Fixed("global")),
            get: |s| expand(&s.location),
            set: |s, v| flatten(&mut s.location, v),
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
            force_new: false,
            default: None,
            get: |s| expand(&s.description),
            set: |s, v| flatten(&mut s.description, v),
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
        Field {
            name: "create_time",
            wire: Some("createTime"),
            behavior: Behavior::Computed,
            force_new: false,
            default: None,
            get: |s| expand(&s.create_time),
            set: |s, v| flatten(&mut s.create_time, v),
        },
        Field {
            name: "update_time",
            wire: Some("updateTime"),
            behavior: Behavior::Computed,
            force_new: false,
            default: None,
            get: |s| expand(&s.update_time),
            set: |s, v| flatten(&mut s.update_time, v),
        },
    ],
    collections: &[],
    fingerprint: None,
    operation: Some(OperationStyle::LongRunning),
    scope: OperationScope::Project,
    timeouts: Timeouts::minutes(30, 30, 30),
    request_id: false,
    not_found: TransportError::is_not_found,
    validate: no_validation,
};
