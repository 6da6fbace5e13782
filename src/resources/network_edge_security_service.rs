//! Compute network edge security service (regional)

use super::{check_gce_name, flatten_id, flatten_short_name};
use crate::error::TransportError;
use crate::gcp::client::Service;
use crate::gcp::http::Method;
use crate::gcp::operation::OperationStyle;
use crate::resource::{
    expand, flatten, Behavior, DefaultKey, Endpoint, Field, OperationScope, ResourceDef, Timeouts,
    UpdateEndpoint,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkEdgeSecurityService {
    pub name: Option<String>,
    pub project: Option<String>,
    /// Short region name; region URLs are accepted and shortened on read
    pub region: Option<String>,
    pub description: Option<String>,
    /// URL of the edge security policy applied to this service
    pub security_policy: Option<String>,
    pub fingerprint: Option<String>,
    pub self_link: Option<String>,
    pub service_id: Option<String>,
    pub creation_timestamp: Option<String>,
}

fn validate(spec: &NetworkEdgeSecurityService) -> Result<(), String> {
    check_gce_name("name", spec.name.as_deref())
}

pub static NETWORK_EDGE_SECURITY_SERVICE: ResourceDef<NetworkEdgeSecurityService> = ResourceDef {
    kind: "compute_network_edge_security_service",
    display_name: "NetworkEdgeSecurityService",
    service: Service::Compute,
    id_template: "projects/{{project}}/regions/{{region}}/networkEdgeSecurityServices/{{name}}",
    import_formats: &[
        "projects/(?P<project>[^/]+)/regions/(?P<region>[^/]+)/networkEdgeSecurityServices/(?P<name>[^/]+)",
        "(?P<project>[^/]+)/(?P<name>[^/]+)",
        "(?P<region>[^/]+)/(?P<name>[^/]+)",
        "(?P<name>[^/]+)",
    ],
    create: Endpoint::new(
        Method::Post,
        "projects/{{project}}/regions/{{region}}/networkEdgeSecurityServices",
    ),
    read: Endpoint::new(
        Method::Get,
        "projects/{{project}}/regions/{{region}}/networkEdgeSecurityServices/{{name}}",
    ),
    update: Some(UpdateEndpoint {
        method: Method::Patch,
        path: "projects/{{project}}/regions/{{region}}/networkEdgeSecurityServices/{{name}}",
        update_mask: false,
    }),
    delete: Endpoint::new(
        Method::Delete,
        "projects/{{project}}/regions/{{region}}/networkEdgeSecurityServices/{{name}}",
    ),
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
            name: "region",
            wire: Some("region"),
            behavior: Behavior::OptionalComputed,
            force_new: true,
            default: Some(DefaultKey::Region),
            get: |s| expand(&s.region),
            set: |s, v| flatten_short_name(&mut s.region, v),
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
            name: "security_policy",
            wire: Some("securityPolicy"),
            behavior: Behavior::Optional,
            force_new: true,
            default: None,
            get: |s| expand(&s.security_policy),
            set: |s, v| flatten(&mut s.security_policy, v),
        },
        Field {
            name: "fingerprint",
            wire: Some("fingerprint"),
            behavior: Behavior::Computed,
            force_new: false,
            default: None,
            get: |s| expand(&s.fingerprint),
            set: |s, v| flatten(&mut s.fingerprint, v),
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
            name: "service_id",
            wire: Some("id"),
            behavior: Behavior::Computed,
            force_new: false,
            default: None,
            get: |s| expand(&s.service_id),
            set: |s, v| flatten_id(&mut s.service_id, v),
        },
        Field {
            name: "creation_timestamp",
            wire: Some("creationTimestamp"),
            behavior: Behavior::Computed,
            force_new: false,
            default: None,
            get: |s| expand(&s.creation_timestamp),
            set: |s, v| flatten(&mut s.creation_timestamp, v),
        },
    ],
    collections: &[],
    fingerprint: Some("fingerprint"),
    operation: Some(OperationStyle::Compute),
    scope: OperationScope::Project,
    timeouts: Timeouts::minutes(4, 4, 4),
    request_id: true,
    not_found: TransportError::is_not_found,
    validate,
};
