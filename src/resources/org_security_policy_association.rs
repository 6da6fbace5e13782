//! Compute organization security policy association
//!
//! Attaches an organization-level security policy to a folder or
//! organization. Operations live under the policy's parent, which is read
//! from the policy itself before polling.

use crate::error::TransportError;
use crate::gcp::client::Service;
use crate::gcp::http::Method;
use crate::gcp::operation::OperationStyle;
use crate::resource::{
    expand, flatten, no_validation, Behavior, Endpoint, Field, OperationScope, ResourceDef,
    Timeouts,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgSecurityPolicyAssociation {
    pub name: Option<String>,
    /// Folder or organization the policy is attached to
    pub attachment_id: Option<String>,
    /// e.g. `locations/global/securityPolicies/123`
    pub policy_id: Option<String>,
    pub display_name: Option<String>,
}

/// getAssociation answers 400 rather than 404 for a missing association
fn association_not_found(err: &TransportError) -> bool {
    match err {
        TransportError::Api { status: 404, .. } => true,
        TransportError::Api {
            status: 400,
            message,
        } => message.contains("does not exist"),
        _ => false,
    }
}

pub static ORG_SECURITY_POLICY_ASSOCIATION: ResourceDef<OrgSecurityPolicyAssociation> =
    ResourceDef {
        kind: "compute_organization_security_policy_association",
        display_name: "OrganizationSecurityPolicyAssociation",
        service: Service::Compute,
        id_template: "{{policy_id}}/association/{{name}}",
        import_formats: &["(?P<policy_id>.+)/association/(?P<name>[^/]+)"],
        create: Endpoint::new(Method::Post, "{{policy_id}}/addAssociation"),
        read: Endpoint::new(Method::Get, "{{policy_id}}/getAssociation?name={{name}}"),
        update: None,
        delete: Endpoint::new(Method::Post, "{{policy_id}}/removeAssociation?name={{name}}"),
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
                name: "attachment_id",
                wire: Some("attachmentId"),
                behavior: Behavior::Required,
                force_new: true,
                default: None,
                get: |s| expand(&s.attachment_id),
                set: |s, v| flatten(&mut s.attachment_id, v),
            },
            Field {
                name: "policy_id",
                wire: None,
                behavior: Behavior::Required,
                force_new: true,
                default: None,
                get: |s| expand(&s.policy_id),
                set: |s, v| flatten(&mut s.policy_id, v),
            },
            Field {
                name: "display_name",
                wire: Some("displayName"),
                behavior: Behavior::Computed,
                force_new: false,
                default: None,
                get: |s| expand(&s.display_name),
                set: |s, v| flatten(&mut s.display_name, v),
            },
        ],
        collections: &[],
        fingerprint: None,
        operation: Some(OperationStyle::ComputeOrganization),
        scope: OperationScope::PolicyParent {
            policy_field: "policy_id",
        },
        timeouts: Timeouts::minutes(20, 20, 20),
        request_id: false,
        not_found: association_not_found,
        validate: no_validation,
    };
