//! Resource kinds
//!
//! Each module declares a typed spec struct and the static [`ResourceDef`]
//! describing how it maps onto its REST API.
//!
//! [`ResourceDef`]: crate::resource::ResourceDef

pub mod gateway_security_policy;
pub mod global_network_endpoint_group;
pub mod network_edge_security_service;
pub mod org_security_policy_association;
pub mod region_security_policy;
pub mod url_list;

pub use gateway_security_policy::GatewaySecurityPolicy;
pub use global_network_endpoint_group::GlobalNetworkEndpointGroup;
pub use network_edge_security_service::NetworkEdgeSecurityService;
pub use org_security_policy_association::OrgSecurityPolicyAssociation;
pub use region_security_policy::RegionSecurityPolicy;
pub use url_list::UrlList;

use crate::gcp::client::short_name;
use crate::resource::flatten;
use regex::Regex;
use serde_json::Value;

/// Compute Engine resource names (RFC 1035, at most 63 characters)
const GCE_NAME_PATTERN: &str = r"^(?:[a-z](?:[-a-z0-9]{0,61}[a-z0-9])?)$";

/// Validate a Compute Engine resource name
pub(crate) fn check_gce_name(field: &str, value: Option<&str>) -> Result<(), String> {
    let Some(value) = value else {
        return Ok(());
    };
    let re = Regex::new(GCE_NAME_PATTERN).map_err(|e| e.to_string())?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "{} {:?} must be 1-63 characters of lowercase letters, digits or hyphens, starting with a letter",
            field, value
        ))
    }
}

/// Flatten a self link or name to its last path segment
pub(crate) fn flatten_short_name(slot: &mut Option<String>, value: Option<Value>) -> Result<(), String> {
    flatten(slot, value)?;
    if let Some(full) = slot.take() {
        *slot = Some(short_name(&full).to_string());
    }
    Ok(())
}

/// Flatten a numeric identifier, which compute sends either as a JSON
/// number or as a string
pub(crate) fn flatten_id(slot: &mut Option<String>, value: Option<Value>) -> Result<(), String> {
    let value = value.map(|v| match v {
        Value::Number(n) => Value::String(n.to_string()),
        other => other,
    });
    flatten(slot, value)
}

// =========================================================================
// Wire readers for nested objects
// =========================================================================

pub(crate) fn str_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

pub(crate) fn bool_at(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(|v| v.as_bool())
}

/// Integers; compute encodes int64 values as strings
pub(crate) fn i64_at(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn strings_at(value: &Value, key: &str) -> Option<Vec<String>> {
    value.get(key).and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str().map(String::from))
            .collect()
    })
}
