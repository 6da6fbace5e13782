//! Resource Registry - supported kinds by key
//!
//! Collects the type-erased facts about every [`ResourceDef`] in
//! [`crate::resources`] so callers can list kinds and validate a kind key
//! before dispatching to the typed reconciler.

use super::schema::ResourceDef;
use crate::resources::{
    gateway_security_policy::GATEWAY_SECURITY_POLICY,
    global_network_endpoint_group::GLOBAL_NETWORK_ENDPOINT_GROUP,
    network_edge_security_service::NETWORK_EDGE_SECURITY_SERVICE,
    org_security_policy_association::ORG_SECURITY_POLICY_ASSOCIATION,
    region_security_policy::REGION_SECURITY_POLICY, url_list::URL_LIST,
};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::OnceLock;

/// Kind metadata independent of the spec type
#[derive(Debug, Clone)]
pub struct KindInfo {
    pub key: &'static str,
    pub id_template: &'static str,
    pub import_formats: &'static [&'static str],
    pub updatable: bool,
}

impl<S: 'static> From<&ResourceDef<S>> for KindInfo {
    fn from(def: &ResourceDef<S>) -> Self {
        Self {
            key: def.kind,
            id_template: def.id_template,
            import_formats: def.import_formats,
            updatable: def.update.is_some() || !def.collections.is_empty(),
        }
    }
}

static REGISTRY: OnceLock<BTreeMap<&'static str, KindInfo>> = OnceLock::new();

/// Get the kind registry (built on first access)
pub fn get_registry() -> &'static BTreeMap<&'static str, KindInfo> {
    REGISTRY.get_or_init(|| {
        [
            KindInfo::from(&NETWORK_EDGE_SECURITY_SERVICE),
            KindInfo::from(&REGION_SECURITY_POLICY),
            KindInfo::from(&GLOBAL_NETWORK_ENDPOINT_GROUP),
            KindInfo::from(&ORG_SECURITY_POLICY_ASSOCIATION),
            KindInfo::from(&URL_LIST),
            KindInfo::from(&GATEWAY_SECURITY_POLICY),
        ]
        .into_iter()
        .map(|info| (info.key, info))
        .collect()
    })
}

/// Get a kind by key
pub fn get_kind(key: &str) -> Option<&'static KindInfo> {
    get_registry().get(key)
}

/// All kinds, sorted by key
pub fn all_kinds() -> Vec<&'static KindInfo> {
    get_registry().values().collect()
}

/// Table of every kind for `gcpr kinds`: one row per kind, then its import formats
pub fn kinds_table() -> String {
    let mut out = format!("{:<52} {:<10} {}\n", "KIND", "UPDATABLE", "ID");
    for kind in all_kinds() {
        let _ = writeln!(
            out,
            "{:<52} {:<10} {}",
            kind.key,
            if kind.updatable { "yes" } else { "no" },
            kind.id_template
        );
        for format in kind.import_formats {
            let _ = writeln!(out, "    import: {}", import_example(format));
        }
    }
    out
}

/// Turn an anchored import regex back into a readable `{{var}}` form
fn import_example(format: &str) -> String {
    let body = format.trim_start_matches('^').trim_end_matches('$');
    let mut out = String::new();
    let mut rest = body;
    while let Some(start) = rest.find("(?P<") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 4..];
        let Some(name_end) = after.find('>') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str("{{");
        out.push_str(&after[..name_end]);
        out.push_str("}}");
        rest = match after[name_end..].find(')') {
            Some(close) => &after[name_end + close + 1..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}
