//! Compute regional security policy (Cloud Armor)
//!
//! Rules are a set keyed by priority. Creation sends them inline; updates go
//! through `addRule` / `patchRule` / `removeRule`, one call per changed rule.

use super::{bool_at, check_gce_name, flatten_short_name, i64_at, str_at, strings_at};
use crate::error::TransportError;
use crate::gcp::client::Service;
use crate::gcp::http::Method;
use crate::gcp::operation::OperationStyle;
use crate::resource::{
    check_one_of, expand, flatten, Behavior, Collection, DefaultKey, Endpoint, Field, KeyedItem,
    OperationScope, ResourceDef, Timeouts, UpdateEndpoint,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const POLICY_TYPES: &[&str] = &[
    "CLOUD_ARMOR",
    "CLOUD_ARMOR_EDGE",
    "CLOUD_ARMOR_INTERNAL_SERVICE",
    "CLOUD_ARMOR_NETWORK",
];
const DDOS_PROTECTION_LEVELS: &[&str] = &["STANDARD", "ADVANCED"];
const JSON_PARSING_MODES: &[&str] = &["DISABLED", "STANDARD"];
const LOG_LEVELS: &[&str] = &["NORMAL", "VERBOSE"];
const RULE_VISIBILITIES: &[&str] = &["STANDARD", "PREMIUM"];
const VERSIONED_EXPRESSIONS: &[&str] = &["SRC_IPS_V1"];
const MAX_SRC_IP_RANGES: usize = 10;
/// Priority of the catch-all rule every policy with rules must carry
pub const DEFAULT_RULE_PRIORITY: i64 = 2147483647;
/// Rate limit key the API fills in when none is given
const DEFAULT_ENFORCE_ON_KEY: &str = "ALL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSecurityPolicy {
    pub name: Option<String>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub policy_type: Option<String>,
    pub rules: Option<Vec<SecurityPolicyRule>>,
    pub ddos_protection_config: Option<DdosProtectionConfig>,
    pub advanced_options_config: Option<AdvancedOptionsConfig>,
    pub adaptive_protection_config: Option<AdaptiveProtectionConfig>,
    pub recaptcha_options_config: Option<RecaptchaOptionsConfig>,
    pub fingerprint: Option<String>,
    pub self_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicyRule {
    pub action: String,
    pub priority: i64,
    pub description: Option<String>,
    pub preview: Option<bool>,
    #[serde(rename = "match")]
    pub rule_match: RuleMatch,
    pub rate_limit_options: Option<RateLimitOptions>,
    pub redirect_options: Option<RedirectOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMatch {
    pub versioned_expr: Option<String>,
    /// Source ranges, used with `versioned_expr`
    pub src_ip_ranges: Option<Vec<String>>,
    /// CEL expression, used instead of `versioned_expr`
    pub expr: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitOptions {
    pub conform_action: Option<String>,
    pub exceed_action: Option<String>,
    pub enforce_on_key: Option<String>,
    pub enforce_on_key_name: Option<String>,
    pub rate_limit_threshold: Option<RateLimitThreshold>,
    pub ban_threshold: Option<RateLimitThreshold>,
    pub ban_duration_sec: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitThreshold {
    pub count: i64,
    pub interval_sec: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectOptions {
    #[serde(rename = "type")]
    pub redirect_type: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdosProtectionConfig {
    pub ddos_protection: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedOptionsConfig {
    pub json_parsing: Option<String>,
    pub json_custom_content_types: Option<Vec<String>>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveProtectionConfig {
    pub layer7_ddos_defense_enable: Option<bool>,
    pub layer7_ddos_defense_rule_visibility: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecaptchaOptionsConfig {
    pub redirect_site_key: String,
}

// =========================================================================
// Expand / flatten
// =========================================================================

/// Insert `value` under `key` when present
fn put<T: Into<Value>>(obj: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), value.into());
    }
}

impl RateLimitThreshold {
    fn to_wire(&self) -> Value {
        json!({"count": self.count, "intervalSec": self.interval_sec})
    }

    fn from_wire(v: &Value) -> Self {
        Self {
            count: i64_at(v, "count").unwrap_or_default(),
            interval_sec: i64_at(v, "intervalSec").unwrap_or_default(),
        }
    }
}

impl SecurityPolicyRule {
    pub fn to_wire(&self) -> Value {
        let mut matcher = Map::new();
        put(&mut matcher, "versionedExpr", self.rule_match.versioned_expr.clone());
        if let Some(ranges) = &self.rule_match.src_ip_ranges {
            matcher.insert("config".to_string(), json!({"srcIpRanges": ranges}));
        }
        if let Some(expr) = &self.rule_match.expr {
            matcher.insert("expr".to_string(), json!({"expression": expr}));
        }

        let mut rule = Map::new();
        rule.insert("action".to_string(), json!(self.action));
        rule.insert("priority".to_string(), json!(self.priority));
        rule.insert("match".to_string(), Value::Object(matcher));
        put(&mut rule, "description", self.description.clone());
        put(&mut rule, "preview", self.preview.filter(|p| *p));

        if let Some(opts) = &self.rate_limit_options {
            let mut o = Map::new();
            put(&mut o, "conformAction", opts.conform_action.clone());
            put(&mut o, "exceedAction", opts.exceed_action.clone());
            put(&mut o, "enforceOnKey", enforce_on_key(opts.enforce_on_key.as_deref()));
            put(&mut o, "enforceOnKeyName", opts.enforce_on_key_name.clone());
            put(&mut o, "rateLimitThreshold", opts.rate_limit_threshold.as_ref().map(|t| t.to_wire()));
            put(&mut o, "banThreshold", opts.ban_threshold.as_ref().map(|t| t.to_wire()));
            put(&mut o, "banDurationSec", opts.ban_duration_sec);
            rule.insert("rateLimitOptions".to_string(), Value::Object(o));
        }

        if let Some(redirect) = &self.redirect_options {
            let mut o = Map::new();
            o.insert("type".to_string(), json!(redirect.redirect_type));
            put(&mut o, "target", redirect.target.clone());
            rule.insert("redirectOptions".to_string(), Value::Object(o));
        }

        Value::Object(rule)
    }

    pub fn from_wire(v: &Value) -> Result<Self, String> {
        let priority = i64_at(v, "priority").ok_or("rule without priority")?;
        let matcher = v.get("match").cloned().unwrap_or(Value::Null);

        Ok(Self {
            action: str_at(v, "action").unwrap_or_default(),
            priority,
            description: str_at(v, "description").filter(|d| !d.is_empty()),
            preview: bool_at(v, "preview").filter(|p| *p),
            rule_match: RuleMatch {
                versioned_expr: str_at(&matcher, "versionedExpr"),
                src_ip_ranges: matcher
                    .get("config")
                    .and_then(|c| strings_at(c, "srcIpRanges")),
                expr: matcher.get("expr").and_then(|e| str_at(e, "expression")),
            },
            rate_limit_options: v.get("rateLimitOptions").map(|o| RateLimitOptions {
                conform_action: str_at(o, "conformAction"),
                exceed_action: str_at(o, "exceedAction"),
                enforce_on_key: enforce_on_key(str_at(o, "enforceOnKey").as_deref()),
                enforce_on_key_name: str_at(o, "enforceOnKeyName"),
                rate_limit_threshold: o.get("rateLimitThreshold").map(RateLimitThreshold::from_wire),
                ban_threshold: o.get("banThreshold").map(RateLimitThreshold::from_wire),
                ban_duration_sec: i64_at(o, "banDurationSec"),
            }),
            redirect_options: v.get("redirectOptions").map(|o| RedirectOptions {
                redirect_type: str_at(o, "type").unwrap_or_default(),
                target: str_at(o, "target"),
            }),
        })
    }

    fn validate(&self) -> Result<(), String> {
        let m = &self.rule_match;
        check_one_of("versioned_expr", m.versioned_expr.as_deref(), VERSIONED_EXPRESSIONS)?;
        match (&m.versioned_expr, &m.src_ip_ranges, &m.expr) {
            (Some(_), Some(ranges), None) if !ranges.is_empty() && ranges.len() <= MAX_SRC_IP_RANGES => Ok(()),
            (Some(_), _, None) => Err(format!(
                "rule {}: versioned_expr needs 1 to {} src_ip_ranges",
                self.priority, MAX_SRC_IP_RANGES
            )),
            (None, None, Some(_)) => Ok(()),
            _ => Err(format!(
                "rule {}: set either versioned_expr with src_ip_ranges, or expr",
                self.priority
            )),
        }
    }
}

/// Rate limit key with the server default folded into unset
fn enforce_on_key(key: Option<&str>) -> Option<String> {
    key.filter(|k| *k != DEFAULT_ENFORCE_ON_KEY).map(str::to_string)
}

fn expand_rules(spec: &RegionSecurityPolicy) -> Option<Value> {
    spec.rules
        .as_ref()
        .map(|rules| Value::Array(rules.iter().map(SecurityPolicyRule::to_wire).collect()))
}

fn flatten_rules(spec: &mut RegionSecurityPolicy, v: Option<Value>) -> Result<(), String> {
    spec.rules = match v {
        Some(Value::Array(items)) => {
            let mut rules = items
                .iter()
                .map(SecurityPolicyRule::from_wire)
                .collect::<Result<Vec<_>, _>>()?;
            rules.sort_by_key(|r| r.priority);
            Some(rules)
        },
        Some(other) => return Err(format!("expected a list of rules, got {}", other)),
        None => None,
    };
    Ok(())
}

fn rule_items(spec: &RegionSecurityPolicy) -> Option<Vec<KeyedItem>> {
    spec.rules.as_ref().map(|rules| {
        rules
            .iter()
            .map(|r| KeyedItem {
                key: r.priority.to_string(),
                body: r.to_wire(),
            })
            .collect()
    })
}

fn expand_ddos(spec: &RegionSecurityPolicy) -> Option<Value> {
    spec.ddos_protection_config
        .as_ref()
        .map(|c| json!({"ddosProtection": c.ddos_protection}))
}

fn flatten_ddos(spec: &mut RegionSecurityPolicy, v: Option<Value>) -> Result<(), String> {
    spec.ddos_protection_config = v
        .as_ref()
        .and_then(|c| str_at(c, "ddosProtection"))
        .map(|ddos_protection| DdosProtectionConfig { ddos_protection });
    Ok(())
}

fn expand_advanced_options(spec: &RegionSecurityPolicy) -> Option<Value> {
    let c = spec.advanced_options_config.as_ref()?;
    let mut o = Map::new();
    put(&mut o, "jsonParsing", c.json_parsing.clone());
    if let Some(types) = &c.json_custom_content_types {
        o.insert("jsonCustomConfig".to_string(), json!({"contentTypes": types}));
    }
    put(&mut o, "logLevel", c.log_level.clone());
    Some(Value::Object(o))
}

fn flatten_advanced_options(spec: &mut RegionSecurityPolicy, v: Option<Value>) -> Result<(), String> {
    spec.advanced_options_config = v.map(|c| AdvancedOptionsConfig {
        json_parsing: str_at(&c, "jsonParsing"),
        json_custom_content_types: c
            .get("jsonCustomConfig")
            .and_then(|j| strings_at(j, "contentTypes")),
        log_level: str_at(&c, "logLevel"),
    });
    Ok(())
}

fn expand_adaptive_protection(spec: &RegionSecurityPolicy) -> Option<Value> {
    let c = spec.adaptive_protection_config.as_ref()?;
    let mut l7 = Map::new();
    put(&mut l7, "enable", c.layer7_ddos_defense_enable);
    put(&mut l7, "ruleVisibility", c.layer7_ddos_defense_rule_visibility.clone());
    Some(json!({"layer7DdosDefenseConfig": l7}))
}

fn flatten_adaptive_protection(spec: &mut RegionSecurityPolicy, v: Option<Value>) -> Result<(), String> {
    spec.adaptive_protection_config = v.map(|c| {
        let l7 = c.get("layer7DdosDefenseConfig").cloned().unwrap_or(Value::Null);
        AdaptiveProtectionConfig {
            layer7_ddos_defense_enable: bool_at(&l7, "enable"),
            layer7_ddos_defense_rule_visibility: str_at(&l7, "ruleVisibility"),
        }
    });
    Ok(())
}

fn expand_recaptcha(spec: &RegionSecurityPolicy) -> Option<Value> {
    spec.recaptcha_options_config
        .as_ref()
        .map(|c| json!({"redirectSiteKey": c.redirect_site_key}))
}

fn flatten_recaptcha(spec: &mut RegionSecurityPolicy, v: Option<Value>) -> Result<(), String> {
    spec.recaptcha_options_config = v
        .as_ref()
        .and_then(|c| str_at(c, "redirectSiteKey"))
        .map(|redirect_site_key| RecaptchaOptionsConfig { redirect_site_key });
    Ok(())
}

fn validate(spec: &RegionSecurityPolicy) -> Result<(), String> {
    check_gce_name("name", spec.name.as_deref())?;
    check_one_of("type", spec.policy_type.as_deref(), POLICY_TYPES)?;

    if let Some(ddos) = &spec.ddos_protection_config {
        check_one_of("ddos_protection", Some(&ddos.ddos_protection), DDOS_PROTECTION_LEVELS)?;
    }
    if let Some(advanced) = &spec.advanced_options_config {
        check_one_of("json_parsing", advanced.json_parsing.as_deref(), JSON_PARSING_MODES)?;
        check_one_of("log_level", advanced.log_level.as_deref(), LOG_LEVELS)?;
    }
    if let Some(adaptive) = &spec.adaptive_protection_config {
        check_one_of(
            "layer7_ddos_defense_rule_visibility",
            adaptive.layer7_ddos_defense_rule_visibility.as_deref(),
            RULE_VISIBILITIES,
        )?;
    }

    if let Some(rules) = &spec.rules {
        let mut priorities = std::collections::BTreeSet::new();
        for rule in rules {
            if !priorities.insert(rule.priority) {
                return Err(format!("duplicate rule priority {}", rule.priority));
            }
            rule.validate()?;
        }
        if !priorities.contains(&DEFAULT_RULE_PRIORITY) {
            return Err(format!(
                "rules must include a default rule at priority {}",
                DEFAULT_RULE_PRIORITY
            ));
        }
    }
    Ok(())
}

const POLICY_PATH: &str = "projects/{{project}}/regions/{{region}}/securityPolicies/{{name}}";

pub static REGION_SECURITY_POLICY: ResourceDef<RegionSecurityPolicy> = ResourceDef {
    kind: "compute_region_security_policy",
    display_name: "RegionSecurityPolicy",
    service: Service::Compute,
    id_template: POLICY_PATH,
    import_formats: &[
        "projects/(?P<project>[^/]+)/regions/(?P<region>[^/]+)/securityPolicies/(?P<name>[^/]+)",
        "(?P<project>[^/]+)/(?P<region>[^/]+)/(?P<name>[^/]+)",
        "(?P<region>[^/]+)/(?P<name>[^/]+)",
        "(?P<name>[^/]+)",
    ],
    create: Endpoint::new(Method::Post, "projects/{{project}}/regions/{{region}}/securityPolicies"),
    read: Endpoint::new(Method::Get, POLICY_PATH),
    update: Some(UpdateEndpoint {
        method: Method::Patch,
        path: POLICY_PATH,
        update_mask: false,
    }),
    delete: Endpoint::new(Method::Delete, POLICY_PATH),
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
            wire: None,
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
            name: "type",
            wire: Some("type"),
            behavior: Behavior::OptionalComputed,
            force_new: false,
            default: None,
            get: |s| expand(&s.policy_type),
            set: |s, v| flatten(&mut s.policy_type, v),
        },
        Field {
            name: "rules",
            wire: Some("rules"),
            behavior: Behavior::OptionalComputed,
            force_new: false,
            default: None,
            get: expand_rules,
            set: flatten_rules,
        },
        Field {
            name: "ddos_protection_config",
            wire: Some("ddosProtectionConfig"),
            behavior: Behavior::Optional,
            force_new: false,
            default: None,
            get: expand_ddos,
            set: flatten_ddos,
        },
        Field {
            name: "advanced_options_config",
            wire: Some("advancedOptionsConfig"),
            behavior: Behavior::OptionalComputed,
            force_new: false,
            default: None,
            get: expand_advanced_options,
            set: flatten_advanced_options,
        },
        Field {
            name: "adaptive_protection_config",
            wire: Some("adaptiveProtectionConfig"),
            behavior: Behavior::Optional,
            force_new: false,
            default: None,
            get: expand_adaptive_protection,
            set: flatten_adaptive_protection,
        },
        Field {
            name: "recaptcha_options_config",
            wire: Some("recaptchaOptionsConfig"),
            behavior: Behavior::Optional,
            force_new: false,
            default: None,
            get: expand_recaptcha,
            set: flatten_recaptcha,
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
    ],
    collections: &[Collection {
        field: "rules",
        items: rule_items,
        add: Endpoint::new(Method::Post, "projects/{{project}}/regions/{{region}}/securityPolicies/{{name}}/addRule"),
        patch: Endpoint::new(
            Method::Post,
            "projects/{{project}}/regions/{{region}}/securityPolicies/{{name}}/patchRule?priority={{key}}",
        ),
        remove: Endpoint::new(
            Method::Post,
            "projects/{{project}}/regions/{{region}}/securityPolicies/{{name}}/removeRule?priority={{key}}",
        ),
    }],
    fingerprint: Some("fingerprint"),
    operation: Some(OperationStyle::Compute),
    scope: OperationScope::Project,
    timeouts: Timeouts::minutes(4, 4, 4),
    request_id: true,
    not_found: TransportError::is_not_found,
    validate,
};
