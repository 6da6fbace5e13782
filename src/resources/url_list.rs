//! Network security URL list

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
pub struct UrlList {
    pub name: Option<String>,
    pub project: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Hosts and URL patterns; at least one is needed
    pub values: Option<Vec<String>>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

fn validate(spec: &UrlList) -> Result<(), String> {
    match &spec.values {
        Some(values) if !values.is_empty() => Ok(()),
        _ => Err("values must list at least one host or URL pattern".to_string()),
    }
}

const URL_LIST_PATH: &str = "projects/{{project}}/locations/{{location}}/urlLists/{{name}}";

pub static URL_LIST: ResourceDef<UrlList> = ResourceDef {
    kind: "network_security_url_list",
    display_name: "UrlLists",
    service: Service::NetworkSecurity,
    id_template: URL_LIST_PATH,
    import_formats: &[
        "projects/(?P<project>[^/]+)/locations/(?P<location>[^/]+)/urlLists/(?P<name>[^/]+)",
        "(?P<project>[^/]+)/(?P<location>[^/]+)/(?P<name>[^/]+)",
        "(?P<location>[^/]+)/(?P<name>[^/]+)",
    ],
    create: Endpoint::new(
        Method::Post,
        "projects/{{project}}/locations/{{location}}/urlLists?urlListId={{name}}",
    ),
    read: Endpoint::new(Method::Get, URL_LIST_PATH),
    update: Some(UpdateEndpoint {
        method: Method::Patch,
        path: URL_LIST_PATH,
        update_mask: true,
    }),
    delete: Endpoint::new(Method::Delete, URL_LIST_PATH),
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
            behavior: Behavior::Required,
            force_new: true,
            default: None,
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
            name: "values",
            wire: Some("values"),
            behavior: Behavior::Optional,
            force_new: false,
            default: None,
            get: |s| expand(&s.values),
            set: |s, v| flatten(&mut s.values, v),
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
    validate,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::diff::diff_fields;

    fn list(values: &[&str]) -> UrlList {
        UrlList {
            name: Some("allowed".to_string()),
            project: Some("my-project".to_string()),
            location: Some("us-central1".to_string()),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_values_required_and_updatable() {
        assert!(validate(&list(&[])).is_err());
        assert!(validate(&list(&["www.example.com"])).is_ok());

        let changes = diff_fields(
            &URL_LIST,
            &list(&["www.example.com"]),
            &list(&["www.example.com", "about.example.com"]),
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].wire, "values");
    }

    #[test]
    fn test_location_change_forces_replacement() {
        let old = list(&["a.example.com"]);
        let mut new = old.clone();
        new.location = Some("europe-west1".to_string());
        assert_eq!(diff_fields(&URL_LIST, &old, &new).unwrap_err(), "location");
    }
}
