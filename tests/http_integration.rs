//! Integration tests for the GCP transport and reconciler using wiremock
//!
//! These run the real reqwest-based client against mocked Compute and
//! Network Security endpoints: authentication headers, status mapping,
//! operation polling and full resource lifecycles.

use async_trait::async_trait;
use gcp_reconciler::gcp::auth::{StaticToken, TokenSource};
use gcp_reconciler::gcp::client::{BasePaths, GcpClient, ProviderDefaults, Transport};
use gcp_reconciler::gcp::http::Method;
use gcp_reconciler::gcp::operation::{GcpOperationPoller, PollSettings};
use gcp_reconciler::resource::{Instance, Phase, ReadOutcome, Reconciler, ResourceDef};
use gcp_reconciler::TransportError;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> GcpClient {
    GcpClient::new(Arc::new(StaticToken::new("test-token"))).unwrap()
}

fn defaults() -> ProviderDefaults {
    ProviderDefaults {
        project: Some("my-project".to_string()),
        region: Some("us-central1".to_string()),
        ..Default::default()
    }
}

fn reconciler<S>(
    server: &MockServer,
    def: &'static ResourceDef<S>,
    defaults: ProviderDefaults,
) -> Reconciler<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    let transport: Arc<dyn Transport> = Arc::new(client());
    let paths = BasePaths::uniform(&server.uri());
    let poller = Arc::new(GcpOperationPoller::new(
        transport.clone(),
        paths.clone(),
        defaults.billing_project.clone(),
        PollSettings::with_initial_interval(Duration::from_millis(10)),
    ));
    Reconciler::new(def, transport, poller, defaults, paths)
}

fn compute_operation(name: &str, status: &str) -> serde_json::Value {
    json!({"kind": "compute#operation", "name": name, "status": status})
}

/// Test module for the HTTP transport
mod transport_tests {
    use super::*;

    /// Bearer token and billing project go out on every request
    #[tokio::test]
    async fn test_get_sends_token_and_billing_project() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/regions/us-central1/securityPolicies/p1"))
            .and(bearer_token("test-token"))
            .and(header("X-Goog-User-Project", "billing-project"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "p1"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!(
            "{}/projects/my-project/regions/us-central1/securityPolicies/p1",
            server.uri()
        );
        let body = client()
            .send(Method::Get, Some("billing-project"), &url, None)
            .await
            .expect("request should succeed");

        assert_eq!(body["name"], "p1");
    }

    /// Hands out a stale token until invalidated
    #[derive(Default)]
    struct RotatingToken {
        refreshed: AtomicBool,
        invalidations: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for RotatingToken {
        async fn token(&self) -> Result<String, TransportError> {
            if self.refreshed.load(Ordering::SeqCst) {
                Ok("fresh-token".to_string())
            } else {
                Ok("stale-token".to_string())
            }
        }

        async fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
            self.refreshed.store(true, Ordering::SeqCst);
        }
    }

    /// A rejected token is dropped and the request retried once with a fresh one
    #[tokio::test]
    async fn test_401_refreshes_token_and_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/networkEndpointGroups/neg1"))
            .and(bearer_token("stale-token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Request had invalid authentication credentials."}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/networkEndpointGroups/neg1"))
            .and(bearer_token("fresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "neg1"})))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = Arc::new(RotatingToken::default());
        let client = GcpClient::new(tokens.clone()).unwrap();
        let url = format!("{}/projects/my-project/global/networkEndpointGroups/neg1", server.uri());

        let body = client.send(Method::Get, None, &url, None).await.unwrap();
        assert_eq!(body["name"], "neg1");
        assert_eq!(tokens.invalidations.load(Ordering::SeqCst), 1);
    }

    /// A second 401 after refreshing is returned rather than retried again
    #[tokio::test]
    async fn test_401_retried_only_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/networkEndpointGroups/neg1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Request had invalid authentication credentials."}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = Arc::new(RotatingToken::default());
        let client = GcpClient::new(tokens.clone()).unwrap();
        let url = format!("{}/projects/my-project/global/networkEndpointGroups/neg1", server.uri());

        let err = client.send(Method::Get, None, &url, None).await.unwrap_err();
        assert!(matches!(err, TransportError::Api { status: 401, .. }));
        assert_eq!(tokens.invalidations.load(Ordering::SeqCst), 1);
    }

    /// 404 stays distinguishable from other failures
    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/networkEndpointGroups/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "The resource 'projects/my-project/global/networkEndpointGroups/missing' was not found"
                }
            })))
            .mount(&server)
            .await;

        let url = format!(
            "{}/projects/my-project/global/networkEndpointGroups/missing",
            server.uri()
        );
        let err = client().send(Method::Get, None, &url, None).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("was not found"));
    }

    /// 412 carries the Google error message
    #[tokio::test]
    async fn test_412_is_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/projects/my-project/regions/us-central1/securityPolicies/p1"))
            .respond_with(ResponseTemplate::new(412).set_body_json(json!({
                "error": {"code": 412, "message": "Invalid fingerprint.", "status": "FAILED_PRECONDITION"}
            })))
            .mount(&server)
            .await;

        let url = format!(
            "{}/projects/my-project/regions/us-central1/securityPolicies/p1",
            server.uri()
        );
        let err = client()
            .send(Method::Patch, None, &url, Some(&json!({"fingerprint": "old"})))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(
            err,
            TransportError::Api {
                status: 412,
                message: "Invalid fingerprint.".to_string()
            }
        );
    }

    /// Empty response bodies decode as null
    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/projects/my-project/locations/global/urlLists/l1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let url = format!("{}/projects/my-project/locations/global/urlLists/l1", server.uri());
        let body = client().send(Method::Delete, None, &url, None).await.unwrap();
        assert!(body.is_null());
    }

    /// Invalid JSON is a decode error
    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/networkEndpointGroups/neg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json {{{"))
            .mount(&server)
            .await;

        let url = format!("{}/projects/my-project/global/networkEndpointGroups/neg", server.uri());
        let err = client().send(Method::Get, None, &url, None).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}

/// Test module for reconciler lifecycles over HTTP
mod lifecycle_tests {
    use super::*;
    use gcp_reconciler::resources::network_edge_security_service::{
        NetworkEdgeSecurityService, NETWORK_EDGE_SECURITY_SERVICE,
    };
    use gcp_reconciler::resources::org_security_policy_association::{
        OrgSecurityPolicyAssociation, ORG_SECURITY_POLICY_ASSOCIATION,
    };
    use gcp_reconciler::resources::url_list::{UrlList, URL_LIST};

    const SVC_PATH: &str = "/projects/my-project/regions/us-central1/networkEdgeSecurityServices/svc1";

    fn svc_body(description: &str, fingerprint: &str) -> serde_json::Value {
        json!({
            "kind": "compute#networkEdgeSecurityService",
            "id": "6917263118283512345",
            "name": "svc1",
            "description": description,
            "region": "https://www.googleapis.com/compute/beta/projects/my-project/regions/us-central1",
            "fingerprint": fingerprint,
            "selfLink": "https://www.googleapis.com/compute/beta/projects/my-project/regions/us-central1/networkEdgeSecurityServices/svc1",
            "creationTimestamp": "2026-10-19T01:02:03.000-07:00"
        })
    }

    /// Create, read, update description, read: one PATCH with only the change
    #[tokio::test]
    async fn test_edge_security_service_end_to_end() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/projects/my-project/regions/us-central1/networkEdgeSecurityServices"))
            .and(body_json(json!({"name": "svc1", "region": "us-central1", "description": "d1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(compute_operation("operation-1", "DONE")),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(SVC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(svc_body("d1", "fp-abc")))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(SVC_PATH))
            .and(body_json(json!({"description": "d2", "fingerprint": "fp-abc"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(compute_operation("operation-2", "DONE")),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(SVC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(svc_body("d2", "fp-def")))
            .mount(&server)
            .await;

        let reconciler = reconciler(&server, &NETWORK_EDGE_SECURITY_SERVICE, defaults());
        let mut svc = Instance::new(NetworkEdgeSecurityService {
            name: Some("svc1".to_string()),
            description: Some("d1".to_string()),
            ..Default::default()
        });

        reconciler.create(&mut svc).await.unwrap();
        assert_eq!(svc.spec.description.as_deref(), Some("d1"));
        assert_eq!(svc.spec.fingerprint.as_deref(), Some("fp-abc"));
        assert_eq!(svc.spec.region.as_deref(), Some("us-central1"));
        assert_eq!(svc.spec.service_id.as_deref(), Some("6917263118283512345"));

        let mut desired = svc.spec.clone();
        desired.description = Some("d2".to_string());
        reconciler.update(&mut svc, desired).await.unwrap();

        assert_eq!(svc.spec.description.as_deref(), Some("d2"));
        assert_eq!(svc.spec.fingerprint.as_deref(), Some("fp-def"));
    }

    /// Long-running create polled through the operations endpoint
    #[tokio::test]
    async fn test_url_list_long_running_create_and_masked_update() {
        let server = MockServer::start().await;
        let list_path = "/projects/my-project/locations/global/urlLists/allowed";

        Mock::given(method("POST"))
            .and(path("/projects/my-project/locations/global/urlLists"))
            .and(query_param("urlListId", "allowed"))
            .and(body_json(json!({"values": ["www.example.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/operations/operation-1",
                "done": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/locations/global/operations/operation-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/operations/operation-1",
                "done": false
            })))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/locations/global/operations/operation-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/operations/operation-1",
                "done": true,
                "response": {"name": "projects/my-project/locations/global/urlLists/allowed"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(list_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/urlLists/allowed",
                "values": ["www.example.com"],
                "createTime": "2026-10-19T08:00:00Z",
                "updateTime": "2026-10-19T08:00:00Z"
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(list_path))
            .and(query_param("updateMask", "values"))
            .and(body_json(json!({"values": ["www.example.com", "about.example.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/operations/operation-2",
                "done": true,
                "response": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(list_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/urlLists/allowed",
                "values": ["www.example.com", "about.example.com"],
                "createTime": "2026-10-19T08:00:00Z",
                "updateTime": "2026-10-19T09:00:00Z"
            })))
            .mount(&server)
            .await;

        let reconciler = reconciler(&server, &URL_LIST, defaults());
        let mut list = Instance::new(UrlList {
            name: Some("allowed".to_string()),
            location: Some("global".to_string()),
            values: Some(vec!["www.example.com".to_string()]),
            ..Default::default()
        });

        reconciler.create(&mut list).await.unwrap();
        assert_eq!(
            list.id.as_deref(),
            Some("projects/my-project/locations/global/urlLists/allowed")
        );
        assert_eq!(list.spec.create_time.as_deref(), Some("2026-10-19T08:00:00Z"));

        let mut desired = list.spec.clone();
        desired.values = Some(vec![
            "www.example.com".to_string(),
            "about.example.com".to_string(),
        ]);
        reconciler.update(&mut list, desired).await.unwrap();
        assert_eq!(list.spec.values.as_ref().map(Vec::len), Some(2));
        assert_eq!(list.spec.update_time.as_deref(), Some("2026-10-19T09:00:00Z"));
    }

    /// A failed long-running operation surfaces its code and message
    #[tokio::test]
    async fn test_url_list_failed_operation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/projects/my-project/locations/global/urlLists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/my-project/locations/global/operations/operation-9",
                "done": true,
                "error": {"code": 3, "message": "Invalid URL pattern"}
            })))
            .mount(&server)
            .await;

        let reconciler = reconciler(&server, &URL_LIST, defaults());
        let mut list = Instance::new(UrlList {
            name: Some("bad".to_string()),
            location: Some("global".to_string()),
            values: Some(vec!["http://[".to_string()]),
            ..Default::default()
        });

        let err = reconciler.create(&mut list).await.unwrap_err();
        assert!(err.to_string().contains("Error code 3, message: Invalid URL pattern"));
        assert!(list.id.is_none());
    }

    /// Organization operations are polled under the policy's parent, and a
    /// 400 "does not exist" counts as already deleted
    #[tokio::test]
    async fn test_org_association_uses_policy_parent() {
        let server = MockServer::start().await;
        let policy = "/locations/global/securityPolicies/123";

        Mock::given(method("POST"))
            .and(path(format!("{}/addAssociation", policy)))
            .and(body_json(json!({"name": "assoc", "attachmentId": "folders/789"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(compute_operation("op-1", "RUNNING")),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(policy))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "123",
                "parent": "organizations/456"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/locations/global/operations/op-1"))
            .and(query_param("parentId", "organizations/456"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(compute_operation("op-1", "DONE")),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/getAssociation", policy)))
            .and(query_param("name", "assoc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "assoc",
                "attachmentId": "folders/789",
                "displayName": "assoc-display"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/removeAssociation", policy)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "An association with that name does not exist."}
            })))
            .mount(&server)
            .await;

        let reconciler = reconciler(&server, &ORG_SECURITY_POLICY_ASSOCIATION, defaults());
        let mut assoc = Instance::new(OrgSecurityPolicyAssociation {
            name: Some("assoc".to_string()),
            attachment_id: Some("folders/789".to_string()),
            policy_id: Some("locations/global/securityPolicies/123".to_string()),
            ..Default::default()
        });

        reconciler.create(&mut assoc).await.unwrap();
        assert_eq!(
            assoc.id.as_deref(),
            Some("locations/global/securityPolicies/123/association/assoc")
        );
        assert_eq!(assoc.spec.display_name.as_deref(), Some("assoc-display"));

        reconciler.delete(&mut assoc).await.unwrap();
        assert!(assoc.id.is_none());
        assert_eq!(assoc.phase, Phase::Absent);
    }

    /// Import then read fills the spec from the server
    #[tokio::test]
    async fn test_import_then_read_with_billing_project() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(SVC_PATH))
            .and(header("X-Goog-User-Project", "billing-project"))
            .respond_with(ResponseTemplate::new(200).set_body_json(svc_body("imported", "fp-1")))
            .expect(1)
            .mount(&server)
            .await;

        let mut defaults = defaults();
        defaults.billing_project = Some("billing-project".to_string());
        let reconciler = reconciler(&server, &NETWORK_EDGE_SECURITY_SERVICE, defaults);

        let mut svc = reconciler.import("my-project/svc1").unwrap();
        assert_eq!(svc.phase, Phase::Importing);
        assert_eq!(reconciler.read(&mut svc).await.unwrap(), ReadOutcome::Found);
        assert_eq!(svc.spec.description.as_deref(), Some("imported"));
        assert_eq!(svc.phase, Phase::Present);
    }
}
