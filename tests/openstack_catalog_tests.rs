//! Tests for the Keystone/Manila catalog client against a local HTTP server

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use manila_csi_driver_operator::adapters::clouds::{AuthInfo, Cloud};
use manila_csi_driver_operator::adapters::openstack::{
    CatalogError, OpenStackClient, ShareTypeCatalog,
};

const TOKEN: &str = "gAAAAABtoken";

// ============================================================================
// Mock OpenStack
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Manila,
    NoManila,
    Forbidden,
    Broken,
}

#[derive(Clone)]
struct MockCloud {
    base: String,
    mode: Mode,
    auth_body: Arc<Mutex<Option<Value>>>,
}

async fn start(mode: Mode) -> MockCloud {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let mock = MockCloud {
        base,
        mode,
        auth_body: Arc::new(Mutex::new(None)),
    };

    let server = mock.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let server = server.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.respond(req).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    mock
}

impl MockCloud {
    async fn respond(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        match (req.method().clone(), req.uri().path()) {
            (Method::POST, "/v3/auth/tokens") => {
                let body = req.into_body().collect().await.unwrap().to_bytes();
                *self.auth_body.lock().unwrap() = serde_json::from_slice(&body).ok();
                self.token_response()
            }
            (Method::GET, "/share/v2/types") => {
                let authorized = req
                    .headers()
                    .get("X-Auth-Token")
                    .map(|v| v == TOKEN)
                    .unwrap_or(false);
                if !authorized {
                    return reply(StatusCode::UNAUTHORIZED, json!({}));
                }
                match self.mode {
                    Mode::Forbidden => reply(StatusCode::FORBIDDEN, json!({"forbidden": {}})),
                    Mode::Broken => reply(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
                    _ => reply(
                        StatusCode::OK,
                        json!({
                            "share_types": [
                                { "id": "a1", "name": "default", "extra_specs": {} },
                                { "id": "b2", "name": "CephFS", "extra_specs": {} }
                            ]
                        }),
                    ),
                }
            }
            _ => reply(StatusCode::NOT_FOUND, json!({})),
        }
    }

    fn token_response(&self) -> Response<Full<Bytes>> {
        let mut catalog = vec![json!({
            "type": "identity",
            "endpoints": [{ "interface": "public", "region_id": "RegionOne", "url": format!("{}/v3", self.base) }]
        })];
        if self.mode != Mode::NoManila {
            catalog.push(json!({
                "type": "sharev2",
                "endpoints": [
                    { "interface": "internal", "region_id": "RegionOne", "url": "http://internal.invalid/v2" },
                    { "interface": "public", "region_id": "RegionTwo", "url": "http://other.invalid/v2" },
                    { "interface": "public", "region_id": "RegionOne", "url": format!("{}/share/v2/", self.base) }
                ]
            }));
        }

        let mut response = reply(StatusCode::CREATED, json!({ "token": { "catalog": catalog } }));
        response
            .headers_mut()
            .insert("X-Subject-Token", TOKEN.parse().unwrap());
        response
    }
}

fn reply(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("Content-Type", "application/json".parse().unwrap());
    response
}

fn client(mock: &MockCloud) -> OpenStackClient {
    let cloud = Cloud {
        auth: AuthInfo {
            auth_url: format!("{}/v3", mock.base),
            username: "manila".to_string(),
            password: "secret".to_string(),
            project_name: "tenant".to_string(),
            user_domain_name: "Default".to_string(),
            project_domain_id: "default".to_string(),
            ..Default::default()
        },
        region_name: "RegionOne".to_string(),
        cacert: String::new(),
    };
    OpenStackClient::new(cloud, None).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn list_share_types_uses_public_endpoint_of_region() {
    let mock = start(Mode::Manila).await;

    let types = client(&mock).list_share_types().await.unwrap();

    let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["default", "CephFS"]);
    assert_eq!(types[0].id, "a1");
}

#[tokio::test]
async fn authentication_uses_password_method_and_project_scope() {
    let mock = start(Mode::Manila).await;

    client(&mock).list_share_types().await.unwrap();

    let body = mock.auth_body.lock().unwrap().clone().unwrap();
    let auth = &body["auth"];
    assert_eq!(auth["identity"]["methods"], json!(["password"]));
    let user = &auth["identity"]["password"]["user"];
    assert_eq!(user["name"], "manila");
    assert_eq!(user["password"], "secret");
    assert_eq!(user["domain"], json!({ "name": "Default" }));
    assert_eq!(
        auth["scope"]["project"],
        json!({ "name": "tenant", "domain": { "id": "default" } })
    );
}

#[tokio::test]
async fn missing_sharev2_endpoint_is_endpoint_not_found() {
    let mock = start(Mode::NoManila).await;

    let result = client(&mock).list_share_types().await;

    assert_matches!(
        result,
        Err(CatalogError::EndpointNotFound { ref service, ref region })
            if service == "sharev2" && region == "RegionOne"
    );
}

#[tokio::test]
async fn forbidden_listing_is_forbidden() {
    let mock = start(Mode::Forbidden).await;

    let result = client(&mock).list_share_types().await;

    assert_matches!(result, Err(CatalogError::Forbidden(_)));
}

#[tokio::test]
async fn server_error_is_unexpected_status() {
    let mock = start(Mode::Broken).await;

    let result = client(&mock).list_share_types().await;

    assert_matches!(result, Err(CatalogError::UnexpectedStatus { status: 500, .. }));
}

#[tokio::test]
async fn unreachable_keystone_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let mock = MockCloud {
        base,
        mode: Mode::Manila,
        auth_body: Arc::new(Mutex::new(None)),
    };

    let result = client(&mock).list_share_types().await;

    assert_matches!(result, Err(CatalogError::Transport(_)));
}

#[tokio::test]
async fn ca_bundle_is_reloaded_before_each_listing() {
    let mock = start(Mode::Manila).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca-bundle.pem");
    std::fs::write(
        &path,
        "-----BEGIN CERTIFICATE-----\nnot base64!\n-----END CERTIFICATE-----\n",
    )
    .unwrap();
    let catalog = client(&mock).with_ca_bundle_file(&path);

    assert_matches!(
        catalog.list_share_types().await,
        Err(CatalogError::CaBundle(_))
    );

    std::fs::write(&path, "").unwrap();
    let types = catalog.list_share_types().await.unwrap();
    assert_eq!(types.len(), 2);
}
