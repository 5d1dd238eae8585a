//! OpenStack Manila share type catalog
//!
//! Authenticates against Keystone v3 with the password method, resolves the
//! `sharev2` endpoint from the token's service catalog and lists share types.
//! A mounted CA bundle is re-read on every listing so a rotated bundle is
//! picked up without a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::adapters::clouds::{load_cloud, AuthInfo, Cloud};
use crate::adapters::storage_class_builder::ShareTypeEntry;
use crate::config::OperatorConfig;
use crate::{Error, Result};

const SHARE_SERVICE_TYPE: &str = "sharev2";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Failure to list share types
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The credentials are not allowed to use Manila
    #[error("access denied: {0}")]
    Forbidden(String),

    /// The cloud has no Manila endpoint
    #[error("no {service} endpoint found in region {region:?}")]
    EndpointNotFound { service: String, region: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid response: {0}")]
    Decode(String),

    /// The mounted CA bundle cannot be read or parsed
    #[error("invalid CA bundle: {0}")]
    CaBundle(String),
}

/// Source of the share types offered by the backend
#[async_trait]
pub trait ShareTypeCatalog: Send + Sync {
    async fn list_share_types(&self) -> std::result::Result<Vec<ShareTypeEntry>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Token,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ShareTypesResponse {
    share_types: Vec<ShareTypeItem>,
}

#[derive(Debug, Deserialize)]
struct ShareTypeItem {
    id: String,
    name: String,
}

/// HTTP client together with the CA bundle it trusts
struct HttpClient {
    ca_bundle: Option<Vec<u8>>,
    client: reqwest::Client,
}

/// Manila client for one cloud profile
pub struct OpenStackClient {
    http: Mutex<HttpClient>,
    ca_bundle_path: Option<PathBuf>,
    cloud: Cloud,
}

impl OpenStackClient {
    /// Build a client from an in-memory cloud profile and optional extra CA bundle
    pub fn new(cloud: Cloud, ca_bundle: Option<&[u8]>) -> Result<Self> {
        let client = build_http_client(ca_bundle)?;

        Ok(Self {
            http: Mutex::new(HttpClient {
                ca_bundle: ca_bundle.map(<[u8]>::to_vec),
                client,
            }),
            ca_bundle_path: None,
            cloud,
        })
    }

    /// Re-read the CA bundle at `path` before every listing
    pub fn with_ca_bundle_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle_path = Some(path.into());
        self
    }

    /// Build a client from the mounted clouds.yaml and CA bundle
    pub async fn from_config(config: &OperatorConfig) -> Result<Self> {
        let cloud = load_cloud(&config.cloud_config_path, &config.cloud_name).await?;
        let ca_bundle = read_optional(&config.ca_bundle_path).await?;
        info!(
            "Loaded OpenStack cloud {:?} (region {:?}, custom CA: {})",
            config.cloud_name,
            cloud.region_name,
            ca_bundle.is_some()
        );
        Ok(Self::new(cloud, ca_bundle.as_deref())?.with_ca_bundle_file(&config.ca_bundle_path))
    }

    /// Current HTTP client, rebuilt when the mounted CA bundle changed
    async fn http_client(&self) -> std::result::Result<reqwest::Client, CatalogError> {
        let mut http = self.http.lock().await;
        let Some(path) = &self.ca_bundle_path else {
            return Ok(http.client.clone());
        };

        let ca_bundle = read_optional(path)
            .await
            .map_err(|e| CatalogError::CaBundle(e.to_string()))?;
        if ca_bundle != http.ca_bundle {
            http.client = build_http_client(ca_bundle.as_deref())
                .map_err(|e| CatalogError::CaBundle(e.to_string()))?;
            http.ca_bundle = ca_bundle;
            info!("Reloaded CA bundle {}", path.display());
        }
        Ok(http.client.clone())
    }

    fn identity_url(&self) -> String {
        let base = self.cloud.auth.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{}/auth/tokens", base)
        } else {
            format!("{}/v3/auth/tokens", base)
        }
    }

    async fn authenticate(
        &self,
        http: &reqwest::Client,
    ) -> std::result::Result<(String, Token), CatalogError> {
        let url = self.identity_url();
        debug!("Authenticating against {}", url);

        let response = http
            .post(&url)
            .json(&auth_request(&self.cloud.auth))
            .send()
            .await?;
        let response = check_status(response, &url)?;

        let token_id = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CatalogError::Decode(format!("{} header missing", SUBJECT_TOKEN_HEADER)))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(format!("token response: {}", e)))?;

        Ok((token_id, body.token))
    }

    fn share_endpoint(&self, token: &Token) -> std::result::Result<String, CatalogError> {
        find_endpoint(token, SHARE_SERVICE_TYPE, &self.cloud.region_name).ok_or_else(|| {
            CatalogError::EndpointNotFound {
                service: SHARE_SERVICE_TYPE.to_string(),
                region: self.cloud.region_name.clone(),
            }
        })
    }
}

#[async_trait]
impl ShareTypeCatalog for OpenStackClient {
    async fn list_share_types(&self) -> std::result::Result<Vec<ShareTypeEntry>, CatalogError> {
        let http = self.http_client().await?;
        let (token_id, token) = self.authenticate(&http).await?;
        let endpoint = self.share_endpoint(&token)?;
        let url = format!("{}/types", endpoint.trim_end_matches('/'));

        let response = http
            .get(&url)
            .header(AUTH_TOKEN_HEADER, token_id)
            .send()
            .await?;
        let response = check_status(response, &url)?;

        let body: ShareTypesResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(format!("share types response: {}", e)))?;

        Ok(body
            .share_types
            .into_iter()
            .map(|t| ShareTypeEntry { id: t.id, name: t.name })
            .collect())
    }
}

fn build_http_client(ca_bundle: Option<&[u8]>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(pem) = ca_bundle {
        let certs = reqwest::Certificate::from_pem_bundle(pem).map_err(|e| {
            Error::CloudConfigError(format!("invalid cloud provider CA bundle: {}", e))
        })?;
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }
    builder
        .build()
        .map_err(|e| Error::CloudConfigError(format!("failed to build HTTP client: {}", e)))
}

fn check_status(
    response: reqwest::Response,
    url: &str,
) -> std::result::Result<reqwest::Response, CatalogError> {
    match response.status() {
        StatusCode::FORBIDDEN => Err(CatalogError::Forbidden(format!("403 Forbidden from {}", url))),
        status if status.is_success() => Ok(response),
        status => Err(CatalogError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

fn find_endpoint(token: &Token, service_type: &str, region: &str) -> Option<String> {
    token
        .catalog
        .iter()
        .filter(|service| service.type_ == service_type)
        .flat_map(|service| service.endpoints.iter())
        .find(|endpoint| {
            endpoint.interface == "public"
                && (region.is_empty()
                    || endpoint.region_id.as_deref() == Some(region)
                    || endpoint.region.as_deref() == Some(region))
        })
        .map(|endpoint| endpoint.url.clone())
}

fn domain(id: &str, name: &str) -> Option<Value> {
    if !id.is_empty() {
        Some(json!({ "id": id }))
    } else if !name.is_empty() {
        Some(json!({ "name": name }))
    } else {
        None
    }
}

/// Keystone v3 password authentication body
fn auth_request(auth: &AuthInfo) -> Value {
    let default_domain = domain(&auth.domain_id, &auth.domain_name);

    let mut user = if !auth.user_id.is_empty() {
        json!({ "id": auth.user_id })
    } else {
        json!({ "name": auth.username })
    };
    user["password"] = json!(auth.password);
    if auth.user_id.is_empty() {
        if let Some(d) = domain(&auth.user_domain_id, &auth.user_domain_name).or(default_domain.clone()) {
            user["domain"] = d;
        }
    }

    let mut body = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": { "user": user }
            }
        }
    });

    let project = if !auth.project_id.is_empty() {
        Some(json!({ "id": auth.project_id }))
    } else if !auth.project_name.is_empty() {
        let mut project = json!({ "name": auth.project_name });
        if let Some(d) =
            domain(&auth.project_domain_id, &auth.project_domain_name).or(default_domain)
        {
            project["domain"] = d;
        }
        Some(project)
    } else {
        None
    };
    if let Some(project) = project {
        body["auth"]["scope"] = json!({ "project": project });
    }

    body
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::CloudConfigError(format!(
            "failed to read CA bundle {}: {}",
            path.display(),
            e
        ))),
    }
}
