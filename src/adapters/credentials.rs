//! Translation of cloud credentials into the secret layout of the Manila CSI driver

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use sha2::{Digest, Sha256};

use crate::adapters::clouds::{parse_cloud, Cloud};
use crate::adapters::labels;
use crate::adapters::secrets::get_secret_key;
use crate::Result;

/// Key holding clouds.yaml in the secret of the cloud credentials operator
pub const CLOUDS_SECRET_KEY: &str = "clouds.yaml";

pub const OS_AUTH_URL: &str = "os-authURL";
pub const OS_REGION: &str = "os-region";
pub const OS_USER_ID: &str = "os-userID";
pub const OS_USER_NAME: &str = "os-userName";
pub const OS_PASSWORD: &str = "os-password";
pub const OS_PROJECT_ID: &str = "os-projectID";
pub const OS_PROJECT_NAME: &str = "os-projectName";
pub const OS_DOMAIN_ID: &str = "os-domainID";
pub const OS_DOMAIN_NAME: &str = "os-domainName";
pub const OS_PROJECT_DOMAIN_ID: &str = "os-projectDomainID";
pub const OS_PROJECT_DOMAIN_NAME: &str = "os-projectDomainName";
pub const OS_USER_DOMAIN_ID: &str = "os-userDomainID";
pub const OS_USER_DOMAIN_NAME: &str = "os-userDomainName";
pub const OS_CERT_AUTHORITY_PATH: &str = "os-certAuthorityPath";

/// Driver secret contents
pub type CredentialBundle = BTreeMap<String, ByteString>;

/// Translate the cloud credentials secret into driver secret data.
///
/// `ca_bundle_path` replaces the cloud's own `cacert` when the bundle is
/// mounted into the driver pods. Fails with `MissingKey` when the secret has
/// no clouds.yaml.
pub fn translate(
    source: &Secret,
    cloud_name: &str,
    ca_bundle_path: Option<&str>,
) -> Result<CredentialBundle> {
    let content = get_secret_key(source, CLOUDS_SECRET_KEY)?;
    let mut cloud = parse_cloud(&content, cloud_name)?;
    if let Some(path) = ca_bundle_path {
        cloud.cacert = path.to_string();
    }
    Ok(translate_cloud(&cloud))
}

/// Map one cloud profile onto the `os-*` keys understood by the driver.
///
/// Only supplied values produce keys. IDs win over names, and a user domain
/// also overrides the generic domain keys.
pub fn translate_cloud(cloud: &Cloud) -> CredentialBundle {
    let auth = &cloud.auth;
    let mut data = CredentialBundle::new();

    put(&mut data, OS_AUTH_URL, &auth.auth_url);
    put(&mut data, OS_REGION, &cloud.region_name);

    first_of(&mut data, (OS_USER_ID, &auth.user_id), (OS_USER_NAME, &auth.username));
    put(&mut data, OS_PASSWORD, &auth.password);
    first_of(
        &mut data,
        (OS_PROJECT_ID, &auth.project_id),
        (OS_PROJECT_NAME, &auth.project_name),
    );
    first_of(
        &mut data,
        (OS_DOMAIN_ID, &auth.domain_id),
        (OS_DOMAIN_NAME, &auth.domain_name),
    );
    first_of(
        &mut data,
        (OS_PROJECT_DOMAIN_ID, &auth.project_domain_id),
        (OS_PROJECT_DOMAIN_NAME, &auth.project_domain_name),
    );

    if !auth.user_domain_id.is_empty() {
        put(&mut data, OS_USER_DOMAIN_ID, &auth.user_domain_id);
        put(&mut data, OS_DOMAIN_ID, &auth.user_domain_id);
    } else if !auth.user_domain_name.is_empty() {
        put(&mut data, OS_USER_DOMAIN_NAME, &auth.user_domain_name);
        put(&mut data, OS_DOMAIN_NAME, &auth.user_domain_name);
    }

    put(&mut data, OS_CERT_AUTHORITY_PATH, &cloud.cacert);

    data
}

/// Build the opaque secret consumed by the driver
pub fn build_driver_secret(name: &str, namespace: &str, data: CredentialBundle) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels::operand("credentials")),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// SHA-256 over the data of a secret, hex encoded.
///
/// Keys are hashed in order, so equal data always gives the same checksum.
pub fn checksum(secret: &Secret) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in secret.data.iter().flatten() {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(&value.0);
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn put(data: &mut CredentialBundle, key: &str, value: &str) {
    if !value.is_empty() {
        data.insert(key.to_string(), ByteString(value.as_bytes().to_vec()));
    }
}

fn first_of(data: &mut CredentialBundle, preferred: (&str, &str), fallback: (&str, &str)) {
    if !preferred.1.is_empty() {
        put(data, preferred.0, preferred.1);
    } else {
        put(data, fallback.0, fallback.1);
    }
}
