//! Sync tasks that deploy the Manila CSI driver
//!
//! These run under the supervisor once Manila is known to be available.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::api::storage::v1::CSIDriver;
use kube::{Api, Client};
use tracing::{debug, info};

use crate::adapters::credentials::{self, build_driver_secret};
use crate::adapters::driver_objects::{
    build_ca_bundle_config_map, build_controller_role, build_csi_driver, build_metrics_service,
    build_namespace, build_node_role, build_role_binding, build_service_account, CONTROLLER_ROLE,
    CONTROLLER_SERVICE_ACCOUNT, NODE_ROLE, NODE_SERVICE_ACCOUNT,
};
use crate::adapters::store::ObjectStore;
use crate::adapters::workload_builder::{
    build_controller_deployment, build_nfs_node_daemonset, build_node_daemonset,
    driver_ca_bundle_path, CA_BUNDLE_CONFIG_MAP, CA_BUNDLE_KEY,
};
use crate::config::{DriverImages, OperatorConfig};
use crate::reconcilers::periodic::{PeriodicController, SyncTask};
use crate::reconcilers::resource;
use crate::reconcilers::supervisor::Runnable;
use crate::{Error, Result};

/// Build the driver controllers in start order
pub fn driver_controllers(client: &Client, config: &OperatorConfig) -> Vec<Arc<dyn Runnable>> {
    let interval = config.controller_interval();
    let operand = config.operand_namespace.as_str();

    vec![
        periodic(
            StaticResources {
                namespace: operand.to_string(),
                namespaces: Arc::new(Api::<Namespace>::all(client.clone())),
                csi_drivers: Arc::new(Api::<CSIDriver>::all(client.clone())),
                service_accounts: Arc::new(Api::<ServiceAccount>::namespaced(client.clone(), operand)),
                cluster_roles: Arc::new(Api::<ClusterRole>::all(client.clone())),
                role_bindings: Arc::new(Api::<ClusterRoleBinding>::all(client.clone())),
                services: Arc::new(Api::<Service>::namespaced(client.clone(), operand)),
            },
            interval,
        ),
        periodic(
            CaBundleSync {
                source_name: config.ca_source_name.clone(),
                namespace: operand.to_string(),
                sources: Arc::new(Api::<ConfigMap>::namespaced(
                    client.clone(),
                    &config.ca_source_namespace,
                )),
                targets: Arc::new(Api::<ConfigMap>::namespaced(client.clone(), operand)),
            },
            interval,
        ),
        periodic(
            SecretSync {
                cloud_name: config.cloud_name.clone(),
                source_name: config.cloud_credentials_secret.clone(),
                target_name: config.driver_credentials_secret.clone(),
                namespace: operand.to_string(),
                sources: Arc::new(Api::<Secret>::namespaced(
                    client.clone(),
                    &config.operator_namespace,
                )),
                ca_bundles: Arc::new(Api::<ConfigMap>::namespaced(client.clone(), operand)),
                targets: Arc::new(Api::<Secret>::namespaced(client.clone(), operand)),
            },
            interval,
        ),
        periodic(
            ControllerService {
                namespace: operand.to_string(),
                secret_name: config.driver_credentials_secret.clone(),
                images: config.images.clone(),
                secrets: Arc::new(Api::<Secret>::namespaced(client.clone(), operand)),
                deployments: Arc::new(Api::<Deployment>::namespaced(client.clone(), operand)),
            },
            interval,
        ),
        periodic(
            NodeService {
                namespace: operand.to_string(),
                secret_name: config.driver_credentials_secret.clone(),
                images: config.images.clone(),
                secrets: Arc::new(Api::<Secret>::namespaced(client.clone(), operand)),
                daemonsets: Arc::new(Api::<DaemonSet>::namespaced(client.clone(), operand)),
            },
            interval,
        ),
        periodic(
            NfsNodeService {
                namespace: operand.to_string(),
                images: config.images.clone(),
                daemonsets: Arc::new(Api::<DaemonSet>::namespaced(client.clone(), operand)),
            },
            interval,
        ),
    ]
}

fn periodic<T: SyncTask + 'static>(task: T, interval: Duration) -> Arc<dyn Runnable> {
    Arc::new(PeriodicController::new(task, interval))
}

/// Namespace, CSIDriver, RBAC and the metrics Service
pub struct StaticResources {
    pub namespace: String,
    pub namespaces: Arc<dyn ObjectStore<Namespace>>,
    pub csi_drivers: Arc<dyn ObjectStore<CSIDriver>>,
    pub service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    pub cluster_roles: Arc<dyn ObjectStore<ClusterRole>>,
    pub role_bindings: Arc<dyn ObjectStore<ClusterRoleBinding>>,
    pub services: Arc<dyn ObjectStore<Service>>,
}

#[async_trait]
impl SyncTask for StaticResources {
    fn name(&self) -> &str {
        "static-resources"
    }

    async fn sync_once(&self) -> Result<()> {
        let ns = self.namespace.as_str();
        // Everything below lives in or refers to the namespace
        resource::sync(self.namespaces.as_ref(), build_namespace(ns)).await?;

        let mut results = vec![resource::sync(self.csi_drivers.as_ref(), build_csi_driver()).await];
        for account in [CONTROLLER_SERVICE_ACCOUNT, NODE_SERVICE_ACCOUNT] {
            let service_account = build_service_account(account, ns);
            results.push(resource::sync(self.service_accounts.as_ref(), service_account).await);
        }
        for role in [build_controller_role(), build_node_role()] {
            results.push(resource::sync(self.cluster_roles.as_ref(), role).await);
        }
        for (role, account) in [
            (CONTROLLER_ROLE, CONTROLLER_SERVICE_ACCOUNT),
            (NODE_ROLE, NODE_SERVICE_ACCOUNT),
        ] {
            let binding = build_role_binding(role, account, ns);
            results.push(resource::sync(self.role_bindings.as_ref(), binding).await);
        }
        results.push(resource::sync(self.services.as_ref(), build_metrics_service(ns)).await);

        Error::aggregate(results.into_iter().filter_map(|result| result.err()).collect())
    }
}

/// Translates the cloud credentials into the driver secret
pub struct SecretSync {
    pub cloud_name: String,
    pub source_name: String,
    pub target_name: String,
    pub namespace: String,
    pub sources: Arc<dyn ObjectStore<Secret>>,
    pub ca_bundles: Arc<dyn ObjectStore<ConfigMap>>,
    pub targets: Arc<dyn ObjectStore<Secret>>,
}

#[async_trait]
impl SyncTask for SecretSync {
    fn name(&self) -> &str {
        "secret-sync"
    }

    async fn sync_once(&self) -> Result<()> {
        let Some(source) = self.sources.get(&self.source_name).await? else {
            info!("Waiting for cloud credentials secret {}", self.source_name);
            return Ok(());
        };

        let ca_bundle_path = self
            .ca_bundles
            .get(CA_BUNDLE_CONFIG_MAP)
            .await?
            .map(|_| driver_ca_bundle_path());
        let data = credentials::translate(&source, &self.cloud_name, ca_bundle_path.as_deref())?;

        let secret = build_driver_secret(&self.target_name, &self.namespace, data);
        resource::sync(self.targets.as_ref(), secret).await?;
        Ok(())
    }
}

/// Copies the cloud CA bundle next to the driver
pub struct CaBundleSync {
    pub source_name: String,
    pub namespace: String,
    pub sources: Arc<dyn ObjectStore<ConfigMap>>,
    pub targets: Arc<dyn ObjectStore<ConfigMap>>,
}

#[async_trait]
impl SyncTask for CaBundleSync {
    fn name(&self) -> &str {
        "ca-bundle-sync"
    }

    async fn sync_once(&self) -> Result<()> {
        let bundle = self
            .sources
            .get(&self.source_name)
            .await?
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(CA_BUNDLE_KEY));

        let Some(bundle) = bundle else {
            debug!("No CA bundle in config map {}", self.source_name);
            return Ok(());
        };

        let config_map =
            build_ca_bundle_config_map(CA_BUNDLE_CONFIG_MAP, &self.namespace, CA_BUNDLE_KEY, &bundle);
        resource::sync(self.targets.as_ref(), config_map).await?;
        Ok(())
    }
}

/// Checksum of the driver secret, or `None` while it does not exist yet
async fn credentials_checksum(
    secrets: &dyn ObjectStore<Secret>,
    name: &str,
) -> Result<Option<String>> {
    Ok(secrets.get(name).await?.map(|s| credentials::checksum(&s)))
}

/// Controller plugin Deployment
pub struct ControllerService {
    pub namespace: String,
    pub secret_name: String,
    pub images: DriverImages,
    pub secrets: Arc<dyn ObjectStore<Secret>>,
    pub deployments: Arc<dyn ObjectStore<Deployment>>,
}

#[async_trait]
impl SyncTask for ControllerService {
    fn name(&self) -> &str {
        "controller-service"
    }

    async fn sync_once(&self) -> Result<()> {
        let Some(checksum) = credentials_checksum(self.secrets.as_ref(), &self.secret_name).await?
        else {
            info!("Waiting for driver secret {} before deploying the controller", self.secret_name);
            return Ok(());
        };

        let deployment = build_controller_deployment(&self.namespace, &self.images, &checksum);
        resource::sync(self.deployments.as_ref(), deployment).await?;
        Ok(())
    }
}

/// Manila node plugin DaemonSet
pub struct NodeService {
    pub namespace: String,
    pub secret_name: String,
    pub images: DriverImages,
    pub secrets: Arc<dyn ObjectStore<Secret>>,
    pub daemonsets: Arc<dyn ObjectStore<DaemonSet>>,
}

#[async_trait]
impl SyncTask for NodeService {
    fn name(&self) -> &str {
        "node-service"
    }

    async fn sync_once(&self) -> Result<()> {
        let Some(checksum) = credentials_checksum(self.secrets.as_ref(), &self.secret_name).await?
        else {
            info!("Waiting for driver secret {} before deploying the node plugin", self.secret_name);
            return Ok(());
        };

        let daemonset = build_node_daemonset(&self.namespace, &self.images, &checksum);
        resource::sync(self.daemonsets.as_ref(), daemonset).await?;
        Ok(())
    }
}

/// NFS node plugin DaemonSet
pub struct NfsNodeService {
    pub namespace: String,
    pub images: DriverImages,
    pub daemonsets: Arc<dyn ObjectStore<DaemonSet>>,
}

#[async_trait]
impl SyncTask for NfsNodeService {
    fn name(&self) -> &str {
        "nfs-node-service"
    }

    async fn sync_once(&self) -> Result<()> {
        let daemonset = build_nfs_node_daemonset(&self.namespace, &self.images);
        resource::sync(self.daemonsets.as_ref(), daemonset).await?;
        Ok(())
    }
}
