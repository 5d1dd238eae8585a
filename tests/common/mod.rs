//! Shared test doubles: in-memory object store, scripted share type catalog,
//! recording condition sink and counting controllers.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;

use manila_csi_driver_operator::adapters::openstack::{CatalogError, ShareTypeCatalog};
use manila_csi_driver_operator::adapters::storage_class_builder::ShareTypeEntry;
use manila_csi_driver_operator::adapters::store::ObjectStore;
use manila_csi_driver_operator::crd::Condition;
use manila_csi_driver_operator::reconcilers::status::{
    remove_condition, upsert_condition, ConditionSink,
};
use manila_csi_driver_operator::reconcilers::supervisor::Runnable;
use manila_csi_driver_operator::{Error, Result};

// ============================================================================
// Object store
// ============================================================================

/// Which store operation to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Op {
    Get,
    Create,
    Replace,
    Delete,
}

/// In-memory `ObjectStore` that assigns resource versions and counts writes
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<String, K>>,
    failures: Mutex<BTreeSet<(Op, String)>>,
    version: AtomicUsize,
    pub creates: AtomicUsize,
    pub replaces: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl<K: Resource + Clone> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(BTreeSet::new()),
            version: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Put an object in place without counting a write
    pub fn seed(&self, mut object: K) {
        self.stamp(&mut object);
        self.objects.lock().unwrap().insert(object.name_any(), object);
    }

    pub fn object(&self, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn writes(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.replaces.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    /// Make every `op` on `name` fail until `heal` is called
    pub fn fail(&self, op: Op, name: &str) {
        self.failures.lock().unwrap().insert((op, name.to_string()));
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }

    fn check(&self, op: Op, name: &str) -> Result<()> {
        if self.failures.lock().unwrap().contains(&(op, name.to_string())) {
            return Err(Error::ConfigError(format!("injected {:?} failure for {}", op, name)));
        }
        Ok(())
    }

    fn stamp(&self, object: &mut K) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        object.meta_mut().resource_version = Some(version.to_string());
        object.meta_mut().uid.get_or_insert_with(|| format!("uid-{}", version));
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>> {
        self.check(Op::Get, name)?;
        Ok(self.object(name))
    }

    async fn create(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        self.check(Op::Create, &name)?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&name) {
            return Err(Error::ConfigError(format!("{} already exists", name)));
        }
        let mut stored = object.clone();
        self.stamp(&mut stored);
        objects.insert(name, stored.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn replace(&self, name: &str, object: &K) -> Result<K> {
        self.check(Op::Replace, name)?;
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(name)
            .ok_or_else(|| Error::ConfigError(format!("{} not found", name)))?;
        if current.meta().resource_version != object.meta().resource_version {
            return Err(Error::ConfigError(format!("conflict on {}", name)));
        }
        let mut stored = object.clone();
        stored.meta_mut().uid = current.meta().uid.clone();
        self.stamp(&mut stored);
        objects.insert(name.to_string(), stored.clone());
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.check(Op::Delete, name)?;
        self.objects.lock().unwrap().remove(name);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Share type catalog
// ============================================================================

/// Canned answer of the scripted catalog
#[derive(Clone, Debug)]
pub enum Reply {
    Types(Vec<ShareTypeEntry>),
    Forbidden,
    Absent,
    Unreachable,
}

/// Catalog that plays back replies in order and then repeats the last one
pub struct ScriptedCatalog {
    replies: Mutex<VecDeque<Reply>>,
    pub calls: AtomicUsize,
}

impl ScriptedCatalog {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShareTypeCatalog for ScriptedCatalog {
    async fn list_share_types(&self) -> std::result::Result<Vec<ShareTypeEntry>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };

        match reply.unwrap_or(Reply::Types(Vec::new())) {
            Reply::Types(types) => Ok(types),
            Reply::Forbidden => Err(CatalogError::Forbidden("403 Forbidden".to_string())),
            Reply::Absent => Err(CatalogError::EndpointNotFound {
                service: "sharev2".to_string(),
                region: "RegionOne".to_string(),
            }),
            Reply::Unreachable => Err(CatalogError::UnexpectedStatus {
                status: 503,
                url: "https://manila.example.com/v2/types".to_string(),
            }),
        }
    }
}

pub fn share_type(id: &str, name: &str) -> ShareTypeEntry {
    ShareTypeEntry {
        id: id.to_string(),
        name: name.to_string(),
    }
}

// ============================================================================
// Condition sink
// ============================================================================

/// Condition sink backed by a plain list
#[derive(Default)]
pub struct RecordingSink {
    conditions: Mutex<Vec<Condition>>,
    pub writes: AtomicUsize,
}

impl RecordingSink {
    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions.lock().unwrap().clone()
    }

    pub fn get(&self, type_: &str) -> Option<Condition> {
        self.conditions().into_iter().find(|c| c.type_ == type_)
    }
}

#[async_trait]
impl ConditionSink for RecordingSink {
    async fn set_condition(&self, condition: Condition) -> Result<()> {
        if upsert_condition(&mut self.conditions.lock().unwrap(), condition) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn remove_condition(&self, type_: &str) -> Result<()> {
        if remove_condition(&mut self.conditions.lock().unwrap(), type_) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// Controllers
// ============================================================================

/// Controller that counts how often it was started and stopped
pub struct CountingRunnable {
    name: String,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

impl CountingRunnable {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runnable for CountingRunnable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, shutdown: CancellationToken) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        shutdown.cancelled().await;
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Let spawned tasks make progress
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}

// ============================================================================
// Fixtures
// ============================================================================

pub const CLOUDS_YAML: &str = r#"
clouds:
  openstack:
    auth:
      auth_url: https://keystone.example.com:5000/v3
      username: manila
      password: secret
      project_id: 0123456789abcdef
      project_name: tenant
      user_domain_name: Default
    region_name: RegionOne
"#;

pub fn secret_with(name: &str, namespace: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}
