//! In-memory collaborators for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::cluster::ResourceClient;
use crate::config::KpConfig;
use crate::descriptor::{
    BuilderEntry, BuildpackRef, DependencyDescriptor, ImageSource, OrderEntry, StackEntry,
    StoreEntry,
};
use crate::error::{ClusterError, RegistryError, Result};
use crate::importer::{Clock, ImportReporter};
use crate::planner::Preview;
use crate::registry::{ImageInfo, Registry};
use crate::resources::{ClusterResource, ImportContext, ResourceKind, ServiceAccountRef, STACK_ID_LABEL};

pub const REPOSITORY: &str = "new-registry.io/new-project";
pub const TIMESTAMP: &str = "2020-07-01T00:00:00Z";

pub fn service_account() -> ServiceAccountRef {
    ServiceAccountRef {
        namespace: String::from("kpack"),
        name: String::from("some-serviceaccount"),
    }
}

pub fn context() -> ImportContext {
    ImportContext {
        repository: REPOSITORY.to_string(),
        service_account: service_account(),
        timestamp: TIMESTAMP.to_string(),
    }
}

pub fn kp_config() -> KpConfig {
    KpConfig {
        canonical_repository: REPOSITORY.to_string(),
        service_account: service_account(),
    }
}

/// One store, one stack and one builder over them.
pub fn descriptor() -> DependencyDescriptor {
    let mut descriptor = DependencyDescriptor::new();
    descriptor.cluster_stores.push(StoreEntry {
        name: String::from("some-store"),
        sources: vec![ImageSource {
            image: String::from("some-registry.io/some-project/store-image"),
        }],
    });
    descriptor.cluster_stacks.push(StackEntry {
        name: String::from("some-stack"),
        build_image: ImageSource {
            image: String::from("some-registry.io/some-project/build-image"),
        },
        run_image: ImageSource {
            image: String::from("some-registry.io/some-project/run-image"),
        },
    });
    descriptor.cluster_builders.push(BuilderEntry {
        name: String::from("some-ccb"),
        tag: None,
        cluster_stack: String::from("some-stack"),
        cluster_store: String::from("some-store"),
        order: vec![OrderEntry {
            group: vec![BuildpackRef {
                id: String::from("buildpack-1"),
                ..BuildpackRef::default()
            }],
        }],
    });
    descriptor
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> String {
        TIMESTAMP.to_string()
    }
}

/// Records everything an import reports.
#[derive(Debug, Default)]
pub struct Transcript {
    pub preview: String,
    pub lines: Vec<String>,
    pub notices: Vec<String>,
}

impl Transcript {
    /// Progress lines, newline terminated.
    pub fn text(&self) -> String {
        self.lines.iter().map(|line| format!("{line}\n")).collect()
    }
}

impl ImportReporter for Transcript {
    fn preview(&mut self, preview: &Preview) -> Result<()> {
        self.preview = preview.to_string();
        Ok(())
    }

    fn progress(&mut self, line: &str) -> Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }

    fn notice(&mut self, line: &str) -> Result<()> {
        self.notices.push(line.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

#[derive(Debug, Default)]
struct ClusterState {
    objects: HashMap<(ResourceKind, String), serde_json::Value>,
    writes: Vec<(WriteOp, ResourceKind, String)>,
    failing_gets: HashMap<ResourceKind, String>,
    failing_writes: HashMap<ResourceKind, String>,
}

/// Cluster keeping objects as JSON, with a write log.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every get of `kind` fail with a connection error.
    pub fn fail_gets_of(self, kind: ResourceKind, message: &str) -> Self {
        self.lock().failing_gets.insert(kind, message.to_string());
        self
    }

    /// Makes every create or update of `kind` fail.
    pub fn fail_writes_of(self, kind: ResourceKind, message: &str) -> Self {
        self.lock().failing_writes.insert(kind, message.to_string());
        self
    }

    pub fn writes(&self) -> Vec<(WriteOp, ResourceKind, String)> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn object<R: ClusterResource>(&self, name: &str) -> Option<R> {
        self.lock()
            .objects
            .get(&(R::KIND, name.to_string()))
            .map(|value| serde_json::from_value(value.clone()).expect("stored object"))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.state.lock().expect("cluster state")
    }

    fn store<R: ClusterResource>(&self, op: WriteOp, resource: &R) -> Result<R> {
        let mut state = self.lock();
        let operation = match op {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
        };
        if let Some(message) = state.failing_writes.get(&R::KIND) {
            return Err(ClusterError::Api {
                operation,
                kind: R::KIND,
                name: resource.name().to_string(),
                message: message.clone(),
            }
            .into());
        }

        let key = (R::KIND, resource.name().to_string());
        let version = match (op, state.objects.get(&key)) {
            (WriteOp::Create, Some(_)) => {
                return Err(ClusterError::Api {
                    operation,
                    kind: R::KIND,
                    name: resource.name().to_string(),
                    message: String::from("already exists"),
                }
                .into());
            }
            (WriteOp::Create, None) => 1,
            (WriteOp::Update, None) => {
                return Err(ClusterError::NotFound {
                    kind: R::KIND,
                    name: resource.name().to_string(),
                }
                .into());
            }
            (WriteOp::Update, Some(existing)) => {
                let stored: R = serde_json::from_value(existing.clone()).expect("stored object");
                let current = stored
                    .metadata()
                    .resource_version
                    .as_deref()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or_default();
                current + 1
            }
        };

        let mut stored = resource.clone();
        stored.metadata_mut().resource_version = Some(version.to_string());
        state
            .objects
            .insert(key.clone(), serde_json::to_value(&stored).expect("serialize"));
        state.writes.push((op, key.0, key.1));
        Ok(stored)
    }
}

#[async_trait]
impl<R: ClusterResource> ResourceClient<R> for InMemoryCluster {
    async fn get(&self, name: &str) -> Result<R> {
        if let Some(message) = self.lock().failing_gets.get(&R::KIND) {
            return Err(ClusterError::Connection {
                message: message.clone(),
            }
            .into());
        }
        self.object(name).ok_or_else(|| {
            ClusterError::NotFound {
                kind: R::KIND,
                name: name.to_string(),
            }
            .into()
        })
    }

    async fn create(&self, resource: &R) -> Result<R> {
        self.store(WriteOp::Create, resource)
    }

    async fn update(&self, resource: &R) -> Result<R> {
        self.store(WriteOp::Update, resource)
    }
}

/// Registry serving fixed images; relocation keeps the digest.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    images: HashMap<String, ImageInfo>,
    relocations: Mutex<Vec<(String, String)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves every image `descriptor()` refers to, plus a second store image.
    pub fn with_descriptor_images() -> Self {
        Self::new()
            .with_image("some-registry.io/some-project/store-image", "sha256:123abc", &[])
            .with_image("some-registry.io/some-project/store-image-2", "sha256:456def", &[])
            .with_stack_image("some-registry.io/some-project/build-image", "sha256:b1", "some-stack-id")
            .with_stack_image("some-registry.io/some-project/run-image", "sha256:r1", "some-stack-id")
    }

    pub fn with_image(mut self, image: &str, digest: &str, labels: &[(&str, &str)]) -> Self {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.images.insert(
            image.to_string(),
            ImageInfo {
                digest: digest.to_string(),
                labels,
            },
        );
        self
    }

    pub fn with_stack_image(self, image: &str, digest: &str, stack_id: &str) -> Self {
        self.with_image(image, digest, &[(STACK_ID_LABEL, stack_id)])
    }

    /// `(image, destination)` of every relocation, in call order.
    pub fn relocations(&self) -> Vec<(String, String)> {
        self.relocations.lock().expect("relocations").clone()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn fetch(&self, image: &str) -> Result<ImageInfo> {
        self.images.get(image).cloned().ok_or_else(|| {
            RegistryError::Status {
                url: image.to_string(),
                status: 404,
                message: String::from("MANIFEST_UNKNOWN"),
            }
            .into()
        })
    }

    async fn relocate(&self, image: &str, destination: &str) -> Result<String> {
        let info = self.fetch(image).await?;
        self.relocations
            .lock()
            .expect("relocations")
            .push((image.to_string(), destination.to_string()));
        Ok(format!("{destination}@{}", info.digest))
    }
}
