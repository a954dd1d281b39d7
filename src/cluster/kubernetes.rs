//! Cluster accessor backed by the Kubernetes API.
//!
//! Stores, stacks and builders are accessed through the dynamic API since
//! their types are not part of `k8s-openapi`. The kp config map is read
//! through the typed `ConfigMap` API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

use crate::config::{EnvOverrides, KpConfig, KP_CONFIG_NAME, KP_CONFIG_NAMESPACE};
use crate::error::{ClusterError, ConfigError, KpError, Result};
use crate::resources::{
    ClusterResource, ObjectMeta, ResourceKind, ServiceAccountRef, API_GROUP, API_VERSION,
};

use super::{ConfigResolver, ResourceClient};

/// Cluster accessor and config resolver over a `kube` client.
#[derive(Clone)]
pub struct KubeCluster {
    /// API client.
    client: Client,
    /// Environment overrides applied on top of the kp config map.
    overrides: EnvOverrides,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Connects using the ambient kubeconfig or in-cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no cluster configuration can be inferred.
    pub async fn connect(overrides: EnvOverrides) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Connection {
                message: e.to_string(),
            })?;

        debug!("Connected to cluster");
        Ok(Self::from_client(client, overrides))
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: Client, overrides: EnvOverrides) -> Self {
        Self { client, overrides }
    }

    fn api_resource(kind: ResourceKind) -> ApiResource {
        let gvk = GroupVersionKind::gvk(API_GROUP, API_VERSION, kind.as_str());
        ApiResource::from_gvk_with_plural(&gvk, kind.plural())
    }

    fn api(&self, kind: ResourceKind) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &Self::api_resource(kind))
    }

    /// Reads the kp config map and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config map cannot be read or names no
    /// canonical repository.
    pub async fn load_kp_config(&self) -> Result<KpConfig> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), KP_CONFIG_NAMESPACE);

        let data = match api.get(KP_CONFIG_NAME).await {
            Ok(config_map) => Some(config_map.data.unwrap_or_default()),
            Err(kube::Error::Api(ref err)) if err.code == 404 => None,
            Err(e) => {
                return Err(ConfigError::Load {
                    message: format!(
                        "failed to read config map {KP_CONFIG_NAMESPACE}/{KP_CONFIG_NAME}: {e}"
                    ),
                }
                .into());
            }
        };

        KpConfig::resolve(data.as_ref(), &self.overrides)
    }

    fn api_error(operation: &'static str, kind: ResourceKind, name: &str, err: &kube::Error) -> KpError {
        ClusterError::Api {
            operation,
            kind,
            name: name.to_string(),
            message: err.to_string(),
        }
        .into()
    }
}

/// Converts a resource to its dynamic wire form.
fn to_dynamic<R: ClusterResource>(resource: &R) -> Result<DynamicObject> {
    let metadata = resource.metadata();
    let mut obj = DynamicObject::new(&metadata.name, &KubeCluster::api_resource(R::KIND));

    if !metadata.annotations.is_empty() {
        obj.metadata.annotations = Some(metadata.annotations.clone());
    }
    obj.metadata.resource_version.clone_from(&metadata.resource_version);

    let spec = serde_json::to_value(resource.spec()).map_err(|e| ClusterError::Conversion {
        kind: R::KIND,
        name: metadata.name.clone(),
        message: e.to_string(),
    })?;
    obj.data = serde_json::json!({ "spec": spec });

    Ok(obj)
}

/// Writes a resource's spec and annotations over the live object.
///
/// Labels, finalizers, owner references, status and spec fields the
/// resource types do not model are kept from `live`.
fn overlay<R: ClusterResource>(mut live: DynamicObject, resource: &R) -> Result<DynamicObject> {
    let metadata = resource.metadata();
    let desired = to_dynamic(resource)?;

    if !metadata.annotations.is_empty() {
        live.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .extend(metadata.annotations.clone());
    }
    if metadata.resource_version.is_some() {
        live.metadata.resource_version.clone_from(&metadata.resource_version);
    }

    let Some(fields) = desired.data.get("spec").and_then(|v| v.as_object()) else {
        return Ok(live);
    };
    if !live.data.is_object() {
        live.data = serde_json::json!({});
    }
    let spec = &mut live.data["spec"];
    if !spec.is_object() {
        *spec = serde_json::json!({});
    }
    if let Some(live_spec) = spec.as_object_mut() {
        for (key, value) in fields {
            live_spec.insert(key.clone(), value.clone());
        }
    }

    Ok(live)
}

/// Converts a dynamic object read from the cluster.
///
/// Status and unknown spec fields are dropped.
fn from_dynamic<R: ClusterResource>(obj: DynamicObject) -> Result<R> {
    let name = obj.metadata.name.unwrap_or_default();
    let spec_value = obj
        .data
        .get("spec")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let spec = serde_json::from_value(spec_value).map_err(|e| ClusterError::Conversion {
        kind: R::KIND,
        name: name.clone(),
        message: e.to_string(),
    })?;

    let metadata = ObjectMeta {
        name,
        annotations: obj.metadata.annotations.unwrap_or_default(),
        resource_version: obj.metadata.resource_version,
    };

    Ok(R::from_parts(metadata, spec))
}

#[async_trait]
impl<R: ClusterResource> ResourceClient<R> for KubeCluster {
    async fn get(&self, name: &str) -> Result<R> {
        match self.api(R::KIND).get(name).await {
            Ok(obj) => from_dynamic(obj),
            Err(kube::Error::Api(ref err)) if err.code == 404 => Err(ClusterError::NotFound {
                kind: R::KIND,
                name: name.to_string(),
            }
            .into()),
            Err(e) => Err(Self::api_error("get", R::KIND, name, &e)),
        }
    }

    async fn create(&self, resource: &R) -> Result<R> {
        let obj = to_dynamic(resource)?;
        debug!("Creating {} '{}'", R::KIND, resource.name());

        let created = self
            .api(R::KIND)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| Self::api_error("create", R::KIND, resource.name(), &e))?;
        from_dynamic(created)
    }

    async fn update(&self, resource: &R) -> Result<R> {
        let api = self.api(R::KIND);
        let live = api
            .get(resource.name())
            .await
            .map_err(|e| Self::api_error("get", R::KIND, resource.name(), &e))?;
        let obj = overlay(live, resource)?;
        debug!("Updating {} '{}'", R::KIND, resource.name());

        let updated = api
            .replace(resource.name(), &PostParams::default(), &obj)
            .await
            .map_err(|e| Self::api_error("update", R::KIND, resource.name(), &e))?;
        from_dynamic(updated)
    }
}

#[async_trait]
impl ConfigResolver for KubeCluster {
    async fn canonical_repository(&self) -> Result<String> {
        Ok(self.load_kp_config().await?.canonical_repository)
    }

    async fn canonical_service_account(&self) -> Result<ServiceAccountRef> {
        Ok(self.load_kp_config().await?.service_account)
    }
}
