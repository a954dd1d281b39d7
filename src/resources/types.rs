//! Cluster object types for stores, stacks and builders.
//!
//! Only the fields the import reads or writes are modelled. Server-managed
//! fields other than `resourceVersion` are dropped on read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::descriptor::OrderEntry;

/// API group of every kind managed by the import.
pub const API_GROUP: &str = "kpack.io";

/// API version of every kind managed by the import.
pub const API_VERSION: &str = "v1alpha2";

/// Annotation recording the canonical repository images were relocated to.
pub const DEFAULT_REPOSITORY_ANNOTATION: &str = "buildservice.pivotal.io/defaultRepository";

/// Annotation recording when the object was last written by an import.
pub const IMPORT_TIMESTAMP_ANNOTATION: &str = "kpack.io/import-timestamp";

/// Image label carrying the buildpacks stack id.
pub const STACK_ID_LABEL: &str = "io.buildpacks.stack.id";

/// Name of the synthesized default stack and builder.
pub const DEFAULT_NAME: &str = "default";

/// The resource kinds an import reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A collection of buildpackages.
    ClusterStore,
    /// A build/run image pair.
    ClusterStack,
    /// A stack, a store and a buildpack order.
    ClusterBuilder,
}

impl ResourceKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClusterStore => "ClusterStore",
            Self::ClusterStack => "ClusterStack",
            Self::ClusterBuilder => "ClusterBuilder",
        }
    }

    /// Returns the lowercase plural used in API paths.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::ClusterStore => "clusterstores",
            Self::ClusterStack => "clusterstacks",
            Self::ClusterBuilder => "clusterbuilders",
        }
    }

    /// Returns the preview section header for this kind.
    #[must_use]
    pub const fn section_header(self) -> &'static str {
        match self {
            Self::ClusterStore => "ClusterStores",
            Self::ClusterStack => "ClusterStacks",
            Self::ClusterBuilder => "ClusterBuilders",
        }
    }

    /// Returns the `apiVersion` of objects of this kind.
    #[must_use]
    pub fn api_version(self) -> String {
        format!("{API_GROUP}/{API_VERSION}")
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object metadata kept by the import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Annotations, sorted by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Optimistic concurrency token, set on objects read from the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    /// Creates metadata with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Common surface of the three cluster kinds.
pub trait ClusterResource:
    Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Spec payload compared by the diff engine.
    type Spec: Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Kind of this resource.
    const KIND: ResourceKind;

    /// Assembles an object from its parts.
    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self;

    /// Returns the object metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Returns the object metadata mutably.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Returns the spec payload.
    fn spec(&self) -> &Self::Spec;

    /// Returns the object name.
    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Renders the full object with `apiVersion` and `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be serialized.
    fn to_manifest(&self) -> serde_json::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "apiVersion": Self::KIND.api_version(),
            "kind": Self::KIND.as_str(),
            "metadata": serde_json::to_value(self.metadata())?,
            "spec": serde_json::to_value(self.spec())?,
        }))
    }
}

/// A `ClusterStore` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterStore {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Store spec.
    pub spec: ClusterStoreSpec,
}

/// Spec of a `ClusterStore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterStoreSpec {
    /// Relocated buildpackage images, in insertion order.
    pub sources: Vec<StoreImage>,
}

/// An image held by a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreImage {
    /// Digest-qualified image reference.
    pub image: String,
}

/// A `ClusterStack` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterStack {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Stack spec.
    pub spec: ClusterStackSpec,
}

/// Spec of a `ClusterStack`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterStackSpec {
    /// Stack id shared by both images.
    pub id: String,
    /// Relocated build image.
    pub build_image: StackImage,
    /// Relocated run image.
    pub run_image: StackImage,
}

/// An image of a stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackImage {
    /// Digest-qualified image reference.
    pub image: String,
}

/// A `ClusterBuilder` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterBuilder {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Builder spec.
    pub spec: ClusterBuilderSpec,
}

/// Spec of a `ClusterBuilder`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterBuilderSpec {
    /// Image tag the builder is published to.
    pub tag: String,
    /// Stack reference.
    pub stack: ObjectReference,
    /// Store reference.
    pub store: ObjectReference,
    /// Ordered buildpack groups.
    pub order: Vec<OrderEntry>,
    /// Service account used to push the builder image.
    pub service_account_ref: ServiceAccountRef,
}

/// A by-name reference to another cluster-scoped object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectReference {
    /// Kind of the referenced object.
    pub kind: String,
    /// Name of the referenced object.
    pub name: String,
}

/// A namespaced service account reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccountRef {
    /// Namespace of the service account.
    pub namespace: String,
    /// Name of the service account.
    pub name: String,
}

impl ObjectReference {
    /// Creates a reference to an object of the given kind.
    #[must_use]
    pub fn to(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            name: name.into(),
        }
    }
}

impl ClusterResource for ClusterStore {
    type Spec = ClusterStoreSpec;
    const KIND: ResourceKind = ResourceKind::ClusterStore;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self { metadata, spec }
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

impl ClusterResource for ClusterStack {
    type Spec = ClusterStackSpec;
    const KIND: ResourceKind = ResourceKind::ClusterStack;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self { metadata, spec }
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

impl ClusterResource for ClusterBuilder {
    type Spec = ClusterBuilderSpec;
    const KIND: ResourceKind = ResourceKind::ClusterBuilder;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self { metadata, spec }
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

impl ClusterStore {
    /// Returns true if the store already holds the given image.
    #[must_use]
    pub fn contains(&self, image: &str) -> bool {
        self.spec.sources.iter().any(|s| s.image == image)
    }
}
