//! Legacy `kp.kpack.io/v1alpha1` descriptor schema.
//!
//! The legacy schema differs from the current one only by field names, so the
//! upgrade is a pure, lossless rename.

use serde::{Deserialize, Serialize};

use super::schema::{ApiVersion, BuilderEntry, DependencyDescriptor, OrderEntry, StackEntry, StoreEntry};

/// A `kp.kpack.io/v1alpha1` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorV1Alpha1 {
    /// Schema tag.
    pub api_version: String,
    /// Stores, later renamed `clusterStores`.
    #[serde(default)]
    pub stores: Vec<StoreEntry>,
    /// Stacks, later renamed `clusterStacks`.
    #[serde(default)]
    pub stacks: Vec<StackEntry>,
    /// Cluster builders.
    #[serde(default)]
    pub cluster_builders: Vec<BuilderEntryV1Alpha1>,
}

/// A legacy builder declaration using `stack`/`store` references.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuilderEntryV1Alpha1 {
    /// Builder name.
    #[serde(default)]
    pub name: String,
    /// Explicit image tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Stack name, later renamed `clusterStack`.
    #[serde(default)]
    pub stack: String,
    /// Store name, later renamed `clusterStore`.
    #[serde(default)]
    pub store: String,
    /// Ordered buildpack groups.
    #[serde(default)]
    pub order: Vec<OrderEntry>,
}

impl DescriptorV1Alpha1 {
    /// Upgrades to the next schema version.
    #[must_use]
    pub fn into_next(self) -> DependencyDescriptor {
        DependencyDescriptor {
            api_version: ApiVersion::V1Alpha2.as_str().to_string(),
            cluster_stores: self.stores,
            cluster_stacks: self.stacks,
            cluster_builders: self
                .cluster_builders
                .into_iter()
                .map(BuilderEntryV1Alpha1::into_next)
                .collect(),
        }
    }
}

impl BuilderEntryV1Alpha1 {
    fn into_next(self) -> BuilderEntry {
        BuilderEntry {
            name: self.name,
            tag: self.tag,
            cluster_stack: self.stack,
            cluster_store: self.store,
            order: self.order,
        }
    }
}
