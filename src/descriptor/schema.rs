//! Current dependency descriptor schema.
//!
//! These types map to a `kp.kpack.io/v1alpha2` document and are the internal
//! representation every other schema version is upgraded into.

use serde::{Deserialize, Serialize};

use super::legacy::DescriptorV1Alpha1;

/// Known descriptor schema versions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    /// Legacy schema with `stores`/`stacks` lists.
    V1Alpha1,
    /// Current schema with `clusterStores`/`clusterStacks` lists.
    V1Alpha2,
}

impl ApiVersion {
    /// The version every document is upgraded to.
    pub const CURRENT: Self = Self::V1Alpha2;

    /// Every accepted version, oldest first.
    pub const ALL: [Self; 2] = [Self::V1Alpha1, Self::V1Alpha2];

    /// Returns the `apiVersion` tag for this version.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1Alpha1 => "kp.kpack.io/v1alpha1",
            Self::V1Alpha2 => "kp.kpack.io/v1alpha2",
        }
    }

    /// Looks up a version by its `apiVersion` tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == tag)
    }

    /// Returns every accepted tag, oldest first.
    #[must_use]
    pub fn accepted_tags() -> Vec<&'static str> {
        Self::ALL.iter().map(|v| v.as_str()).collect()
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded descriptor in whichever schema version it was written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedDescriptor {
    /// A legacy `kp.kpack.io/v1alpha1` document.
    V1Alpha1(DescriptorV1Alpha1),
    /// A current `kp.kpack.io/v1alpha2` document.
    V1Alpha2(DependencyDescriptor),
}

impl VersionedDescriptor {
    /// Returns the schema version of this document.
    #[must_use]
    pub const fn version(&self) -> ApiVersion {
        match self {
            Self::V1Alpha1(_) => ApiVersion::V1Alpha1,
            Self::V1Alpha2(_) => ApiVersion::V1Alpha2,
        }
    }

    /// Upgrades the document by exactly one schema version.
    ///
    /// The current version upgrades to itself.
    #[must_use]
    pub fn upgrade(self) -> Self {
        match self {
            Self::V1Alpha1(legacy) => Self::V1Alpha2(legacy.into_next()),
            current @ Self::V1Alpha2(_) => current,
        }
    }

    /// Applies upgrades until the current schema version is reached.
    #[must_use]
    pub fn into_current(self) -> DependencyDescriptor {
        let mut doc = self;
        loop {
            match doc {
                Self::V1Alpha2(current) => return current,
                older => doc = older.upgrade(),
            }
        }
    }
}

/// The validated, version-normalized root document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDescriptor {
    /// Schema tag; always the current version after parsing.
    pub api_version: String,
    /// Cluster stores, in declaration order.
    #[serde(default)]
    pub cluster_stores: Vec<StoreEntry>,
    /// Cluster stacks, in declaration order.
    #[serde(default)]
    pub cluster_stacks: Vec<StackEntry>,
    /// Cluster builders, in declaration order.
    #[serde(default)]
    pub cluster_builders: Vec<BuilderEntry>,
}

/// A store declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreEntry {
    /// Store name, unique among stores.
    #[serde(default)]
    pub name: String,
    /// Buildpackage images to upload into the store.
    #[serde(default)]
    pub sources: Vec<ImageSource>,
}

/// A single image reference wrapper, as used by `sources` and stack images.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSource {
    /// Image reference.
    #[serde(default)]
    pub image: String,
}

/// A stack declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackEntry {
    /// Stack name, unique among stacks.
    #[serde(default)]
    pub name: String,
    /// Build image of the stack.
    #[serde(default)]
    pub build_image: ImageSource,
    /// Run image of the stack.
    #[serde(default)]
    pub run_image: ImageSource,
}

/// A builder declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuilderEntry {
    /// Builder name, unique among builders.
    #[serde(default)]
    pub name: String,
    /// Explicit image tag; derived from the canonical repository when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Name of the stack the builder uses.
    #[serde(default)]
    pub cluster_stack: String,
    /// Name of the store the builder uses.
    #[serde(default)]
    pub cluster_store: String,
    /// Ordered buildpack groups.
    #[serde(default)]
    pub order: Vec<OrderEntry>,
}

/// One group of buildpacks in a builder order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderEntry {
    /// Buildpacks detected together.
    #[serde(default)]
    pub group: Vec<BuildpackRef>,
}

/// A buildpack selected by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildpackRef {
    /// Buildpack id.
    #[serde(default)]
    pub id: String,
    /// Pinned buildpack version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether detection may skip this buildpack.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl DependencyDescriptor {
    /// Creates an empty descriptor tagged with the current version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_version: ApiVersion::CURRENT.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Returns true if the descriptor declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cluster_stores.is_empty()
            && self.cluster_stacks.is_empty()
            && self.cluster_builders.is_empty()
    }
}
