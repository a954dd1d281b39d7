//! Cluster access.
//!
//! This module provides:
//! - The per-kind read/write capability the import depends on
//! - The configuration resolver supplying the canonical repository
//! - A `kube` backed implementation of both

mod kubernetes;

pub use kubernetes::KubeCluster;

use async_trait::async_trait;

use crate::error::Result;
use crate::resources::{
    ClusterBuilder, ClusterResource, ClusterStack, ClusterStore, ServiceAccountRef,
};

/// Get, create and update for one resource kind.
#[async_trait]
pub trait ResourceClient<R: ClusterResource>: Send + Sync {
    /// Reads an object by name.
    ///
    /// A missing object is reported as `ClusterError::NotFound`.
    async fn get(&self, name: &str) -> Result<R>;

    /// Creates an object and returns it as stored.
    async fn create(&self, resource: &R) -> Result<R>;

    /// Replaces an object and returns it as stored.
    async fn update(&self, resource: &R) -> Result<R>;
}

/// Access to every kind an import reconciles.
pub trait ClusterAccessor:
    ResourceClient<ClusterStore> + ResourceClient<ClusterStack> + ResourceClient<ClusterBuilder>
{
}

impl<T> ClusterAccessor for T where
    T: ResourceClient<ClusterStore> + ResourceClient<ClusterStack> + ResourceClient<ClusterBuilder>
{
}

/// Supplies the values every desired object is qualified with.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Repository images are relocated into.
    async fn canonical_repository(&self) -> Result<String>;

    /// Service account builders push with.
    async fn canonical_service_account(&self) -> Result<ServiceAccountRef>;
}

/// Reads an object, mapping not-found to `None`.
///
/// # Errors
///
/// Returns every error other than not-found.
pub async fn get_optional<R, C>(client: &C, name: &str) -> Result<Option<R>>
where
    R: ClusterResource,
    C: ResourceClient<R> + ?Sized,
{
    match client.get(name).await {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
