//! Cluster resource model.
//!
//! This module provides:
//! - The three kinds an import reconciles and their wire shapes
//! - Annotation and label keys shared with the cluster
//! - Pure builders turning descriptor entries into desired objects

mod factory;
mod types;

pub use factory::{prepare_update, stack_sources, ImportContext, ResolvedStack};
pub use types::{
    ClusterBuilder, ClusterBuilderSpec, ClusterResource, ClusterStack, ClusterStackSpec,
    ClusterStore, ClusterStoreSpec, ObjectMeta, ObjectReference, ResourceKind, ServiceAccountRef,
    StackImage, StoreImage, API_GROUP, API_VERSION, DEFAULT_NAME, DEFAULT_REPOSITORY_ANNOTATION,
    IMPORT_TIMESTAMP_ANNOTATION, STACK_ID_LABEL,
};
