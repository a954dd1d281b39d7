//! Desired-state builders.
//!
//! Every function here is pure: registry lookups happen beforehand and their
//! results are passed in, so the same inputs always build the same object.

use crate::descriptor::{BuilderEntry, StackEntry};
use crate::error::Result;
use crate::registry::ImageReference;

use super::types::{
    ClusterBuilder, ClusterBuilderSpec, ClusterResource, ClusterStack, ClusterStackSpec,
    ClusterStore, ClusterStoreSpec, ObjectMeta, ObjectReference, ResourceKind, ServiceAccountRef,
    StackImage, StoreImage, DEFAULT_NAME, DEFAULT_REPOSITORY_ANNOTATION,
    IMPORT_TIMESTAMP_ANNOTATION,
};

/// Values shared by every desired object of one import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    /// Canonical repository images are relocated into.
    pub repository: String,
    /// Service account builders push with.
    pub service_account: ServiceAccountRef,
    /// RFC 3339 timestamp stamped on written objects.
    pub timestamp: String,
}

/// Build and run images of a stack, already relocated or resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStack {
    /// Stack id read from the image labels.
    pub id: String,
    /// Digest-qualified build image in the canonical repository.
    pub build_image: String,
    /// Digest-qualified run image in the canonical repository.
    pub run_image: String,
}

impl ImportContext {
    fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta::named(name).with_annotation(IMPORT_TIMESTAMP_ANNOTATION, &self.timestamp)
    }

    fn repository_metadata(&self, name: &str) -> ObjectMeta {
        self.metadata(name)
            .with_annotation(DEFAULT_REPOSITORY_ANNOTATION, &self.repository)
    }

    /// Returns the repository a store source is uploaded to.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a valid image reference.
    pub fn store_source_destination(&self, source: &str) -> Result<String> {
        let reference = ImageReference::parse(source)?;
        Ok(format!("{}/{}", self.repository, reference.basename()))
    }

    /// Returns where a store source lands in the canonical repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a valid image reference.
    pub fn store_source_target(&self, source: &str, digest: &str) -> Result<String> {
        Ok(format!("{}@{digest}", self.store_source_destination(source)?))
    }

    /// Returns where a stack image lands; `role` is `build` or `run`.
    #[must_use]
    pub fn stack_image_target(&self, role: &str, digest: &str) -> String {
        format!("{}/{role}@{digest}", self.repository)
    }

    /// Returns the repository stack images of the given role are pushed to.
    #[must_use]
    pub fn stack_image_destination(&self, role: &str) -> String {
        format!("{}/{role}", self.repository)
    }

    /// Returns the tag a builder is published to.
    ///
    /// The default builder always uses `<repository>/default`; a named
    /// builder uses its explicit tag if any.
    #[must_use]
    pub fn builder_tag(&self, name: &str, entry: &BuilderEntry) -> String {
        if name == DEFAULT_NAME {
            return format!("{}/{DEFAULT_NAME}", self.repository);
        }
        entry
            .tag
            .clone()
            .unwrap_or_else(|| format!("{}/{name}", self.repository))
    }

    /// Builds the desired store.
    ///
    /// Sources already held by `current` are kept in place; resolved sources
    /// not yet present are appended. Sources are never removed.
    #[must_use]
    pub fn desired_store(
        &self,
        name: &str,
        current: Option<&ClusterStore>,
        resolved_sources: &[String],
    ) -> ClusterStore {
        let mut sources: Vec<StoreImage> = current
            .map(|store| store.spec.sources.clone())
            .unwrap_or_default();

        for image in resolved_sources {
            if !sources.iter().any(|s| &s.image == image) {
                sources.push(StoreImage {
                    image: image.clone(),
                });
            }
        }

        ClusterStore::from_parts(
            self.repository_metadata(name),
            ClusterStoreSpec { sources },
        )
    }

    /// Builds the desired stack under the given name.
    #[must_use]
    pub fn desired_stack(&self, name: &str, resolved: &ResolvedStack) -> ClusterStack {
        ClusterStack::from_parts(
            self.repository_metadata(name),
            ClusterStackSpec {
                id: resolved.id.clone(),
                build_image: StackImage {
                    image: resolved.build_image.clone(),
                },
                run_image: StackImage {
                    image: resolved.run_image.clone(),
                },
            },
        )
    }

    /// Builds the desired builder under the given name.
    #[must_use]
    pub fn desired_builder(&self, name: &str, entry: &BuilderEntry) -> ClusterBuilder {
        ClusterBuilder::from_parts(
            self.metadata(name),
            ClusterBuilderSpec {
                tag: self.builder_tag(name, entry),
                stack: ObjectReference::to(ResourceKind::ClusterStack, &entry.cluster_stack),
                store: ObjectReference::to(ResourceKind::ClusterStore, &entry.cluster_store),
                order: entry.order.clone(),
                service_account_ref: self.service_account.clone(),
            },
        )
    }
}

/// Prepares a desired object for an update of `current`.
///
/// The current `resourceVersion` is carried over and annotations are merged,
/// desired values winning.
#[must_use]
pub fn prepare_update<R: ClusterResource>(current: &R, desired: &R) -> R {
    let mut merged = desired.clone();
    let mut annotations = current.metadata().annotations.clone();
    annotations.extend(desired.metadata().annotations.clone());

    let metadata = merged.metadata_mut();
    metadata.annotations = annotations;
    metadata.resource_version.clone_from(&current.metadata().resource_version);
    merged
}

/// Returns the stack entry's images as `(build, run)`.
#[must_use]
pub fn stack_sources(entry: &StackEntry) -> (&str, &str) {
    (&entry.build_image.image, &entry.run_image.image)
}
