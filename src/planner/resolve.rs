//! Registry lookups feeding the desired-state builders.
//!
//! Resolution only reads from registries: it learns each image's digest and
//! computes where the image will live in the canonical repository. Uploads
//! happen later, during apply.

use tracing::debug;

use crate::descriptor::{StackEntry, StoreEntry};
use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::resources::{stack_sources, ImportContext, ResolvedStack, STACK_ID_LABEL};

/// A store source and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Image as declared in the descriptor.
    pub image: String,
    /// Digest-qualified reference in the canonical repository.
    pub target: String,
}

/// A stack's declared images together with their resolved targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResolution {
    /// Declared build image.
    pub build_source: String,
    /// Declared run image.
    pub run_source: String,
    /// Stack id and target references.
    pub resolved: ResolvedStack,
}

/// Resolutions of every store and stack, indexed like the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolutions {
    /// Per store entry, its resolved sources.
    pub stores: Vec<Vec<ResolvedSource>>,
    /// Per stack entry, its resolution.
    pub stacks: Vec<StackResolution>,
}

/// Resolves every source of a store.
///
/// # Errors
///
/// Returns the first registry or reference error.
pub async fn resolve_store(
    registry: &dyn Registry,
    ctx: &ImportContext,
    entry: &StoreEntry,
) -> Result<Vec<ResolvedSource>> {
    let mut resolved = Vec::with_capacity(entry.sources.len());

    for source in &entry.sources {
        let digest = registry.digest(&source.image).await?;
        let target = ctx.store_source_target(&source.image, &digest)?;
        debug!("Store source {} resolves to {target}", source.image);
        resolved.push(ResolvedSource {
            image: source.image.clone(),
            target,
        });
    }

    Ok(resolved)
}

/// Resolves the images and stack id of a stack.
///
/// # Errors
///
/// Returns an error if an image cannot be read, lacks the stack id label, or
/// the build and run images disagree on it.
pub async fn resolve_stack(
    registry: &dyn Registry,
    ctx: &ImportContext,
    entry: &StackEntry,
) -> Result<StackResolution> {
    let (build_source, run_source) = stack_sources(entry);

    let build = registry.fetch(build_source).await?;
    let run = registry.fetch(run_source).await?;

    let build_id = stack_id(build_source, &build.labels)?;
    let run_id = stack_id(run_source, &run.labels)?;
    if build_id != run_id {
        return Err(RegistryError::StackMismatch {
            build: build_id,
            run: run_id,
        }
        .into());
    }

    debug!("Stack '{}' resolves to id {build_id}", entry.name);

    Ok(StackResolution {
        build_source: build_source.to_string(),
        run_source: run_source.to_string(),
        resolved: ResolvedStack {
            id: build_id,
            build_image: ctx.stack_image_target("build", &build.digest),
            run_image: ctx.stack_image_target("run", &run.digest),
        },
    })
}

fn stack_id(image: &str, labels: &std::collections::BTreeMap<String, String>) -> Result<String> {
    labels
        .get(STACK_ID_LABEL)
        .filter(|id| !id.is_empty())
        .cloned()
        .ok_or_else(|| {
            RegistryError::MissingLabel {
                image: image.to_string(),
                label: STACK_ID_LABEL.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ImageSource;
    use crate::error::KpError;
    use crate::testing::{context, FakeRegistry};

    fn stack_entry() -> StackEntry {
        StackEntry {
            name: String::from("some-stack"),
            build_image: ImageSource {
                image: String::from("some-registry.io/some-project/build-image"),
            },
            run_image: ImageSource {
                image: String::from("some-registry.io/some-project/run-image"),
            },
        }
    }

    #[tokio::test]
    async fn test_resolve_store_computes_targets() {
        let registry = FakeRegistry::new()
            .with_image("some-registry.io/some-project/store-image", "sha256:123abc", &[]);
        let entry = StoreEntry {
            name: String::from("some-store"),
            sources: vec![ImageSource {
                image: String::from("some-registry.io/some-project/store-image"),
            }],
        };

        let resolved = resolve_store(&registry, &context(), &entry).await.expect("resolve");
        assert_eq!(
            resolved,
            vec![ResolvedSource {
                image: String::from("some-registry.io/some-project/store-image"),
                target: String::from("new-registry.io/new-project/store-image@sha256:123abc"),
            }]
        );
        assert!(registry.relocations().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_stack() {
        let registry = FakeRegistry::new()
            .with_stack_image("some-registry.io/some-project/build-image", "sha256:b1", "some-stack-id")
            .with_stack_image("some-registry.io/some-project/run-image", "sha256:r1", "some-stack-id");

        let resolution = resolve_stack(&registry, &context(), &stack_entry())
            .await
            .expect("resolve");
        assert_eq!(resolution.resolved.id, "some-stack-id");
        assert_eq!(resolution.resolved.build_image, "new-registry.io/new-project/build@sha256:b1");
        assert_eq!(resolution.resolved.run_image, "new-registry.io/new-project/run@sha256:r1");
    }

    #[tokio::test]
    async fn test_resolve_stack_id_mismatch() {
        let registry = FakeRegistry::new()
            .with_stack_image("some-registry.io/some-project/build-image", "sha256:b1", "some-stack-id")
            .with_stack_image("some-registry.io/some-project/run-image", "sha256:r1", "other-id");

        let err = resolve_stack(&registry, &context(), &stack_entry())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "build image stack id 'some-stack-id' does not match run image stack id 'other-id'"
        );
    }

    #[tokio::test]
    async fn test_resolve_stack_missing_label() {
        let registry = FakeRegistry::new()
            .with_image("some-registry.io/some-project/build-image", "sha256:b1", &[])
            .with_stack_image("some-registry.io/some-project/run-image", "sha256:r1", "some-stack-id");

        let err = resolve_stack(&registry, &context(), &stack_entry())
            .await
            .unwrap_err();
        assert!(matches!(err, KpError::Registry(RegistryError::MissingLabel { .. })));
    }
}
