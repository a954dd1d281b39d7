//! Import preview construction.
//!
//! The preview fetches every current object, builds every desired object
//! from read-only registry lookups, and groups the diffs into one section per
//! kind. Resolutions are kept so the apply phase does not query the registry
//! again.

use tracing::info;

use crate::cluster::{get_optional, ClusterAccessor};
use crate::descriptor::DependencyDescriptor;
use crate::error::Result;
use crate::registry::Registry;
use crate::resources::{ClusterBuilder, ClusterStack, ClusterStore, ImportContext, ResourceKind};

use super::diff::{DiffEngine, ResourceDiff};
use super::resolve::{resolve_stack, resolve_store, Resolutions};
use super::targets::expand_defaults;

/// Literal shown for a section without changes.
pub const NO_CHANGES: &str = "No Changes";

/// Diffs of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Kind the section covers.
    pub kind: ResourceKind,
    /// Per-object diffs, in reconciliation order.
    pub diffs: Vec<ResourceDiff>,
}

/// The combined preview of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Sections for stores, stacks and builders, in that order.
    pub sections: Vec<Section>,
}

/// A preview together with the registry lookups it was built from.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    /// Rendered diffs.
    pub preview: Preview,
    /// Store and stack resolutions, indexed like the descriptor.
    pub resolutions: Resolutions,
}

impl Section {
    /// Returns true if any object in the section changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diffs.iter().any(ResourceDiff::has_changes)
    }
}

impl Preview {
    /// Returns true if any object changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.sections.iter().any(Section::has_changes)
    }

    /// Returns the diffs of every object that changes.
    pub fn changes(&self) -> impl Iterator<Item = &ResourceDiff> {
        self.sections
            .iter()
            .flat_map(|s| s.diffs.iter())
            .filter(|d| d.has_changes())
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\n", self.kind.section_header())?;

        let mut any = false;
        for diff in self.diffs.iter().filter(|d| !d.text.is_empty()) {
            write!(f, "{}\n\n", diff.text)?;
            any = true;
        }
        if !any {
            write!(f, "{NO_CHANGES}\n\n")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Preview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for section in &self.sections {
            write!(f, "{section}")?;
        }
        Ok(())
    }
}

/// Builds the import plan for a descriptor.
///
/// A missing object counts as absent; any other lookup error aborts the
/// whole preview.
///
/// # Errors
///
/// Returns the first cluster or registry error.
pub async fn build_plan(
    cluster: &dyn ClusterAccessor,
    registry: &dyn Registry,
    ctx: &ImportContext,
    descriptor: &DependencyDescriptor,
) -> Result<ImportPlan> {
    let engine = DiffEngine::new();
    let mut resolutions = Resolutions::default();

    info!("Computing changes");

    let mut stores = Section {
        kind: ResourceKind::ClusterStore,
        diffs: Vec::new(),
    };
    for entry in &descriptor.cluster_stores {
        let current = get_optional::<ClusterStore, _>(cluster, &entry.name).await?;
        let sources = resolve_store(registry, ctx, entry).await?;

        let targets: Vec<String> = sources.iter().map(|s| s.target.clone()).collect();
        let desired = ctx.desired_store(&entry.name, current.as_ref(), &targets);
        stores.diffs.push(engine.diff(current.as_ref(), &desired)?);

        resolutions.stores.push(sources);
    }

    for entry in &descriptor.cluster_stacks {
        resolutions.stacks.push(resolve_stack(registry, ctx, entry).await?);
    }

    let mut stacks = Section {
        kind: ResourceKind::ClusterStack,
        diffs: Vec::new(),
    };
    for target in expand_defaults(&descriptor.cluster_stacks) {
        let current = get_optional::<ClusterStack, _>(cluster, target.name).await?;
        let desired = ctx.desired_stack(target.name, &resolutions.stacks[target.index].resolved);
        stacks.diffs.push(engine.diff(current.as_ref(), &desired)?);
    }

    let mut builders = Section {
        kind: ResourceKind::ClusterBuilder,
        diffs: Vec::new(),
    };
    for target in expand_defaults(&descriptor.cluster_builders) {
        let current = get_optional::<ClusterBuilder, _>(cluster, target.name).await?;
        let desired = ctx.desired_builder(target.name, target.entry);
        builders.diffs.push(engine.diff(current.as_ref(), &desired)?);
    }

    Ok(ImportPlan {
        preview: Preview {
            sections: vec![stores, stacks, builders],
        },
        resolutions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClusterError, KpError};
    use crate::planner::diff::DiffType;
    use crate::testing::{context, descriptor, FakeRegistry, InMemoryCluster};

    #[test]
    fn test_section_layout() {
        let section = Section {
            kind: ResourceKind::ClusterStore,
            diffs: vec![
                ResourceDiff {
                    kind: ResourceKind::ClusterStore,
                    name: String::from("a"),
                    diff_type: DiffType::Create,
                    text: String::from("+ kind: ClusterStore"),
                },
                ResourceDiff {
                    kind: ResourceKind::ClusterStore,
                    name: String::from("b"),
                    diff_type: DiffType::NoChange,
                    text: String::new(),
                },
            ],
        };
        assert_eq!(section.to_string(), "ClusterStores\n\n+ kind: ClusterStore\n\n");
    }

    #[test]
    fn test_empty_preview() {
        let preview = Preview {
            sections: vec![
                Section {
                    kind: ResourceKind::ClusterStore,
                    diffs: vec![],
                },
                Section {
                    kind: ResourceKind::ClusterStack,
                    diffs: vec![],
                },
                Section {
                    kind: ResourceKind::ClusterBuilder,
                    diffs: vec![],
                },
            ],
        };
        assert_eq!(
            preview.to_string(),
            "ClusterStores\n\nNo Changes\n\nClusterStacks\n\nNo Changes\n\nClusterBuilders\n\nNo Changes\n\n"
        );
        assert!(!preview.has_changes());
    }

    #[tokio::test]
    async fn test_plan_against_empty_cluster() {
        let cluster = InMemoryCluster::new();
        let registry = FakeRegistry::with_descriptor_images();

        let plan = build_plan(&cluster, &registry, &context(), &descriptor())
            .await
            .expect("plan");

        let changed: Vec<(ResourceKind, &str)> = plan
            .preview
            .changes()
            .map(|d| (d.kind, d.name.as_str()))
            .collect();
        assert_eq!(
            changed,
            vec![
                (ResourceKind::ClusterStore, "some-store"),
                (ResourceKind::ClusterStack, "some-stack"),
                (ResourceKind::ClusterStack, "default"),
                (ResourceKind::ClusterBuilder, "some-ccb"),
                (ResourceKind::ClusterBuilder, "default"),
            ]
        );
        assert_eq!(plan.resolutions.stores.len(), 1);
        assert_eq!(plan.resolutions.stacks.len(), 1);
        assert!(cluster.writes().is_empty());
        assert!(registry.relocations().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_aborts_preview() {
        let cluster =
            InMemoryCluster::new().fail_gets_of(ResourceKind::ClusterStack, "connection refused");
        let registry = FakeRegistry::with_descriptor_images();

        let err = build_plan(&cluster, &registry, &context(), &descriptor())
            .await
            .unwrap_err();
        assert!(matches!(err, KpError::Cluster(ClusterError::Connection { .. })));
    }
}
