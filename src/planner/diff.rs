//! Diff engine for comparing current and desired objects.
//!
//! Objects are rendered to YAML restricted to their kind, name and spec, then
//! compared line by line. Metadata never takes part, so server-managed fields
//! and import annotations cannot produce a change.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::resources::{ClusterResource, ResourceKind};

/// Engine for computing per-object diffs.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// Difference for a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDiff {
    /// Kind of the object.
    pub kind: ResourceKind,
    /// Object name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Rendered diff; empty when nothing changes.
    pub text: String,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Object does not exist yet.
    Create,
    /// Object exists with a different spec.
    Update,
    /// Object is unchanged.
    NoChange,
}

/// The part of an object the diff looks at.
#[derive(Serialize)]
struct DiffView<'a, S> {
    kind: &'static str,
    name: &'a str,
    spec: &'a S,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Diffs a desired object against the current one, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if either object cannot be rendered.
    pub fn diff<R: ClusterResource>(&self, current: Option<&R>, desired: &R) -> Result<ResourceDiff> {
        let desired_yaml = Self::render(desired)?;

        let (diff_type, text) = match current {
            None => (DiffType::Create, Self::line_diff("", &desired_yaml)),
            Some(current) => {
                let current_yaml = Self::render(current)?;
                if current_yaml == desired_yaml {
                    (DiffType::NoChange, String::new())
                } else {
                    (DiffType::Update, Self::line_diff(&current_yaml, &desired_yaml))
                }
            }
        };

        debug!("{} '{}': {diff_type:?}", R::KIND, desired.name());

        Ok(ResourceDiff {
            kind: R::KIND,
            name: desired.name().to_string(),
            diff_type,
            text,
        })
    }

    fn render<R: ClusterResource>(resource: &R) -> Result<String> {
        let view = DiffView {
            kind: R::KIND.as_str(),
            name: resource.name(),
            spec: resource.spec(),
        };

        serde_yaml::to_string(&view).map_err(|e| {
            ClusterError::Conversion {
                kind: R::KIND,
                name: resource.name().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    fn line_diff(old: &str, new: &str) -> String {
        TextDiff::from_lines(old, new)
            .iter_all_changes()
            .map(|change| {
                let prefix = match change.tag() {
                    ChangeTag::Delete => "- ",
                    ChangeTag::Insert => "+ ",
                    ChangeTag::Equal => "  ",
                };
                format!("{prefix}{}", change.value().trim_end_matches('\n'))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ResourceDiff {
    /// Returns true if applying the object would change the cluster.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diff_type != DiffType::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{
        ClusterStack, ClusterStackSpec, ClusterStore, ClusterStoreSpec, ObjectMeta, StackImage,
        StoreImage, IMPORT_TIMESTAMP_ANNOTATION,
    };

    fn store(sources: &[&str]) -> ClusterStore {
        ClusterStore {
            metadata: ObjectMeta::named("some-store"),
            spec: ClusterStoreSpec {
                sources: sources
                    .iter()
                    .map(|image| StoreImage {
                        image: (*image).to_string(),
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn test_absent_current_is_full_create() {
        let desired = store(&["new-registry.io/new-project/store-image@sha256:123abc"]);
        let diff = DiffEngine::new().diff(None, &desired).expect("diff");

        assert_eq!(diff.diff_type, DiffType::Create);
        assert_eq!(
            diff.text,
            "+ kind: ClusterStore\n+ name: some-store\n+ spec:\n+   sources:\n+   - image: new-registry.io/new-project/store-image@sha256:123abc"
        );
    }

    #[test]
    fn test_identical_objects_have_no_changes() {
        let desired = store(&["new-registry.io/new-project/store-image@sha256:123abc"]);
        let diff = DiffEngine::new().diff(Some(&desired), &desired).expect("diff");

        assert_eq!(diff.diff_type, DiffType::NoChange);
        assert!(diff.text.is_empty());
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_metadata_is_ignored() {
        let mut current = store(&["new-registry.io/new-project/store-image@sha256:123abc"]);
        current.metadata.resource_version = Some(String::from("12"));
        current
            .metadata
            .annotations
            .insert(IMPORT_TIMESTAMP_ANNOTATION.to_string(), String::from("2019-01-01T00:00:00Z"));

        let desired = store(&["new-registry.io/new-project/store-image@sha256:123abc"]);
        let diff = DiffEngine::new().diff(Some(&current), &desired).expect("diff");
        assert_eq!(diff.diff_type, DiffType::NoChange);
    }

    #[test]
    fn test_changed_spec_marks_lines() {
        let image = |digest: &str| StackImage {
            image: format!("new-registry.io/new-project/build@sha256:{digest}"),
        };
        let current = ClusterStack {
            metadata: ObjectMeta::named("some-stack"),
            spec: ClusterStackSpec {
                id: String::from("some-stack-id"),
                build_image: image("aaa"),
                run_image: image("bbb"),
            },
        };
        let mut desired = current.clone();
        desired.spec.id = String::from("some-other-stack-id");

        let diff = DiffEngine::new().diff(Some(&current), &desired).expect("diff");
        assert_eq!(diff.diff_type, DiffType::Update);
        assert!(diff.text.contains("-   id: some-stack-id"));
        assert!(diff.text.contains("+   id: some-other-stack-id"));
        assert!(diff.text.contains("  kind: ClusterStack"));
    }
}
