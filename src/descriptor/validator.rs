//! Structural validation for dependency descriptors.
//!
//! Validation runs on the current schema after any upgrade and before the
//! cluster is contacted. Cross references between builders and the stacks or
//! stores they name are only advisory: the referenced objects may already
//! exist in the cluster.

use std::collections::HashSet;
use tracing::debug;

use crate::error::{DescriptorError, Result};
use crate::resources::DEFAULT_NAME;

use super::schema::{BuilderEntry, DependencyDescriptor, StackEntry, StoreEntry};

/// Validator for dependency descriptors.
#[derive(Debug, Default)]
pub struct DescriptorValidator;

/// Validation result containing all findings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Fatal findings, in document order.
    pub errors: Vec<ValidationError>,
    /// Advisory findings.
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl DescriptorValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, descriptor: &DependencyDescriptor) -> Result<ValidationResult> {
        let result = self.check(descriptor);

        match result.errors.first() {
            None => {
                debug!(
                    "Descriptor validation passed ({} warnings)",
                    result.warnings.len()
                );
                Ok(result)
            }
            Some(first) => Err(DescriptorError::validation(&first.field, &first.message).into()),
        }
    }

    /// Collects every finding without failing.
    #[must_use]
    pub fn check(&self, descriptor: &DependencyDescriptor) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_stores(&descriptor.cluster_stores, &mut result);
        Self::validate_stacks(&descriptor.cluster_stacks, &mut result);
        Self::validate_builders(descriptor, &descriptor.cluster_builders, &mut result);

        result
    }

    fn validate_stores(stores: &[StoreEntry], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, store) in stores.iter().enumerate() {
            let prefix = format!("clusterStores[{i}]");
            Self::validate_name(&store.name, "cluster store", &prefix, &mut seen, result);

            if store.sources.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.sources"),
                    message: format!("cluster store '{}' must declare at least one source", store.name),
                });
            }

            for (j, source) in store.sources.iter().enumerate() {
                if source.image.trim().is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.sources[{j}].image"),
                        message: String::from("source image cannot be empty"),
                    });
                }
            }
        }
    }

    fn validate_stacks(stacks: &[StackEntry], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, stack) in stacks.iter().enumerate() {
            let prefix = format!("clusterStacks[{i}]");
            Self::validate_name(&stack.name, "cluster stack", &prefix, &mut seen, result);
            Self::warn_default_name(&stack.name, "cluster stack", &prefix, result);

            if stack.build_image.image.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.buildImage.image"),
                    message: format!("cluster stack '{}' is missing a build image", stack.name),
                });
            }

            if stack.run_image.image.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.runImage.image"),
                    message: format!("cluster stack '{}' is missing a run image", stack.name),
                });
            }
        }
    }

    fn validate_builders(
        descriptor: &DependencyDescriptor,
        builders: &[BuilderEntry],
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();

        for (i, builder) in builders.iter().enumerate() {
            let prefix = format!("clusterBuilders[{i}]");
            Self::validate_name(&builder.name, "cluster builder", &prefix, &mut seen, result);
            Self::warn_default_name(&builder.name, "cluster builder", &prefix, result);

            if builder.cluster_stack.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.clusterStack"),
                    message: format!("cluster builder '{}' must reference a stack", builder.name),
                });
            } else if !descriptor
                .cluster_stacks
                .iter()
                .any(|s| s.name == builder.cluster_stack)
            {
                result.warnings.push(format!(
                    "{prefix}.clusterStack: stack '{}' is not declared in the descriptor",
                    builder.cluster_stack
                ));
            }

            if builder.cluster_store.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.clusterStore"),
                    message: format!("cluster builder '{}' must reference a store", builder.name),
                });
            } else if !descriptor
                .cluster_stores
                .iter()
                .any(|s| s.name == builder.cluster_store)
            {
                result.warnings.push(format!(
                    "{prefix}.clusterStore: store '{}' is not declared in the descriptor",
                    builder.cluster_store
                ));
            }

            if builder.order.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.order"),
                    message: format!("cluster builder '{}' must declare an order", builder.name),
                });
            }

            for (j, entry) in builder.order.iter().enumerate() {
                if entry.group.is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.order[{j}].group"),
                        message: String::from("order group cannot be empty"),
                    });
                }
                for (k, buildpack) in entry.group.iter().enumerate() {
                    if buildpack.id.trim().is_empty() {
                        result.errors.push(ValidationError {
                            field: format!("{prefix}.order[{j}].group[{k}].id"),
                            message: String::from("buildpack id cannot be empty"),
                        });
                    }
                }
            }
        }
    }

    /// An entry named `default` is the same object as every default twin.
    fn warn_default_name(name: &str, what: &str, prefix: &str, result: &mut ValidationResult) {
        if name == DEFAULT_NAME {
            result.warnings.push(format!(
                "{prefix}.name: {what} '{DEFAULT_NAME}' is also written by every entry's default"
            ));
        }
    }

    fn validate_name<'a>(
        name: &'a str,
        what: &str,
        prefix: &str,
        seen: &mut HashSet<&'a str>,
        result: &mut ValidationResult,
    ) {
        if name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.name"),
                message: format!("{what} name cannot be empty"),
            });
        } else if !seen.insert(name) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.name"),
                message: format!("duplicate {what} name '{name}'"),
            });
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::schema::{BuildpackRef, ImageSource, OrderEntry};

    fn store(name: &str) -> StoreEntry {
        StoreEntry {
            name: name.to_string(),
            sources: vec![ImageSource {
                image: String::from("registry.io/store-image"),
            }],
        }
    }

    fn stack(name: &str) -> StackEntry {
        StackEntry {
            name: name.to_string(),
            build_image: ImageSource {
                image: String::from("registry.io/build"),
            },
            run_image: ImageSource {
                image: String::from("registry.io/run"),
            },
        }
    }

    fn builder(name: &str, stack: &str, store: &str) -> BuilderEntry {
        BuilderEntry {
            name: name.to_string(),
            tag: None,
            cluster_stack: stack.to_string(),
            cluster_store: store.to_string(),
            order: vec![OrderEntry {
                group: vec![BuildpackRef {
                    id: String::from("buildpack-1"),
                    ..BuildpackRef::default()
                }],
            }],
        }
    }

    #[test]
    fn test_valid_descriptor() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stores.push(store("some-store"));
        doc.cluster_stacks.push(stack("some-stack"));
        doc.cluster_builders.push(builder("some-ccb", "some-stack", "some-store"));

        let result = DescriptorValidator::new().validate(&doc).expect("valid");
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_store_name() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stores.push(store("some-store"));
        doc.cluster_stores.push(store("some-store"));

        let err = DescriptorValidator::new().validate(&doc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid dependency descriptor: clusterStores[1].name: duplicate cluster store name 'some-store'"
        );
    }

    #[test]
    fn test_duplicate_stack_name() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stacks.push(stack("some-stack"));
        doc.cluster_stacks.push(stack("other-stack"));
        doc.cluster_stacks.push(stack("some-stack"));

        let err = DescriptorValidator::new().validate(&doc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid dependency descriptor: clusterStacks[2].name: duplicate cluster stack name 'some-stack'"
        );
    }

    #[test]
    fn test_duplicate_builder_name() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stores.push(store("some-store"));
        doc.cluster_stacks.push(stack("some-stack"));
        doc.cluster_builders.push(builder("some-ccb", "some-stack", "some-store"));
        doc.cluster_builders.push(builder("some-ccb", "some-stack", "some-store"));

        let err = DescriptorValidator::new().validate(&doc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid dependency descriptor: clusterBuilders[1].name: duplicate cluster builder name 'some-ccb'"
        );
    }

    #[test]
    fn test_entries_named_default_are_warnings() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stores.push(store("some-store"));
        doc.cluster_stacks.push(stack("default"));
        doc.cluster_stacks.push(stack("some-stack"));
        doc.cluster_builders.push(builder("default", "default", "some-store"));

        let result = DescriptorValidator::new().validate(&doc).expect("valid");
        assert_eq!(
            result.warnings,
            vec![
                "clusterStacks[0].name: cluster stack 'default' is also written by every entry's default",
                "clusterBuilders[0].name: cluster builder 'default' is also written by every entry's default",
            ]
        );
    }

    #[test]
    fn test_default_named_stack_twice_is_duplicate() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stacks.push(stack("default"));
        doc.cluster_stacks.push(stack("default"));

        let result = DescriptorValidator::new().check(&doc);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "clusterStacks[1].name");
    }

    #[test]
    fn test_same_name_across_kinds_is_allowed() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_stores.push(store("shared"));
        doc.cluster_stacks.push(stack("shared"));

        assert!(DescriptorValidator::new().validate(&doc).is_ok());
    }

    #[test]
    fn test_missing_run_image() {
        let mut doc = DependencyDescriptor::new();
        let mut s = stack("some-stack");
        s.run_image.image.clear();
        doc.cluster_stacks.push(s);

        let result = DescriptorValidator::new().check(&doc);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "clusterStacks[0].runImage.image");
    }

    #[test]
    fn test_builder_missing_fields() {
        let mut doc = DependencyDescriptor::new();
        let mut b = builder("some-ccb", "", "");
        b.order.clear();
        doc.cluster_builders.push(b);

        let fields: Vec<String> = DescriptorValidator::new()
            .check(&doc)
            .errors
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "clusterBuilders[0].clusterStack",
                "clusterBuilders[0].clusterStore",
                "clusterBuilders[0].order",
            ]
        );
    }

    #[test]
    fn test_undeclared_references_are_warnings() {
        let mut doc = DependencyDescriptor::new();
        doc.cluster_builders.push(builder("some-ccb", "elsewhere", "also-elsewhere"));

        let result = DescriptorValidator::new().validate(&doc).expect("valid");
        assert_eq!(result.warnings.len(), 2);
    }
}
