// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(dead_code)]                   // Unused code is reported
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # kp import
//!
//! Reconciles a kpack dependency descriptor against a cluster.
//!
//! ## Overview
//!
//! A dependency descriptor declares the cluster stores, stacks and builders a
//! kpack installation should have. An import:
//!
//! - Parses the descriptor, upgrading legacy schema versions
//! - Resolves image digests and relocates images into the canonical repository
//! - Shows a per-kind diff against the live cluster and asks for confirmation
//! - Creates or updates only the objects whose spec changed
//!
//! Every declared stack and builder is also reconciled under the name
//! `default`.
//!
//! ## Modules
//!
//! - [`descriptor`]: Descriptor parsing, migration and validation
//! - [`resources`]: Cluster object model and desired-state builders
//! - [`planner`]: Registry resolution, default expansion and diffs
//! - [`importer`]: The import run itself
//! - [`cluster`]: Cluster access backed by `kube`
//! - [`registry`]: OCI registry access
//! - [`config`]: kp configuration and environment overrides
//! - [`prompt`]: Confirmation prompt
//! - [`secret`]: Secret kind selection
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: kp.kpack.io/v1alpha2
//! clusterStores:
//!   - name: default
//!     sources:
//!       - image: gcr.io/paketo-buildpacks/java
//! clusterStacks:
//!   - name: base
//!     buildImage:
//!       image: paketobuildpacks/build:base-cnb
//!     runImage:
//!       image: paketobuildpacks/run:base-cnb
//! clusterBuilders:
//!   - name: base
//!     clusterStack: base
//!     clusterStore: default
//!     order:
//!       - group:
//!           - id: paketo-buildpacks/java
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cluster;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod importer;
pub mod planner;
pub mod prompt;
pub mod registry;
pub mod resources;
pub mod secret;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cluster::{ClusterAccessor, ConfigResolver, KubeCluster, ResourceClient};
pub use config::KpConfig;
pub use descriptor::{DependencyDescriptor, DescriptorParser, DescriptorSource};
pub use error::{KpError, Result};
pub use importer::{ImportOptions, ImportOutcome, ImportReport, Importer, RunMode};
pub use planner::{DiffEngine, Preview};
pub use prompt::{Confirm, LinePrompt};
pub use registry::{Registry, RegistryClient};
pub use secret::{SecretKind, SecretParams};
