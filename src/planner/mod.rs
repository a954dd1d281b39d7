//! Planning module for import operations.
//!
//! This module handles the comparison between current and desired cluster
//! objects:
//! - Registry resolution of digests and stack ids
//! - Expansion of stacks and builders into named and default targets
//! - Per-object diffs grouped into the import preview

mod diff;
mod preview;
mod resolve;
mod targets;

pub use diff::{DiffEngine, DiffType, ResourceDiff};
pub use preview::{build_plan, ImportPlan, Preview, Section, NO_CHANGES};
pub use resolve::{resolve_stack, resolve_store, ResolvedSource, Resolutions, StackResolution};
pub use targets::{expand_defaults, NamedEntry, Target};
