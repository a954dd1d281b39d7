//! Dependency descriptor module.
//!
//! This module handles everything about the input document:
//! - Decoding the `apiVersion` envelope and dispatching on schema version
//! - Upgrading legacy schema versions to the current one
//! - Structural validation before any cluster access

mod legacy;
mod parser;
mod schema;
mod validator;

pub use legacy::{BuilderEntryV1Alpha1, DescriptorV1Alpha1};
pub use parser::{DescriptorParser, DescriptorSource};
pub use schema::{
    ApiVersion, BuilderEntry, BuildpackRef, DependencyDescriptor, ImageSource, OrderEntry,
    StackEntry, StoreEntry, VersionedDescriptor,
};
pub use validator::{DescriptorValidator, ValidationResult};
