//! Image registry access.
//!
//! This module provides:
//! - The [`Registry`] capability the import depends on
//! - Image reference parsing
//! - An OCI distribution client with docker credential support

mod auth;
mod client;
mod reference;

pub use auth::{Challenge, Credential, CredentialStore};
pub use client::{sha256_digest, RegistryClient, TlsOptions};
pub use reference::{ImageReference, DOCKER_HUB};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;

/// Metadata of an image as stored in a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// Content digest of the manifest (or index).
    pub digest: String,
    /// Config labels of the image.
    pub labels: BTreeMap<String, String>,
}

/// Read and copy access to image registries.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Reads the digest and labels of an image.
    async fn fetch(&self, image: &str) -> Result<ImageInfo>;

    /// Reads only the digest of an image.
    async fn digest(&self, image: &str) -> Result<String> {
        Ok(self.fetch(image).await?.digest)
    }

    /// Copies an image into `destination` and returns the digest-qualified
    /// reference it was written to.
    async fn relocate(&self, image: &str, destination: &str) -> Result<String>;
}
