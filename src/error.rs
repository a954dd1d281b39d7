//! Error types for the kp import tool.
//!
//! This module provides the error hierarchy for every stage of an import:
//! reading the descriptor, talking to the cluster and the registry, resolving
//! the kp configuration, and validating secret parameters.

use std::path::PathBuf;
use thiserror::Error;

use crate::resources::ResourceKind;

/// The main error type for the kp import tool.
#[derive(Debug, Error)]
pub enum KpError {
    /// Dependency descriptor errors.
    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    /// Cluster access errors.
    #[error("{0}")]
    Cluster(#[from] ClusterError),

    /// Registry errors.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// kp configuration errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Secret parameter errors.
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while reading, decoding or validating a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The descriptor file could not be read.
    #[error("failed to read dependency descriptor {path}: {source}")]
    Read {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The descriptor is not valid YAML for the selected schema.
    #[error("failed to parse dependency descriptor: {message}")]
    Parse {
        /// Decoder message.
        message: String,
    },

    /// The `apiVersion` is not one this tool understands.
    #[error("did not find expected apiVersion, must be one of: {}", .accepted.join(", "))]
    UnknownApiVersion {
        /// The version found in the document (empty when absent).
        found: String,
        /// Versions accepted by the parser.
        accepted: Vec<&'static str>,
    },

    /// Structural validation failed.
    #[error("invalid dependency descriptor: {field}: {message}")]
    Validation {
        /// Path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors raised by a cluster accessor.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The requested object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing object.
        kind: ResourceKind,
        /// Name of the missing object.
        name: String,
    },

    /// Could not build a client for the cluster.
    #[error("failed to connect to cluster: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A read or write against the API server failed.
    #[error("{operation} {kind} '{name}' failed: {message}")]
    Api {
        /// Operation that failed (get, create, update).
        operation: &'static str,
        /// Kind of the object.
        kind: ResourceKind,
        /// Name of the object.
        name: String,
        /// Server or transport message.
        message: String,
    },

    /// An object could not be converted to or from its wire form.
    #[error("failed to convert {kind} '{name}': {message}")]
    Conversion {
        /// Kind of the object.
        kind: ResourceKind,
        /// Name of the object.
        name: String,
        /// Serializer message.
        message: String,
    },
}

/// Errors raised while reading from or writing to an image registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The image reference could not be parsed.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference {
        /// The offending reference.
        reference: String,
        /// Why it is invalid.
        reason: String,
    },

    /// Transport failure talking to the registry.
    #[error("network error talking to {registry}: {message}")]
    Network {
        /// Registry host.
        registry: String,
        /// Description of the failure.
        message: String,
    },

    /// The registry rejected our credentials.
    #[error("authentication to {registry} failed: {message}")]
    Unauthorized {
        /// Registry host.
        registry: String,
        /// Description of the failure.
        message: String,
    },

    /// The registry answered with an unexpected status.
    #[error("registry request {url} failed: {status} {message}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// A manifest or config blob could not be decoded.
    #[error("invalid manifest for '{reference}': {message}")]
    Manifest {
        /// Image the manifest belongs to.
        reference: String,
        /// Decoder message.
        message: String,
    },

    /// Content did not hash to the digest it was addressed by.
    #[error("digest mismatch for {reference}: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Blob or manifest reference.
        reference: String,
        /// Digest we asked for.
        expected: String,
        /// Digest of the bytes received.
        actual: String,
    },

    /// An image lacks a label the import depends on.
    #[error("image '{image}' is missing label '{label}'")]
    MissingLabel {
        /// Image reference.
        image: String,
        /// Label key.
        label: String,
    },

    /// Build and run images disagree on the stack id.
    #[error("build image stack id '{build}' does not match run image stack id '{run}'")]
    StackMismatch {
        /// Stack id of the build image.
        build: String,
        /// Stack id of the run image.
        run: String,
    },

    /// TLS configuration could not be loaded.
    #[error("invalid registry TLS configuration: {message}")]
    Tls {
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised while resolving the kp configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is missing from the kp config map.
    #[error(
        "failed to get {what}: key '{key}' not found in config map {namespace}/{name}, \
         use \"kp config\" to set it"
    )]
    MissingKey {
        /// Human name of the setting.
        what: &'static str,
        /// Config map key.
        key: &'static str,
        /// Config map namespace.
        namespace: &'static str,
        /// Config map name.
        name: &'static str,
    },

    /// The kp config map does not exist.
    #[error("config map {namespace}/{name} not found")]
    ConfigMapNotFound {
        /// Config map namespace.
        namespace: &'static str,
        /// Config map name.
        name: &'static str,
    },

    /// Reading the config map or the .env file failed.
    #[error("failed to load configuration: {message}")]
    Load {
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised by secret kind selection.
///
/// The messages are part of the CLI contract and are compared verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    /// Zero or more than one secret kind was requested.
    #[error("secret must be one of dockerhub, gcr, registry, or git")]
    KindRequired,

    /// Parameters belonging to another kind were supplied.
    #[error("extraneous parameters: {}", .0.join(", "))]
    Extraneous(Vec<&'static str>),

    /// A parameter required by the selected kind is absent.
    #[error("missing parameter {0}")]
    Missing(&'static str),

    /// Both git authentication modes were supplied.
    #[error("must provide one of git-user or git-ssh-key")]
    AmbiguousGitAuth,
}

/// Result type alias for kp import operations.
pub type Result<T> = std::result::Result<T, KpError>;

impl KpError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this is the cluster's not-found condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Cluster(ClusterError::NotFound { .. }))
    }

    /// Returns true if a transport retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::Network { .. }))
    }
}

impl DescriptorError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a parse error from any decoder error.
    #[must_use]
    pub fn parse(err: impl std::fmt::Display) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

impl RegistryError {
    /// Creates a network error.
    #[must_use]
    pub fn network(registry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Creates a manifest decoding error.
    #[must_use]
    pub fn manifest(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Manifest {
            reference: reference.into(),
            message: message.into(),
        }
    }
}
