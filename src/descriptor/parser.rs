//! Dependency descriptor parser.
//!
//! Decoding happens in two passes: a minimal envelope is read first to learn
//! the `apiVersion`, then the full document is decoded against the schema for
//! that version and upgraded to the current one.

use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{DescriptorError, Result};

use super::legacy::DescriptorV1Alpha1;
use super::schema::{ApiVersion, DependencyDescriptor, VersionedDescriptor};
use super::validator::DescriptorValidator;

/// Where the descriptor is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// A file on disk.
    Path(PathBuf),
    /// Standard input, selected with `-`.
    Stdin,
}

impl DescriptorSource {
    /// Interprets a `-f` argument.
    #[must_use]
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::Path(PathBuf::from(arg))
        }
    }
}

impl std::fmt::Display for DescriptorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// Envelope decoded before dispatching on the schema version.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    api_version: String,
}

/// Parser turning raw bytes into a validated, current-schema descriptor.
#[derive(Debug, Default)]
pub struct DescriptorParser {
    validator: DescriptorValidator,
}

impl DescriptorParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            validator: DescriptorValidator::new(),
        }
    }

    /// Reads and parses a descriptor from its source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the document is
    /// invalid.
    pub fn load(&self, source: &DescriptorSource) -> Result<DependencyDescriptor> {
        info!("Loading dependency descriptor from: {source}");

        let bytes = match source {
            DescriptorSource::Path(path) => Self::read_file(path)?,
            DescriptorSource::Stdin => {
                let mut buf = Vec::new();
                std::io::stdin().lock().read_to_end(&mut buf)?;
                buf
            }
        };

        self.parse_bytes(&bytes)
    }

    /// Reads a descriptor from any reader.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the document is invalid.
    pub fn load_reader(&self, mut reader: impl Read) -> Result<DependencyDescriptor> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.parse_bytes(&buf)
    }

    /// Parses and validates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML, an unknown `apiVersion`, or a
    /// structurally invalid document.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<DependencyDescriptor> {
        let versioned = Self::decode(bytes)?;
        let version = versioned.version();
        let descriptor = versioned.into_current();

        if version != ApiVersion::CURRENT {
            debug!("Upgraded descriptor from {version} to {}", ApiVersion::CURRENT);
        }

        let result = self.validator.validate(&descriptor)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        debug!(
            "Parsed descriptor: {} stores, {} stacks, {} builders",
            descriptor.cluster_stores.len(),
            descriptor.cluster_stacks.len(),
            descriptor.cluster_builders.len()
        );
        Ok(descriptor)
    }

    /// Decodes a document against the schema its `apiVersion` names.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML or an unknown `apiVersion`.
    pub fn decode(bytes: &[u8]) -> Result<VersionedDescriptor> {
        let envelope: Envelope = serde_yaml::from_slice(bytes).map_err(DescriptorError::parse)?;

        let Some(version) = ApiVersion::from_tag(&envelope.api_version) else {
            return Err(DescriptorError::UnknownApiVersion {
                found: envelope.api_version,
                accepted: ApiVersion::accepted_tags(),
            }
            .into());
        };

        let versioned = match version {
            ApiVersion::V1Alpha1 => VersionedDescriptor::V1Alpha1(
                serde_yaml::from_slice::<DescriptorV1Alpha1>(bytes)
                    .map_err(DescriptorError::parse)?,
            ),
            ApiVersion::V1Alpha2 => VersionedDescriptor::V1Alpha2(
                serde_yaml::from_slice::<DependencyDescriptor>(bytes)
                    .map_err(DescriptorError::parse)?,
            ),
        };

        Ok(versioned)
    }

    fn read_file(path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|source| {
            DescriptorError::Read {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KpError;
    use std::io::Write;

    const LEGACY: &str = r"
apiVersion: kp.kpack.io/v1alpha1
stores:
- name: some-store
  sources:
  - image: some-registry.io/some-project/store-image
stacks:
- name: some-stack
  buildImage:
    image: some-registry.io/some-project/build-image
  runImage:
    image: some-registry.io/some-project/run-image
clusterBuilders:
- name: some-ccb
  stack: some-stack
  store: some-store
  order:
  - group:
    - id: buildpack-1
";

    const CURRENT: &str = r"
apiVersion: kp.kpack.io/v1alpha2
clusterStores:
- name: some-store
  sources:
  - image: some-registry.io/some-project/store-image
clusterStacks:
- name: some-stack
  buildImage:
    image: some-registry.io/some-project/build-image
  runImage:
    image: some-registry.io/some-project/run-image
clusterBuilders:
- name: some-ccb
  clusterStack: some-stack
  clusterStore: some-store
  order:
  - group:
    - id: buildpack-1
";

    #[test]
    fn test_legacy_and_current_parse_equal() {
        let parser = DescriptorParser::new();
        let legacy = parser.parse_bytes(LEGACY.as_bytes()).expect("legacy");
        let current = parser.parse_bytes(CURRENT.as_bytes()).expect("current");
        assert_eq!(legacy, current);
        assert_eq!(current.api_version, "kp.kpack.io/v1alpha2");
        assert_eq!(current.cluster_builders[0].cluster_stack, "some-stack");
    }

    #[test]
    fn test_decode_keeps_version() {
        let decoded = DescriptorParser::decode(LEGACY.as_bytes()).expect("decode");
        assert_eq!(decoded.version(), ApiVersion::V1Alpha1);

        let upgraded = decoded.upgrade();
        assert_eq!(upgraded.version(), ApiVersion::V1Alpha2);
        assert_eq!(upgraded.clone().upgrade(), upgraded);
    }

    #[test]
    fn test_unknown_api_version() {
        let err = DescriptorParser::new()
            .parse_bytes(b"apiVersion: kp.kpack.io/v9\n")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "did not find expected apiVersion, must be one of: kp.kpack.io/v1alpha1, kp.kpack.io/v1alpha2"
        );
    }

    #[test]
    fn test_missing_api_version() {
        let err = DescriptorParser::new()
            .parse_bytes(b"clusterStores: []\n")
            .unwrap_err();
        assert!(matches!(
            err,
            KpError::Descriptor(DescriptorError::UnknownApiVersion { ref found, .. }) if found.is_empty()
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = DescriptorParser::new()
            .parse_bytes(b"apiVersion: [unterminated\n")
            .unwrap_err();
        assert!(matches!(err, KpError::Descriptor(DescriptorError::Parse { .. })));
    }

    #[test]
    fn test_validation_runs_after_upgrade() {
        let doc = "apiVersion: kp.kpack.io/v1alpha1\nstores:\n- name: some-store\n  sources: []\n";
        let err = DescriptorParser::new().parse_bytes(doc.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid dependency descriptor: clusterStores[0].sources: cluster store 'some-store' must declare at least one source"
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(CURRENT.as_bytes()).expect("write");

        let source = DescriptorSource::from_arg(&file.path().display().to_string());
        let descriptor = DescriptorParser::new().load(&source).expect("load");
        assert_eq!(descriptor.cluster_stores[0].name, "some-store");
    }

    #[test]
    fn test_load_missing_file() {
        let source = DescriptorSource::Path(PathBuf::from("/nonexistent/descriptor.yaml"));
        let err = DescriptorParser::new().load(&source).unwrap_err();
        assert!(matches!(err, KpError::Descriptor(DescriptorError::Read { .. })));
    }

    #[test]
    fn test_load_reader() {
        let descriptor = DescriptorParser::new()
            .load_reader(LEGACY.as_bytes())
            .expect("reader");
        assert_eq!(descriptor.cluster_stacks[0].name, "some-stack");
    }

    #[test]
    fn test_source_from_dash() {
        assert_eq!(DescriptorSource::from_arg("-"), DescriptorSource::Stdin);
        assert_eq!(
            DescriptorSource::from_arg("deps.yaml"),
            DescriptorSource::Path(PathBuf::from("deps.yaml"))
        );
    }
}
