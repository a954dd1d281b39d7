//! Image reference parsing.
//!
//! References follow the docker conventions: a first path component that
//! looks like a host (contains `.` or `:`, or is `localhost`) names the
//! registry, otherwise Docker Hub is implied.

use crate::error::{RegistryError, Result};

/// Registry host assumed when a reference names none.
pub const DOCKER_HUB: &str = "index.docker.io";

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, with port if any.
    pub registry: String,
    /// Repository path within the registry.
    pub repository: String,
    /// Tag, if the reference carries one.
    pub tag: Option<String>,
    /// Digest, if the reference carries one.
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parses an image reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is empty or malformed.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty").into());
        }

        let (rest, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("digest must be of the form algorithm:hex").into());
                }
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&rest[..split], Some(rest[split + 1..].to_string()))
            }
            None => (rest, None),
        };

        if tag.as_deref() == Some("") {
            return Err(invalid("tag is empty").into());
        }

        let (registry, repository) = match name.split_once('/') {
            Some((host, path)) if Self::looks_like_host(host) => {
                (host.to_string(), path.to_string())
            }
            Some(_) => (DOCKER_HUB.to_string(), name.to_string()),
            None => (DOCKER_HUB.to_string(), format!("library/{name}")),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("repository path has an empty component").into());
        }

        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository must be lowercase").into());
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    fn looks_like_host(component: &str) -> bool {
        component.contains('.') || component.contains(':') || component == "localhost"
    }

    /// Returns the last segment of the repository path.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(self.repository.as_str())
    }

    /// Returns `registry/repository` without tag or digest.
    #[must_use]
    pub fn context(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Returns the digest if present, else the tag, else `latest`.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or("latest")
    }

    /// Returns true if the registry is reached over plain HTTP.
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        let host = self
            .registry
            .rsplit_once(':')
            .map_or(self.registry.as_str(), |(host, _)| host);
        host == "localhost" || host == "127.0.0.1"
    }

    /// Returns the base URL of the registry API.
    #[must_use]
    pub fn registry_url(&self) -> String {
        let scheme = if self.is_insecure() { "http" } else { "https" };
        let host = if self.registry == DOCKER_HUB {
            "registry-1.docker.io"
        } else {
            self.registry.as_str()
        };
        format!("{scheme}://{host}")
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = crate::error::KpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reference() {
        let r = ImageReference::parse("some-registry.io/some-project/store-image:1.0").expect("parse");
        assert_eq!(r.registry, "some-registry.io");
        assert_eq!(r.repository, "some-project/store-image");
        assert_eq!(r.tag.as_deref(), Some("1.0"));
        assert_eq!(r.digest, None);
        assert_eq!(r.basename(), "store-image");
        assert_eq!(r.identifier(), "1.0");
    }

    #[test]
    fn test_parse_digest_and_port() {
        let r = ImageReference::parse("localhost:5000/build@sha256:abc").expect("parse");
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "build");
        assert_eq!(r.digest.as_deref(), Some("sha256:abc"));
        assert!(r.is_insecure());
        assert_eq!(r.registry_url(), "http://localhost:5000");
        assert_eq!(r.to_string(), "localhost:5000/build@sha256:abc");
    }

    #[test]
    fn test_parse_docker_hub_shorthand() {
        let r = ImageReference::parse("paketobuildpacks/builder").expect("parse");
        assert_eq!(r.registry, DOCKER_HUB);
        assert_eq!(r.repository, "paketobuildpacks/builder");
        assert_eq!(r.identifier(), "latest");
        assert_eq!(r.registry_url(), "https://registry-1.docker.io");

        let r = ImageReference::parse("ubuntu").expect("parse");
        assert_eq!(r.repository, "library/ubuntu");
    }

    #[test]
    fn test_invalid_references() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("registry.io/Upper").is_err());
        assert!(ImageReference::parse("registry.io/repo:").is_err());
        assert!(ImageReference::parse("registry.io/repo@nodigest").is_err());
        assert!(ImageReference::parse("registry.io//repo").is_err());
    }
}
