//! Secret kind selection.
//!
//! A secret is created from exactly one of four kinds of credential. This
//! module picks the kind from the supplied parameters and rejects mixed or
//! incomplete combinations.

use serde::Serialize;

use crate::error::SecretError;

/// Parameter names as they appear on the command line.
pub mod params {
    /// Docker Hub id.
    pub const DOCKERHUB: &str = "dockerhub";
    /// GCR service account file.
    pub const GCR: &str = "gcr";
    /// Registry host.
    pub const REGISTRY: &str = "registry";
    /// Registry user.
    pub const REGISTRY_USER: &str = "registry-user";
    /// Git url.
    pub const GIT: &str = "git";
    /// Git basic auth user.
    pub const GIT_USER: &str = "git-user";
    /// Git ssh key file.
    pub const GIT_SSH_KEY: &str = "git-ssh-key";
}

/// Optional credential parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretParams {
    /// Docker Hub id.
    pub dockerhub: Option<String>,
    /// Path to a GCR service account file.
    pub gcr: Option<String>,
    /// Registry host.
    pub registry: Option<String>,
    /// Registry user.
    pub registry_user: Option<String>,
    /// Git url.
    pub git: Option<String>,
    /// Git basic auth user.
    pub git_user: Option<String>,
    /// Path to a git ssh key.
    pub git_ssh_key: Option<String>,
}

/// The credential kind a secret is made from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SecretKind {
    /// Docker Hub credentials.
    DockerHub {
        /// Docker Hub id.
        id: String,
    },
    /// GCR service account credentials.
    Gcr {
        /// Service account file.
        service_account_file: String,
    },
    /// Generic registry credentials.
    Registry {
        /// Registry host.
        registry: String,
        /// Registry user.
        user: String,
    },
    /// Git credentials with user and password.
    GitBasicAuth {
        /// Git url.
        url: String,
        /// Git user.
        user: String,
    },
    /// Git credentials with an ssh key.
    GitSsh {
        /// Git url.
        url: String,
        /// Ssh key file.
        key_file: String,
    },
}

impl SecretKind {
    /// Short name of the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DockerHub { .. } => "dockerhub",
            Self::Gcr { .. } => "gcr",
            Self::Registry { .. } => "registry",
            Self::GitBasicAuth { .. } => "git basic auth",
            Self::GitSsh { .. } => "git ssh",
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SecretParams {
    /// Sub-parameters supplied that belong to a kind other than `kind`,
    /// sorted by name.
    fn extraneous(&self, kind: &str) -> Vec<&'static str> {
        let owned = [
            (params::REGISTRY, params::REGISTRY_USER, self.registry_user.is_some()),
            (params::GIT, params::GIT_USER, self.git_user.is_some()),
            (params::GIT, params::GIT_SSH_KEY, self.git_ssh_key.is_some()),
        ];

        let mut names: Vec<&'static str> = owned
            .into_iter()
            .filter(|(owner, _, set)| *set && *owner != kind)
            .map(|(_, name, _)| name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Selects the secret kind.
    ///
    /// # Errors
    ///
    /// Returns an error if zero or several kinds are requested, if other
    /// kinds' parameters are mixed in, or if a required parameter of the
    /// selected kind is missing.
    pub fn select(&self) -> Result<SecretKind, SecretError> {
        let indicators = [
            (params::DOCKERHUB, &self.dockerhub),
            (params::GCR, &self.gcr),
            (params::REGISTRY, &self.registry),
            (params::GIT, &self.git),
        ];

        let mut set = indicators.iter().filter(|(_, value)| value.is_some());
        let (kind, value) = match (set.next(), set.next()) {
            (Some((kind, Some(value))), None) => (*kind, value.clone()),
            _ => return Err(SecretError::KindRequired),
        };

        let extraneous = self.extraneous(kind);
        if !extraneous.is_empty() {
            return Err(SecretError::Extraneous(extraneous));
        }

        match kind {
            params::DOCKERHUB => Ok(SecretKind::DockerHub { id: value }),
            params::GCR => Ok(SecretKind::Gcr {
                service_account_file: value,
            }),
            params::REGISTRY => {
                let user = self
                    .registry_user
                    .clone()
                    .ok_or(SecretError::Missing(params::REGISTRY_USER))?;
                Ok(SecretKind::Registry {
                    registry: value,
                    user,
                })
            }
            _ => match (&self.git_user, &self.git_ssh_key) {
                (Some(user), None) => Ok(SecretKind::GitBasicAuth {
                    url: value,
                    user: user.clone(),
                }),
                (None, Some(key_file)) => Ok(SecretKind::GitSsh {
                    url: value,
                    key_file: key_file.clone(),
                }),
                (Some(_), Some(_)) => Err(SecretError::AmbiguousGitAuth),
                (None, None) => Err(SecretError::Missing("git-user or git-ssh-key")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn test_no_kind() {
        let err = SecretParams::default().select().unwrap_err();
        assert_eq!(err.to_string(), "secret must be one of dockerhub, gcr, registry, or git");
    }

    #[test]
    fn test_too_many_kinds() {
        let params = SecretParams {
            dockerhub: some("some-dockerhub-id"),
            gcr: some("some-gcr-service-account"),
            ..SecretParams::default()
        };
        assert_eq!(params.select(), Err(SecretError::KindRequired));
    }

    #[test]
    fn test_extraneous_with_dockerhub() {
        let params = SecretParams {
            dockerhub: some("some-dockerhub-id"),
            registry_user: some("some-reg-user"),
            git_user: some("some-git-user"),
            ..SecretParams::default()
        };
        let err = params.select().unwrap_err();
        assert_eq!(err.to_string(), "extraneous parameters: git-user, registry-user");
    }

    #[test]
    fn test_extraneous_with_gcr() {
        let params = SecretParams {
            gcr: some("some-gcr-service-account-file"),
            registry_user: some("some-reg-user"),
            git_ssh_key: some("some-git-ssh-key-file"),
            ..SecretParams::default()
        };
        let err = params.select().unwrap_err();
        assert_eq!(err.to_string(), "extraneous parameters: git-ssh-key, registry-user");
    }

    #[test]
    fn test_registry_requires_user() {
        let params = SecretParams {
            registry: some("some-registry"),
            ..SecretParams::default()
        };
        let err = params.select().unwrap_err();
        assert_eq!(err.to_string(), "missing parameter registry-user");
    }

    #[test]
    fn test_extraneous_with_registry() {
        let params = SecretParams {
            registry: some("some-registry"),
            registry_user: some("some-reg-user"),
            git_user: some("some-git-user"),
            ..SecretParams::default()
        };
        let err = params.select().unwrap_err();
        assert_eq!(err.to_string(), "extraneous parameters: git-user");
    }

    #[test]
    fn test_extraneous_with_git() {
        let params = SecretParams {
            git: some("some-git"),
            registry_user: some("some-reg-user"),
            git_user: some("some-git-user"),
            ..SecretParams::default()
        };
        let err = params.select().unwrap_err();
        assert_eq!(err.to_string(), "extraneous parameters: registry-user");
    }

    #[test]
    fn test_git_auth_modes() {
        let neither = SecretParams {
            git: some("some-git"),
            ..SecretParams::default()
        };
        assert_eq!(
            neither.select().unwrap_err().to_string(),
            "missing parameter git-user or git-ssh-key"
        );

        let both = SecretParams {
            git: some("some-git"),
            git_user: some("some-git-user"),
            git_ssh_key: some("some-ssh-key"),
            ..SecretParams::default()
        };
        assert_eq!(
            both.select().unwrap_err().to_string(),
            "must provide one of git-user or git-ssh-key"
        );
    }

    #[test]
    fn test_valid_selections() {
        let registry = SecretParams {
            registry: some("some-registry"),
            registry_user: some("some-reg-user"),
            ..SecretParams::default()
        };
        assert_eq!(
            registry.select(),
            Ok(SecretKind::Registry {
                registry: String::from("some-registry"),
                user: String::from("some-reg-user"),
            })
        );

        let ssh = SecretParams {
            git: some("git@github.com:org/repo.git"),
            git_ssh_key: some("/keys/id_rsa"),
            ..SecretParams::default()
        };
        let kind = ssh.select().expect("select");
        assert_eq!(kind.name(), "git ssh");
    }
}
