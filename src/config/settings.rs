//! kp configuration resolution.
//!
//! The canonical repository and service account live in the `kp-config`
//! config map of the `kpack` namespace. Environment variables, optionally
//! loaded from a `.env` file, take precedence over the config map.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cluster::ConfigResolver;
use crate::error::{ConfigError, Result};
use crate::resources::ServiceAccountRef;

/// Namespace of the kp config map.
pub const KP_CONFIG_NAMESPACE: &str = "kpack";

/// Name of the kp config map.
pub const KP_CONFIG_NAME: &str = "kp-config";

/// Config map key of the canonical repository.
pub const CANONICAL_REPOSITORY_KEY: &str = "canonical.repository";

/// Config map key of the canonical service account.
pub const SERVICE_ACCOUNT_KEY: &str = "canonical.repository.serviceaccount";

/// Config map key of the canonical service account namespace.
pub const SERVICE_ACCOUNT_NAMESPACE_KEY: &str = "canonical.repository.serviceaccount.namespace";

/// Service account used when the config map names none.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Environment variable overriding the canonical repository.
pub const ENV_CANONICAL_REPOSITORY: &str = "KP_CANONICAL_REPOSITORY";

/// Environment variable overriding the canonical service account.
pub const ENV_CANONICAL_SERVICE_ACCOUNT: &str = "KP_CANONICAL_SERVICE_ACCOUNT";

/// Environment variable overriding the canonical service account namespace.
pub const ENV_CANONICAL_SERVICE_ACCOUNT_NAMESPACE: &str = "KP_CANONICAL_SERVICE_ACCOUNT_NAMESPACE";

/// Values taken from the environment instead of the config map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Canonical repository override.
    pub repository: Option<String>,
    /// Service account name override.
    pub service_account: Option<String>,
    /// Service account namespace override.
    pub service_account_namespace: Option<String>,
}

impl EnvOverrides {
    /// Reads the overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            repository: read(ENV_CANONICAL_REPOSITORY),
            service_account: read(ENV_CANONICAL_SERVICE_ACCOUNT),
            service_account_namespace: read(ENV_CANONICAL_SERVICE_ACCOUNT_NAMESPACE),
        }
    }
}

/// Resolved kp configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpConfig {
    /// Repository images are relocated into.
    pub canonical_repository: String,
    /// Service account builders push with.
    pub service_account: ServiceAccountRef,
}

impl KpConfig {
    /// Resolves the configuration from config map data and overrides.
    ///
    /// `data` is `None` when the config map does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if no canonical repository is configured.
    pub fn resolve(data: Option<&BTreeMap<String, String>>, overrides: &EnvOverrides) -> Result<Self> {
        let lookup = |key: &str| {
            data.and_then(|d| d.get(key))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        let canonical_repository = match (&overrides.repository, lookup(CANONICAL_REPOSITORY_KEY)) {
            (Some(repository), _) => {
                debug!("Overriding {CANONICAL_REPOSITORY_KEY} from environment");
                repository.clone()
            }
            (None, Some(repository)) => repository,
            (None, None) if data.is_none() => {
                return Err(ConfigError::ConfigMapNotFound {
                    namespace: KP_CONFIG_NAMESPACE,
                    name: KP_CONFIG_NAME,
                }
                .into());
            }
            (None, None) => {
                return Err(ConfigError::MissingKey {
                    what: "canonical repository",
                    key: CANONICAL_REPOSITORY_KEY,
                    namespace: KP_CONFIG_NAMESPACE,
                    name: KP_CONFIG_NAME,
                }
                .into());
            }
        };

        let name = overrides
            .service_account
            .clone()
            .or_else(|| lookup(SERVICE_ACCOUNT_KEY))
            .unwrap_or_else(|| DEFAULT_SERVICE_ACCOUNT.to_string());
        let namespace = overrides
            .service_account_namespace
            .clone()
            .or_else(|| lookup(SERVICE_ACCOUNT_NAMESPACE_KEY))
            .unwrap_or_else(|| KP_CONFIG_NAMESPACE.to_string());

        Ok(Self {
            canonical_repository: canonical_repository.trim_end_matches('/').to_string(),
            service_account: ServiceAccountRef { namespace, name },
        })
    }
}

#[async_trait]
impl ConfigResolver for KpConfig {
    async fn canonical_repository(&self) -> Result<String> {
        Ok(self.canonical_repository.clone())
    }

    async fn canonical_service_account(&self) -> Result<ServiceAccountRef> {
        Ok(self.service_account.clone())
    }
}

/// Loads a `.env` file from `base` (or the current directory) if present.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be loaded.
pub fn load_dotenv(base: Option<&Path>) -> Result<()> {
    let env_path = base.map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

    if env_path.exists() {
        info!("Loading environment from: {}", env_path.display());
        dotenvy::from_path(&env_path).map_err(|e| ConfigError::Load {
            message: format!("failed to load {}: {e}", env_path.display()),
        })?;
    } else {
        debug!(".env file not found at: {}", env_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_from_config_map() {
        let data = data(&[
            (CANONICAL_REPOSITORY_KEY, "new-registry.io/new-project"),
            (SERVICE_ACCOUNT_KEY, "some-serviceaccount"),
        ]);

        let config = KpConfig::resolve(Some(&data), &EnvOverrides::default()).expect("resolve");
        assert_eq!(config.canonical_repository, "new-registry.io/new-project");
        assert_eq!(
            config.service_account,
            ServiceAccountRef {
                namespace: String::from("kpack"),
                name: String::from("some-serviceaccount"),
            }
        );
    }

    #[test]
    fn test_service_account_defaults() {
        let data = data(&[(CANONICAL_REPOSITORY_KEY, "new-registry.io/new-project/")]);
        let config = KpConfig::resolve(Some(&data), &EnvOverrides::default()).expect("resolve");
        assert_eq!(config.canonical_repository, "new-registry.io/new-project");
        assert_eq!(config.service_account.name, DEFAULT_SERVICE_ACCOUNT);
        assert_eq!(config.service_account.namespace, KP_CONFIG_NAMESPACE);
    }

    #[test]
    fn test_overrides_win() {
        let data = data(&[(CANONICAL_REPOSITORY_KEY, "new-registry.io/new-project")]);
        let overrides = EnvOverrides {
            repository: Some(String::from("other-registry.io/other")),
            service_account: Some(String::from("pusher")),
            service_account_namespace: Some(String::from("build")),
        };

        let config = KpConfig::resolve(Some(&data), &overrides).expect("resolve");
        assert_eq!(config.canonical_repository, "other-registry.io/other");
        assert_eq!(config.service_account.name, "pusher");
        assert_eq!(config.service_account.namespace, "build");
    }

    #[test]
    fn test_override_without_config_map() {
        let overrides = EnvOverrides {
            repository: Some(String::from("other-registry.io/other")),
            ..EnvOverrides::default()
        };
        assert!(KpConfig::resolve(None, &overrides).is_ok());
    }

    #[test]
    fn test_missing_repository() {
        let empty = BTreeMap::new();
        let err = KpConfig::resolve(Some(&empty), &EnvOverrides::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to get canonical repository: key 'canonical.repository' not found in config map kpack/kp-config, use \"kp config\" to set it"
        );

        let err = KpConfig::resolve(None, &EnvOverrides::default()).unwrap_err();
        assert_eq!(err.to_string(), "config map kpack/kp-config not found");
    }

    #[test]
    fn test_load_dotenv_missing_file_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_dotenv(Some(dir.path())).is_ok());
    }
}
