//! Registry credentials and authentication challenges.
//!
//! Credentials come from the docker `config.json` (`$DOCKER_CONFIG` or
//! `~/.docker`). Registries that answer `401` with a `Bearer` challenge are
//! asked for a token with those credentials.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::reference::DOCKER_HUB;

/// Key docker uses for Docker Hub credentials.
const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

/// Credentials for one registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// No credentials.
    #[default]
    Anonymous,
    /// Username and password (or token).
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Credentials loaded from a docker config file, keyed by registry host.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: HashMap<String, Credential>,
}

impl CredentialStore {
    /// Loads the default docker config, or an empty store if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => {
                debug!("No docker config found, using anonymous registry access");
                Ok(Self::default())
            }
        }
    }

    fn default_path() -> Option<PathBuf> {
        std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .map(|dir| dir.join("config.json"))
    }

    /// Loads credentials from a docker config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("Loading registry credentials from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a docker config document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or an `auth` entry is invalid.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: DockerConfigFile = serde_json::from_str(content).map_err(|e| ConfigError::Load {
            message: format!("invalid docker config: {e}"),
        })?;

        let mut credentials = HashMap::new();
        for (key, entry) in file.auths {
            let credential = Self::decode_entry(&key, entry)?;
            credentials.insert(normalize_registry(&key), credential);
        }

        Ok(Self { credentials })
    }

    fn decode_entry(key: &str, entry: DockerAuthEntry) -> Result<Credential> {
        if let (Some(username), Some(password)) = (entry.username, entry.password) {
            return Ok(Credential::Basic { username, password });
        }

        let Some(auth) = entry.auth.filter(|a| !a.is_empty()) else {
            return Ok(Credential::Anonymous);
        };

        let invalid = |reason: &str| ConfigError::Load {
            message: format!("invalid auth entry for {key}: {reason}"),
        };

        let decoded = STANDARD
            .decode(auth.trim())
            .map_err(|e| invalid(&e.to_string()))?;
        let decoded = String::from_utf8(decoded).map_err(|e| invalid(&e.to_string()))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| invalid("expected username:password"))?;

        Ok(Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Adds or replaces the credential for a registry.
    pub fn insert(&mut self, registry: &str, credential: Credential) {
        self.credentials.insert(normalize_registry(registry), credential);
    }

    /// Returns the credential for a registry host.
    #[must_use]
    pub fn credential_for(&self, registry: &str) -> Credential {
        self.credentials
            .get(&normalize_registry(registry))
            .cloned()
            .unwrap_or_default()
    }
}

/// Maps the various spellings of a registry to its host.
fn normalize_registry(registry: &str) -> String {
    if registry == DOCKER_HUB_AUTH_KEY {
        return DOCKER_HUB.to_string();
    }

    let host = registry
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or(host);

    match host {
        "docker.io" | "registry-1.docker.io" => DOCKER_HUB.to_string(),
        other => other.to_string(),
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// HTTP basic authentication.
    Basic,
    /// Token authentication against a separate realm.
    Bearer {
        /// Token endpoint.
        realm: String,
        /// Service name to request a token for.
        service: Option<String>,
        /// Scope suggested by the registry.
        scope: Option<String>,
    },
}

impl Challenge {
    /// Parses a `WWW-Authenticate` header value.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params = parse_params(params);
        Some(Self::Bearer {
            realm: params.get("realm")?.clone(),
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        })
    }
}

/// Splits `key="value",key2="value2"` pairs, honouring commas inside quotes.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };

        params.insert(key, value.to_string());
        rest = remainder.trim_start_matches(',').trim();
    }

    params
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token.or(self.access_token)
    }
}
