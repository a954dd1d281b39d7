//! kp configuration module.
//!
//! This module handles:
//! - Reading the canonical repository and service account settings
//! - Environment overrides and `.env` loading

mod settings;

pub use settings::{
    load_dotenv, EnvOverrides, KpConfig, CANONICAL_REPOSITORY_KEY, DEFAULT_SERVICE_ACCOUNT,
    ENV_CANONICAL_REPOSITORY, ENV_CANONICAL_SERVICE_ACCOUNT,
    ENV_CANONICAL_SERVICE_ACCOUNT_NAMESPACE, KP_CONFIG_NAME, KP_CONFIG_NAMESPACE,
    SERVICE_ACCOUNT_KEY, SERVICE_ACCOUNT_NAMESPACE_KEY,
};
