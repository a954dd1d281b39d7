//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::importer::{ImportOptions, RunMode};
use crate::registry::TlsOptions;
use crate::secret::SecretParams;

/// kp - kpack dependency management.
#[derive(Parser, Debug)]
#[command(name = "kp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import dependencies (stores, stacks, and cluster builders).
    Import(ImportArgs),

    /// Secret commands.
    Secret {
        /// Secret subcommand.
        #[command(subcommand)]
        command: SecretCommands,
    },
}

/// Arguments of `kp import`.
#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Dependency descriptor filename, or "-" for stdin.
    #[arg(short, long)]
    pub filename: String,

    /// Import without confirmation.
    #[arg(long)]
    pub force: bool,

    /// Perform validation with no side effects; no objects are sent to the cluster.
    #[arg(long, conflicts_with = "dry_run_with_image_upload")]
    pub dry_run: bool,

    /// Like --dry-run, but image uploads are performed.
    #[arg(long)]
    pub dry_run_with_image_upload: bool,

    /// Print the written objects in the given format.
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Additional CA certificate for the registry.
    #[arg(long, env = "KP_REGISTRY_CA_CERT_PATH")]
    pub registry_ca_cert_path: Option<PathBuf>,

    /// Verify the registry's certificate chain and host name.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub registry_verify_certs: bool,
}

/// Secret subcommands.
#[derive(Subcommand, Debug)]
pub enum SecretCommands {
    /// Check which kind of secret the given parameters describe.
    Validate(SecretArgs),
}

/// Credential parameters of a secret.
#[derive(clap::Args, Debug, Default)]
pub struct SecretArgs {
    /// Docker Hub id.
    #[arg(long)]
    pub dockerhub: Option<String>,

    /// Path to a GCR service account file.
    #[arg(long)]
    pub gcr: Option<String>,

    /// Registry host.
    #[arg(long)]
    pub registry: Option<String>,

    /// Registry user.
    #[arg(long)]
    pub registry_user: Option<String>,

    /// Git url.
    #[arg(long)]
    pub git: Option<String>,

    /// Git user.
    #[arg(long)]
    pub git_user: Option<String>,

    /// Path to a git ssh key.
    #[arg(long)]
    pub git_ssh_key: Option<String>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress lines and a summary table.
    #[default]
    Text,
    /// Written objects as YAML documents.
    Yaml,
    /// Written objects as a JSON array.
    Json,
}

impl ImportArgs {
    /// Returns the import options selected by the flags.
    #[must_use]
    pub const fn options(&self) -> ImportOptions {
        let mode = if self.dry_run {
            RunMode::DryRun
        } else if self.dry_run_with_image_upload {
            RunMode::DryRunWithImageUpload
        } else {
            RunMode::Apply
        };
        ImportOptions {
            force: self.force,
            mode,
        }
    }

    /// Returns the registry TLS options selected by the flags.
    #[must_use]
    pub fn tls(&self) -> TlsOptions {
        TlsOptions {
            ca_cert_path: self.registry_ca_cert_path.clone(),
            verify_certs: self.registry_verify_certs,
        }
    }
}

impl From<SecretArgs> for SecretParams {
    fn from(args: SecretArgs) -> Self {
        Self {
            dockerhub: args.dockerhub,
            gcr: args.gcr,
            registry: args.registry,
            registry_user: args.registry_user,
            git: args.git,
            git_user: args.git_user,
            git_ssh_key: args.git_ssh_key,
        }
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
