//! kp CLI entrypoint.
//!
//! This is the main entrypoint for the kp command-line tool.

use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use kp_import::cli::{
    Cli, Commands, ConsoleReporter, ImportArgs, OutputFormat, OutputFormatter, SecretArgs,
    SecretCommands,
};
use kp_import::cluster::KubeCluster;
use kp_import::config::{load_dotenv, EnvOverrides};
use kp_import::descriptor::{DescriptorParser, DescriptorSource};
use kp_import::error::Result;
use kp_import::importer::{ImportOutcome, Importer};
use kp_import::prompt::LinePrompt;
use kp_import::registry::{CredentialStore, RegistryClient};
use kp_import::secret::SecretParams;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system on stderr.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    load_dotenv(None)?;

    match cli.command {
        Commands::Import(args) => cmd_import(args).await,
        Commands::Secret {
            command: SecretCommands::Validate(args),
        } => cmd_secret_validate(args),
    }
}

/// Import dependencies into the cluster.
async fn cmd_import(args: ImportArgs) -> Result<()> {
    let source = DescriptorSource::from_arg(&args.filename);
    let descriptor = DescriptorParser::new().load(&source)?;

    let cluster = KubeCluster::connect(EnvOverrides::from_env()).await?;
    let config = cluster.load_kp_config().await?;
    let registry = RegistryClient::new(&args.tls(), CredentialStore::load_default()?)?;
    let prompt = LinePrompt::stdio();

    let formatter = OutputFormatter::new(args.output)
        .with_color(args.output == OutputFormat::Text && std::io::stdout().is_terminal());
    let mut reporter = ConsoleReporter::new(formatter, std::io::stdout(), std::io::stderr());

    let outcome = Importer::new(&cluster, &registry, &config, &prompt)
        .with_options(args.options())
        .run(&descriptor, &mut reporter)
        .await?;

    match outcome {
        ImportOutcome::Skipped => debug!("Import declined"),
        ImportOutcome::Imported(report) => reporter.report(&report)?,
    }
    Ok(())
}

/// Validate secret parameters.
fn cmd_secret_validate(args: SecretArgs) -> Result<()> {
    let kind = SecretParams::from(args).select()?;
    let text = OutputFormatter::new(OutputFormat::Text).format_secret(&kind)?;

    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
