//! vsctl CLI
//!
//! Main entry point for the vsctl command-line tool.
//! Operates hosted vector stores: validate a credential, list indexes,
//! query them and overwrite their contents from spreadsheets.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    ConvertCommand, ListCommand, OverwriteCommand, QueryCommand, SessionCommand, UploadCommand,
    ValidateCommand,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Instrument;
use vsctl_core::{config::AppConfig, logging, AppError, AppResult};

/// vsctl - operator client for hosted vector stores
#[derive(Parser, Debug)]
#[command(name = "vsctl")]
#[command(about = "Operator client for hosted vector stores", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "VSCTL_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "VSCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Vendor binding (openai, memory)
    #[arg(short, long, global = true, env = "VSCTL_PROVIDER")]
    provider: Option<String>,

    /// Vendor base URL
    #[arg(long, global = true, env = "VSCTL_ENDPOINT")]
    endpoint: Option<String>,

    /// Assistant model identifier
    #[arg(short, long, global = true, env = "VSCTL_MODEL")]
    model: Option<String>,

    /// API key (prompted for when absent)
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the API key is accepted
    Validate(ValidateCommand),

    /// List indexes visible to the API key
    List(ListCommand),

    /// Ask a question against one index
    Query(QueryCommand),

    /// Replace an index's contents with spreadsheet rows (destructive)
    Overwrite(OverwriteCommand),

    /// Upload spreadsheet rows into an existing index
    Upload(UploadCommand),

    /// Print the JSON-lines payload of a spreadsheet
    Convert(ConvertCommand),

    /// Interactive session with a cached assistant
    Session(SessionCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Cancelled) => {
            eprintln!("Cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Defaults, config file and environment, then CLI overrides
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.endpoint,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;
    config.validate()?;

    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {} at {}", config.provider, config.endpoint);
    tracing::debug!("Model: {}", config.assistant.model);

    let command_name = match &cli.command {
        Commands::Validate(_) => "validate",
        Commands::List(_) => "list",
        Commands::Query(_) => "query",
        Commands::Overwrite(_) => "overwrite",
        Commands::Upload(_) => "upload",
        Commands::Convert(_) => "convert",
        Commands::Session(_) => "session",
    };
    let span = tracing::info_span!("command", name = command_name);

    let command = cli.command;
    let api_key = cli.api_key;
    let result = async {
        let api_key = api_key.as_deref();
        match command {
            // the session handles Ctrl-C per command itself
            Commands::Session(cmd) => cmd.execute(&config, api_key).await,
            Commands::Validate(cmd) => commands::cancellable(cmd.execute(&config, api_key)).await,
            Commands::List(cmd) => commands::cancellable(cmd.execute(&config, api_key)).await,
            Commands::Query(cmd) => commands::cancellable(cmd.execute(&config, api_key)).await,
            Commands::Overwrite(cmd) => commands::cancellable(cmd.execute(&config, api_key)).await,
            Commands::Upload(cmd) => commands::cancellable(cmd.execute(&config, api_key)).await,
            Commands::Convert(cmd) => cmd.execute(),
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(()) => tracing::debug!("Command completed successfully"),
        Err(e) => tracing::debug!("Command failed: {}", e),
    }

    result
}
