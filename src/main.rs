//! mcp-sandbox - command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_sandbox::{
    commands::{self, CreateArgs},
    output, Config, ConfigError,
};

#[derive(Parser, Debug)]
#[command(name = "mcp-sandbox")]
#[command(about = "E2B cloud sandbox with an MCP gateway and the GitHub Copilot CLI")]
#[command(version)]
struct Cli {
    /// Config file path (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new sandbox with the MCP gateway and Copilot CLI
    Create(CreateArgs),
    /// List active sandboxes
    List,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "mcp_sandbox=info,warn",
        _ => "mcp_sandbox=debug,info",
    };

    // Logs go to stderr so they never interleave with the report on stdout.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn report_error(err: &anyhow::Error, context: &str) {
    if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        eprintln!(
            "{}",
            output::error_lines(&config_err.to_string(), &config_err.hints())
        );
    } else {
        eprintln!("❌ {context}: {err:#}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    println!("{}", output::banner());

    let Some(command) = cli.command else {
        println!("{}", output::usage());
        return ExitCode::FAILURE;
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", output::error_lines(&e.to_string(), &e.hints()));
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "configuration loaded");

    let result = match &command {
        Command::Create(args) => commands::create::run(&config, args)
            .await
            .map_err(|e| (e, "Error creating sandbox")),
        Command::List => commands::list::run(&config).map_err(|e| (e, "Error listing sandboxes")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err((err, context)) => {
            report_error(&err, context);
            ExitCode::FAILURE
        }
    }
}
