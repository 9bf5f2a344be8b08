pub mod commands;

use std::io;
use std::process::ExitCode;

use boulanger_core::config::AppConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "boulanger",
    about = "Boulanger order assistant CLI",
    long_about = "Chat with the order assistant from a terminal, apply migrations and inspect configuration.",
    after_help = "Examples:\n  boulanger chat\n  boulanger chat --conversation kitchen-1 --ephemeral\n  boulanger doctor --json\n  boulanger config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Hold an order conversation on stdin/stdout")]
    Chat {
        #[arg(long, help = "Resume or name a specific conversation")]
        conversation: Option<String>,
        #[arg(long, help = "Keep conversation state and orders in memory only")]
        ephemeral: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, language service readiness and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { conversation, ephemeral } => {
            let options = commands::chat::ChatOptions { conversation_id: conversation, ephemeral };
            let stdin = io::stdin();
            commands::chat::run(options, &mut stdin.lock(), &mut io::stdout())
        }
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::CommandResult::plain(commands::config::run()),
        Command::Doctor { json } => commands::CommandResult::plain(commands::doctor::run(json)),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so they never interleave with chat output.
pub(crate) fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}
