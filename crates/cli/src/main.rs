//! hintloop CLI: the main entry point.
//!
//! Commands:
//! - `run`: Run the agent on one message, or interactively
//! - `query`: Ask the knowledge base a question
//! - `serve`: Start the HTTP gateway
//! - `config`: Show, locate, validate or initialize the configuration
//! - `tools`: List the tools the agent can call

use clap::{Parser, Subcommand};
use hintloop_core::trigger::EventType;

mod commands;

#[derive(Parser)]
#[command(
    name = "hintloop",
    about = "hintloop: tool-calling LLM agent loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// How the message is framed for the agent
        #[arg(long, default_value = "web_message")]
        event_type: EventType,
    },

    /// Ask the knowledge base a question
    Query {
        question: String,

        /// One retrieval and one completion instead of the agent loop
        #[arg(long)]
        non_agentic: bool,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List available tools
    Tools,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Check the configuration for errors
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run {
            message,
            event_type,
        } => commands::run::run(message, event_type).await?,
        Commands::Query {
            question,
            non_agentic,
        } => commands::query::run(question, non_agentic).await?,
        Commands::Serve { port } => commands::gateway::run(port).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Init => commands::config_cmd::init()?,
        },
        Commands::Tools => commands::tools::run().await?,
    }

    Ok(())
}
