use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use notemem::{cli, config, server};

#[derive(Parser)]
#[command(name = "notemem", version, about = "Namespace-scoped note memory MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport to serve on (defaults to transport_defaults.default_transport)
        #[arg(long, value_enum)]
        transport: Option<Transport>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Semantic search over a project's notes
    Search {
        /// Search query
        query: String,
        /// Project path
        #[arg(long, default_value = ".")]
        project: String,
        /// Restrict to one group
        #[arg(long)]
        group: Option<String>,
        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration and namespace
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::AppConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.transport_defaults.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = match transport {
                Some(t) => t,
                None => match config.transport_defaults.default_transport.as_str() {
                    "stdio" => Transport::Stdio,
                    "http" => Transport::Http,
                    other => bail!("unsupported transport {other:?} (supported: stdio, http)"),
                },
            };
            match transport {
                Transport::Stdio => server::serve_stdio(config).await?,
                Transport::Http => server::serve_http(config).await?,
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => cli::show_config(&config)?,
        },
        Command::Search {
            query,
            project,
            group,
            top_k,
        } => {
            cli::search(config, &project, group, top_k, &query).await?;
        }
    }

    Ok(())
}
