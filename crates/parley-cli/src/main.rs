use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_cli::cli::{run_command, CliCommand, CliConfig};
use parley_cli::tracing_setup::init_tracing;
use parley_core::models::Role;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Buyer/seller chat from the command line")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short, global = true)]
    pretty: bool,

    /// Path to JSON config file (defaults to <config dir>/parley/config.json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Address of the logged-in user
    #[arg(long, global = true)]
    email: Option<String>,

    /// buyer or seller
    #[arg(long, global = true)]
    role: Option<Role>,

    /// Base URL of the message service
    #[arg(long, global = true)]
    service_url: Option<String>,

    /// host:port of the push channel
    #[arg(long, global = true)]
    push_address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations with unread counts
    Inbox,

    /// Show the messages exchanged with a peer (marks them read)
    History {
        peer: String,
    },

    /// Send a text message
    Send {
        peer: String,
        text: String,
    },

    /// Upload and send an image
    SendImage {
        peer: String,
        file: PathBuf,
    },

    /// Mark a conversation as read
    Read {
        peer: String,
    },

    /// Delete a conversation
    Delete {
        peer: String,
    },

    /// Stay connected and print badge changes and notices
    Watch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("Warning: {:#}", e);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let command = match cli.command {
        Commands::Inbox => CliCommand::Inbox,
        Commands::History { peer } => CliCommand::History { peer },
        Commands::Send { peer, text } => CliCommand::Send { peer, text },
        Commands::SendImage { peer, file } => CliCommand::SendImage { peer, file },
        Commands::Read { peer } => CliCommand::Read { peer },
        Commands::Delete { peer } => CliCommand::Delete { peer },
        Commands::Watch => CliCommand::Watch,
    };

    if let Err(e) = run_command(command, config, cli.pretty).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Priority: flags > --config file > default config file
fn load_config(cli: &Cli) -> anyhow::Result<parley_core::CoreConfig> {
    let file = match cli.config {
        Some(ref path) => CliConfig::load(path)?,
        None => CliConfig::load_default()?,
    };
    let flags = CliConfig {
        email: cli.email.clone(),
        role: cli.role,
        service_url: cli.service_url.clone(),
        push_address: cli.push_address.clone(),
        ..Default::default()
    };
    file.merge(flags).into_core()
}
