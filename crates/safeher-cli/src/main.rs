use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod host;

#[derive(Parser)]
#[command(name = "safeher", version, about = "SafeHer emergency alert CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the shake monitor over replayed accelerometer samples
    Run(commands::run::RunArgs),
    /// Emergency contact management
    Contacts {
        #[command(subcommand)]
        action: commands::contacts::ContactsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Send a message directly, skipping detection and confirmation
    Send(commands::send::SendArgs),
    /// Preview the emergency message
    Compose(commands::compose::ComposeArgs),
    /// Segments queued by the terminal SMS transport
    Outbox {
        #[command(subcommand)]
        action: commands::outbox::OutboxAction,
    },
    /// Past dispatch jobs
    History(commands::history::HistoryArgs),
    /// Check permissions, power settings and contacts
    Doctor,
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_env("SAFEHER_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Contacts { action } => commands::contacts::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Send(args) => commands::send::run(args),
        Commands::Compose(args) => commands::compose::run(args),
        Commands::Outbox { action } => commands::outbox::run(action),
        Commands::History(args) => commands::history::run(args),
        Commands::Doctor => commands::doctor::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
