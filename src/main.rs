use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, ItemCommand, ListCommand, ShareCommand};
use listsync::config::Config;
use listsync::{ListManager, SqliteStore};

#[derive(Parser)]
#[command(name = "listsync")]
#[command(version)]
#[command(about = "Offline-first shopping lists", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage shopping lists
    List(ListCommand),

    /// Manage the items of a list
    Item(ItemCommand),

    /// Manage who a list is shared with
    Share(ShareCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "listsync=debug"
    } else {
        "listsync=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::List(cmd)) => {
            let manager = open_manager(&config).await?;
            cmd.run(&manager).await?;
        }
        Some(Commands::Item(cmd)) => {
            let manager = open_manager(&config).await?;
            cmd.run(&manager).await?;
        }
        Some(Commands::Share(cmd)) => {
            let manager = open_manager(&config).await?;
            cmd.run(&manager).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// The CLI works on the local store only; changes are pushed by whichever
/// client next syncs this database.
async fn open_manager(config: &Config) -> Result<ListManager, Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.database_path.value).await?;
    let mut builder = ListManager::builder(Arc::new(store))
        .intervals(config.sync.intervals())
        .poll_rate(config.sync.poll_rate.value);
    if let Some(user) = config.user() {
        builder = builder.user(user);
    }
    Ok(builder.build().await?)
}
