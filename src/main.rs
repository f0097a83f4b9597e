//! Slotkeeper CLI - keeps slot registrations for one multiworld room.
//!
//! This is the main binary entry point. See the `slotkeeper` library for the
//! core functionality.

use anyhow::{Context, Result};
use mimalloc::MiMalloc;
use slotkeeper::{
    commands::{self, CommandContext},
    config::DEFAULT_CONFIG_PATH,
    ClientSettings, Config, GameCatalog, LogContext, ProtocolClient, RegistrationStore,
    RoomLocator, SlotDirectory,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI
#[derive(Parser)]
#[command(name = "slotkeeper")]
#[command(version = VERSION)]
#[command(about = "Tracks a multiworld room and keeps per-user slot registrations")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the room and read `<user-id> <command>` lines from stdin
    Run,
    /// Validate the configuration and print it
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => {
            let _log_guard = slotkeeper::logging::init(&config.logging, &config.room_id)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run(config))?;
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let root = LogContext::new("slotkeeper");
    log::info!(
        target: root.target(),
        "Slotkeeper v{} starting for room {} as slot '{}'",
        VERSION,
        config.room_id,
        config.slot_name
    );

    let store = RegistrationStore::open(&config.data_dir, &config.room_id, root.child("store"))
        .context("Failed to open registration store")?;

    let settings = ClientSettings::new(&config.game, &config.slot_name)
        .with_catalog(config.fetch_catalog)
        .with_handshake_timeout(config.handshake_timeout());
    let client = Arc::new(ProtocolClient::new(
        settings,
        root.child(&format!("client[{}]", config.slot_name)),
    ));

    let directory = Arc::new(SlotDirectory::new(root.child("directory")));
    directory.attach(&client);
    let catalog = Arc::new(GameCatalog::new(root.child("catalog")));
    catalog.attach(&client);

    let locator = RoomLocator::new(&config.web_base_url, root.child("web"))?;
    let ctx = CommandContext::new(
        store,
        Arc::clone(&directory),
        Arc::clone(&client),
        locator,
        config.room_id.clone(),
        root.child("commands"),
    );

    // Start offline if the room is unreachable; `refresh` retries.
    match ctx.refresh().await {
        Ok(room) => log::info!(target: root.target(), "Connected to {}", room.server_url),
        Err(e) => log::error!(target: root.target(), "Initial connection failed: {:#}", e),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!(target: root.target(), "Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                println!("{}", handle_line(&ctx, &line).await);
            }
        }
    }

    client.disconnect().await;
    log::info!(target: root.target(), "Slotkeeper stopped");
    Ok(())
}

/// Split `<user-id> <command...>` and run the command.
async fn handle_line(ctx: &CommandContext, line: &str) -> String {
    let Some((user, command)) = line.trim().split_once(char::is_whitespace) else {
        return "Expected `<user-id> <command>`".to_string();
    };
    match user.parse() {
        Ok(user) => commands::execute(ctx, user, command).await.to_string(),
        Err(_) => format!("Invalid user id `{user}`"),
    }
}
