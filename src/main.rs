//! Bingo room server binary

use bingo_rooms::{
    api::ApiServer,
    config::{BingoConfig, ConfigLoader},
    room::{RoomConfig, RoomOrchestrator, UserProfile},
    store::{DurableStore, MemoryDurableStore, MemoryEphemeralStore, RoomStore},
    BroadcastHub,
};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info};

/// Bingo room orchestrator
#[derive(Parser)]
#[command(name = "bingo-rooms")]
#[command(about = "Realtime bingo rooms with server-driven countdowns and draws")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP/WebSocket API
    Serve {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Create a demo room with house players on start-up
        #[arg(long)]
        seed_demo: bool,
    },

    /// Write the default configuration as TOML
    InitConfig {
        #[arg(default_value = "bingo.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "bingo_rooms=debug,tower_http=debug"
    } else {
        "bingo_rooms=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            seed_demo,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, seed_demo).await
        }
        Commands::InitConfig { path } => {
            ConfigLoader::save(&config, &path.to_string_lossy())?;
            info!(path = %path.display(), "configuration written");
            Ok(())
        }
    }
}

async fn serve(config: BingoConfig, seed_demo: bool) -> Result<(), Box<dyn std::error::Error>> {
    let durable = Arc::new(MemoryDurableStore::new());
    let ephemeral = Arc::new(MemoryEphemeralStore::new());
    let store = RoomStore::new(durable.clone(), ephemeral.clone(), config.ttl.clone());

    // Either store being unreachable is fatal.
    if let Err(e) = store.ping().await {
        error!(error = %e, "store unreachable at start-up");
        return Err(e.into());
    }
    let _sweeper = ephemeral.start_sweeper(Duration::from_secs(60));

    if seed_demo {
        seed_demo_room(&store, &durable).await?;
    }

    let hub = BroadcastHub::default();
    let orchestrator = RoomOrchestrator::new(config.clone(), store, Arc::new(hub.clone()));

    info!(
        countdown_ms = config.timing.countdown_ms,
        draw_interval_ms = config.timing.draw_interval_ms,
        auto_start = config.auto_start_countdown,
        "room orchestrator ready"
    );

    ApiServer::new(config.server.clone(), orchestrator.clone(), hub)
        .run()
        .await
}

async fn seed_demo_room(
    store: &RoomStore,
    durable: &MemoryDurableStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::from_entropy();
    let room = RoomConfig::generated("demo", "Demo Room", 100, 30, &mut rng);
    store.durable().save_room_config(room).await?;

    for i in 1..=5 {
        let mut profile = UserProfile::new(&format!("house-{}", i))
            .with_balance(1_000_000)
            .demo();
        profile.username = format!("House {}", i);
        durable.upsert_user(profile);
    }

    info!(room_id = "demo", cards = 30, "demo room seeded");
    Ok(())
}
