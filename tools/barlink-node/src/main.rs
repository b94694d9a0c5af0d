// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Barlink node
//!
//! Join-code tooling and an in-process mesh simulation:
//! - generate a join code and its room key
//! - derive the room key of a typed code or an invite URL
//! - run a waiter and bartenders on a simulated mesh, optionally cutting one
//!   device off to watch expiry and self-healing
//!
//! # Usage
//!
//! ```bash
//! # Fresh code, remembered for the next start
//! barlink-node code --name Ana --save session.json
//!
//! # Room key of an invite link
//! barlink-node room "https://bar.example/?join=hx4k9p"
//!
//! # Three devices, five orders, bartender 1 drops off mid-run
//! barlink-node --heartbeat-ms 500 simulate --devices 3 --orders 5 --mute bar-1
//! ```

use barlink::{
    JoinCode, MemoryMesh, MeshConfig, MeshSession, OrderItem, Payment, Role, SessionEvent,
    SessionIdentity, SessionStore, Station, StationMode, StatusEvent,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Barlink node - mesh session tooling and simulation
#[derive(Parser, Debug)]
#[command(name = "barlink-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mesh configuration file (JSON format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Heartbeat interval in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    heartbeat_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a fresh join code
    Code {
        /// Worker name stored with the session
        #[arg(short, long, default_value = "Host")]
        name: String,

        /// Save the host identity to this file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// Print the room key for a code or invite URL
    Room {
        /// Code as typed, or a URL carrying `?join=<code>`
        input: String,
    },

    /// Show or forget a saved session
    Session {
        /// Session file
        #[arg(short, long, default_value = "session.json")]
        store: PathBuf,

        /// Delete the saved session
        #[arg(long)]
        forget: bool,
    },

    /// Write the default mesh configuration
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "mesh.json")]
        output: PathBuf,
    },

    /// Run a simulated bar on an in-process mesh
    Simulate {
        /// Devices in the room (1 runs a single solo station)
        #[arg(short, long, default_value = "3")]
        devices: usize,

        /// Orders the waiter sends
        #[arg(short, long, default_value = "3")]
        orders: usize,

        /// Device to cut off silently once the orders are out
        #[arg(long)]
        mute: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = load_config(args.config.as_ref(), args.heartbeat_ms)?;

    match args.command {
        Commands::Code { name, save } => cmd_code(&name, save),
        Commands::Room { input } => cmd_room(&input),
        Commands::Session { store, forget } => cmd_session(store, forget),
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Simulate {
            devices,
            orders,
            mute,
        } => {
            tokio::select! {
                result = cmd_simulate(config, devices, orders, mute) => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    Ok(())
                }
            }
        }
    }
}

fn load_config(
    path: Option<&PathBuf>,
    heartbeat_ms: Option<u64>,
) -> Result<MeshConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => {
            info!("Loading config from {:?}", path);
            MeshConfig::from_file(path)?
        }
        None => MeshConfig::default(),
    };
    if let Some(ms) = heartbeat_ms {
        config.heartbeat_interval_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_code(name: &str, save: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let identity = SessionIdentity::host(name);
    println!("Join code: {}", identity.session_code);
    println!("Room key:  {}", identity.room_id);
    if let Some(path) = save {
        SessionStore::new(&path).save(&identity)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn cmd_room(input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let code = JoinCode::parse(input)?;
    println!("Join code: {}", code);
    println!("Room key:  {}", code.room_key());
    Ok(())
}

fn cmd_session(store: PathBuf, forget: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(store);
    if forget {
        store.clear()?;
        println!("Session forgotten");
        return Ok(());
    }
    match store.load()? {
        Some(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
        None => println!("No saved session in {}", store.path().display()),
    }
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    MeshConfig::default().to_file(&output)?;
    println!("Configuration written to {}", output.display());
    Ok(())
}

async fn cmd_simulate(
    config: MeshConfig,
    devices: usize,
    orders: usize,
    mute: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = MemoryMesh::new();
    let host = SessionIdentity::host("waiter").with_role(Role::Waiter);
    let code = host.session_code.clone();
    let beat = config.heartbeat_interval();

    info!("+----------------------------------------------------+");
    info!("|  Barlink simulation                                |");
    info!("+----------------------------------------------------+");
    info!("|  Code:      {:38} |", code);
    info!("|  Room:      {:38} |", host.room_id);
    info!("|  Devices:   {:38} |", devices.max(1));
    info!("|  Heartbeat: {:38} |", format!("{}ms", config.heartbeat_interval_ms));
    info!("+----------------------------------------------------+");

    let solo = devices <= 1;
    let mode = if solo {
        StationMode::Solo
    } else {
        StationMode::Mesh
    };

    let waiter = launch(&mesh, &config, host, mode)?;
    spawn_status_log("waiter", waiter.handle().subscribe());

    let mut bartenders = Vec::new();
    for i in 1..devices {
        let name = format!("bar-{}", i);
        let identity = SessionIdentity::join(code.clone(), &name).with_role(Role::Bartender);
        let station = launch(&mesh, &config, identity, StationMode::Mesh)?;
        spawn_status_log(&name, station.handle().subscribe());
        bartenders.push(station);
    }

    tokio::time::sleep(config.announce_delay() + beat).await;

    for table in 1..=orders as i64 {
        let items = vec![
            OrderItem::new("spritz", "Spritz", table as u32, "table"),
            OrderItem::new("water", "Water", 1, "bar").with_payment(Payment::Card),
        ];
        waiter.send_order(table, items).await?;
        tokio::time::sleep(beat / 4).await;
    }
    info!("Pending after orders: {:?}", waiter.pending_tables());

    if let Some(device) = mute.as_deref() {
        warn!("Cutting {} off the mesh", device);
        mesh.set_muted(device, true);
        // expiry, debounce, rejoin and announce
        tokio::time::sleep(config.peer_timeout() + beat * 2 + config.reconnect_debounce()).await;
        mesh.set_muted(device, false);
        info!("{} back on the mesh", device);
        tokio::time::sleep(config.reconnect_debounce() + config.announce_delay() + beat).await;
    }

    let completer = bartenders.first().unwrap_or(&waiter);
    for card in completer.queue().into_iter().rev() {
        completer.complete_order(card.table_id).await?;
        tokio::time::sleep(beat / 4).await;
    }
    tokio::time::sleep(beat).await;

    let stats = waiter.handle().stats().await?;
    let mesh_stats = mesh.stats();
    println!();
    println!("Simulation summary");
    println!("==================");
    println!("Waiter peers:     {}", stats.peers);
    println!("Waiter reconnects: {}", stats.reconnects);
    println!("Pending tables:   {:?}", waiter.pending_tables());
    for station in &bartenders {
        println!(
            "{:16}  queue {} cards, knows {} peers",
            station.identity().worker_name,
            station.queue().len(),
            station.peers().len()
        );
    }
    println!(
        "Mesh frames:      {} delivered, {} dropped, {} send failures",
        mesh_stats.frames_delivered, mesh_stats.frames_dropped, mesh_stats.send_failures
    );

    for station in bartenders {
        station.stop().await?;
    }
    waiter.stop().await?;
    Ok(())
}

fn launch(
    mesh: &MemoryMesh,
    config: &MeshConfig,
    identity: SessionIdentity,
    mode: StationMode,
) -> Result<Station, Box<dyn std::error::Error>> {
    let device = identity.worker_name.clone();
    let session = MeshSession::create(
        config.clone(),
        mesh.endpoint(device),
        identity.room_id.clone(),
    )?;
    Ok(Station::launch(session, identity, mode))
}

fn spawn_status_log(name: &str, mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    let name = name.to_string();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Status(StatusEvent::Error { cause }) => {
                    warn!("[{}] error: {}", name, cause)
                }
                SessionEvent::Status(status) => info!("[{}] {:?}", name, status),
                SessionEvent::Data(inbound) => {
                    info!("[{}] data from {}: {}", name, inbound.from, inbound.payload)
                }
            }
        }
    });
}
