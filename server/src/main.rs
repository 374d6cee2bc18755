use clap::Parser;
use log::info;
use server::config::{RoomConfig, ServerConfig};
use server::network::Server;
use std::time::Duration;

/// Lockstep relay server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Players required before a match starts
    #[clap(short, long, default_value_t = shared::DEFAULT_ROOM_SIZE)]
    room_size: usize,
    /// Frames broadcast per second
    #[clap(short, long, default_value_t = shared::DEFAULT_TARGET_FPS)]
    target_fps: u32,
    /// Shared secret clients must present
    #[clap(short, long, default_value = shared::DEFAULT_CONNECTION_KEY)]
    key: String,
    /// Keep checksums only for this many frames behind the newest
    #[clap(long)]
    checksum_retention: Option<u64>,
    /// Seconds a new connection has to present its key
    #[clap(long, default_value_t = 5)]
    handshake_timeout: u64,
    /// Exit after the first match instead of opening a new room
    #[clap(long)]
    single_match: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        room: RoomConfig {
            room_size: args.room_size,
            target_fps: args.target_fps,
            connection_key: args.key,
            checksum_retention: args.checksum_retention,
        },
        handshake_timeout: Duration::from_secs(args.handshake_timeout),
        single_match: args.single_match,
    };

    info!(
        "Starting lockstep server: {} players per room at {} fps",
        config.room.room_size, config.room.target_fps
    );

    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
