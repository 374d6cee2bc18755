use clap::Parser;
use client::network::{BotOptions, LockstepClient};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless lockstep bot", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:9050")]
    server: String,

    /// Shared connection key
    #[arg(short = 'k', long, default_value = shared::DEFAULT_CONNECTION_KEY)]
    key: String,

    /// Send a random input every N frames (0 disables)
    #[arg(short = 'i', long, default_value = "5")]
    input_every: u64,

    /// Report a checksum every N frames (0 disables)
    #[arg(short = 'c', long, default_value = "10")]
    checksum_every: u64,

    /// Largest random input in bytes
    #[arg(long, default_value = "8")]
    max_input_len: usize,

    /// Leave the match after this many frames
    #[arg(short = 'f', long)]
    frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let mut client = LockstepClient::connect(&args.server, &args.key).await?;
    info!("Waiting for the room to fill...");

    let options = BotOptions {
        input_every: args.input_every,
        checksum_every: args.checksum_every,
        max_input_len: args.max_input_len,
        max_frames: args.frames,
    };
    let report = client.run_bot(&options).await?;
    client.close().await?;

    info!(
        "Played {} frames as player {}: sent {} inputs, received {}, final checksum {}",
        report.frames,
        report.start.player_id,
        report.inputs_sent,
        report.inputs_received,
        report.final_checksum
    );

    Ok(())
}
