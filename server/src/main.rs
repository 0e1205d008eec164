use clap::Parser;
use log::info;
use server::network::{Server, DEFAULT_MAX_CLIENTS, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum simultaneous connections, registered or not
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Sleep between loop iterations in milliseconds
    #[arg(short, long, default_value = "4")]
    tick_ms: u64,

    /// Seed for crate layout and bots; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting server on {} (seed {})", address, seed);

    let mut server = Server::bind(&address, args.max_clients, seed)?;
    server
        .run(Duration::from_millis(args.tick_ms.max(1)), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down");
        })
        .await?;

    Ok(())
}
