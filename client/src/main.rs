use clap::Parser;
use client::config::Settings;
use client::game::{ClientGame, GameEvent};
use client::input::Command;
use client::network::{NetClient, TcpConnector};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host; overrides the saved one for this session
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Display name; overrides the saved one for this session
    #[arg(short, long)]
    name: Option<String>,

    /// Bots to add while playing offline (0-2)
    #[arg(short, long, default_value = "0")]
    bots: usize,

    /// Directory holding name.txt and host.txt
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Seed for the offline simulation; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

const FRAME: Duration = Duration::from_millis(16);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut settings = Settings::load(&args.data_dir)?;

    let host = args.host.unwrap_or_else(|| settings.host.clone());
    let name = args.name.unwrap_or_else(|| settings.name.clone());
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting client as {} for {}:{}", name, host, args.port);
    info!("Controls: w/a/s/d to move, x to stop, b to drop a bomb");
    info!("Commands: /name, /host, /chat, /addbot, /removebot, /quit");

    let net = NetClient::new(TcpConnector::default(), &host, args.port, &name);
    let mut game = ClientGame::new(net, args.bots, seed);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => {
                        info!("Input closed, exiting");
                        break;
                    }
                };

                let cmd = match Command::parse(&line) {
                    Ok(Some(cmd)) => cmd,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("{}", e);
                        continue;
                    }
                };

                match &cmd {
                    Command::Quit => break,
                    Command::SetName(name) => {
                        if let Err(e) = settings.set_name(name) {
                            error!("{}", e);
                        }
                    }
                    Command::SetHost(host) => {
                        if let Err(e) = settings.set_host(host) {
                            error!("{}", e);
                        }
                    }
                    _ => {}
                }

                for event in game.handle_command(&cmd) {
                    report(&event);
                }
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;

                for event in game.update(dt) {
                    report(&event);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn report(event: &GameEvent) {
    match event {
        GameEvent::Chat(text) => println!("{}", text),
        GameEvent::Status(text) => info!("{}", text),
        GameEvent::Explosion(explosion) => {
            debug!("{:?} at ({}, {})", explosion.kind, explosion.tile.x, explosion.tile.y)
        }
    }
}
