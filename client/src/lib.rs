//! # Game Client Library
//!
//! Client side of the tile arena: a connection state machine that talks to
//! the server, a game driver that mirrors the server's simulation (or runs
//! its own while offline), a text input layer and persisted settings.
//!
//! ## Architecture Overview
//!
//! ### Snapshot Mirroring
//! While registered with a server the client never simulates on its own.
//! Every `SIMULATION` message overwrites players, bombs and the round
//! countdown wholesale; explosion events carried in the snapshot patch the
//! local grid and are handed on to the presentation layer. `INIT_TILE_DATA`
//! replaces the grid and wins over any patch from the same batch.
//!
//! ### Offline Fallback
//! Until the server accepts our name, and after the connection drops, the
//! client runs the same [`shared::Simulation`] locally with up to two bots,
//! so playing alone behaves exactly like playing on a server.
//!
//! ### Connection Upkeep
//! The connection is re-established on a fixed interval, checked with
//! `PING`/`PONG` once per alive window, and registration is retried until
//! the server answers `NAME_OK`.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - Non-blocking TCP connect over every resolved address
//! - Receive buffering, frame reassembly and snapshot decoding
//! - Keepalive, reconnect and registration timers
//!
//! ### Game Module (`game`)
//! - Online/offline mode switching
//! - Applying snapshots and tile data in arrival order
//! - Stepping the local simulation and bots while offline
//!
//! ### Input Module (`input`)
//! - Parsing typed lines into movement and chat commands
//! - Edge-triggered bomb drops and change-driven input sends
//!
//! ### Config Module (`config`)
//! - `name.txt` / `host.txt` persistence
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::game::ClientGame;
//! use client::input::Command;
//! use client::network::{NetClient, TcpConnector};
//!
//! let net = NetClient::new(TcpConnector::default(), "localhost", 3000, "alice");
//! let mut game = ClientGame::new(net, 1, 42);
//!
//! loop {
//!     if let Ok(Some(cmd)) = Command::parse("d") {
//!         game.handle_command(&cmd);
//!     }
//!     for event in game.update(0.016) {
//!         println!("{:?}", event);
//!     }
//! #   break;
//! }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
