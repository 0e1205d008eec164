//! # Game Server Library
//!
//! This library provides the authoritative server for the arena bomb game.
//! It owns the one canonical [`shared::Simulation`], feeds it the inputs
//! received from connected clients and streams the resulting state back to
//! every registered player.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server advances the simulation once per loop iteration, but only
//! while at least one human is registered. Bots never run the game alone.
//! Every iteration ends with a `SIMULATION` snapshot to every in-game
//! client; clients overwrite their local copy with it wholesale.
//!
//! ### Client Management
//! Handles the complete lifecycle of a connection:
//! - Accepting sockets up to a fixed connection cap
//! - Name registration, renames and the four-player roster limit
//! - Keepalive windows and pruning of dead or stray connections
//! - Answering stray browser requests with a small HTML page
//!
//! ### Roster Changes
//! Any admission, rename, bot change or departure rebuilds the roster
//! (in-game clients in connection order, then bots), starts a new round and
//! re-sends the full tile grid with `INIT_TILE_DATA`.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Polling Loop
//! All sockets are non-blocking `std::net` sockets polled once per
//! iteration on a single-threaded tokio runtime. A read or write that
//! would block just defers the work to the next iteration, so there is no
//! shared state and no locking.
//!
//! ### Text Protocol over TCP
//! Messages are `TOKEN payload\0` frames from [`shared::protocol`].
//! Snapshot and tile payloads come from [`shared::snapshot`].
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Per-connection state: status, name, receive reassembly, outbound queue
//! and keepalive flags.
//!
//! ### Network Module (`network`)
//! The [`network::Server`] loop: accept, receive, dispatch, simulate,
//! send and prune.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, DEFAULT_TICK};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind("0.0.0.0:3000", 10, 42)?;
//!
//!     server
//!         .run(DEFAULT_TICK, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
