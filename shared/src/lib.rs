//! # Shared Game Core
//!
//! Everything the server and the client must execute identically lives in
//! this crate: the tile grid, the entity records, the deterministic
//! simulation step, the bot controller and the line-delimited text protocol.
//!
//! ## Determinism
//!
//! The server runs the one authoritative [`Simulation`]; clients either
//! mirror it (overwriting their local copy from every `SIMULATION`
//! snapshot) or, while offline, run the very same step function locally.
//! Overwriting from the network is only safe because both sides share this
//! code, so nothing here may depend on wall-clock time, threads or I/O.
//!
//! ## Module Organization
//!
//! - [`grid`]: square tile map with permanent border and pillar walls
//! - [`entity`]: players, bombs, explosion events and input actions
//! - [`simulation`]: input processing, bomb detonation, collisions, rounds
//! - [`bot`]: danger mapping and escape pathfinding for computer players
//! - [`protocol`]: command vocabulary, framing and buffered socket I/O
//! - [`snapshot`]: text layouts for `SIMULATION`, `INIT_TILE_DATA` and
//!   `PLAYER_INPUT` payloads

pub mod bot;
pub mod entity;
pub mod grid;
pub mod math;
pub mod protocol;
pub mod simulation;
pub mod snapshot;

pub use entity::{Action, Bomb, Dir, ExploEvent, ExploKind, Player};
pub use grid::{Grid, Tile};
pub use math::{TilePos, Vec2};
pub use simulation::{SimError, Simulation};

/// Tiles per side. Must be odd so the pillar lattice closes on the border.
pub const MAP_SIZE: usize = 13;
/// Side length of one tile (and of a player's bounding box) in world units.
pub const TILE_SIZE: f32 = 20.0;

pub const PLAYER_SPEED: f32 = 80.0;
pub const HP: i32 = 3;
pub const MAX_PLAYERS: usize = 4;
pub const MAX_BOMBS: usize = 50;

pub const BOMB_TIMER: f32 = 3.0;
pub const BOMB_RANGE: i32 = 2;
/// Fuse left on a bomb caught in another bomb's blast.
pub const CHAIN_TIMER: f32 = 0.1;
pub const DROP_COOLDOWN: f32 = 1.0;
pub const DMG_TIMER: f32 = 1.2;
/// Longest step the simulation will integrate in one call.
pub const MAX_STEP: f32 = 0.033;
pub const ROUND_START_DELAY: f32 = 3.0;
pub const PERMITTED_SLOTS: usize = 2;

/// Name buffer size including the terminator, so 19 visible characters.
pub const NAME_BUF_SIZE: usize = 20;

pub const BOT_SCAN_PERIOD: f32 = 0.6;
pub const BOT_STEP_PERIOD: f32 = 0.2;
pub const BOT_WANDER_PERIOD: f32 = 0.5;
pub const BOT_DROP_PERIOD: f32 = 5.0;
pub const BOT_HOP_BUDGET: u32 = 5;
