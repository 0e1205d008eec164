//! Text payloads for `SIMULATION`, `INIT_TILE_DATA` and `PLAYER_INPUT`.
//!
//! Layouts are positional and whitespace separated. Decoding validates
//! every count, enum, tile coordinate and index before building anything,
//! so a malformed frame is rejected as a whole and the caller's state is
//! never half-updated.

use std::fmt::Write as _;
use std::str::{FromStr, SplitAsciiWhitespace};

use crate::entity::{Action, Bomb, Dir, ExploEvent, ExploKind, Player};
use crate::grid::{Grid, Tile};
use crate::math::{TilePos, Vec2};
use crate::protocol::is_valid_name;
use crate::simulation::Simulation;
use crate::{BOMB_RANGE, HP, MAP_SIZE, MAX_BOMBS, MAX_PLAYERS, PERMITTED_SLOTS};

/// Upper bound on events one step can produce: every bomb going off with
/// all five arms fully open.
pub const MAX_EVENTS: usize = MAX_BOMBS * (1 + 4 * BOMB_RANGE as usize);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has unparsable value {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("unexpected trailing data {0:?}")]
    TrailingData(String),
    #[error("tile data has {found} tiles, expected {expected}")]
    TileCount { expected: usize, found: usize },
    #[error("tile data clears permanent wall at ({0}, {1})")]
    WallMismatch(usize, usize),
}

/// Decoded `SIMULATION` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub time_to_start: f32,
    pub players: Vec<Player>,
    pub bombs: Vec<Bomb>,
    pub events: Vec<ExploEvent>,
}

pub fn encode_simulation(sim: &Simulation, events: &[ExploEvent]) -> String {
    let mut out = String::with_capacity(128 + 64 * sim.players.len() + 32 * sim.bombs.len());

    // writing into a String cannot fail
    let _ = writeln!(out, "{:.6} {}", sim.time_to_start, sim.players.len());
    for p in &sim.players {
        let _ = writeln!(
            out,
            "{:.6} {:.6} {:.6} {} {:.6} {} {} {} {:.6} {}",
            p.pos.x,
            p.pos.y,
            p.vel,
            p.dir.index(),
            p.drop_cooldown,
            p.hp,
            p.score,
            p.name,
            p.dmg_timer,
            p.prev_dir.index()
        );
    }

    let _ = writeln!(out, "{}", sim.bombs.len());
    for b in &sim.bombs {
        let _ = write!(out, "{} {} {} {:.6}", b.tile.x, b.tile.y, b.range, b.timer);
        for slot in b.permitted {
            let _ = write!(out, " {}", slot.map_or(-1, |s| s as i64));
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{}", events.len());
    for e in events {
        let _ = writeln!(out, "{} {} {}", e.tile.x, e.tile.y, e.kind.index());
    }

    out
}

pub fn decode_simulation(payload: &str) -> Result<Snapshot, SnapshotError> {
    let mut fields = Fields::new(payload);

    let time_to_start = fields.finite("timeToStart")?;
    let num_players = fields.count("numPlayers", MAX_PLAYERS)?;

    let mut players = Vec::with_capacity(num_players);
    for _ in 0..num_players {
        let pos = Vec2::new(fields.finite("pos.x")?, fields.finite("pos.y")?);
        let vel = fields.finite("vel")?;
        let dir = fields.dir("dir")?;
        let drop_cooldown = fields.finite("dropCooldown")?;
        let hp = fields.ranged("hp", 0, HP)?;
        let score = fields.ranged("score", 0, i32::MAX)?;
        let name = fields.next("name")?;
        if !is_valid_name(name) {
            return Err(SnapshotError::InvalidField {
                field: "name",
                value: name.to_string(),
            });
        }
        let name = name.to_string();
        let dmg_timer = fields.finite("dmgTimer")?;
        let prev_dir = fields.dir("prevDir")?;

        players.push(Player {
            pos,
            vel,
            dir,
            prev_dir,
            drop_cooldown,
            hp,
            score,
            name,
            dmg_timer,
        });
    }

    let num_bombs = fields.count("numBombs", MAX_BOMBS)?;
    let mut bombs = Vec::with_capacity(num_bombs);
    for _ in 0..num_bombs {
        let tile = fields.tile("bomb.tile")?;
        let range = fields.ranged("range", 0, MAP_SIZE as i32)?;
        let timer = fields.finite("timer")?;

        let mut permitted = [None; PERMITTED_SLOTS];
        for entry in permitted.iter_mut() {
            let index = fields.ranged("permitted", -1, num_players as i32 - 1)?;
            *entry = usize::try_from(index).ok();
        }

        bombs.push(Bomb {
            tile,
            range,
            timer,
            permitted,
        });
    }

    let num_events = fields.count("numExploEvents", MAX_EVENTS)?;
    let mut events = Vec::with_capacity(num_events);
    for _ in 0..num_events {
        let tile = fields.tile("event.tile")?;
        let kind_index = fields.parse::<i32>("type")?;
        let kind = ExploKind::from_index(kind_index).ok_or(SnapshotError::OutOfRange {
            field: "type",
            value: kind_index.to_string(),
        })?;
        events.push(ExploEvent { tile, kind });
    }

    fields.finish()?;

    Ok(Snapshot {
        time_to_start,
        players,
        bombs,
        events,
    })
}

/// One digit per tile, each followed by a filler space, row-major.
pub fn encode_tiles(grid: &Grid) -> String {
    let mut out = String::with_capacity(grid.tiles().len() * 2);
    for tile in grid.tiles() {
        out.push(char::from(b'0' + tile.as_digit()));
        out.push(' ');
    }
    out
}

pub fn decode_tiles(payload: &str, size: usize) -> Result<Grid, SnapshotError> {
    let expected = size * size;
    let bytes = payload.as_bytes();

    // the filler after the last tile may be trimmed in transit
    let found = (bytes.len() + 1) / 2;
    if found != expected {
        return Err(SnapshotError::TileCount { expected, found });
    }

    let mut tiles = Vec::with_capacity(expected);
    for &b in bytes.iter().step_by(2) {
        let tile = b
            .checked_sub(b'0')
            .and_then(Tile::from_digit)
            .ok_or_else(|| SnapshotError::InvalidField {
                field: "tile",
                value: char::from(b).to_string(),
            })?;
        tiles.push(tile);
    }

    let grid = Grid::from_tiles(size, tiles).ok_or(SnapshotError::TileCount {
        expected,
        found,
    })?;

    for y in 0..size {
        for x in 0..size {
            let pos = TilePos::new(x as i32, y as i32);
            if grid.is_permanent_wall(x, y) && grid.get(pos) != Tile::Wall {
                return Err(SnapshotError::WallMismatch(x, y));
            }
        }
    }

    Ok(grid)
}

/// `up down left right drop` as 0/1 flags.
pub fn encode_action(action: &Action) -> String {
    format!(
        "{} {} {} {} {}",
        action.up as u8, action.down as u8, action.left as u8, action.right as u8, action.drop as u8
    )
}

pub fn decode_action(payload: &str) -> Result<Action, SnapshotError> {
    let mut fields = Fields::new(payload);
    let action = Action {
        up: fields.flag("up")?,
        down: fields.flag("down")?,
        left: fields.flag("left")?,
        right: fields.flag("right")?,
        drop: fields.flag("drop")?,
    };
    fields.finish()?;
    Ok(action)
}

struct Fields<'a> {
    iter: SplitAsciiWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn new(payload: &'a str) -> Self {
        Self {
            iter: payload.split_ascii_whitespace(),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, SnapshotError> {
        self.iter.next().ok_or(SnapshotError::MissingField(field))
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, SnapshotError> {
        let raw = self.next(field)?;
        raw.parse().map_err(|_| SnapshotError::InvalidField {
            field,
            value: raw.to_string(),
        })
    }

    fn finite(&mut self, field: &'static str) -> Result<f32, SnapshotError> {
        let value: f32 = self.parse(field)?;
        if !value.is_finite() {
            return Err(SnapshotError::OutOfRange {
                field,
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    fn ranged(&mut self, field: &'static str, min: i32, max: i32) -> Result<i32, SnapshotError> {
        let value: i32 = self.parse(field)?;
        if value < min || value > max {
            return Err(SnapshotError::OutOfRange {
                field,
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    fn count(&mut self, field: &'static str, max: usize) -> Result<usize, SnapshotError> {
        self.ranged(field, 0, max as i32).map(|n| n as usize)
    }

    fn dir(&mut self, field: &'static str) -> Result<Dir, SnapshotError> {
        let index = self.ranged(field, 0, 4)?;
        Dir::from_index(index).ok_or(SnapshotError::OutOfRange {
            field,
            value: index.to_string(),
        })
    }

    fn tile(&mut self, field: &'static str) -> Result<TilePos, SnapshotError> {
        let last = MAP_SIZE as i32 - 1;
        let x = self.ranged(field, 0, last)?;
        let y = self.ranged(field, 0, last)?;
        Ok(TilePos::new(x, y))
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, SnapshotError> {
        Ok(self.ranged(field, 0, 1)? == 1)
    }

    fn finish(mut self) -> Result<(), SnapshotError> {
        match self.iter.next() {
            Some(extra) => Err(SnapshotError::TrailingData(extra.to_string())),
            None => Ok(()),
        }
    }
}
