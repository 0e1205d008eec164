use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bot::BotData;
use crate::entity::{Action, Bomb, Dir, ExploEvent, ExploKind, Player};
use crate::grid::{Grid, Tile};
use crate::math::{TilePos, Vec2};
use crate::snapshot::Snapshot;
use crate::{
    CHAIN_TIMER, DMG_TIMER, DROP_COOLDOWN, HP, MAP_SIZE, MAX_BOMBS, MAX_PLAYERS, MAX_STEP,
    PLAYER_SPEED, ROUND_START_DELAY, TILE_SIZE,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("no player named {0:?} in the roster")]
    UnknownPlayer(String),
}

/// The authoritative game aggregate.
///
/// Constructed once per process. `set_new_game` reinitialises players,
/// bombs and crates in place; the roster itself is replaced with
/// `set_roster`.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub grid: Grid,
    pub players: Vec<Player>,
    pub bombs: Vec<Bomb>,
    /// Seconds until input is accepted again after a round restart.
    pub time_to_start: f32,
    bot_data: Vec<BotData>,
    rng: StdRng,
}

impl Simulation {
    pub fn new(seed: u64) -> Self {
        Self {
            grid: Grid::new(MAP_SIZE),
            players: Vec::with_capacity(MAX_PLAYERS),
            bombs: Vec::with_capacity(MAX_BOMBS),
            time_to_start: 0.0,
            bot_data: vec![BotData::default(); MAX_PLAYERS],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Replaces the roster. Names past `MAX_PLAYERS` are ignored.
    /// Call `set_new_game` afterwards to place the new players.
    pub fn set_roster<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.players = names
            .into_iter()
            .take(MAX_PLAYERS)
            .map(|name| Player::new(name))
            .collect();
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Starts a fresh round: clears bombs, restores every player to its
    /// spawn corner and scatters a new set of crates.
    pub fn set_new_game(&mut self) {
        self.bombs.clear();
        for bot in self.bot_data.iter_mut() {
            *bot = BotData::default();
        }

        let size = self.grid.size() as i32;
        for (slot, player) in self.players.iter_mut().enumerate() {
            let (tile, facing) = spawn_point(slot, size);
            player.pos = tile.to_world(TILE_SIZE);
            player.vel = PLAYER_SPEED;
            player.drop_cooldown = 0.0;
            player.dmg_timer = 0.0;
            player.hp = HP;
            // Nil so the next input does not overwrite prev_dir
            player.dir = Dir::Nil;
            player.prev_dir = facing;
        }

        self.grid.clear_crates();

        let spawns: Vec<TilePos> = (0..MAX_PLAYERS).map(|slot| spawn_point(slot, size).0).collect();
        let mut free: Vec<usize> = (0..self.grid.tiles().len())
            .filter(|&i| self.grid.tiles()[i].is_empty())
            .filter(|&i| {
                let tile = self.grid.pos_of(i);
                spawns
                    .iter()
                    .all(|spawn| (tile.x - spawn.x).abs() > 1 || (tile.y - spawn.y).abs() > 1)
            })
            .collect();

        let num_crates = free.len() * 2 / 3;
        for _ in 0..num_crates {
            let pick = self.rng.gen_range(0..free.len());
            let index = free.swap_remove(pick);
            let tile = self.grid.pos_of(index);
            self.grid.set(tile, Tile::Crate);
        }

        debug!(
            "new game: {} players, {} crates",
            self.players.len(),
            num_crates
        );
    }

    /// Applies one frame of input for the named player.
    ///
    /// Ignored during the pre-round countdown and for eliminated players.
    pub fn process_player_input(&mut self, action: &Action, name: &str) -> Result<(), SimError> {
        if self.time_to_start > 0.0 {
            return Ok(());
        }

        let slot = self
            .slot_of(name)
            .ok_or_else(|| SimError::UnknownPlayer(name.to_string()))?;

        let player = &mut self.players[slot];
        if !player.is_alive() {
            return Ok(());
        }

        if player.dir != Dir::Nil {
            player.prev_dir = player.dir;
        }
        player.dir = action.dir();

        if action.drop {
            self.try_drop_bomb(slot);
        }

        Ok(())
    }

    fn try_drop_bomb(&mut self, slot: usize) {
        let player = &self.players[slot];
        let target = player.tile();

        let occupied = self.bombs.iter().any(|b| b.tile == target);
        if occupied || player.drop_cooldown > 0.0 || self.bombs.len() >= MAX_BOMBS {
            return;
        }

        let mut bomb = Bomb::new(target);
        for (other_slot, other) in self.players.iter().enumerate() {
            if overlaps_tile(other.pos, target) {
                bomb.permit(other_slot);
            }
        }

        self.players[slot].drop_cooldown = DROP_COOLDOWN;
        self.bombs.push(bomb);
    }

    /// Lets the bot occupying `name`'s slot pick an action, then applies it.
    pub fn update_and_process_bot_input(&mut self, name: &str, dt: f32) -> Result<(), SimError> {
        if self.time_to_start > 0.0 {
            return Ok(());
        }

        let slot = self
            .slot_of(name)
            .ok_or_else(|| SimError::UnknownPlayer(name.to_string()))?;

        if !self.players[slot].is_alive() {
            return Ok(());
        }

        let action = {
            let Simulation {
                grid,
                players,
                bombs,
                bot_data,
                rng,
                ..
            } = self;
            bot_data[slot].think(&players[slot], grid, bombs, rng, dt)
        };

        self.process_player_input(&action, name)
    }

    /// Advances the world by `dt` seconds, appending what every explosion
    /// arm did to `events`. Returns true when a new round has begun.
    pub fn update(&mut self, dt: f32, events: &mut Vec<ExploEvent>) -> bool {
        self.time_to_start = (self.time_to_start - dt).max(0.0);

        // clamp after the countdown so frame hitches cannot tunnel players
        let dt = dt.min(MAX_STEP);

        self.update_bombs(dt, events);

        for slot in 0..self.players.len() {
            self.update_player(slot, dt);
        }

        self.check_round_end()
    }

    fn update_bombs(&mut self, dt: f32, events: &mut Vec<ExploEvent>) {
        let mut i = 0;
        while i < self.bombs.len() {
            self.bombs[i].timer -= dt;

            if self.bombs[i].timer > 0.0 {
                i += 1;
                continue;
            }

            self.detonate(i, events);
            self.bombs.swap_remove(i);
        }
    }

    fn detonate(&mut self, index: usize, events: &mut Vec<ExploEvent>) {
        let origin = self.bombs[index].tile;
        let range = self.bombs[index].range;

        for dir in Dir::ALL {
            let reach = if dir == Dir::Nil { 1 } else { range };
            let (dx, dy) = dir.step();

            for step in 1..=reach {
                let tile = origin.offset(dx * step, dy * step);

                match self.grid.get(tile) {
                    Tile::Wall => {
                        events.push(ExploEvent {
                            tile,
                            kind: ExploKind::Wall,
                        });
                        break;
                    }
                    Tile::Crate => {
                        self.grid.set(tile, Tile::Empty);
                        events.push(ExploEvent {
                            tile,
                            kind: ExploKind::Crate,
                        });
                        break;
                    }
                    Tile::Empty => {
                        let kind = self.blast_tile(index, tile);
                        events.push(ExploEvent { tile, kind });
                    }
                }
            }
        }
    }

    /// Chains other bombs and damages players on an empty tile in a blast.
    fn blast_tile(&mut self, source: usize, tile: TilePos) -> ExploKind {
        let mut hit_bomb = false;
        for (i, bomb) in self.bombs.iter_mut().enumerate() {
            if i != source && bomb.tile == tile {
                bomb.timer = bomb.timer.min(CHAIN_TIMER);
                hit_bomb = true;
            }
        }

        let mut hit_player = false;
        for player in self.players.iter_mut() {
            if player.is_alive() && player.tile() == tile {
                player.hp -= 1;
                player.dmg_timer = DMG_TIMER;
                hit_player = true;
            }
        }

        if hit_player {
            ExploKind::Player
        } else if hit_bomb {
            ExploKind::OtherBomb
        } else {
            ExploKind::EmptyTile
        }
    }

    fn update_player(&mut self, slot: usize, dt: f32) {
        let Simulation {
            grid,
            players,
            bombs,
            ..
        } = self;
        let player = &mut players[slot];

        player.drop_cooldown = (player.drop_cooldown - dt).max(0.0);
        player.dmg_timer = (player.dmg_timer - dt).max(0.0);

        if !player.is_alive() {
            return;
        }

        player.pos = player.pos + player.dir.unit() * (player.vel * dt);

        let player_tile = player.tile();

        for bomb in bombs.iter_mut() {
            let overlapping = overlaps_tile(player.pos, bomb.tile);
            let permitted = bomb.is_permitted(slot);

            if overlapping && !permitted {
                snap_to_tile_axis(player, player_tile);
            } else if !overlapping && permitted {
                bomb.revoke(slot);
            }
        }

        if touches_solid_tile(grid, player.pos, player_tile) {
            snap_to_tile_axis(player, player_tile);
            slide_around_corner(grid, player, player_tile, dt);
        }
    }

    fn check_round_end(&mut self) -> bool {
        let eliminated = self.players.iter().filter(|p| !p.is_alive()).count();

        if eliminated == 0 || eliminated + 1 < self.players.len() {
            return false;
        }

        for player in self.players.iter_mut() {
            if player.is_alive() {
                player.score += 1;
            }
        }

        info!(
            "round over: {}",
            self.players
                .iter()
                .map(|p| format!("{}={}", p.name, p.score))
                .collect::<Vec<_>>()
                .join(" ")
        );

        self.time_to_start = ROUND_START_DELAY;
        self.set_new_game();
        true
    }

    /// Overwrites players, bombs and the countdown with a server snapshot
    /// and patches crates its explosion events destroyed. Returns the
    /// events so the caller can republish them.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Vec<ExploEvent> {
        self.time_to_start = snapshot.time_to_start;
        self.players = snapshot.players;
        self.bombs = snapshot.bombs;

        for event in &snapshot.events {
            if event.kind == ExploKind::Crate {
                self.grid.set(event.tile, Tile::Empty);
            }
        }

        snapshot.events
    }
}

/// Spawn tile and remembered facing for a roster slot.
fn spawn_point(slot: usize, size: i32) -> (TilePos, Dir) {
    match slot % MAX_PLAYERS {
        0 => (TilePos::new(1, 1), Dir::Right),
        1 => (TilePos::new(size - 2, size - 2), Dir::Left),
        2 => (TilePos::new(1, size - 2), Dir::Right),
        _ => (TilePos::new(size - 2, 1), Dir::Down),
    }
}

/// Axis-aligned overlap between a player box and a tile; both are one tile wide.
pub fn overlaps_tile(pos: Vec2, tile: TilePos) -> bool {
    let tile_pos = tile.to_world(TILE_SIZE);

    pos.x < tile_pos.x + TILE_SIZE
        && pos.x + TILE_SIZE > tile_pos.x
        && pos.y < tile_pos.y + TILE_SIZE
        && pos.y + TILE_SIZE > tile_pos.y
}

fn snap_to_tile_axis(player: &mut Player, tile: TilePos) {
    if player.dir.is_horizontal() {
        player.pos.x = tile.x as f32 * TILE_SIZE;
    } else {
        player.pos.y = tile.y as f32 * TILE_SIZE;
    }
}

fn touches_solid_tile(grid: &Grid, pos: Vec2, center: TilePos) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            let tile = center.offset(dx, dy);
            if !grid.get(tile).is_empty() && overlaps_tile(pos, tile) {
                return true;
            }
        }
    }
    false
}

/// Nudges a blocked player around a convex corner.
///
/// If the player is more than a quarter tile off-centre and the tile ahead
/// is blocked, the diagonal neighbour on the side of the offset is tried
/// instead. When the tile beyond the chosen one is open the player slides
/// toward its centre, landing exactly on it rather than overshooting.
fn slide_around_corner(grid: &Grid, player: &mut Player, player_tile: TilePos, dt: f32) {
    let (dx, dy) = player.dir.step();
    let offset = player.pos - player_tile.to_world(TILE_SIZE);

    let ahead_blocked = !grid.get(player_tile.offset(dx, dy)).is_empty();
    let slide_tile = if offset.magnitude() > TILE_SIZE / 4.0 && ahead_blocked {
        let unit = offset.normalize();
        player_tile.offset(unit.x.round() as i32, unit.y.round() as i32)
    } else {
        player_tile
    };

    if !grid.get(slide_tile.offset(dx, dy)).is_empty() {
        return;
    }

    let target = slide_tile.to_world(TILE_SIZE);
    let slide_vec = target - player.pos;
    player.pos = player.pos + slide_vec.normalize() * (player.vel * dt);

    if slide_vec.dot(&(target - player.pos)) < 0.0 {
        player.pos = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn open_sim(names: &[&str]) -> Simulation {
        let mut sim = Simulation::new(42);
        sim.set_roster(names.iter().copied());
        sim.set_new_game();
        sim.grid.clear_crates();
        sim
    }

    fn place(sim: &mut Simulation, name: &str, x: f32, y: f32) {
        let slot = sim.slot_of(name).unwrap();
        sim.players[slot].pos = Vec2::new(x, y);
    }

    fn drop_action() -> Action {
        Action {
            drop: true,
            ..Action::default()
        }
    }

    fn assert_permanent_walls(grid: &Grid) {
        let size = grid.size();
        for y in 0..size {
            for x in 0..size {
                if grid.is_permanent_wall(x, y) {
                    assert_eq!(grid.get(TilePos::new(x as i32, y as i32)), Tile::Wall);
                }
            }
        }
    }

    #[test]
    fn test_walls_survive_new_games() {
        let mut sim = Simulation::new(1);
        assert_permanent_walls(&sim.grid);
        sim.set_roster(["a", "b", "c", "d"]);
        for _ in 0..20 {
            sim.set_new_game();
            assert_permanent_walls(&sim.grid);
        }
    }

    #[test]
    fn test_new_game_places_crates_away_from_spawns() {
        let mut sim = Simulation::new(9);
        sim.set_roster(["a", "b"]);
        sim.set_new_game();

        let crates = sim.grid.tiles().iter().filter(|t| **t == Tile::Crate).count();
        assert!(crates > 0);

        for slot in 0..MAX_PLAYERS {
            let (spawn, _) = spawn_point(slot, MAP_SIZE as i32);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    assert_ne!(sim.grid.get(spawn.offset(dx, dy)), Tile::Crate);
                }
            }
        }

        assert_eq!(sim.players[0].tile(), TilePos::new(1, 1));
        assert_eq!(sim.players[1].tile(), TilePos::new(11, 11));
        assert_eq!(sim.players[0].prev_dir, Dir::Right);
    }

    #[test]
    fn test_same_seed_same_crates() {
        let mut a = Simulation::new(5);
        let mut b = Simulation::new(5);
        a.set_roster(["x"]);
        b.set_roster(["x"]);
        a.set_new_game();
        b.set_new_game();
        assert_eq!(a.grid, b.grid);
    }

    #[test]
    fn test_unknown_player_input() {
        let mut sim = open_sim(&["alice"]);
        let err = sim.process_player_input(&Action::default(), "mallory");
        assert_eq!(err, Err(SimError::UnknownPlayer("mallory".into())));
    }

    #[test]
    fn test_input_sets_direction_and_remembers_previous() {
        let mut sim = open_sim(&["alice"]);
        sim.process_player_input(&Action::moving(Dir::Down), "alice").unwrap();
        assert_eq!(sim.players[0].dir, Dir::Down);

        sim.process_player_input(&Action::default(), "alice").unwrap();
        assert_eq!(sim.players[0].dir, Dir::Nil);
        assert_eq!(sim.players[0].prev_dir, Dir::Down);

        // nil does not overwrite the remembered direction
        sim.process_player_input(&Action::default(), "alice").unwrap();
        assert_eq!(sim.players[0].prev_dir, Dir::Down);
    }

    #[test]
    fn test_input_ignored_during_countdown() {
        let mut sim = open_sim(&["alice"]);
        sim.time_to_start = 1.0;
        sim.process_player_input(&Action::moving(Dir::Right), "alice").unwrap();
        sim.process_player_input(&drop_action(), "alice").unwrap();
        assert_eq!(sim.players[0].dir, Dir::Nil);
        assert!(sim.bombs.is_empty());
    }

    #[test]
    fn test_drop_creates_one_bomb_per_tile() {
        let mut sim = open_sim(&["alice", "bob"]);
        place(&mut sim, "bob", TILE_SIZE, TILE_SIZE);

        sim.process_player_input(&drop_action(), "alice").unwrap();
        assert_eq!(sim.bombs.len(), 1);
        assert_eq!(sim.bombs[0].tile, TilePos::new(1, 1));
        assert!(sim.bombs[0].is_permitted(0));
        assert!(sim.bombs[0].is_permitted(1));

        // bob has no cooldown but the tile is taken
        sim.process_player_input(&drop_action(), "bob").unwrap();
        assert_eq!(sim.bombs.len(), 1);
        assert_eq!(sim.players[1].drop_cooldown, 0.0);
    }

    #[test]
    fn test_drop_respects_cooldown() {
        let mut sim = open_sim(&["alice"]);
        sim.process_player_input(&drop_action(), "alice").unwrap();
        place(&mut sim, "alice", 3.0 * TILE_SIZE, TILE_SIZE);
        sim.process_player_input(&drop_action(), "alice").unwrap();
        assert_eq!(sim.bombs.len(), 1);

        let mut events = Vec::new();
        for _ in 0..31 {
            sim.update(MAX_STEP, &mut events);
        }
        assert_eq!(sim.players[0].drop_cooldown, 0.0);
        sim.process_player_input(&drop_action(), "alice").unwrap();
        assert_eq!(sim.bombs.len(), 2);
    }

    #[test]
    fn test_eliminated_player_cannot_drop_or_take_damage() {
        let mut sim = open_sim(&["alice", "bob", "carol"]);
        sim.players[0].hp = 0;

        sim.process_player_input(&drop_action(), "alice").unwrap();
        assert!(sim.bombs.is_empty());

        sim.bombs.push(Bomb::new(TilePos::new(1, 1)));
        sim.bombs[0].timer = 0.0;
        let mut events = Vec::new();
        sim.update(0.01, &mut events);
        assert_eq!(sim.players[0].hp, 0);
        assert!(events.iter().all(|e| e.kind != ExploKind::Player));
    }

    #[test]
    fn test_straight_line_motion() {
        let mut sim = open_sim(&["alice"]);
        let start = sim.players[0].pos;
        assert_eq!(sim.players[0].tile(), TilePos::new(1, 1));

        sim.process_player_input(&Action::moving(Dir::Right), "alice").unwrap();
        let mut events = Vec::new();
        sim.update(0.1, &mut events);

        // the step is clamped before integrating
        let moved = sim.players[0].pos - start;
        assert_approx_eq!(moved.x, PLAYER_SPEED * MAX_STEP, 1e-4);
        assert_approx_eq!(moved.y, 0.0, 1e-6);
    }

    #[test]
    fn test_small_step_motion_is_exact() {
        let mut sim = open_sim(&["alice"]);
        let start = sim.players[0].pos;
        sim.process_player_input(&Action::moving(Dir::Right), "alice").unwrap();
        let mut events = Vec::new();
        for _ in 0..4 {
            sim.update(0.025, &mut events);
        }
        let moved = sim.players[0].pos - start;
        assert_approx_eq!(moved.x, 8.0, 1e-3);
        assert_approx_eq!(moved.y, 0.0, 1e-6);
    }

    #[test]
    fn test_explosion_stops_at_wall() {
        let mut sim = open_sim(&["alice"]);
        sim.grid.set(TilePos::new(6, 7), Tile::Wall);
        let mut bomb = Bomb::new(TilePos::new(6, 6));
        bomb.timer = 0.0;
        sim.bombs.push(bomb);

        let mut events = Vec::new();
        sim.update(0.01, &mut events);

        assert!(events.contains(&ExploEvent {
            tile: TilePos::new(6, 7),
            kind: ExploKind::Wall,
        }));
        assert!(events.iter().all(|e| e.tile != TilePos::new(6, 8)));
        assert!(sim.bombs.is_empty());
        assert_eq!(sim.grid.get(TilePos::new(6, 7)), Tile::Wall);
    }

    #[test]
    fn test_explosion_clears_one_crate_per_arm() {
        let mut sim = open_sim(&["alice"]);
        sim.grid.set(TilePos::new(4, 3), Tile::Crate);
        sim.grid.set(TilePos::new(5, 3), Tile::Crate);
        let mut bomb = Bomb::new(TilePos::new(3, 3));
        bomb.timer = 0.0;
        sim.bombs.push(bomb);

        let mut events = Vec::new();
        sim.update(0.01, &mut events);

        assert_eq!(sim.grid.get(TilePos::new(4, 3)), Tile::Empty);
        assert_eq!(sim.grid.get(TilePos::new(5, 3)), Tile::Crate);
        let crates = events.iter().filter(|e| e.kind == ExploKind::Crate).count();
        assert_eq!(crates, 1);
        assert_permanent_walls(&sim.grid);
    }

    #[test]
    fn test_explosion_event_layout() {
        let mut sim = open_sim(&["alice"]);
        let mut bomb = Bomb::new(TilePos::new(5, 5));
        bomb.timer = 0.0;
        sim.bombs.push(bomb);

        let mut events = Vec::new();
        sim.update(0.01, &mut events);

        // origin, then two open steps per arm
        assert_eq!(events.len(), 9);
        assert_eq!(
            events[0],
            ExploEvent {
                tile: TilePos::new(5, 5),
                kind: ExploKind::EmptyTile,
            }
        );
    }

    #[test]
    fn test_chain_reaction_shortens_fuse() {
        let mut sim = open_sim(&["alice"]);
        let mut first = Bomb::new(TilePos::new(3, 3));
        first.timer = 0.0;
        sim.bombs.push(first);
        sim.bombs.push(Bomb::new(TilePos::new(5, 3)));

        let mut events = Vec::new();
        sim.update(0.01, &mut events);

        assert_eq!(sim.bombs.len(), 1);
        assert!(sim.bombs[0].timer <= CHAIN_TIMER);
        assert!(events.contains(&ExploEvent {
            tile: TilePos::new(5, 3),
            kind: ExploKind::OtherBomb,
        }));

        events.clear();
        for _ in 0..5 {
            sim.update(MAX_STEP, &mut events);
        }
        assert!(sim.bombs.is_empty());
    }

    #[test]
    fn test_blast_damages_player_once_per_arm_step() {
        let mut sim = open_sim(&["alice", "bob", "carol"]);
        place(&mut sim, "bob", 3.0 * TILE_SIZE, 3.0 * TILE_SIZE);
        let mut bomb = Bomb::new(TilePos::new(3, 3));
        bomb.timer = 0.0;
        sim.bombs.push(bomb);

        let mut events = Vec::new();
        sim.update(0.01, &mut events);

        assert_eq!(sim.players[1].hp, HP - 1);
        assert!(sim.players[1].dmg_timer > 0.0);
        assert_eq!(
            events[0],
            ExploEvent {
                tile: TilePos::new(3, 3),
                kind: ExploKind::Player,
            }
        );
    }

    #[test]
    fn test_round_end_awards_survivor() {
        let mut sim = open_sim(&["alice", "bob", "carol"]);
        sim.players[1].hp = 0;
        let mut events = Vec::new();
        assert!(!sim.update(0.01, &mut events));

        sim.players[2].hp = 0;
        assert!(sim.update(0.01, &mut events));

        assert_eq!(sim.players[0].score, 1);
        assert_eq!(sim.players[1].score, 0);
        assert_eq!(sim.players[2].score, 0);
        assert!(sim.players.iter().all(|p| p.hp == HP));
        assert_eq!(sim.time_to_start, ROUND_START_DELAY);
        assert!(sim.bombs.is_empty());
    }

    #[test]
    fn test_round_end_with_everyone_out_scores_nobody() {
        let mut sim = open_sim(&["alice", "bob"]);
        sim.players[0].hp = 0;
        sim.players[1].hp = 0;
        let mut events = Vec::new();
        assert!(sim.update(0.01, &mut events));
        assert!(sim.players.iter().all(|p| p.score == 0));
    }

    #[test]
    fn test_round_end_ties_score_every_survivor() {
        // two players, one eliminated: threshold met with one survivor
        let mut sim = open_sim(&["alice", "bob"]);
        sim.players[1].hp = 0;
        let mut events = Vec::new();
        assert!(sim.update(0.01, &mut events));
        assert_eq!(sim.players[0].score, 1);

        // a solo player never ends the round while alive
        let mut solo = open_sim(&["alice"]);
        assert!(!solo.update(0.01, &mut events));
    }

    #[test]
    fn test_tile_collision_blocks_movement() {
        let mut sim = open_sim(&["alice"]);
        place(&mut sim, "alice", 11.0 * TILE_SIZE, TILE_SIZE);
        sim.process_player_input(&Action::moving(Dir::Right), "alice").unwrap();

        let mut events = Vec::new();
        for _ in 0..10 {
            sim.update(MAX_STEP, &mut events);
        }
        assert_approx_eq!(sim.players[0].pos.x, 11.0 * TILE_SIZE, 1e-4);
        assert_approx_eq!(sim.players[0].pos.y, TILE_SIZE, 1e-4);
    }

    #[test]
    fn test_corner_slide_moves_toward_open_column() {
        let mut sim = open_sim(&["alice"]);
        // just right of the column above pillar (2,2), heading down
        place(&mut sim, "alice", 2.0 * TILE_SIZE + 7.0, TILE_SIZE);
        sim.process_player_input(&Action::moving(Dir::Down), "alice").unwrap();

        let mut events = Vec::new();
        sim.update(MAX_STEP, &mut events);

        let player = &sim.players[0];
        assert_approx_eq!(player.pos.y, TILE_SIZE, 1e-4);
        assert_approx_eq!(player.pos.x, 2.0 * TILE_SIZE + 7.0 + PLAYER_SPEED * MAX_STEP, 1e-3);

        for _ in 0..20 {
            sim.update(MAX_STEP, &mut events);
        }
        // lined up with column 3 and moving down it
        assert_approx_eq!(sim.players[0].pos.x, 3.0 * TILE_SIZE, 1e-4);
        assert!(sim.players[0].pos.y > TILE_SIZE);
    }

    #[test]
    fn test_bomb_pushes_back_unpermitted_player() {
        let mut sim = open_sim(&["alice", "bob"]);
        place(&mut sim, "bob", 3.0 * TILE_SIZE, TILE_SIZE);
        sim.bombs.push(Bomb::new(TilePos::new(2, 1)));

        sim.process_player_input(&Action::moving(Dir::Left), "bob").unwrap();
        let mut events = Vec::new();
        for _ in 0..10 {
            sim.update(MAX_STEP, &mut events);
        }
        assert_approx_eq!(sim.players[1].pos.x, 3.0 * TILE_SIZE, 1e-4);
    }

    #[test]
    fn test_walking_off_bomb_revokes_permission() {
        let mut sim = open_sim(&["alice"]);
        sim.process_player_input(&drop_action(), "alice").unwrap();
        assert!(sim.bombs[0].is_permitted(0));

        sim.process_player_input(&Action::moving(Dir::Right), "alice").unwrap();
        let mut events = Vec::new();
        for _ in 0..10 {
            sim.update(MAX_STEP, &mut events);
        }
        assert!(!sim.bombs[0].is_permitted(0));

        // walking back is now blocked
        sim.process_player_input(&Action::moving(Dir::Left), "alice").unwrap();
        for _ in 0..10 {
            sim.update(MAX_STEP, &mut events);
        }
        assert!(sim.players[0].pos.x >= 2.0 * TILE_SIZE - 1e-3);
    }

    #[test]
    fn test_bot_walks_off_its_bomb() {
        let mut sim = open_sim(&["bot_0"]);
        sim.bombs.push(Bomb::new(TilePos::new(1, 1)));
        sim.bombs[0].permit(0);

        let mut events = Vec::new();
        for _ in 0..40 {
            sim.update_and_process_bot_input("bot_0", MAX_STEP).unwrap();
            sim.update(MAX_STEP, &mut events);
        }

        assert_ne!(sim.players[0].tile(), TilePos::new(1, 1));
        assert!(!sim.bombs[0].is_permitted(0));
    }

    #[test]
    fn test_bot_input_unknown_slot() {
        let mut sim = open_sim(&["alice"]);
        assert!(sim.update_and_process_bot_input("bot_3", MAX_STEP).is_err());
    }

    #[test]
    fn test_apply_snapshot_overwrites_and_patches_crates() {
        let mut sim = open_sim(&["alice"]);
        sim.grid.set(TilePos::new(3, 1), Tile::Crate);

        let mut remote = Player::new("bob");
        remote.score = 4;
        let snapshot = Snapshot {
            time_to_start: 1.5,
            players: vec![remote],
            bombs: vec![Bomb::new(TilePos::new(5, 5))],
            events: vec![ExploEvent {
                tile: TilePos::new(3, 1),
                kind: ExploKind::Crate,
            }],
        };

        let events = sim.apply_snapshot(snapshot);
        assert_eq!(events.len(), 1);
        assert_eq!(sim.players.len(), 1);
        assert_eq!(sim.players[0].name, "bob");
        assert_eq!(sim.bombs.len(), 1);
        assert_eq!(sim.time_to_start, 1.5);
        assert_eq!(sim.grid.get(TilePos::new(3, 1)), Tile::Empty);
    }
}
