//! Computer-controlled players.
//!
//! A bot periodically scans the map for tiles that an active bomb will
//! reach. When it stands on such a tile it searches outward for the closest
//! safe tile and walks there one tile at a time; otherwise it wanders.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::entity::{Action, Bomb, Dir, Player};
use crate::grid::{Grid, Tile};
use crate::math::TilePos;
use crate::{
    BOT_DROP_PERIOD, BOT_HOP_BUDGET, BOT_SCAN_PERIOD, BOT_STEP_PERIOD, BOT_WANDER_PERIOD,
};

/// Grid cell as seen by the pathfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Crate,
    Wall,
    /// Empty tile inside some bomb's blast radius.
    Danger,
}

impl From<Tile> for Cell {
    fn from(tile: Tile) -> Self {
        match tile {
            Tile::Empty => Cell::Empty,
            Tile::Crate => Cell::Crate,
            Tile::Wall => Cell::Wall,
        }
    }
}

impl Cell {
    pub fn is_walkable(self) -> bool {
        matches!(self, Cell::Empty | Cell::Danger)
    }
}

/// Per-slot scratch state, kept across simulation steps.
#[derive(Debug, Clone, Default)]
pub struct BotData {
    pub timer_drop: f32,
    pub timer_scan: f32,
    pub timer_step: f32,
    pub timer_wander: f32,
    /// Heading currently held down.
    pub dir: Dir,
    pub cells: Vec<Cell>,
    /// Tile indices still to visit; the next step is at the end.
    pub path: Vec<usize>,
    pub target: Option<usize>,
}

impl BotData {
    /// Advances the bot's timers and returns the action for this frame.
    pub fn think<R: Rng>(
        &mut self,
        player: &Player,
        grid: &Grid,
        bombs: &[Bomb],
        rng: &mut R,
        dt: f32,
    ) -> Action {
        self.timer_drop += dt;
        self.timer_scan += dt;
        self.timer_step += dt;
        self.timer_wander += dt;

        let here = player.tile();

        if self.path.is_empty() && self.timer_scan >= BOT_SCAN_PERIOD {
            self.timer_scan = 0.0;
            self.cells = danger_map(grid, bombs);

            if let Some(start) = grid.index_of(here) {
                if self.cells[start] == Cell::Danger {
                    let (path, target) = escape_path(&self.cells, grid.size(), start, BOT_HOP_BUDGET);
                    self.path = path;
                    self.target = target;
                    // take the first step right away
                    self.timer_step = BOT_STEP_PERIOD;
                }
            }
        }

        if !self.path.is_empty() {
            if self.timer_step >= BOT_STEP_PERIOD {
                self.timer_step = 0.0;
                self.dir = self.next_step(here, grid, rng);
            }
        } else if self.target.is_some() {
            if self.timer_step >= BOT_STEP_PERIOD {
                // arrived, hold still until the next scan
                self.target = None;
                self.dir = Dir::Nil;
                self.timer_wander = 0.0;
            }
        } else if self.timer_wander >= BOT_WANDER_PERIOD {
            self.timer_wander = 0.0;
            self.dir = wander(here, grid, bombs, rng);
        }

        let mut action = Action::moving(self.dir);

        if self.timer_drop >= BOT_DROP_PERIOD {
            self.timer_drop = 0.0;
            action.drop = true;
        }

        action
    }

    fn next_step<R: Rng>(&mut self, here: TilePos, grid: &Grid, rng: &mut R) -> Dir {
        while let Some(next) = self.path.pop() {
            let next_pos = grid.pos_of(next);
            if next_pos == here {
                continue;
            }
            if let Some(dir) = Dir::between(here, next_pos) {
                return dir;
            }

            // the bot drifted off the recorded path
            self.path.clear();
            self.target = None;
            return self.fallback(here, grid, rng);
        }
        Dir::Nil
    }

    fn fallback<R: Rng>(&self, here: TilePos, grid: &Grid, rng: &mut R) -> Dir {
        let open: Vec<Dir> = Dir::CARDINAL
            .into_iter()
            .filter(|dir| {
                let (dx, dy) = dir.step();
                grid.index_of(here.offset(dx, dy))
                    .and_then(|i| self.cells.get(i))
                    .is_some_and(|cell| cell.is_walkable())
            })
            .collect();
        open.choose(rng).copied().unwrap_or(Dir::Nil)
    }
}

/// Marks every empty tile an active bomb would reach. The scan stops at
/// walls and crates exactly like a real explosion arm does.
pub fn danger_map(grid: &Grid, bombs: &[Bomb]) -> Vec<Cell> {
    let mut cells: Vec<Cell> = grid.tiles().iter().map(|t| Cell::from(*t)).collect();

    for bomb in bombs {
        if let Some(i) = grid.index_of(bomb.tile) {
            cells[i] = Cell::Danger;
        }

        for dir in Dir::CARDINAL {
            let (dx, dy) = dir.step();
            for step in 1..=bomb.range {
                let tile = bomb.tile.offset(dx * step, dy * step);
                if !grid.get(tile).is_empty() {
                    break;
                }
                if let Some(i) = grid.index_of(tile) {
                    cells[i] = Cell::Danger;
                }
            }
        }
    }

    cells
}

/// Uniform-cost search from `start` across walkable cells.
///
/// Stops at the first plain-empty cell. If none is reachable within
/// `hop_budget` steps the farthest danger cell reached becomes the target.
/// Returns the path as a stack (next step last) and the chosen target.
pub fn escape_path(
    cells: &[Cell],
    size: usize,
    start: usize,
    hop_budget: u32,
) -> (Vec<usize>, Option<usize>) {
    let mut dist = vec![u32::MAX; size * size];
    let mut prev: Vec<Option<usize>> = vec![None; size * size];
    let mut open = BinaryHeap::new();

    dist[start] = 0;
    open.push(Reverse((0u32, start)));

    let mut target = None;
    let mut farthest = start;

    while let Some(Reverse((d, idx))) = open.pop() {
        if d > dist[idx] {
            continue;
        }
        if cells[idx] == Cell::Empty {
            target = Some(idx);
            break;
        }
        if d > dist[farthest] {
            farthest = idx;
        }
        if d >= hop_budget {
            continue;
        }

        for next in neighbours(idx, size) {
            if !cells[next].is_walkable() {
                continue;
            }
            let candidate = d + 1;
            if candidate < dist[next] {
                dist[next] = candidate;
                prev[next] = Some(idx);
                open.push(Reverse((candidate, next)));
            }
        }
    }

    let target = target.or((farthest != start).then_some(farthest));

    let mut path = Vec::new();
    if let Some(target) = target {
        let mut cur = target;
        while let Some(p) = prev[cur] {
            path.push(cur);
            cur = p;
        }
    }

    (path, target)
}

fn neighbours(idx: usize, size: usize) -> impl Iterator<Item = usize> {
    let x = idx % size;
    let y = idx / size;
    let left = (x > 0).then(|| idx - 1);
    let right = (x + 1 < size).then(|| idx + 1);
    let up = (y > 0).then(|| idx - size);
    let down = (y + 1 < size).then(|| idx + size);
    [up, down, left, right].into_iter().flatten()
}

fn wander<R: Rng>(here: TilePos, grid: &Grid, bombs: &[Bomb], rng: &mut R) -> Dir {
    let cells = danger_map(grid, bombs);
    let mut options = vec![Dir::Nil];

    for dir in Dir::CARDINAL {
        let (dx, dy) = dir.step();
        let safe = grid
            .index_of(here.offset(dx, dy))
            .is_some_and(|i| cells[i] == Cell::Empty);
        if safe {
            options.push(dir);
        }
    }

    options.choose(rng).copied().unwrap_or(Dir::Nil)
}
