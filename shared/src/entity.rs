//! Plain data records owned by [`crate::Simulation`].

use crate::math::{TilePos, Vec2};
use crate::{BOMB_RANGE, BOMB_TIMER, HP, PERMITTED_SLOTS, PLAYER_SPEED};

/// Facing direction. Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dir {
    #[default]
    Nil = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

impl Dir {
    pub const ALL: [Dir; 5] = [Dir::Nil, Dir::Up, Dir::Down, Dir::Left, Dir::Right];
    pub const CARDINAL: [Dir; 4] = [Dir::Up, Dir::Down, Dir::Left, Dir::Right];

    pub fn from_index(index: i32) -> Option<Dir> {
        match index {
            0 => Some(Dir::Nil),
            1 => Some(Dir::Up),
            2 => Some(Dir::Down),
            3 => Some(Dir::Left),
            4 => Some(Dir::Right),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        self as i32
    }

    /// Axis-unit step in tile space.
    pub fn step(self) -> (i32, i32) {
        match self {
            Dir::Nil => (0, 0),
            Dir::Up => (0, -1),
            Dir::Down => (0, 1),
            Dir::Left => (-1, 0),
            Dir::Right => (1, 0),
        }
    }

    pub fn unit(self) -> Vec2 {
        let (x, y) = self.step();
        Vec2::new(x as f32, y as f32)
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Dir::Left | Dir::Right)
    }

    /// Direction that moves from `from` to an adjacent `to`.
    pub fn between(from: TilePos, to: TilePos) -> Option<Dir> {
        Dir::CARDINAL.into_iter().find(|dir| {
            let (dx, dy) = dir.step();
            from.offset(dx, dy) == to
        })
    }
}

/// One frame of player intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub drop: bool,
}

impl Action {
    pub fn moving(dir: Dir) -> Self {
        let mut action = Action::default();
        match dir {
            Dir::Up => action.up = true,
            Dir::Down => action.down = true,
            Dir::Left => action.left = true,
            Dir::Right => action.right = true,
            Dir::Nil => {}
        }
        action
    }

    /// Left beats right beats up beats down.
    pub fn dir(&self) -> Dir {
        if self.left {
            Dir::Left
        } else if self.right {
            Dir::Right
        } else if self.up {
            Dir::Up
        } else if self.down {
            Dir::Down
        } else {
            Dir::Nil
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Top-left corner in world units.
    pub pos: Vec2,
    pub vel: f32,
    pub dir: Dir,
    /// Last non-nil direction; only used to pick an idle frame.
    pub prev_dir: Dir,
    pub drop_cooldown: f32,
    pub hp: i32,
    pub score: i32,
    /// Stable identity across the network.
    pub name: String,
    pub dmg_timer: f32,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Player {
            pos: Vec2::ZERO,
            vel: PLAYER_SPEED,
            dir: Dir::Nil,
            prev_dir: Dir::Nil,
            drop_cooldown: 0.0,
            hp: HP,
            score: 0,
            name: name.into(),
            dmg_timer: 0.0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn tile(&self) -> TilePos {
        TilePos::from_world(self.pos, crate::TILE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bomb {
    pub tile: TilePos,
    pub range: i32,
    pub timer: f32,
    /// Roster slots allowed to stand on the bomb until they walk off it.
    pub permitted: [Option<usize>; PERMITTED_SLOTS],
}

impl Bomb {
    pub fn new(tile: TilePos) -> Self {
        Bomb {
            tile,
            range: BOMB_RANGE,
            timer: BOMB_TIMER,
            permitted: [None; PERMITTED_SLOTS],
        }
    }

    /// Records `slot` as permitted. Returns false when every slot is taken.
    pub fn permit(&mut self, slot: usize) -> bool {
        if self.is_permitted(slot) {
            return true;
        }
        match self.permitted.iter_mut().find(|s| s.is_none()) {
            Some(free) => {
                *free = Some(slot);
                true
            }
            None => false,
        }
    }

    pub fn revoke(&mut self, slot: usize) {
        for entry in self.permitted.iter_mut() {
            if *entry == Some(slot) {
                *entry = None;
            }
        }
    }

    pub fn is_permitted(&self, slot: usize) -> bool {
        self.permitted.contains(&Some(slot))
    }
}

/// What one explosion arm did at one tile. Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploKind {
    Wall = 0,
    Crate = 1,
    EmptyTile = 2,
    Player = 3,
    OtherBomb = 4,
}

impl ExploKind {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(ExploKind::Wall),
            1 => Some(ExploKind::Crate),
            2 => Some(ExploKind::EmptyTile),
            3 => Some(ExploKind::Player),
            4 => Some(ExploKind::OtherBomb),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExploEvent {
    pub tile: TilePos,
    pub kind: ExploKind,
}
