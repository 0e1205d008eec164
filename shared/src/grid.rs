//! Square tile map with a permanent border ring and pillar lattice.

use crate::math::TilePos;

/// One grid cell. Discriminants are the wire digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tile {
    #[default]
    Empty = 0,
    Crate = 1,
    Wall = 2,
}

impl Tile {
    pub fn as_digit(self) -> u8 {
        self as u8
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Tile::Empty),
            1 => Some(Tile::Crate),
            2 => Some(Tile::Wall),
            _ => None,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Tile::Empty
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: usize,
    tiles: Vec<Tile>,
}

impl Grid {
    /// Builds a map of `size × size` with walls on the border and on every
    /// even row/column intersection inside it. `size` must be odd.
    pub fn new(size: usize) -> Self {
        assert!(size % 2 == 1 && size >= 3, "map size must be odd and >= 3");

        let mut grid = Grid {
            size,
            tiles: vec![Tile::Empty; size * size],
        };

        for y in 0..size {
            for x in 0..size {
                if grid.is_permanent_wall(x, y) {
                    grid.tiles[y * size + x] = Tile::Wall;
                }
            }
        }

        grid
    }

    /// Rebuilds a grid from raw row-major tiles. Used by the tile-data decoder.
    pub fn from_tiles(size: usize, tiles: Vec<Tile>) -> Option<Self> {
        if tiles.len() != size * size {
            return None;
        }
        Some(Grid { size, tiles })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.size && (pos.y as usize) < self.size
    }

    pub fn index_of(&self, pos: TilePos) -> Option<usize> {
        if self.in_bounds(pos) {
            Some(pos.y as usize * self.size + pos.x as usize)
        } else {
            None
        }
    }

    pub fn pos_of(&self, index: usize) -> TilePos {
        TilePos::new((index % self.size) as i32, (index / self.size) as i32)
    }

    /// Tile at `pos`. Anything outside the map reads as a wall.
    pub fn get(&self, pos: TilePos) -> Tile {
        self.index_of(pos).map_or(Tile::Wall, |i| self.tiles[i])
    }

    /// Overwrites a tile. Permanent walls and out-of-range positions are left untouched.
    pub fn set(&mut self, pos: TilePos, tile: Tile) -> bool {
        match self.index_of(pos) {
            Some(i) if !self.is_permanent_wall(pos.x as usize, pos.y as usize) => {
                self.tiles[i] = tile;
                true
            }
            _ => false,
        }
    }

    pub fn is_permanent_wall(&self, x: usize, y: usize) -> bool {
        let last = self.size - 1;
        let border = x == 0 || y == 0 || x == last || y == last;
        let pillar = x % 2 == 0 && y % 2 == 0;
        border || pillar
    }

    pub fn clear_crates(&mut self) {
        for tile in self.tiles.iter_mut() {
            if *tile == Tile::Crate {
                *tile = Tile::Empty;
            }
        }
    }
}
