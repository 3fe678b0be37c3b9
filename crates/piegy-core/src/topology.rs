//! Neighbor links of the patch grid.
//!
//! Patches live in one flat row-major arena; a link is the arena index of the
//! neighbor, or `None` across an open edge.

use crate::config::BoundaryMode;
use serde::{Deserialize, Serialize};

/// Migration directions, in the order used by rate arrays and event indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Direction::Up),
            1 => Some(Direction::Down),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    /// The direction that points back from the neighbor.
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// Neighbor links of one patch, indexed by [`Direction::index`].
pub type Neighbors = [Option<usize>; 4];

/// Grid coordinate of the neighbor of `(i, j)` in `dir`, or `None` across an open edge.
pub fn neighbor_coord(
    rows: usize,
    cols: usize,
    boundary: BoundaryMode,
    i: usize,
    j: usize,
    dir: Direction,
) -> Option<(usize, usize)> {
    debug_assert!(i < rows && j < cols, "({i}, {j}) outside {rows}x{cols} grid");
    match boundary {
        BoundaryMode::OpenEdge => match dir {
            Direction::Up => i.checked_sub(1).map(|r| (r, j)),
            Direction::Down => (i + 1 < rows).then_some((i + 1, j)),
            Direction::Left => j.checked_sub(1).map(|c| (i, c)),
            Direction::Right => (j + 1 < cols).then_some((i, j + 1)),
        },
        BoundaryMode::WrapAround => Some(match dir {
            Direction::Up => (if i == 0 { rows - 1 } else { i - 1 }, j),
            Direction::Down => (if i + 1 == rows { 0 } else { i + 1 }, j),
            Direction::Left => (i, if j == 0 { cols - 1 } else { j - 1 }),
            Direction::Right => (i, if j + 1 == cols { 0 } else { j + 1 }),
        }),
    }
}

/// Immutable neighbor table of an `rows x cols` grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    rows: usize,
    cols: usize,
    boundary: BoundaryMode,
    links: Vec<Neighbors>,
}

impl Topology {
    /// Build the table. Returns `None` when either dimension is zero.
    pub fn build(rows: usize, cols: usize, boundary: BoundaryMode) -> Option<Self> {
        if rows == 0 || cols == 0 {
            return None;
        }
        let mut links = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                let mut nb = [None; 4];
                for dir in Direction::ALL {
                    nb[dir.index()] =
                        neighbor_coord(rows, cols, boundary, i, j, dir).map(|(r, c)| r * cols + c);
                }
                links.push(nb);
            }
        }
        Some(Self {
            rows,
            cols,
            boundary,
            links,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.cols + j
    }

    pub fn coord(&self, idx: usize) -> (usize, usize) {
        (idx / self.cols, idx % self.cols)
    }

    pub fn neighbors(&self, idx: usize) -> &Neighbors {
        &self.links[idx]
    }

    pub fn neighbor(&self, idx: usize, dir: Direction) -> Option<usize> {
        self.links[idx][dir.index()]
    }

    /// Number of present links of a patch. Self-links on 1-wide wrapped grids count.
    pub fn neighbor_count(&self, idx: usize) -> usize {
        self.links[idx].iter().filter(|nb| nb.is_some()).count()
    }
}
